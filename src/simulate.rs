use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::binding::BindingModel;
use crate::error::{ChexmixError, Result};
use crate::experiment::ReadStore;
use crate::types::{Strand, StrandedBaseCount};

/// Draws synthetic reads from binding events on a single chromosome.
///
/// Each event adds `strength * probability(distance)` to a per-strand landscape; reads are
/// sampled from the normalized landscape, except for a `noise_prob` share drawn uniformly
/// along the chromosome. The same seed always yields the same reads.
pub struct ReadSimulator {
    chrom: String,
    chrom_len: i64,
    events: Vec<(i64, f64)>,
    noise_prob: f64,
    forward_cumul: Vec<f64>,
    reverse_cumul: Vec<f64>,
    rng: StdRng,
}

impl ReadSimulator {
    /// # Arguments
    /// * `model` - read distribution around each event
    /// * `chrom`, `chrom_len` - the simulated chromosome
    /// * `events` - `(position, strength)` pairs
    /// * `seed` - random seed
    ///
    /// # Errors
    /// * `ChexmixError::InvalidParameter` for an empty chromosome, an event off the
    ///   chromosome or a negative strength
    pub fn new(
        model: &BindingModel,
        chrom: impl Into<String>,
        chrom_len: i64,
        events: Vec<(i64, f64)>,
        seed: u64,
    ) -> Result<Self> {
        if chrom_len <= 0 {
            return Err(ChexmixError::invalid_parameter(
                "chrom_len",
                chrom_len,
                "must be positive",
            ));
        }
        if let Some((pos, strength)) = events
            .iter()
            .find(|(p, s)| *p < 0 || *p >= chrom_len || !(*s >= 0.0))
        {
            return Err(ChexmixError::invalid_parameter(
                "event",
                format!("{}:{}", pos, strength),
                "events must lie on the chromosome with non-negative strength",
            ));
        }

        let len = chrom_len as usize;
        let mut forward = vec![0.0; len];
        let mut reverse = vec![0.0; len];
        let range = model.min().abs().max(model.max().abs()) as i64;
        for (pos, strength) in &events {
            for i in (pos - range).max(0)..(pos + range + 1).min(chrom_len) {
                forward[i as usize] += strength * model.probability((i - pos) as i32);
                reverse[i as usize] += strength * model.probability((pos - i) as i32);
            }
        }

        Ok(ReadSimulator {
            chrom: chrom.into(),
            chrom_len,
            events,
            noise_prob: 0.5,
            forward_cumul: cumulative(forward),
            reverse_cumul: cumulative(reverse),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    /// # Errors
    /// * `ChexmixError::InvalidParameter` if `p` is outside [0, 1]
    pub fn set_noise_prob(&mut self, p: f64) -> Result<()> {
        if !(0.0..=1.0).contains(&p) {
            return Err(ChexmixError::invalid_parameter(
                "noise_prob",
                p,
                "must lie in [0, 1]",
            ));
        }
        self.noise_prob = p;
        Ok(())
    }

    /// Draws `num_reads` reads on one strand, each with a count of 1.
    pub fn simulate(&mut self, num_reads: usize, strand: Strand) -> Vec<StrandedBaseCount> {
        let mut reads = Vec::with_capacity(num_reads);
        for _ in 0..num_reads {
            let noise: f64 = self.rng.random();
            let cumul = match strand {
                Strand::Forward => &self.forward_cumul,
                Strand::Reverse => &self.reverse_cumul,
            };
            // without any event signal every read is noise
            let from_event = noise >= self.noise_prob && cumul.last().is_some_and(|t| *t > 0.0);
            let coordinate = if from_event {
                let r: f64 = self.rng.random();
                cumul.partition_point(|c| *c <= r).min(cumul.len() - 1) as i64
            } else {
                self.rng.random_range(0..self.chrom_len)
            };
            reads.push(StrandedBaseCount::new(coordinate, strand, 1.0));
        }
        reads
    }

    /// Half the reads on each strand; the reverse strand takes the odd one out.
    pub fn simulate_both_strands(&mut self, num_reads: usize) -> Vec<StrandedBaseCount> {
        let mut reads = self.simulate(num_reads / 2, Strand::Forward);
        reads.extend(self.simulate(num_reads - num_reads / 2, Strand::Reverse));
        reads
    }

    /// Simulates reads straight into `store` under `sample`.
    pub fn simulate_into(&mut self, store: &mut ReadStore, sample: usize, num_reads: usize) {
        let reads = self.simulate_both_strands(num_reads);
        info!(
            "simulated {} reads on {} from {} events",
            reads.len(),
            self.chrom,
            self.events.len()
        );
        store.extend(sample, &self.chrom, reads);
    }
}

/// Running totals scaled to end at 1. An all-zero landscape stays all zero.
fn cumulative(landscape: Vec<f64>) -> Vec<f64> {
    let mut running = 0.0;
    let mut cumul: Vec<f64> = landscape
        .into_iter()
        .map(|v| {
            running += v;
            running
        })
        .collect();
    if running > 0.0 {
        cumul.iter_mut().for_each(|c| *c /= running);
    }
    cumul
}
