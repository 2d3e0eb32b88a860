use log::debug;
use polars::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::binding::BindingModel;
use crate::error::{ChexmixError, Result};
use crate::types::{Region, Strand, StrandedBaseCount};

/// Read-only access to per-sample stranded read counts.
///
/// One call must return a self-consistent snapshot of the requested region, sorted by
/// coordinate. Implementations are shared across worker threads.
pub trait StrandedReadSource: Sync {
    fn stranded_bases(&self, sample: usize, region: &Region) -> Vec<StrandedBaseCount>;

    fn has_sample(&self, sample: usize) -> bool;
}

/// A signal sample paired with an optional control, plus the binding model used to
/// place events in it.
#[derive(Debug, Clone)]
pub struct Replicate {
    pub name: String,
    pub signal: usize,
    pub control: Option<usize>,
    pub binding_model: Arc<BindingModel>,
}

impl Replicate {
    pub fn new(
        name: impl Into<String>,
        signal: usize,
        control: Option<usize>,
        binding_model: Arc<BindingModel>,
    ) -> Self {
        Replicate {
            name: name.into(),
            signal,
            control,
            binding_model,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Condition {
    pub name: String,
    pub replicates: Vec<Replicate>,
}

impl Condition {
    pub fn new(name: impl Into<String>, replicates: Vec<Replicate>) -> Self {
        Condition {
            name: name.into(),
            replicates,
        }
    }
}

/// Conditions and their replicates. Replicates are numbered globally in condition order.
#[derive(Debug, Clone)]
pub struct ExperimentDesign {
    conditions: Vec<Condition>,
    num_samples: usize,
}

impl ExperimentDesign {
    /// # Errors
    /// * `ChexmixError::InvalidParameter` if there are no conditions or a condition has no
    ///   replicates
    pub fn new(conditions: Vec<Condition>) -> Result<Self> {
        if conditions.is_empty() {
            return Err(ChexmixError::invalid_parameter(
                "conditions",
                0,
                "an experiment needs at least one condition",
            ));
        }
        if let Some(empty) = conditions.iter().find(|c| c.replicates.is_empty()) {
            return Err(ChexmixError::invalid_parameter(
                "replicates",
                &empty.name,
                "condition has no replicates",
            ));
        }
        let num_samples = conditions
            .iter()
            .flat_map(|c| c.replicates.iter())
            .flat_map(|r| std::iter::once(r.signal).chain(r.control))
            .max()
            .map_or(0, |m| m + 1);
        Ok(ExperimentDesign {
            conditions,
            num_samples,
        })
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn num_conditions(&self) -> usize {
        self.conditions.len()
    }

    /// One more than the largest sample index referenced by any replicate
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_replicates(&self) -> usize {
        self.conditions.iter().map(|c| c.replicates.len()).sum()
    }

    /// All replicates in global order, with their condition index
    pub fn replicates(&self) -> impl Iterator<Item = (usize, &Replicate)> {
        self.conditions
            .iter()
            .enumerate()
            .flat_map(|(c, cond)| cond.replicates.iter().map(move |r| (c, r)))
    }
}

/// In-memory read counts, per sample and chromosome, kept sorted by coordinate then strand.
#[derive(Debug, Default, Clone)]
pub struct ReadStore {
    samples: HashMap<usize, HashMap<String, Vec<StrandedBaseCount>>>,
}

impl ReadStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `count` reads at a coordinate, merging with reads already stored at the same
    /// coordinate and strand.
    pub fn add(&mut self, sample: usize, chrom: &str, coordinate: i64, strand: Strand, count: f64) {
        let bases = self
            .samples
            .entry(sample)
            .or_default()
            .entry(chrom.to_string())
            .or_default();
        let key = (coordinate, strand_rank(strand));
        match bases.binary_search_by_key(&key, |b| (b.coordinate, strand_rank(b.strand))) {
            Ok(i) => bases[i].count += count,
            Err(i) => bases.insert(i, StrandedBaseCount::new(coordinate, strand, count)),
        }
    }

    pub fn extend(
        &mut self,
        sample: usize,
        chrom: &str,
        bases: impl IntoIterator<Item = StrandedBaseCount>,
    ) {
        for b in bases {
            self.add(sample, chrom, b.coordinate, b.strand, b.count);
        }
    }

    /// Total weighted count held for a sample
    pub fn total(&self, sample: usize) -> f64 {
        self.samples
            .get(&sample)
            .map(|chroms| chroms.values().flatten().map(|b| b.count).sum())
            .unwrap_or(0.0)
    }

    /// Loads a tab-separated table with columns `chrom`, `position`, `strand` and an
    /// optional `count` (defaulting to 1 per row) into `sample`.
    ///
    /// # Errors
    /// * `ChexmixError::DataError` if the table cannot be read or a column is missing
    /// * `ChexmixError::InvalidParameter` for a strand other than `+` or `-`
    pub fn load_tsv<P: AsRef<Path>>(&mut self, sample: usize, path: P) -> Result<()> {
        let df = LazyCsvReader::new(path.as_ref())
            .with_has_header(true)
            .with_separator(b'\t')
            .finish()?
            .collect()?;

        let chroms = df.column("chrom")?.cast(&DataType::String)?;
        let positions = df.column("position")?.cast(&DataType::Int64)?;
        let strands = df.column("strand")?.cast(&DataType::String)?;
        let counts = match df.column("count") {
            Ok(c) => c.cast(&DataType::Float64)?,
            Err(_) => Column::new("count".into(), vec![1.0f64; df.height()]),
        };

        let rows = chroms
            .as_materialized_series()
            .str()?
            .into_iter()
            .zip(positions.as_materialized_series().i64()?)
            .zip(strands.as_materialized_series().str()?)
            .zip(counts.as_materialized_series().f64()?);

        let mut loaded = 0usize;
        for (((chrom, pos), strand), count) in rows {
            let (Some(chrom), Some(pos), Some(strand)) = (chrom, pos, strand) else {
                return Err(ChexmixError::DataError(format!(
                    "row {} of sample {} has an empty field",
                    loaded + 1,
                    sample
                )));
            };
            let strand = Strand::try_from(strand.chars().next().unwrap_or(' '))?;
            self.add(sample, chrom, pos, strand, count.unwrap_or(1.0));
            loaded += 1;
        }
        debug!("loaded {} rows into sample {}", loaded, sample);
        Ok(())
    }

    /// Reads of one sample as a `chrom`/`position`/`strand`/`count` table, chromosomes in
    /// lexical order.
    pub fn to_dataframe(&self, sample: usize) -> Result<DataFrame> {
        let mut chroms: Vec<String> = Vec::new();
        let mut positions: Vec<i64> = Vec::new();
        let mut strands: Vec<String> = Vec::new();
        let mut counts: Vec<f64> = Vec::new();

        if let Some(by_chrom) = self.samples.get(&sample) {
            let mut names: Vec<&String> = by_chrom.keys().collect();
            names.sort();
            for name in names {
                for b in &by_chrom[name] {
                    chroms.push(name.clone());
                    positions.push(b.coordinate);
                    strands.push(b.strand.to_string());
                    counts.push(b.count);
                }
            }
        }

        let df = DataFrame::new(vec![
            Column::new("chrom".into(), chroms),
            Column::new("position".into(), positions),
            Column::new("strand".into(), strands),
            Column::new("count".into(), counts),
        ])?;
        Ok(df)
    }
}

impl StrandedReadSource for ReadStore {
    fn stranded_bases(&self, sample: usize, region: &Region) -> Vec<StrandedBaseCount> {
        let Some(bases) = self
            .samples
            .get(&sample)
            .and_then(|chroms| chroms.get(&region.chrom))
        else {
            return Vec::new();
        };
        let lo = bases.partition_point(|b| b.coordinate < region.start);
        let hi = bases.partition_point(|b| b.coordinate <= region.end);
        bases[lo..hi].to_vec()
    }

    fn has_sample(&self, sample: usize) -> bool {
        self.samples.contains_key(&sample)
    }
}

fn strand_rank(strand: Strand) -> u8 {
    match strand {
        Strand::Forward => 0,
        Strand::Reverse => 1,
    }
}
