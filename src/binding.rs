use statrs::distribution::{Continuous, Normal};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::density::{normalize, support_len};
use crate::error::{ChexmixError, Result};

/// Probability of observing a read at a given signed distance from a binding event.
///
/// Built once and never modified; share it between replicates and threads by reference
/// or through an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingModel {
    min: i32,
    max: i32,
    probs: Vec<f64>,
}

impl BindingModel {
    /// Builds a binding model from an empirical `(distance, weight)` table.
    ///
    /// Distances need not be contiguous: weights at unlisted distances are linearly
    /// interpolated between their listed neighbours. The table is then normalized to sum
    /// to 1 over `[min, max]`, falling back to uniform if every weight is zero.
    ///
    /// # Errors
    /// * `ChexmixError::InvalidParameter` if the table is empty, repeats a distance, holds
    ///   a negative or non-finite weight or spans more than `MAX_SUPPORT` distances
    pub fn from_empirical(pairs: &[(i32, f64)]) -> Result<Self> {
        if pairs.is_empty() {
            return Err(ChexmixError::invalid_parameter(
                "empirical",
                "[]",
                "a binding model needs at least one distance",
            ));
        }
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|(d, _)| *d);
        for w in sorted.windows(2) {
            if w[0].0 == w[1].0 {
                return Err(ChexmixError::invalid_parameter(
                    "empirical",
                    w[0].0,
                    "distance listed twice",
                ));
            }
        }
        if let Some((_, bad)) = sorted.iter().find(|(_, w)| !w.is_finite() || *w < 0.0) {
            return Err(ChexmixError::invalid_parameter(
                "empirical",
                bad,
                "weights must be finite and non-negative",
            ));
        }

        let min = sorted[0].0;
        let max = sorted[sorted.len() - 1].0;
        let mut probs = Vec::with_capacity(support_len(min, max)?);
        probs.push(sorted[0].1);
        for w in sorted.windows(2) {
            let ((d0, p0), (d1, p1)) = (w[0], w[1]);
            let span = (d1 - d0) as f64;
            for d in (d0 + 1)..d1 {
                let frac = (d - d0) as f64 / span;
                probs.push(p0 + (p1 - p0) * frac);
            }
            probs.push(p1);
        }

        Ok(BindingModel {
            min,
            max,
            probs: normalize(probs),
        })
    }

    /// Reads an empirical table from a text file with one `distance weight` pair per line.
    /// Blank lines and lines starting with `#` are skipped.
    ///
    /// # Errors
    /// * `ChexmixError::Io` if the file cannot be read
    /// * `ChexmixError::InvalidFileFormat` if a line does not hold two numbers
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut pairs = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line.split_whitespace();
            let pair = match (words.next(), words.next()) {
                (Some(d), Some(w)) => d.parse::<i32>().ok().zip(w.parse::<f64>().ok()),
                _ => None,
            };
            let pair = pair.ok_or_else(|| {
                ChexmixError::InvalidFileFormat(format!(
                    "line {}: expected 'distance weight', found '{}'",
                    n + 1,
                    line
                ))
            })?;
            pairs.push(pair);
        }
        Self::from_empirical(&pairs)
    }

    /// Symmetric Gaussian read distribution over `[-range, range]`
    pub fn gaussian(range: i32, sd: f64) -> Result<Self> {
        if range < 0 {
            return Err(ChexmixError::invalid_parameter(
                "range",
                range,
                "must not be negative",
            ));
        }
        support_len(-range, range)?;
        let normal = Normal::new(0.0, sd)
            .map_err(|e| ChexmixError::invalid_parameter("sd", sd, e.to_string()))?;
        let pairs: Vec<(i32, f64)> = (-range..=range).map(|d| (d, normal.pdf(d as f64))).collect();
        Self::from_empirical(&pairs)
    }

    pub fn min(&self) -> i32 {
        self.min
    }

    pub fn max(&self) -> i32 {
        self.max
    }

    pub fn influence_range(&self) -> i32 {
        self.max - self.min
    }

    pub fn probability(&self, distance: i32) -> f64 {
        if distance < self.min || distance > self.max {
            0.0
        } else {
            self.probs[(distance - self.min) as usize]
        }
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probs
    }
}
