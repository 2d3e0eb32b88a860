use log::warn;
use statrs::distribution::{Continuous, Normal};

use crate::binding::BindingModel;
use crate::error::{ChexmixError, Result};

pub const DENSITY_TAG: &str = "#TagProbabilityDensity";

/// Widest support, in offsets, a density or binding model may span
pub const MAX_SUPPORT: usize = 1 << 20;

/// Discretized read-density footprint over signed offsets relative to an event center.
///
/// The table covers the closed support `[min, max]`; `probability` is 0 everywhere else.
/// `Clone` is a deep copy, so two components never share a table.
#[derive(Debug, Clone, PartialEq)]
pub struct TagProbabilityDensity {
    index: usize,
    min: i32,
    max: i32,
    probs: Vec<f64>,
}

impl TagProbabilityDensity {
    /// Builds a density from raw counts laid out from `min` upwards.
    ///
    /// The table is normalized to sum to 1. An all-zero table falls back to a uniform
    /// distribution over the same support.
    ///
    /// # Errors
    /// * Returns `ChexmixError::InvalidParameter` if `counts` is empty, holds a negative
    ///   or non-finite value, or runs past `i32::MAX` or [`MAX_SUPPORT`]
    pub fn from_counts(min: i32, counts: &[f64]) -> Result<Self> {
        if counts.is_empty() {
            return Err(ChexmixError::invalid_parameter(
                "counts",
                "[]",
                "a density needs at least one offset",
            ));
        }
        check_weights(counts)?;
        let max = i32::try_from(counts.len() - 1)
            .ok()
            .and_then(|n| min.checked_add(n))
            .ok_or_else(|| {
                ChexmixError::invalid_parameter(
                    "counts",
                    counts.len(),
                    format!("too many offsets above {}", min),
                )
            })?;
        support_len(min, max)?;
        Ok(TagProbabilityDensity {
            index: 0,
            min,
            max,
            probs: normalize(counts.to_vec()),
        })
    }

    /// Builds a density from sparse `(offset, weight)` pairs. Offsets between the smallest
    /// and largest listed offset that are not listed get weight 0.
    pub fn from_pairs(pairs: &[(i32, f64)]) -> Result<Self> {
        let min = pairs.iter().map(|(o, _)| *o).min().ok_or_else(|| {
            ChexmixError::invalid_parameter("pairs", "[]", "a density needs at least one offset")
        })?;
        let max = pairs.iter().map(|(o, _)| *o).max().unwrap_or(min);
        let mut counts = vec![0.0; support_len(min, max)?];
        for (offset, weight) in pairs {
            counts[(*offset as i64 - min as i64) as usize] += weight;
        }
        Self::from_counts(min, &counts)
    }

    pub fn uniform(min: i32, max: i32) -> Result<Self> {
        let width = support_len(min, max)?;
        Ok(TagProbabilityDensity {
            index: 0,
            min,
            max,
            probs: vec![1.0 / width as f64; width],
        })
    }

    /// Discretized Gaussian with the given mean and standard deviation, truncated to
    /// `[min, max]` and renormalized.
    pub fn gaussian(min: i32, max: i32, mean: f64, sd: f64) -> Result<Self> {
        support_len(min, max)?;
        let normal = Normal::new(mean, sd)
            .map_err(|e| ChexmixError::invalid_parameter("sd", sd, e.to_string()))?;
        let counts: Vec<f64> = (min..=max).map(|x| normal.pdf(x as f64)).collect();
        Self::from_counts(min, &counts)
    }

    /// Seeds a density with the shape of a binding model
    pub fn from_binding_model(model: &BindingModel) -> Self {
        TagProbabilityDensity {
            index: 0,
            min: model.min(),
            max: model.max(),
            probs: model.probabilities().to_vec(),
        }
    }

    /// Returns a copy of this density tagged with `index`
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn index(&self) -> usize {
        self.index
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

    pub fn probability(&self, offset: i32) -> f64 {
        if offset < self.min || offset > self.max {
            0.0
        } else {
            self.probs[(offset - self.min) as usize]
        }
    }

    pub fn probabilities(&self) -> &[f64] {
        &self.probs
    }

    /// Replaces the table with re-estimated weights over the same support.
    pub fn update(&mut self, weights: &[f64]) -> Result<()> {
        if weights.len() != self.probs.len() {
            return Err(ChexmixError::invalid_parameter(
                "weights",
                weights.len(),
                format!("expected {} values", self.probs.len()),
            ));
        }
        check_weights(weights)?;
        self.probs = normalize(weights.to_vec());
        Ok(())
    }

    /// Three-line text form: header, offsets, probabilities.
    pub fn save_string(&self) -> String {
        let mut out = format!("{},{},{},{},\n", DENSITY_TAG, self.index, self.min, self.max);
        for offset in self.min..=self.max {
            out.push_str(&format!("{},", offset));
        }
        out.push('\n');
        for p in &self.probs {
            out.push_str(&format!("{},", p));
        }
        out.push('\n');
        out
    }

    /// Parses the three lines written by [`save_string`](Self::save_string).
    ///
    /// Stored probabilities are kept as written so that a save/load cycle is exact,
    /// except for an all-zero table, which becomes uniform.
    ///
    /// # Errors
    /// * `ChexmixError::InvalidFileFormat` naming the first defect found
    pub fn load(lines: &[&str]) -> Result<Self> {
        if lines.len() != 3 {
            return Err(ChexmixError::InvalidFileFormat(format!(
                "density block has {} lines, expected 3",
                lines.len()
            )));
        }
        let header = fields(lines[0]);
        if header.len() != 4 || header[0] != DENSITY_TAG {
            return Err(ChexmixError::InvalidFileFormat(format!(
                "bad density header '{}'",
                lines[0]
            )));
        }
        let index: usize = parse_field(header[1], "density index")?;
        let min: i32 = parse_field(header[2], "density min")?;
        let max: i32 = parse_field(header[3], "density max")?;
        support_len(min, max)?;

        let offsets = fields(lines[1])
            .into_iter()
            .map(|f| parse_field::<i32>(f, "density offset"))
            .collect::<Result<Vec<_>>>()?;
        if offsets.iter().copied().ne(min..=max) {
            return Err(ChexmixError::InvalidFileFormat(format!(
                "density offsets do not span [{}, {}]",
                min, max
            )));
        }
        let probs = fields(lines[2])
            .into_iter()
            .map(|f| parse_field::<f64>(f, "density probability"))
            .collect::<Result<Vec<_>>>()?;
        if probs.len() != offsets.len() {
            return Err(ChexmixError::InvalidFileFormat(format!(
                "density has {} offsets but {} probabilities",
                offsets.len(),
                probs.len()
            )));
        }
        check_weights(&probs)?;
        let probs = if probs.iter().sum::<f64>() > 0.0 {
            probs
        } else {
            normalize(probs)
        };

        Ok(TagProbabilityDensity {
            index,
            min,
            max,
            probs,
        })
    }
}

/// Splits a comma-separated line, dropping the trailing empty field left by a final comma.
pub(crate) fn fields(line: &str) -> Vec<&str> {
    let line = line.trim_end();
    let line = line.strip_suffix(',').unwrap_or(line);
    if line.is_empty() {
        return Vec::new();
    }
    line.split(',').map(str::trim).collect()
}

pub(crate) fn parse_field<T: std::str::FromStr>(field: &str, what: &str) -> Result<T> {
    field
        .parse::<T>()
        .map_err(|_| ChexmixError::InvalidFileFormat(format!("invalid {}: '{}'", what, field)))
}

/// Number of offsets in `[min, max]`.
///
/// # Errors
/// * `ChexmixError::InvalidParameter` if `min > max` or the span exceeds [`MAX_SUPPORT`]
pub(crate) fn support_len(min: i32, max: i32) -> Result<usize> {
    if min > max {
        return Err(ChexmixError::invalid_parameter(
            "support",
            format!("[{}, {}]", min, max),
            "min must not exceed max",
        ));
    }
    let len = (max as i64 - min as i64 + 1) as usize;
    if len > MAX_SUPPORT {
        return Err(ChexmixError::invalid_parameter(
            "support",
            format!("[{}, {}]", min, max),
            format!("spans more than {} offsets", MAX_SUPPORT),
        ));
    }
    Ok(len)
}

fn check_weights(weights: &[f64]) -> Result<()> {
    if let Some(bad) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(ChexmixError::invalid_parameter(
            "weight",
            bad,
            "weights must be finite and non-negative",
        ));
    }
    Ok(())
}

/// Scales weights to sum to 1; a zero-sum table becomes uniform.
pub(crate) fn normalize(mut weights: Vec<f64>) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total > 0.0 && total.is_finite() {
        weights.iter_mut().for_each(|w| *w /= total);
    } else {
        warn!(
            "degenerate density over {} offsets, falling back to uniform",
            weights.len()
        );
        let uniform = 1.0 / weights.len() as f64;
        weights.iter_mut().for_each(|w| *w = uniform);
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_drops_trailing_comma() {
        assert_eq!(fields("a,b,c,"), vec!["a", "b", "c"]);
        assert_eq!(fields("a,b"), vec!["a", "b"]);
        assert!(fields(",").is_empty());
    }

    #[test]
    fn normalize_zero_sum_is_uniform() {
        let probs = normalize(vec![0.0; 4]);
        assert!(probs.iter().all(|p| (*p - 0.25).abs() < 1e-12));
    }
}
