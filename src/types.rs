use ndarray::Array2;
use std::collections::HashMap;
use std::fmt;

use crate::density::TagProbabilityDensity;
use crate::error::ChexmixError;

/// Per-condition composite read profile.
/// Rows are conditions, columns are window positions.
pub type ProfileMatrix = Array2<f64>;

/// Densities keyed by the index of the component they belong to
pub type DensityLookup = HashMap<usize, TagProbabilityDensity>;

/// Read strand. Watson is the forward strand, Crick the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strand {
    Forward,
    Reverse,
}

impl Strand {
    pub fn as_char(&self) -> char {
        match self {
            Strand::Forward => '+',
            Strand::Reverse => '-',
        }
    }
}

impl TryFrom<char> for Strand {
    type Error = ChexmixError;

    fn try_from(c: char) -> Result<Self, Self::Error> {
        match c {
            '+' => Ok(Strand::Forward),
            '-' => Ok(Strand::Reverse),
            other => Err(ChexmixError::invalid_parameter(
                "strand",
                other,
                "expected '+' or '-'",
            )),
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// All reads whose 5' end falls on the same coordinate and strand, collapsed to one
/// weighted count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrandedBaseCount {
    pub coordinate: i64,
    pub strand: Strand,
    pub count: f64,
}

impl StrandedBaseCount {
    pub fn new(coordinate: i64, strand: Strand, count: f64) -> Self {
        StrandedBaseCount {
            coordinate,
            strand,
            count,
        }
    }
}

/// A single genomic coordinate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Point {
    pub chrom: String,
    pub location: i64,
}

impl Point {
    pub fn new(chrom: impl Into<String>, location: i64) -> Self {
        Point {
            chrom: chrom.into(),
            location,
        }
    }

    /// Region of `distance` bases either side of this point. The start is clipped at 0.
    pub fn expand(&self, distance: i64) -> Region {
        Region::new(
            self.chrom.clone(),
            (self.location - distance).max(0),
            self.location + distance,
        )
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chrom, self.location)
    }
}

/// Closed genomic interval `[start, end]`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Region {
    pub chrom: String,
    pub start: i64,
    pub end: i64,
}

impl Region {
    pub fn new(chrom: impl Into<String>, start: i64, end: i64) -> Self {
        Region {
            chrom: chrom.into(),
            start,
            end,
        }
    }

    /// Distance from start to end. A region of width `w` covers `w + 1` bases.
    pub fn width(&self) -> i64 {
        self.end - self.start
    }

    pub fn contains(&self, coordinate: i64) -> bool {
        coordinate >= self.start && coordinate <= self.end
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
    }
}
