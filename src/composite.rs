use log::info;
use ndarray::Array2;

use crate::error::{ChexmixError, Result};
use crate::experiment::{ExperimentDesign, StrandedReadSource};
use crate::types::{Point, ProfileMatrix, Region, Strand};

/// Window geometry plus per-condition Watson/Crick composite profiles
pub trait CompositeProfile {
    fn window_size(&self) -> usize;

    /// Index of the window position that corresponds to the aligned points
    fn center_offset(&self) -> i32;

    fn num_conditions(&self) -> usize;

    /// `num_conditions x window_size` forward-strand profile
    fn composite_watson(&self) -> &ProfileMatrix;

    /// `num_conditions x window_size` reverse-strand profile
    fn composite_crick(&self) -> &ProfileMatrix;
}

/// Composite read profiles around a set of aligned points, summed over replicates.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeTagDistribution {
    center_offset: i32,
    watson: ProfileMatrix,
    crick: ProfileMatrix,
}

impl CompositeTagDistribution {
    /// # Errors
    /// * `ChexmixError::InvalidParameter` if the two profiles differ in shape, are empty, or
    ///   `center_offset` lies outside the window
    pub fn new(watson: ProfileMatrix, crick: ProfileMatrix, center_offset: i32) -> Result<Self> {
        if watson.dim() != crick.dim() {
            return Err(ChexmixError::invalid_parameter(
                "composite",
                format!("{:?} vs {:?}", watson.dim(), crick.dim()),
                "Watson and Crick profiles must have the same shape",
            ));
        }
        let width = watson.ncols();
        if width == 0 || center_offset < 0 || center_offset as usize >= width {
            return Err(ChexmixError::invalid_parameter(
                "center_offset",
                center_offset,
                format!("must lie inside a window of width {}", width),
            ));
        }
        Ok(CompositeTagDistribution {
            center_offset,
            watson,
            crick,
        })
    }

    /// Piles up each condition's signal reads around every point.
    ///
    /// The window is `width` positions wide with the point at `width / 2`. Windows around
    /// reverse-strand points are mirrored, so their forward reads land on the Crick profile
    /// and vice versa.
    pub fn build<S: StrandedReadSource>(
        points: &[(Point, Strand)],
        design: &ExperimentDesign,
        reads: &S,
        width: usize,
    ) -> Result<Self> {
        if width == 0 {
            return Err(ChexmixError::invalid_parameter(
                "width",
                width,
                "window must be non-empty",
            ));
        }
        let center = (width / 2) as i64;
        let last = width as i64 - 1;
        let mut watson = Array2::<f64>::zeros((design.num_conditions(), width));
        let mut crick = Array2::<f64>::zeros((design.num_conditions(), width));

        for (point, strand) in points {
            let region = match strand {
                Strand::Forward => Region::new(
                    point.chrom.clone(),
                    point.location - center,
                    point.location - center + last,
                ),
                Strand::Reverse => Region::new(
                    point.chrom.clone(),
                    point.location + center - last,
                    point.location + center,
                ),
            };
            for (c, rep) in design.replicates() {
                for base in reads.stranded_bases(rep.signal, &region) {
                    let (idx, same_strand) = match strand {
                        Strand::Forward => (
                            base.coordinate - region.start,
                            base.strand == Strand::Forward,
                        ),
                        Strand::Reverse => (
                            region.end - base.coordinate,
                            base.strand == Strand::Reverse,
                        ),
                    };
                    if !(0..=last).contains(&idx) {
                        continue;
                    }
                    let target = if same_strand { &mut watson } else { &mut crick };
                    target[[c, idx as usize]] += base.count;
                }
            }
        }
        info!(
            "built composite of {} points over {} conditions, width {}",
            points.len(),
            design.num_conditions(),
            width
        );
        Self::new(watson, crick, center as i32)
    }
}

impl CompositeProfile for CompositeTagDistribution {
    fn window_size(&self) -> usize {
        self.watson.ncols()
    }

    fn center_offset(&self) -> i32 {
        self.center_offset
    }

    fn num_conditions(&self) -> usize {
        self.watson.nrows()
    }

    fn composite_watson(&self) -> &ProfileMatrix {
        &self.watson
    }

    fn composite_crick(&self) -> &ProfileMatrix {
        &self.crick
    }
}
