use log::{debug, info, warn};
use polars::prelude::*;
use rayon::prelude::*;
use std::fmt;

use crate::binding::BindingModel;
use crate::error::Result;
use crate::experiment::{ExperimentDesign, Replicate, StrandedReadSource};
use crate::types::{Point, Region, Strand, StrandedBaseCount};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRole {
    Signal,
    Control,
}

impl fmt::Display for SampleRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleRole::Signal => write!(f, "signal"),
            SampleRole::Control => write!(f, "control"),
        }
    }
}

/// A replicate sample with no reads available; its contribution was skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingData {
    pub replicate: String,
    pub role: SampleRole,
}

/// A candidate binding location with the reads assigned to it.
///
/// Replicate vectors follow the design's global replicate order; condition vectors follow
/// its condition order.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingEvent {
    pub point: Point,
    pub region: Region,
    /// Maximum-likelihood event position in each replicate's signal reads
    pub rep_sig_positions: Vec<Option<i64>>,
    pub rep_sig_hits: Vec<Option<f64>>,
    pub rep_ctrl_hits: Vec<Option<f64>>,
    pub cond_sig_hits: Vec<f64>,
    pub cond_ctrl_hits: Vec<f64>,
    pub missing: Vec<MissingData>,
}

impl BindingEvent {
    fn new(point: Point, region: Region, design: &ExperimentDesign) -> Self {
        let reps = design.num_replicates();
        let conds = design.num_conditions();
        BindingEvent {
            point,
            region,
            rep_sig_positions: vec![None; reps],
            rep_sig_hits: vec![None; reps],
            rep_ctrl_hits: vec![None; reps],
            cond_sig_hits: vec![0.0; conds],
            cond_ctrl_hits: vec![0.0; conds],
            missing: Vec::new(),
        }
    }
}

/// Turns candidate points into binding events by placing a single event in a window around
/// each point and assigning it the reads within binding range.
pub struct PointsToEvents<'a, S: StrandedReadSource> {
    design: &'a ExperimentDesign,
    reads: &'a S,
    region_win: usize,
}

impl<'a, S: StrandedReadSource> PointsToEvents<'a, S> {
    pub fn new(design: &'a ExperimentDesign, reads: &'a S, region_win: usize) -> Self {
        PointsToEvents {
            design,
            reads,
            region_win,
        }
    }

    /// Converts every point to an event. Points are processed in parallel; the output keeps
    /// the input order.
    pub fn execute(&self, points: &[Point]) -> Vec<BindingEvent> {
        for (_, rep) in self.design.replicates() {
            let roles = [
                (SampleRole::Signal, Some(rep.signal)),
                (SampleRole::Control, rep.control),
            ];
            for (role, sample) in roles {
                if !sample.is_some_and(|s| self.reads.has_sample(s)) {
                    warn!(
                        "replicate {} has no {} reads; its contribution is skipped",
                        rep.name, role
                    );
                }
            }
        }
        let events: Vec<BindingEvent> = points.par_iter().map(|p| self.call_event(p)).collect();
        info!("converted {} points to events", events.len());
        events
    }

    /// Builds the event for a single point.
    pub fn call_event(&self, point: &Point) -> BindingEvent {
        let region = point.expand((self.region_win / 2) as i64);
        let mut event = BindingEvent::new(point.clone(), region.clone(), self.design);

        for (rep_idx, (_, rep)) in self.design.replicates().enumerate() {
            match self.sample_reads(Some(rep.signal), &region) {
                Some(hits) => {
                    let (pos, resp) = place_and_assign(&hits, &region, &rep.binding_model);
                    event.rep_sig_positions[rep_idx] = Some(pos);
                    event.rep_sig_hits[rep_idx] = Some(resp);
                }
                None => event.missing.push(missing(rep, SampleRole::Signal)),
            }
            match self.sample_reads(rep.control, &region) {
                Some(hits) => {
                    let (_, resp) = place_and_assign(&hits, &region, &rep.binding_model);
                    event.rep_ctrl_hits[rep_idx] = Some(resp);
                }
                None => event.missing.push(missing(rep, SampleRole::Control)),
            }
        }

        let (sig, ctrl) = condition_responsibilities(self.design, &event);
        event.cond_sig_hits = sig;
        event.cond_ctrl_hits = ctrl;
        debug!(
            "{}: signal {:?}, control {:?}",
            point, event.cond_sig_hits, event.cond_ctrl_hits
        );
        event
    }

    fn sample_reads(
        &self,
        sample: Option<usize>,
        region: &Region,
    ) -> Option<Vec<StrandedBaseCount>> {
        let sample = sample.filter(|s| self.reads.has_sample(*s))?;
        Some(self.reads.stranded_bases(sample, region))
    }
}

fn missing(rep: &Replicate, role: SampleRole) -> MissingData {
    MissingData {
        replicate: rep.name.clone(),
        role,
    }
}

fn place_and_assign(
    hits: &[StrandedBaseCount],
    region: &Region,
    model: &BindingModel,
) -> (i64, f64) {
    let pos = find_max_with_binding_model(hits, region, model);
    (pos, assign_reads_single_event(hits, pos, model))
}

/// Per-condition signal and control totals.
///
/// Within a condition each sample is counted once. The first role a sample is seen in, in
/// replicate order with signal before control, claims it; replicates using it in that role
/// contribute the largest responsibility any of them assigned, and uses in the other role
/// are left out of the totals. Distinct samples are summed.
fn condition_responsibilities(
    design: &ExperimentDesign,
    event: &BindingEvent,
) -> (Vec<f64>, Vec<f64>) {
    let mut claimed: Vec<Vec<Option<(SampleRole, f64)>>> =
        vec![vec![None; design.num_samples()]; design.num_conditions()];

    for (rep_idx, (cond_idx, rep)) in design.replicates().enumerate() {
        let roles = [
            (SampleRole::Signal, Some(rep.signal), event.rep_sig_hits[rep_idx]),
            (SampleRole::Control, rep.control, event.rep_ctrl_hits[rep_idx]),
        ];
        for (role, sample, resp) in roles {
            let (Some(sample), Some(resp)) = (sample, resp) else {
                continue;
            };
            let slot = &mut claimed[cond_idx][sample];
            match slot {
                Some((owner, best)) if *owner == role => *best = best.max(resp),
                Some(_) => {}
                None => *slot = Some((role, resp)),
            }
        }
    }

    let total = |samples: &[Option<(SampleRole, f64)>], role: SampleRole| -> f64 {
        samples
            .iter()
            .flatten()
            .filter(|(owner, _)| *owner == role)
            .map(|(_, resp)| resp)
            .sum()
    };
    claimed
        .iter()
        .map(|samples| {
            (
                total(samples, SampleRole::Signal),
                total(samples, SampleRole::Control),
            )
        })
        .unzip()
}

/// Finds the maximum-likelihood event position in `coords`.
///
/// Every read within binding range of the region spreads `probability(distance) * count`
/// over the positions it could have come from: positions downstream of forward reads and
/// upstream of reverse reads. The first position with the highest score wins. With no
/// evidence at all the region start is returned.
pub fn find_max_with_binding_model(
    hits: &[StrandedBaseCount],
    coords: &Region,
    model: &BindingModel,
) -> i64 {
    let width = coords.width().max(0);
    let (min, max) = (model.min() as i64, model.max() as i64);
    let mut scores = vec![0.0f64; width as usize + 1];

    for x in hits {
        let read_start = x.coordinate;
        if read_start < coords.start - max || read_start > coords.end + max {
            continue;
        }
        let offset = read_start - coords.start;
        match x.strand {
            Strand::Forward => {
                for i in (min + offset).max(0)..=width.min(offset + max) {
                    scores[i as usize] += model.probability((i - offset) as i32) * x.count;
                }
            }
            Strand::Reverse => {
                for i in (offset - max).max(0)..=width.min(offset - min) {
                    scores[i as usize] += model.probability((offset - i) as i32) * x.count;
                }
            }
        }
    }

    let mut max_pos = 0usize;
    let mut max_score = 0.0;
    for (k, score) in scores.iter().enumerate() {
        if *score > max_score {
            max_score = *score;
            max_pos = k;
        }
    }
    coords.start + max_pos as i64
}

/// Total count of reads within `model.max()` bases either side of `position`.
pub fn assign_reads_single_event(
    hits: &[StrandedBaseCount],
    position: i64,
    model: &BindingModel,
) -> f64 {
    let reach = model.max() as i64;
    hits.iter()
        .filter(|x| x.coordinate >= position - reach && x.coordinate <= position + reach)
        .map(|x| x.count)
        .sum()
}

/// Tabulates events with one row per event.
///
/// # Returns
/// * `Result<DataFrame>` - columns `point`, `chrom`, `position`, then `<condition>_signal`
///   and `<condition>_control` per condition, then `<replicate>_signal`,
///   `<replicate>_control` and `<replicate>_peak` per replicate (null where data were missing)
pub fn events_to_dataframe(
    events: &[BindingEvent],
    design: &ExperimentDesign,
) -> Result<DataFrame> {
    let mut columns = vec![
        Column::new(
            "point".into(),
            events.iter().map(|e| e.point.to_string()).collect::<Vec<String>>(),
        ),
        Column::new(
            "chrom".into(),
            events.iter().map(|e| e.point.chrom.clone()).collect::<Vec<String>>(),
        ),
        Column::new(
            "position".into(),
            events.iter().map(|e| e.point.location).collect::<Vec<i64>>(),
        ),
    ];

    for (c, cond) in design.conditions().iter().enumerate() {
        columns.push(Column::new(
            format!("{}_signal", cond.name).into(),
            events.iter().map(|e| e.cond_sig_hits[c]).collect::<Vec<f64>>(),
        ));
        columns.push(Column::new(
            format!("{}_control", cond.name).into(),
            events.iter().map(|e| e.cond_ctrl_hits[c]).collect::<Vec<f64>>(),
        ));
    }

    for (r, (_, rep)) in design.replicates().enumerate() {
        columns.push(Column::new(
            format!("{}_signal", rep.name).into(),
            events.iter().map(|e| e.rep_sig_hits[r]).collect::<Vec<Option<f64>>>(),
        ));
        columns.push(Column::new(
            format!("{}_control", rep.name).into(),
            events.iter().map(|e| e.rep_ctrl_hits[r]).collect::<Vec<Option<f64>>>(),
        ));
        columns.push(Column::new(
            format!("{}_peak", rep.name).into(),
            events.iter().map(|e| e.rep_sig_positions[r]).collect::<Vec<Option<i64>>>(),
        ));
    }

    let df = DataFrame::new(columns)?;
    Ok(df)
}
