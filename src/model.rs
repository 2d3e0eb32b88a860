//! The protein-DNA interaction mixture for one window: a background component, a
//! ChIP-signal component and a row of cross-link components, together with the composite
//! read profiles the mixture describes.
//!
//! Saved models are line-oriented text. The header line carries the window geometry;
//! composite rows, density blocks and component lines follow, each recognised by its
//! `#` prefix. Lines with any other prefix are ignored on load.

use log::{debug, info, warn};
use ndarray::Array2;
use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::path::Path;

use crate::component::{ComponentLabel, CompositeModelComponent, COMPONENT_TAG};
use crate::composite::CompositeProfile;
use crate::config::ModelConfig;
use crate::density::{fields, parse_field, TagProbabilityDensity, DENSITY_TAG, MAX_SUPPORT};
use crate::error::{ChexmixError, Result};
use crate::types::{DensityLookup, ProfileMatrix};

pub const MODEL_TAG: &str = "#ProteinDNAInteractionModel";
pub const WATSON_TAG: &str = "#CompositeWatson";
pub const CRICK_TAG: &str = "#CompositeCrick";

/// Upper bound on `num_conditions * width` accepted from a saved header
const MAX_COMPOSITE_CELLS: usize = 1 << 26;

const BACKGROUND_INDEX: usize = 0;
const CHIP_SIGNAL_INDEX: usize = 1;

#[derive(Debug, Clone, PartialEq)]
pub struct ProteinDnaInteractionModel {
    width: usize,
    center_offset: i32,
    num_conditions: usize,
    composite_watson: ProfileMatrix,
    composite_crick: ProfileMatrix,
    background: CompositeModelComponent,
    chip_signal: CompositeModelComponent,
    cross_links: Vec<CompositeModelComponent>,
    min_component_pi: f64,
}

impl ProteinDnaInteractionModel {
    /// Initializes a model over a composite profile.
    ///
    /// The background and ChIP-signal components sit at the window center. Cross-link
    /// components are spread `config.xl_component_spacing` apart, centered on the window;
    /// their number is how many spacings fit in half the ChIP-signal density's influence
    /// range. Each cross-link component gets its own copy of `xl_seed`.
    ///
    /// Initial pis: background gets `noise_pi`; the ChIP-signal component gets
    /// `max((1 - noise_pi) * init_cs_to_xl_ratio, min_cs_pi)`, capped at `1 - noise_pi`;
    /// the remaining binding mass is shared evenly among the cross-link components.
    ///
    /// # Errors
    /// * `ChexmixError::InvalidParameter` if `config` fails validation or `noise_pi` is
    ///   outside [0, 1]
    pub fn new<P: CompositeProfile>(
        config: &ModelConfig,
        composite: &P,
        xl_seed: &TagProbabilityDensity,
        cs_seed: TagProbabilityDensity,
        background_seed: TagProbabilityDensity,
        noise_pi: f64,
    ) -> Result<Self> {
        config.validate()?;
        if !(0.0..=1.0).contains(&noise_pi) {
            return Err(ChexmixError::invalid_parameter(
                "noise_pi",
                noise_pi,
                "must lie in [0, 1]",
            ));
        }
        let center_offset = composite.center_offset();
        let spacing = config.xl_component_spacing;

        let background = CompositeModelComponent::new(
            background_seed,
            center_offset,
            BACKGROUND_INDEX,
            ComponentLabel::Background,
            false,
        );

        let num_xl = (cs_seed.influence_range() / 2) as usize / spacing;
        let chip_signal = CompositeModelComponent::new(
            cs_seed,
            center_offset,
            CHIP_SIGNAL_INDEX,
            ComponentLabel::ChipSignal,
            false,
        );

        let mut xl_pos = center_offset - (num_xl * spacing) as i32 / 2;
        let mut cross_links = Vec::with_capacity(num_xl);
        for i in 0..num_xl {
            cross_links.push(CompositeModelComponent::new(
                xl_seed.clone(),
                xl_pos,
                i + 2,
                ComponentLabel::CrossLink,
                true,
            ));
            xl_pos += spacing as i32;
        }

        let mut model = ProteinDnaInteractionModel {
            width: composite.window_size(),
            center_offset,
            num_conditions: composite.num_conditions(),
            composite_watson: composite.composite_watson().clone(),
            composite_crick: composite.composite_crick().clone(),
            background,
            chip_signal,
            cross_links,
            min_component_pi: config.min_component_pi,
        };
        model.set_initial_pi(config, noise_pi);
        info!(
            "initialized model: width {}, {} conditions, {} cross-link components",
            model.width, model.num_conditions, num_xl
        );
        Ok(model)
    }

    /// Assembles a model from already materialized components, e.g. after loading.
    /// An empty cross-link list is allowed.
    ///
    /// # Errors
    /// * `ChexmixError::InvalidParameter` if a component carries the wrong label or the
    ///   composite profiles do not match the declared geometry
    #[allow(clippy::too_many_arguments)]
    pub fn from_components(
        width: usize,
        center_offset: i32,
        num_conditions: usize,
        composite_watson: ProfileMatrix,
        composite_crick: ProfileMatrix,
        chip_signal: CompositeModelComponent,
        background: CompositeModelComponent,
        cross_links: Vec<CompositeModelComponent>,
    ) -> Result<Self> {
        let shape = (num_conditions, width);
        if composite_watson.dim() != shape || composite_crick.dim() != shape {
            return Err(ChexmixError::invalid_parameter(
                "composite",
                format!("{:?}/{:?}", composite_watson.dim(), composite_crick.dim()),
                format!("expected {:?}", shape),
            ));
        }
        let expect = |comp: &CompositeModelComponent, label: ComponentLabel| {
            if comp.label() == label {
                Ok(())
            } else {
                Err(ChexmixError::invalid_parameter(
                    "component",
                    comp.index(),
                    format!("expected a {} component, found {}", label, comp.label()),
                ))
            }
        };
        expect(&chip_signal, ComponentLabel::ChipSignal)?;
        expect(&background, ComponentLabel::Background)?;
        for xl in &cross_links {
            expect(xl, ComponentLabel::CrossLink)?;
        }

        Ok(ProteinDnaInteractionModel {
            width,
            center_offset,
            num_conditions,
            composite_watson,
            composite_crick,
            background,
            chip_signal,
            cross_links,
            min_component_pi: 0.0,
        })
    }

    fn set_initial_pi(&mut self, config: &ModelConfig, noise_pi: f64) {
        self.background.set_pi(noise_pi);
        let binding_pi = 1.0 - noise_pi;
        if self.cross_links.is_empty() {
            warn!("no room for cross-link components; ChIP-signal takes all binding mass");
            self.chip_signal.set_pi(binding_pi);
            return;
        }
        let cs_pi = (binding_pi * config.init_cs_to_xl_ratio)
            .max(config.min_cs_pi)
            .min(binding_pi);
        self.chip_signal.set_pi(cs_pi);
        let xl_pi = (binding_pi - cs_pi) / self.cross_links.len() as f64;
        for xl in &mut self.cross_links {
            xl.set_pi(xl_pi);
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn center_offset(&self) -> i32 {
        self.center_offset
    }

    pub fn num_conditions(&self) -> usize {
        self.num_conditions
    }

    pub fn composite_watson(&self) -> &ProfileMatrix {
        &self.composite_watson
    }

    pub fn composite_crick(&self) -> &ProfileMatrix {
        &self.composite_crick
    }

    pub fn background(&self) -> &CompositeModelComponent {
        &self.background
    }

    pub fn chip_signal(&self) -> &CompositeModelComponent {
        &self.chip_signal
    }

    pub fn cross_links(&self) -> &[CompositeModelComponent] {
        &self.cross_links
    }

    pub fn cross_links_mut(&mut self) -> &mut [CompositeModelComponent] {
        &mut self.cross_links
    }

    pub fn num_components(&self) -> usize {
        2 + self.cross_links.len()
    }

    /// Background, ChIP-signal, then cross-links in index order
    pub fn components(&self) -> impl Iterator<Item = &CompositeModelComponent> {
        std::iter::once(&self.background)
            .chain(std::iter::once(&self.chip_signal))
            .chain(self.cross_links.iter())
    }

    pub fn components_mut(&mut self) -> impl Iterator<Item = &mut CompositeModelComponent> {
        std::iter::once(&mut self.background)
            .chain(std::iter::once(&mut self.chip_signal))
            .chain(self.cross_links.iter_mut())
    }

    pub fn component(&self, index: usize) -> Option<&CompositeModelComponent> {
        self.components().find(|c| c.index() == index)
    }

    pub fn min_component_pi(&self) -> f64 {
        self.min_component_pi
    }

    pub fn set_min_component_pi(&mut self, epsilon: f64) {
        self.min_component_pi = epsilon;
    }

    /// Components whose pi exceeds the model's epsilon
    pub fn non_zero_components(&self) -> Vec<&CompositeModelComponent> {
        let epsilon = self.min_component_pi;
        self.components()
            .filter(|c| c.is_non_zero_above(epsilon))
            .collect()
    }

    pub fn pi_total(&self) -> f64 {
        self.components().map(|c| c.pi()).sum()
    }

    /// Rescales all pis to sum to 1. If every pi is zero the background takes all mass.
    pub fn normalize_pi(&mut self) {
        let total = self.pi_total();
        if total > 0.0 && total.is_finite() {
            self.components_mut().for_each(|c| c.set_pi(c.pi() / total));
        } else {
            warn!("all component pis are zero; resetting to background only");
            self.components_mut().for_each(|c| c.set_pi(0.0));
            self.background.set_pi(1.0);
        }
    }

    /// Sets pis in component order (background, ChIP-signal, cross-links) and renormalizes.
    ///
    /// # Errors
    /// * `ChexmixError::InvalidParameter` on a length mismatch or a negative or non-finite pi
    pub fn set_pis(&mut self, pis: &[f64]) -> Result<()> {
        if pis.len() != self.num_components() {
            return Err(ChexmixError::invalid_parameter(
                "pis",
                pis.len(),
                format!("expected {} values", self.num_components()),
            ));
        }
        if let Some(bad) = pis.iter().find(|p| !p.is_finite() || **p < 0.0) {
            return Err(ChexmixError::invalid_parameter(
                "pi",
                bad,
                "must be finite and non-negative",
            ));
        }
        for (comp, pi) in self.components_mut().zip(pis) {
            comp.set_pi(*pi);
        }
        self.normalize_pi();
        Ok(())
    }

    /// Zeroes every cross-link component with pi at or below `threshold`, then renormalizes.
    /// Returns the number of components pruned.
    pub fn prune_components(&mut self, threshold: f64) -> usize {
        let mut pruned = 0;
        for xl in &mut self.cross_links {
            if xl.pi() > 0.0 && xl.pi() <= threshold {
                xl.set_pi(0.0);
                pruned += 1;
            }
        }
        if pruned > 0 {
            debug!("pruned {} cross-link components at pi <= {}", pruned, threshold);
            self.normalize_pi();
        }
        pruned
    }

    /// Serializes the whole model, including zero-pi components.
    pub fn save_string(&self) -> String {
        let mut out = format!(
            "{},{},{},{},\n",
            MODEL_TAG, self.width, self.center_offset, self.num_conditions
        );
        for c in 0..self.num_conditions {
            for (tag, profile) in [
                (WATSON_TAG, &self.composite_watson),
                (CRICK_TAG, &self.composite_crick),
            ] {
                out.push_str(&format!("{},{},", tag, c));
                for v in profile.row(c) {
                    out.push_str(&format!("{},", v));
                }
                out.push('\n');
            }
        }
        for comp in self.components() {
            out.push_str(&comp.density().save_string());
        }
        for comp in self.components() {
            out.push_str(&comp.save_string());
        }
        out
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.save_string())?;
        Ok(())
    }

    /// Loads a model from the lines written by [`save_string`](Self::save_string).
    ///
    /// Composite rows and densities are read first; component lines are then resolved
    /// against the densities by index.
    ///
    /// # Errors
    /// * `ChexmixError::MalformedModel` naming the offending line for a bad header, a bad
    ///   composite row, density block or component line
    /// * `ChexmixError::MissingComponent` if no background or ChIP-signal component is present
    pub fn load(lines: &[&str]) -> Result<Self> {
        let mut builder = ModelBuilder::from_header(lines.first().copied())?;
        for (n, line) in lines.iter().enumerate() {
            if line.starts_with(WATSON_TAG) || line.starts_with(CRICK_TAG) {
                builder.add_composite_row(n + 1, line)?;
            } else if line.starts_with(DENSITY_TAG) {
                let block = lines
                    .get(n..n + 3)
                    .ok_or_else(|| ChexmixError::malformed(n + 1, "truncated density block"))?;
                builder.add_density(n + 1, block)?;
            }
        }
        for (n, line) in lines.iter().enumerate() {
            if line.starts_with(COMPONENT_TAG) {
                builder.add_component(n + 1, line)?;
            }
        }
        builder.build()
    }

    pub fn load_str(text: &str) -> Result<Self> {
        let lines: Vec<&str> = text.lines().collect();
        Self::load(&lines)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::load_str(&text)
    }
}

impl fmt::Display for ProteinDnaInteractionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ProteinDNAInteractionModel:")?;
        let mut xls: Vec<&CompositeModelComponent> = self
            .cross_links
            .iter()
            .filter(|c| c.is_non_zero_above(self.min_component_pi))
            .collect();
        // indices are unique within a model, so every pair is ordered
        xls.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        for xl in xls {
            writeln!(f, "\t{}\tXL:\t{}", xl.index(), xl.describe(self.center_offset))?;
        }
        writeln!(
            f,
            "\t{}\tCS:\t{}",
            self.chip_signal.index(),
            self.chip_signal.describe(self.center_offset)
        )?;
        writeln!(
            f,
            "\t{}\tBack:\t{}",
            self.background.index(),
            self.background.describe(self.center_offset)
        )
    }
}

/// Accumulates the pieces of a saved model before validating them into a model.
struct ModelBuilder {
    width: usize,
    center_offset: i32,
    num_conditions: usize,
    watson: ProfileMatrix,
    crick: ProfileMatrix,
    densities: DensityLookup,
    background: Option<CompositeModelComponent>,
    chip_signal: Option<CompositeModelComponent>,
    cross_links: Vec<CompositeModelComponent>,
}

impl ModelBuilder {
    fn from_header(header: Option<&str>) -> Result<Self> {
        let header = header.ok_or_else(|| ChexmixError::malformed(1, "empty model"))?;
        let bits = fields(header);
        if bits.len() != 4 || bits[0] != MODEL_TAG {
            return Err(ChexmixError::malformed(
                1,
                format!("expected '{},<width>,<centerOffset>,<numConditions>'", MODEL_TAG),
            ));
        }
        let at_header = |e: ChexmixError| ChexmixError::malformed(1, e.to_string());
        let width: usize = parse_field(bits[1], "width").map_err(at_header)?;
        let center_offset: i32 = parse_field(bits[2], "center offset").map_err(at_header)?;
        let num_conditions: usize = parse_field(bits[3], "condition count").map_err(at_header)?;
        let cells = num_conditions.checked_mul(width);
        if width > MAX_SUPPORT
            || num_conditions > MAX_COMPOSITE_CELLS
            || !cells.is_some_and(|n| n <= MAX_COMPOSITE_CELLS)
        {
            return Err(ChexmixError::malformed(
                1,
                format!(
                    "{} conditions over a window of width {} is too large",
                    num_conditions, width
                ),
            ));
        }
        Ok(ModelBuilder {
            width,
            center_offset,
            num_conditions,
            watson: Array2::zeros((num_conditions, width)),
            crick: Array2::zeros((num_conditions, width)),
            densities: DensityLookup::new(),
            background: None,
            chip_signal: None,
            cross_links: Vec::new(),
        })
    }

    fn add_composite_row(&mut self, line_no: usize, line: &str) -> Result<()> {
        let bits = fields(line);
        let at_line = |e: ChexmixError| ChexmixError::malformed(line_no, e.to_string());
        let cond: usize = bits
            .get(1)
            .ok_or_else(|| ChexmixError::malformed(line_no, "composite row has no condition"))
            .and_then(|f| parse_field(f, "condition").map_err(at_line))?;
        if cond >= self.num_conditions {
            return Err(ChexmixError::malformed(
                line_no,
                format!("condition {} out of range (model has {})", cond, self.num_conditions),
            ));
        }
        let values = bits[2..]
            .iter()
            .map(|f| parse_field::<f64>(f, "composite value"))
            .collect::<Result<Vec<_>>>()
            .map_err(at_line)?;
        if values.len() != self.width {
            return Err(ChexmixError::malformed(
                line_no,
                format!("composite row has {} values, expected {}", values.len(), self.width),
            ));
        }
        let target = if bits[0] == WATSON_TAG {
            &mut self.watson
        } else {
            &mut self.crick
        };
        for (x, v) in values.into_iter().enumerate() {
            target[[cond, x]] = v;
        }
        Ok(())
    }

    fn add_density(&mut self, line_no: usize, block: &[&str]) -> Result<()> {
        let density = TagProbabilityDensity::load(block)
            .map_err(|e| ChexmixError::malformed(line_no, e.to_string()))?;
        let index = density.index();
        if self.densities.insert(index, density).is_some() {
            return Err(ChexmixError::malformed(
                line_no,
                format!("density {} saved twice", index),
            ));
        }
        Ok(())
    }

    fn add_component(&mut self, line_no: usize, line: &str) -> Result<()> {
        let comp = CompositeModelComponent::load(line, &mut self.densities)
            .map_err(|e| ChexmixError::malformed(line_no, e.to_string()))?;
        let slot = match comp.label() {
            ComponentLabel::Background => &mut self.background,
            ComponentLabel::ChipSignal => &mut self.chip_signal,
            ComponentLabel::CrossLink => {
                self.cross_links.push(comp);
                return Ok(());
            }
        };
        if slot.is_some() {
            return Err(ChexmixError::malformed(
                line_no,
                format!("second {} component", comp.label()),
            ));
        }
        *slot = Some(comp);
        Ok(())
    }

    fn build(self) -> Result<ProteinDnaInteractionModel> {
        let background = self
            .background
            .ok_or(ChexmixError::MissingComponent(ComponentLabel::Background))?;
        let chip_signal = self
            .chip_signal
            .ok_or(ChexmixError::MissingComponent(ComponentLabel::ChipSignal))?;
        ProteinDnaInteractionModel::from_components(
            self.width,
            self.center_offset,
            self.num_conditions,
            self.watson,
            self.crick,
            chip_signal,
            background,
            self.cross_links,
        )
    }
}
