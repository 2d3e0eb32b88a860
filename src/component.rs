use phf::phf_map;
use std::cmp::Ordering;
use std::fmt;

use crate::density::{fields, parse_field, TagProbabilityDensity};
use crate::error::{ChexmixError, Result};
use crate::types::DensityLookup;

pub const COMPONENT_TAG: &str = "#CompositeModelComponent";

/// Role a component plays in the binding mixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentLabel {
    Background,
    ChipSignal,
    CrossLink,
}

static LABELS: phf::Map<&'static str, ComponentLabel> = phf_map! {
    "Back" => ComponentLabel::Background,
    "CS" => ComponentLabel::ChipSignal,
    "XL" => ComponentLabel::CrossLink,
};

impl ComponentLabel {
    /// Short tag used in saved models
    pub fn tag(&self) -> &'static str {
        match self {
            ComponentLabel::Background => "Back",
            ComponentLabel::ChipSignal => "CS",
            ComponentLabel::CrossLink => "XL",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        LABELS.get(tag).copied()
    }
}

impl fmt::Display for ComponentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One latent event generator: a footprint placed at a position in the window, weighted
/// by its mixing proportion `pi`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeModelComponent {
    index: usize,
    label: ComponentLabel,
    position: i32,
    pi: f64,
    position_updatable: bool,
    density: TagProbabilityDensity,
}

impl CompositeModelComponent {
    /// The density is re-tagged with the component's index so that it can be reattached
    /// after a save/load cycle.
    pub fn new(
        density: TagProbabilityDensity,
        position: i32,
        index: usize,
        label: ComponentLabel,
        position_updatable: bool,
    ) -> Self {
        CompositeModelComponent {
            index,
            label,
            position,
            pi: 0.0,
            position_updatable,
            density: density.with_index(index),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn label(&self) -> ComponentLabel {
        self.label
    }

    pub fn position(&self) -> i32 {
        self.position
    }

    pub fn set_position(&mut self, position: i32) {
        if self.position_updatable {
            self.position = position;
        }
    }

    pub fn pi(&self) -> f64 {
        self.pi
    }

    /// Unclamped; the owning model keeps the pis summing to 1.
    pub fn set_pi(&mut self, pi: f64) {
        self.pi = pi;
    }

    pub fn is_non_zero(&self) -> bool {
        self.is_non_zero_above(0.0)
    }

    pub fn is_non_zero_above(&self, epsilon: f64) -> bool {
        self.pi > epsilon
    }

    pub fn density(&self) -> &TagProbabilityDensity {
        &self.density
    }

    pub fn density_mut(&mut self) -> &mut TagProbabilityDensity {
        &mut self.density
    }

    /// One-line summary with the position given relative to the window center
    pub fn describe(&self, center_offset: i32) -> String {
        format!(
            "Position:{}\tPi:{:.5}",
            self.position - center_offset,
            self.pi
        )
    }

    pub fn save_string(&self) -> String {
        format!(
            "{},{},{},{},{},{},\n",
            COMPONENT_TAG,
            self.index,
            self.label.tag(),
            self.position,
            self.pi,
            self.position_updatable
        )
    }

    /// Rebuilds a component from its saved line, taking ownership of the density stored
    /// under the same index.
    ///
    /// # Errors
    /// * `ChexmixError::InvalidFileFormat` for a malformed line or unknown label
    /// * `ChexmixError::InvalidFileFormat` if no density was saved for the component's index
    pub fn load(line: &str, densities: &mut DensityLookup) -> Result<Self> {
        let bits = fields(line);
        if bits.len() != 6 || bits[0] != COMPONENT_TAG {
            return Err(ChexmixError::InvalidFileFormat(format!(
                "bad component line '{}'",
                line
            )));
        }
        let index: usize = parse_field(bits[1], "component index")?;
        let label = ComponentLabel::from_tag(bits[2]).ok_or_else(|| {
            ChexmixError::InvalidFileFormat(format!("unknown component label '{}'", bits[2]))
        })?;
        let position: i32 = parse_field(bits[3], "component position")?;
        let pi: f64 = parse_field(bits[4], "component pi")?;
        let position_updatable: bool = parse_field(bits[5], "component updatable flag")?;
        let density = densities.remove(&index).ok_or_else(|| {
            ChexmixError::InvalidFileFormat(format!("no density saved for component {}", index))
        })?;

        let mut comp =
            CompositeModelComponent::new(density, position, index, label, position_updatable);
        comp.set_pi(pi);
        Ok(comp)
    }
}

/// Components order by position, then index. Two components with the same position and
/// index but different contents are unordered.
impl PartialOrd for CompositeModelComponent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.position, self.index).cmp(&(other.position, other.index)) {
            Ordering::Equal if self != other => None,
            ord => Some(ord),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_through_tags() {
        for label in [
            ComponentLabel::Background,
            ComponentLabel::ChipSignal,
            ComponentLabel::CrossLink,
        ] {
            assert_eq!(ComponentLabel::from_tag(label.tag()), Some(label));
        }
        assert_eq!(ComponentLabel::from_tag("XO"), None);
    }

    #[test]
    fn fixed_components_ignore_position_updates() {
        let density = TagProbabilityDensity::uniform(-2, 2).unwrap();
        let mut cs =
            CompositeModelComponent::new(density, 100, 1, ComponentLabel::ChipSignal, false);
        cs.set_position(90);
        assert_eq!(cs.position(), 100);
    }

    #[test]
    fn components_order_by_position_then_index() {
        let density = TagProbabilityDensity::uniform(-2, 2).unwrap();
        let xl = |position, index| {
            CompositeModelComponent::new(
                density.clone(),
                position,
                index,
                ComponentLabel::CrossLink,
                true,
            )
        };
        let mut comps = vec![xl(60, 2), xl(40, 5), xl(50, 4), xl(50, 3)];
        comps.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let order: Vec<(i32, usize)> = comps.iter().map(|c| (c.position(), c.index())).collect();
        assert_eq!(order, vec![(40, 5), (50, 3), (50, 4), (60, 2)]);

        let a = xl(45, 2);
        let mut b = a.clone();
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));
        b.set_pi(0.3);
        assert_eq!(a.partial_cmp(&b), None);
        assert!(xl(44, 9) < xl(45, 0));
    }
}
