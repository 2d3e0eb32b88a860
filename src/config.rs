use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{ChexmixError, Result};

/// Tunable parameters shared by model construction and event calling.
///
/// Every field has a default, so a TOML file only needs to name the values it changes:
///
/// ```toml
/// xl_component_spacing = 10
/// noise_pi = 0.2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Distance in bases between neighbouring cross-link components
    pub xl_component_spacing: usize,
    /// Initial share of the binding mass given to the ChIP-signal component
    pub init_cs_to_xl_ratio: f64,
    /// Floor on the initial ChIP-signal pi
    pub min_cs_pi: f64,
    /// Components with pi at or below this are treated as inactive
    pub min_component_pi: f64,
    /// Initial background pi
    pub noise_pi: f64,
    /// Width of the window scanned around each candidate point
    pub event_window: usize,
    /// Width of the composite profile window
    pub composite_window: usize,
    /// Standard deviation of the Gaussian used to seed cross-link densities
    pub xl_seed_sd: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            xl_component_spacing: 5,
            init_cs_to_xl_ratio: 0.05,
            min_cs_pi: 0.05,
            min_component_pi: 0.0,
            noise_pi: 0.1,
            event_window: 200,
            composite_window: 200,
            xl_seed_sd: 3.0,
        }
    }
}

impl ModelConfig {
    /// Reads a config from a TOML file, filling unspecified fields with defaults.
    ///
    /// # Errors
    /// * `ChexmixError::Io` if the file cannot be read
    /// * `ChexmixError::InvalidFileFormat` if the TOML does not parse
    /// * `ChexmixError::InvalidParameter` if a value is out of range
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let config: ModelConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.xl_component_spacing == 0 {
            return Err(ChexmixError::invalid_parameter(
                "xl_component_spacing",
                self.xl_component_spacing,
                "must be at least 1",
            ));
        }
        for (name, value) in [
            ("init_cs_to_xl_ratio", self.init_cs_to_xl_ratio),
            ("min_cs_pi", self.min_cs_pi),
            ("noise_pi", self.noise_pi),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ChexmixError::invalid_parameter(
                    name,
                    value,
                    "must lie in [0, 1]",
                ));
            }
        }
        if !(self.min_component_pi >= 0.0 && self.min_component_pi < 1.0) {
            return Err(ChexmixError::invalid_parameter(
                "min_component_pi",
                self.min_component_pi,
                "must lie in [0, 1)",
            ));
        }
        if self.event_window == 0 || self.composite_window == 0 {
            return Err(ChexmixError::invalid_parameter(
                "window",
                format!("{}/{}", self.event_window, self.composite_window),
                "windows must be non-empty",
            ));
        }
        if !(self.xl_seed_sd > 0.0) {
            return Err(ChexmixError::invalid_parameter(
                "xl_seed_sd",
                self.xl_seed_sd,
                "must be positive",
            ));
        }
        Ok(())
    }
}
