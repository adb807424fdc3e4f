//! Config - Entropy Model Configuration
//!
//! Constructor-time settings for the hyperprior entropy model, loadable
//! from TOML. Every field has a default, so a partial file is valid.
//!
//! ```toml
//! bottleneck_capacity = 220
//! hyperlatent_filters = "small"
//!
//! [density]
//! filters = [3, 3, 3]
//! init_scale = 10.0
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EntropyError, EntropyResult};

// =============================================================================
// Defaults
// =============================================================================

/// Lower bound applied to predicted scales before likelihood evaluation.
pub const MIN_SCALE: f32 = 0.11;
/// Smallest likelihood any density reports.
pub const MIN_LIKELIHOOD: f32 = 1e-9;
/// Largest likelihood any density reports.
pub const MAX_LIKELIHOOD: f32 = 1e3;
/// Hyperlatent channel count of the `small` preset.
pub const SMALL_HYPERLATENT_FILTERS: usize = 192;
/// Hyperlatent channel count of the `large` preset.
pub const LARGE_HYPERLATENT_FILTERS: usize = 320;
/// Default bottleneck (primary latent) channel count.
pub const DEFAULT_BOTTLENECK_CAPACITY: usize = 220;

// =============================================================================
// Hyperlatent Filters
// =============================================================================

/// Hyperlatent channel count, as a preset or an explicit value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HyperlatentFilters {
    /// 192 channels.
    Small,
    /// 320 channels.
    #[default]
    Large,
    /// Any other positive channel count.
    Custom(usize),
}

impl HyperlatentFilters {
    /// Returns the channel count.
    pub fn channels(self) -> usize {
        match self {
            Self::Small => SMALL_HYPERLATENT_FILTERS,
            Self::Large => LARGE_HYPERLATENT_FILTERS,
            Self::Custom(n) => n,
        }
    }
}

// =============================================================================
// Density Configuration
// =============================================================================

/// Shape of the non-parametric hyperlatent density.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DensityConfig {
    /// Hidden widths of the per-channel cascade; `K` hidden layers give
    /// `K + 1` transform layers.
    pub filters: Vec<usize>,

    /// Initial width of the modeled densities.
    pub init_scale: f32,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            filters: vec![3, 3, 3],
            init_scale: 10.0,
        }
    }
}

// =============================================================================
// Hyperprior Configuration
// =============================================================================

/// Configuration of the complete two-level entropy model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HyperpriorConfig {
    /// Channel count of the primary latents.
    pub bottleneck_capacity: usize,

    /// Channel count of the hyperlatents.
    pub hyperlatent_filters: HyperlatentFilters,

    /// Lower likelihood clamp.
    pub min_likelihood: f32,

    /// Upper likelihood clamp.
    pub max_likelihood: f32,

    /// Lower bound for predicted scales.
    pub scale_lower_bound: f32,

    /// Hyperlatent density settings.
    pub density: DensityConfig,
}

impl Default for HyperpriorConfig {
    fn default() -> Self {
        Self {
            bottleneck_capacity: DEFAULT_BOTTLENECK_CAPACITY,
            hyperlatent_filters: HyperlatentFilters::default(),
            min_likelihood: MIN_LIKELIHOOD,
            max_likelihood: MAX_LIKELIHOOD,
            scale_lower_bound: MIN_SCALE,
            density: DensityConfig::default(),
        }
    }
}

impl HyperpriorConfig {
    /// Default configuration for `bottleneck_capacity` latent channels.
    pub fn new(bottleneck_capacity: usize) -> Self {
        Self {
            bottleneck_capacity,
            ..Self::default()
        }
    }

    /// Sets the hyperlatent channel count.
    pub fn with_hyperlatent_filters(mut self, filters: HyperlatentFilters) -> Self {
        self.hyperlatent_filters = filters;
        self
    }

    /// Returns the hyperlatent channel count.
    pub fn hyperlatent_channels(&self) -> usize {
        self.hyperlatent_filters.channels()
    }

    /// Checks every field for values the models cannot work with.
    pub fn validate(&self) -> EntropyResult<()> {
        if self.bottleneck_capacity == 0 {
            return Err(EntropyError::invalid_config("bottleneck_capacity must be positive"));
        }
        if self.hyperlatent_channels() == 0 {
            return Err(EntropyError::invalid_config("hyperlatent_filters must be positive"));
        }
        if !(self.min_likelihood > 0.0 && self.min_likelihood < self.max_likelihood) {
            return Err(EntropyError::invalid_config(format!(
                "likelihood bounds must satisfy 0 < min < max, got [{}, {}]",
                self.min_likelihood, self.max_likelihood
            )));
        }
        if !(self.scale_lower_bound > 0.0) {
            return Err(EntropyError::invalid_config(format!(
                "scale_lower_bound must be positive, got {}",
                self.scale_lower_bound
            )));
        }
        if self.density.filters.is_empty() || self.density.filters.contains(&0) {
            return Err(EntropyError::invalid_config(format!(
                "density filters must be non-empty and positive, got {:?}",
                self.density.filters
            )));
        }
        if !(self.density.init_scale > 0.0) {
            return Err(EntropyError::invalid_config(format!(
                "density init_scale must be positive, got {}",
                self.density.init_scale
            )));
        }
        Ok(())
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> EntropyResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes to a TOML document.
    pub fn to_toml_string(&self) -> EntropyResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Loads and validates configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> EntropyResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> EntropyResult<()> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = HyperpriorConfig::default();
        assert_eq!(config.bottleneck_capacity, 220);
        assert_eq!(config.hyperlatent_channels(), 320);
        assert!((config.scale_lower_bound - 0.11).abs() < 1e-7);
        assert_eq!(config.density.filters, vec![3, 3, 3]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = HyperpriorConfig::from_toml_str(
            r#"
            bottleneck_capacity = 25
            hyperlatent_filters = "small"

            [density]
            init_scale = 4.0
            "#,
        )
        .unwrap();
        assert_eq!(config.bottleneck_capacity, 25);
        assert_eq!(config.hyperlatent_channels(), 192);
        assert_eq!(config.density.filters, vec![3, 3, 3]);
        assert!((config.density.init_scale - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_custom_filters_roundtrip() {
        let config = HyperpriorConfig::new(16)
            .with_hyperlatent_filters(HyperlatentFilters::Custom(12));
        let text = config.to_toml_string().unwrap();
        let parsed = HyperpriorConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.hyperlatent_channels(), 12);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = HyperpriorConfig::new(0);
        assert!(matches!(config.validate(), Err(EntropyError::InvalidConfig(_))));

        config = HyperpriorConfig::default();
        config.max_likelihood = config.min_likelihood;
        assert!(config.validate().is_err());

        config = HyperpriorConfig::default();
        config.density.filters = vec![3, 0];
        assert!(config.validate().is_err());

        config = HyperpriorConfig::default();
        config.scale_lower_bound = 0.0;
        assert!(config.validate().is_err());

        config = HyperpriorConfig::default().with_hyperlatent_filters(HyperlatentFilters::Custom(0));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml() {
        let err = HyperpriorConfig::from_toml_str("bottleneck_capacity = \"wide\"").unwrap_err();
        assert!(matches!(err, EntropyError::Toml(_)));
    }

    #[test]
    fn test_save_and_load() {
        let path = std::env::temp_dir().join(format!("hific-entropy-{}.toml", std::process::id()));
        let config = HyperpriorConfig::new(8);
        config.save(&path).unwrap();
        let loaded = HyperpriorConfig::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded, config);
    }
}
