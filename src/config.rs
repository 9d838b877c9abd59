//! Configuration module for bootstrap comparisons.
//!
//! Handles YAML configuration loading with validation of every option the
//! test engine and the comparator consume.

use crate::error::StamboError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid {kind} option: {value}")]
    InvalidOption { kind: &'static str, value: String },

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
}

impl From<ConfigError> for StamboError {
    fn from(err: ConfigError) -> Self {
        Self::InvalidConfiguration(err.to_string())
    }
}

/// Alternative hypothesis for the difference `A - B`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Alternative {
    /// `A - B != null_value`
    #[default]
    TwoSided,
    /// `A - B > null_value`
    Greater,
    /// `A - B < null_value`
    Less,
}

impl std::str::FromStr for Alternative {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "two-sided" | "two_sided" | "twosided" | "both" => Ok(Self::TwoSided),
            "greater" | "larger" => Ok(Self::Greater),
            "less" | "smaller" => Ok(Self::Less),
            _ => Err(ConfigError::InvalidOption {
                kind: "alternative",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Alternative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::TwoSided => "two-sided",
            Self::Greater => "greater",
            Self::Less => "less",
        })
    }
}

/// How the two models of a pair are resampled
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Pairing {
    /// Both models scored on the same replicate of shared targets and groups
    #[default]
    Paired,
    /// Each model's sample resampled independently
    Unpaired,
}

impl std::str::FromStr for Pairing {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "paired" => Ok(Self::Paired),
            "unpaired" | "non-paired" | "non_paired" | "independent" => Ok(Self::Unpaired),
            _ => Err(ConfigError::InvalidOption {
                kind: "pairing",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Pairing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Paired => "paired",
            Self::Unpaired => "unpaired",
        })
    }
}

/// Multiple-comparison correction applied across comparator units
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CorrectionMethod {
    /// Corrected p-values equal the raw ones
    None,
    /// Single-step family-wise correction
    Bonferroni,
    /// Holm step-down family-wise correction
    #[default]
    Holm,
}

impl std::str::FromStr for CorrectionMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "off" => Ok(Self::None),
            "bonferroni" => Ok(Self::Bonferroni),
            "holm" | "holm-bonferroni" => Ok(Self::Holm),
            _ => Err(ConfigError::InvalidOption {
                kind: "correction",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::Bonferroni => "bonferroni",
            Self::Holm => "holm",
        })
    }
}

/// Bootstrap comparison configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComparisonConfig {
    /// Number of bootstrap replicates
    #[serde(default = "default_n_bootstrap")]
    pub n_bootstrap: usize,
    /// Confidence level of the percentile intervals
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Sidedness of the test
    #[serde(default)]
    pub alternative: Alternative,
    /// Paired or unpaired resampling
    #[serde(default)]
    pub pairing: Pairing,
    /// Multiple-comparison correction
    #[serde(default)]
    pub correction: CorrectionMethod,
    /// Root random seed
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Difference under the null hypothesis
    #[serde(default)]
    pub null_value: f64,
    /// Threshold on the corrected p-value for the `significant` flag
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Consecutive redraws tolerated before a metric is declared undefined
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Evaluate replicates on the rayon pool
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

const fn default_n_bootstrap() -> usize {
    2000
}
const fn default_confidence() -> f64 {
    0.95
}
const fn default_seed() -> u64 {
    42
}
const fn default_alpha() -> f64 {
    0.05
}
const fn default_max_retries() -> usize {
    100
}
const fn default_parallel() -> bool {
    true
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            n_bootstrap: default_n_bootstrap(),
            confidence: default_confidence(),
            alternative: Alternative::default(),
            pairing: Pairing::default(),
            correction: CorrectionMethod::default(),
            seed: default_seed(),
            null_value: 0.0,
            alpha: default_alpha(),
            max_retries: default_max_retries(),
            parallel: default_parallel(),
        }
    }
}

impl ComparisonConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or holds invalid settings.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load configuration from a YAML string
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML cannot be parsed or holds invalid settings.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Set the number of replicates
    #[must_use]
    pub const fn with_n_bootstrap(mut self, n_bootstrap: usize) -> Self {
        self.n_bootstrap = n_bootstrap;
        self
    }

    /// Set the root seed
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the confidence level
    #[must_use]
    pub const fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    /// Set the alternative hypothesis
    #[must_use]
    pub const fn with_alternative(mut self, alternative: Alternative) -> Self {
        self.alternative = alternative;
        self
    }

    /// Set the pairing mode
    #[must_use]
    pub const fn with_pairing(mut self, pairing: Pairing) -> Self {
        self.pairing = pairing;
        self
    }

    /// Set the correction method
    #[must_use]
    pub const fn with_correction(mut self, correction: CorrectionMethod) -> Self {
        self.correction = correction;
        self
    }

    /// Enable or disable the rayon pool
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Check that every setting is in range
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSetting` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_bootstrap == 0 {
            return Err(ConfigError::InvalidSetting(
                "n_bootstrap must be at least 1".to_string(),
            ));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(ConfigError::InvalidSetting(format!(
                "confidence must lie in (0, 1), got {}",
                self.confidence
            )));
        }
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(ConfigError::InvalidSetting(format!(
                "alpha must lie in (0, 1), got {}",
                self.alpha
            )));
        }
        if !self.null_value.is_finite() {
            return Err(ConfigError::InvalidSetting(
                "null_value must be finite".to_string(),
            ));
        }
        if self.max_retries == 0 {
            return Err(ConfigError::InvalidSetting(
                "max_retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
