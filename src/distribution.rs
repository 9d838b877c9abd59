//! Empirical bootstrap distributions, p-values and percentile intervals.
//!
//! The distribution holds the B replicate statistics in sorted order next
//! to the statistic observed on the full sample.
//!
//! p-values use the shifted bootstrap distribution `t_b - t_obs`, which
//! approximates the sampling distribution of the statistic under the null,
//! and compare it with the observed deviation `t_obs - null_value`:
//!
//! ```text
//! two-sided: #{ |t_b - t_obs| >= |t_obs - null| }
//! greater:   #{  t_b - t_obs  >=  t_obs - null  }
//! less:      #{  t_b - t_obs  <=  t_obs - null  }
//! p = (1 + count) / (B + 1)
//! ```
//!
//! The +1 in numerator and denominator keeps p strictly positive.

use crate::config::Alternative;
use crate::error::{Result, StamboError};
use serde::{Deserialize, Serialize};

/// Percentile confidence interval
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    /// Lower bound (alpha/2 quantile)
    pub lower: f64,
    /// Upper bound (1 - alpha/2 quantile)
    pub upper: f64,
    /// Coverage level
    pub level: f64,
}

impl ConfidenceInterval {
    /// Whether `value` lies inside the closed interval
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.upper - self.lower
    }
}

/// Smallest B with `alpha/2 * B >= 1` for a coverage level
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn required_replicates(confidence: f64) -> usize {
    let alpha = 1.0 - confidence;
    (2.0 / alpha - 1e-9).ceil().max(1.0) as usize
}

/// Sorted bootstrap statistics plus the observed statistic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmpiricalDistribution {
    sorted: Vec<f64>,
    observed: f64,
}

impl EmpiricalDistribution {
    /// Build a distribution from replicate statistics
    ///
    /// # Errors
    ///
    /// Returns `InsufficientReplicates` when `values` is empty and
    /// `InvalidConfiguration` when a value is not finite.
    pub fn new(mut values: Vec<f64>, observed: f64) -> Result<Self> {
        if values.is_empty() {
            return Err(StamboError::InsufficientReplicates {
                n_bootstrap: 0,
                confidence: 0.0,
                required: 1,
            });
        }
        if !observed.is_finite() || values.iter().any(|v| !v.is_finite()) {
            return Err(StamboError::InvalidConfiguration(
                "bootstrap statistics must be finite".to_string(),
            ));
        }
        values.sort_by(f64::total_cmp);
        Ok(Self {
            sorted: values,
            observed,
        })
    }

    /// Number of replicates (B)
    #[must_use]
    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }

    /// Statistic computed on the full sample
    #[must_use]
    pub const fn observed(&self) -> f64 {
        self.observed
    }

    /// Replicate statistics in ascending order
    #[must_use]
    pub fn sorted_values(&self) -> &[f64] {
        &self.sorted
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(&self) -> f64 {
        self.sorted.iter().sum::<f64>() / self.sorted.len() as f64
    }

    /// Bootstrap standard error (sample standard deviation of the replicates)
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn std_error(&self) -> f64 {
        if self.sorted.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let ss: f64 = self.sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (ss / (self.sorted.len() - 1) as f64).sqrt()
    }

    /// Empirical quantile with linear interpolation between order statistics
    ///
    /// `q` is clamped to `[0, 1]`; rank `h = (B - 1) q`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn quantile(&self, q: f64) -> f64 {
        let q = q.clamp(0.0, 1.0);
        let h = (self.sorted.len() - 1) as f64 * q;
        let lo = h.floor() as usize;
        let hi = h.ceil() as usize;
        let frac = h - lo as f64;
        self.sorted[lo] + (self.sorted[hi] - self.sorted[lo]) * frac
    }

    /// Percentile confidence interval at `confidence`
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a level outside (0, 1) and
    /// `InsufficientReplicates` when `alpha/2 * B < 1`.
    #[allow(clippy::cast_precision_loss)]
    pub fn confidence_interval(&self, confidence: f64) -> Result<ConfidenceInterval> {
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(StamboError::InvalidConfiguration(format!(
                "confidence must lie in (0, 1), got {confidence}"
            )));
        }
        let required = required_replicates(confidence);
        if self.sorted.len() < required {
            return Err(StamboError::InsufficientReplicates {
                n_bootstrap: self.sorted.len(),
                confidence,
                required,
            });
        }
        let alpha = 1.0 - confidence;
        Ok(ConfidenceInterval {
            lower: self.quantile(alpha / 2.0),
            upper: self.quantile(1.0 - alpha / 2.0),
            level: confidence,
        })
    }

    /// Bootstrap p-value against `null_value`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn p_value(&self, alternative: Alternative, null_value: f64) -> f64 {
        let deviation = self.observed - null_value;
        let count = match alternative {
            Alternative::TwoSided => {
                let bound = deviation.abs();
                self.sorted
                    .iter()
                    .filter(|&&t| (t - self.observed).abs() >= bound)
                    .count()
            }
            Alternative::Greater => self
                .sorted
                .iter()
                .filter(|&&t| t - self.observed >= deviation)
                .count(),
            Alternative::Less => self
                .sorted
                .iter()
                .filter(|&&t| t - self.observed <= deviation)
                .count(),
        };
        (1 + count) as f64 / (self.sorted.len() + 1) as f64
    }
}
