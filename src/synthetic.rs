//! Synthetic clustered datasets.
//!
//! Simulates M subjects with a total of N measurements. Measurements of one
//! subject share a subject-specific mean and are correlated through a base
//! covariance; different subjects are independent. Used by the calibration
//! tests, the demo and `stambo synthetic`.

use crate::input::{ComparisonInput, ModelInput};
use crate::sample::GroupId;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Binomial, Dirichlet, Distribution, StandardNormal, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Invalid generator parameters
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SyntheticError {
    #[error("need at least one subject")]
    NoSubjects,

    #[error("{n_measurements} measurements cannot cover {n_subjects} subjects")]
    TooFewMeasurements {
        n_subjects: usize,
        n_measurements: usize,
    },

    #[error("invalid Dirichlet temperature {0}")]
    InvalidTemperature(f64),

    #[error("invalid mean range [{0}, {1}]")]
    InvalidMeanRange(f64, f64),

    #[error("covariance must be a non-empty square matrix")]
    NotSquare,

    #[error("covariance is not positive definite")]
    NotPositiveDefinite,
}

/// Measurements of all subjects, stacked in subject order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticData {
    /// One row of `dim` values per measurement
    pub data: Vec<Vec<f64>>,
    /// Subject of each row
    pub subject_ids: Vec<GroupId>,
    /// Mean vector drawn for each subject
    pub subject_means: Vec<Vec<f64>>,
}

/// Number of measurements per subject
///
/// Every subject gets one measurement; the remaining `n_measurements -
/// n_subjects` are distributed multinomially, with probabilities drawn from
/// a symmetric Dirichlet(`d_temp`) when `random`, uniform otherwise.
///
/// # Errors
///
/// Returns `SyntheticError` for zero subjects, fewer measurements than
/// subjects, or a non-positive temperature.
pub fn generate_n_measurements<R: Rng + ?Sized>(
    n_subjects: usize,
    n_measurements: usize,
    random: bool,
    d_temp: f64,
    rng: &mut R,
) -> Result<Vec<usize>, SyntheticError> {
    if n_subjects == 0 {
        return Err(SyntheticError::NoSubjects);
    }
    if n_measurements < n_subjects {
        return Err(SyntheticError::TooFewMeasurements {
            n_subjects,
            n_measurements,
        });
    }
    if !(d_temp > 0.0 && d_temp.is_finite()) {
        return Err(SyntheticError::InvalidTemperature(d_temp));
    }

    #[allow(clippy::cast_precision_loss)]
    let probs = if random && n_subjects > 1 {
        Dirichlet::new(&vec![d_temp; n_subjects])
            .map_err(|_| SyntheticError::InvalidTemperature(d_temp))?
            .sample(rng)
    } else {
        vec![1.0 / n_subjects as f64; n_subjects]
    };

    let mut counts = vec![1; n_subjects];
    for (count, extra) in counts
        .iter_mut()
        .zip(multinomial(n_measurements - n_subjects, &probs, rng))
    {
        *count += extra;
    }
    Ok(counts)
}

/// Multinomial draw as a chain of conditional binomials
#[allow(clippy::cast_possible_truncation)]
fn multinomial<R: Rng + ?Sized>(n: usize, probs: &[f64], rng: &mut R) -> Vec<usize> {
    let mut remaining = n as u64;
    let mut mass = 1.0;
    let mut draws = Vec::with_capacity(probs.len());
    for (i, &p) in probs.iter().enumerate() {
        let k = if i + 1 == probs.len() {
            remaining
        } else if remaining == 0 || mass <= 0.0 {
            0
        } else {
            let q = (p / mass).clamp(0.0, 1.0);
            Binomial::new(remaining, q).map_or(0, |b| b.sample(rng))
        };
        draws.push(k as usize);
        remaining -= k;
        mass -= p;
    }
    draws
}

/// Multivariate Gaussian measurements for each subject
///
/// Subject `s` draws a mean uniformly from `mean_range` in every dimension,
/// then `counts[s]` rows from `N(mean, base_cov)`. With a single subject the
/// off-diagonal covariance is dropped.
///
/// # Errors
///
/// Returns `SyntheticError` for an empty `counts`, an inverted mean range or
/// a covariance that is not square and positive definite.
pub fn generate_subject_measurements<R: Rng + ?Sized>(
    counts: &[usize],
    mean_range: (f64, f64),
    base_cov: &DMatrix<f64>,
    rng: &mut R,
) -> Result<SyntheticData, SyntheticError> {
    if counts.is_empty() {
        return Err(SyntheticError::NoSubjects);
    }
    let (low, high) = mean_range;
    if !(low <= high && low.is_finite() && high.is_finite()) {
        return Err(SyntheticError::InvalidMeanRange(low, high));
    }

    if base_cov.is_empty() || !base_cov.is_square() {
        return Err(SyntheticError::NotSquare);
    }
    let cov = if counts.len() == 1 {
        DMatrix::from_diagonal(&base_cov.diagonal())
    } else {
        base_cov.clone()
    };
    let l = cov
        .cholesky()
        .ok_or(SyntheticError::NotPositiveDefinite)?
        .l();
    let dim = l.nrows();
    let mean_dist = Uniform::new_inclusive(low, high);

    let total: usize = counts.iter().sum();
    let mut data = Vec::with_capacity(total);
    let mut subject_ids = Vec::with_capacity(total);
    let mut subject_means = Vec::with_capacity(counts.len());

    for (subject, &n) in counts.iter().enumerate() {
        let mean = DVector::from_fn(dim, |_, _| mean_dist.sample(rng));
        for _ in 0..n {
            let z = DVector::from_fn(dim, |_, _| rng.sample::<f64, _>(StandardNormal));
            let row = &mean + &l * z;
            data.push(row.iter().copied().collect());
            subject_ids.push(subject as GroupId);
        }
        subject_means.push(mean.iter().copied().collect());
    }

    Ok(SyntheticData {
        data,
        subject_ids,
        subject_means,
    })
}

/// Two regression models evaluated on clustered targets
///
/// Column 0 of a 3-dimensional clustered draw is the target, columns 1 and 2
/// carry subject-correlated errors. `model_a` predicts `target + 0.3 e1` and
/// `model_b` predicts `target + 0.6 e2`, so `model_a` has the lower error.
///
/// # Errors
///
/// Propagates [`generate_n_measurements`] errors.
pub fn demo_dataset<R: Rng + ?Sized>(
    n_subjects: usize,
    n_measurements: usize,
    rng: &mut R,
) -> Result<ComparisonInput, SyntheticError> {
    let counts = generate_n_measurements(n_subjects, n_measurements, true, 3.0, rng)?;
    #[rustfmt::skip]
    let base_cov = DMatrix::from_row_slice(3, 3, &[
        1.0, 0.0, 0.0,
        0.0, 1.0, 0.8,
        0.0, 0.8, 1.0,
    ]);
    let clustered = generate_subject_measurements(&counts, (-1.0, 1.0), &base_cov, rng)?;

    let targets: Vec<f64> = clustered.data.iter().map(|row| row[0]).collect();
    let model = |name: &str, column: usize, scale: f64| ModelInput {
        name: name.to_string(),
        predictions: clustered
            .data
            .iter()
            .map(|row| row[0] + scale * row[column])
            .collect(),
        targets: None,
        groups: None,
    };

    Ok(ComparisonInput {
        targets: Some(targets),
        groups: Some(clustered.subject_ids.clone()),
        models: vec![model("model_a", 1, 0.3), model("model_b", 2, 0.6)],
    })
}
