//! Multiple-comparison correction of p-values.
//!
//! Both corrections control the family-wise error rate. Adjusted values are
//! returned in the input order and are never smaller than the raw ones.

use crate::config::CorrectionMethod;

/// Adjust a family of p-values
#[must_use]
pub fn adjust_p_values(p_values: &[f64], method: CorrectionMethod) -> Vec<f64> {
    match method {
        CorrectionMethod::None => p_values.to_vec(),
        CorrectionMethod::Bonferroni => bonferroni(p_values),
        CorrectionMethod::Holm => holm(p_values),
    }
}

/// Bonferroni: `min(1, m p)`
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bonferroni(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len() as f64;
    p_values.iter().map(|p| (p * m).min(1.0)).collect()
}

/// Holm step-down
///
/// With p-values sorted ascending, the k-th (0-based) adjusted value is
/// `max_{j <= k} min(1, (m - j) p_(j))`, mapped back to input order.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn holm(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len();
    let mut order: Vec<usize> = (0..m).collect();
    // Stable sort keeps ties in input order
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut adjusted = vec![0.0; m];
    let mut running_max: f64 = 0.0;
    for (rank, &idx) in order.iter().enumerate() {
        let scaled = ((m - rank) as f64 * p_values[idx]).min(1.0);
        running_max = running_max.max(scaled);
        adjusted[idx] = running_max;
    }
    adjusted
}
