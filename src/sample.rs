//! Grouped samples: one model's predictions and targets with cluster labels.
//!
//! Observations that share a group id are correlated (e.g. several scans of
//! one patient) and are resampled together. Without explicit groups every
//! observation forms its own singleton group, which reduces the grouped
//! bootstrap to the plain i.i.d. bootstrap.

use crate::error::{Result, StamboError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cluster identifier of an observation
pub type GroupId = u64;

/// Immutable predictions/targets pair with per-observation group ids.
///
/// Invariant: `predictions`, `targets` and `group_ids` have the same
/// non-zero length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGroupedSample")]
pub struct GroupedSample {
    predictions: Vec<f64>,
    targets: Vec<f64>,
    group_ids: Vec<GroupId>,
}

/// Unvalidated wire form of [`GroupedSample`]
#[derive(Deserialize)]
struct RawGroupedSample {
    predictions: Vec<f64>,
    targets: Vec<f64>,
    #[serde(default)]
    group_ids: Option<Vec<GroupId>>,
}

impl TryFrom<RawGroupedSample> for GroupedSample {
    type Error = StamboError;

    fn try_from(raw: RawGroupedSample) -> Result<Self> {
        Self::from_parts(raw.predictions, raw.targets, raw.group_ids)
    }
}

impl GroupedSample {
    /// Create a sample where every observation is its own group
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` on unequal lengths and `InsufficientGroups` when empty.
    pub fn new(predictions: Vec<f64>, targets: Vec<f64>) -> Result<Self> {
        let group_ids = (0..predictions.len() as u64).collect();
        Self::with_groups(predictions, targets, group_ids)
    }

    /// Create a sample with explicit group ids
    ///
    /// Group ids need not be contiguous or sorted.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` on unequal lengths and `InsufficientGroups` when empty.
    pub fn with_groups(
        predictions: Vec<f64>,
        targets: Vec<f64>,
        group_ids: Vec<GroupId>,
    ) -> Result<Self> {
        if predictions.len() != targets.len() {
            return Err(StamboError::ShapeMismatch(format!(
                "{} predictions vs {} targets",
                predictions.len(),
                targets.len()
            )));
        }
        if group_ids.len() != predictions.len() {
            return Err(StamboError::ShapeMismatch(format!(
                "{} group ids vs {} observations",
                group_ids.len(),
                predictions.len()
            )));
        }
        if predictions.is_empty() {
            return Err(StamboError::InsufficientGroups(
                "sample has no observations".to_string(),
            ));
        }
        Ok(Self {
            predictions,
            targets,
            group_ids,
        })
    }

    /// Create a sample from optional group ids
    ///
    /// # Errors
    ///
    /// Same as [`GroupedSample::with_groups`].
    pub fn from_parts(
        predictions: Vec<f64>,
        targets: Vec<f64>,
        group_ids: Option<Vec<GroupId>>,
    ) -> Result<Self> {
        match group_ids {
            Some(groups) => Self::with_groups(predictions, targets, groups),
            None => Self::new(predictions, targets),
        }
    }

    /// Number of observations
    #[must_use]
    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    /// Always false for a constructed sample
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    #[must_use]
    pub fn predictions(&self) -> &[f64] {
        &self.predictions
    }

    #[must_use]
    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    #[must_use]
    pub fn group_ids(&self) -> &[GroupId] {
        &self.group_ids
    }

    /// Build the group → observation index used by the resampler
    #[must_use]
    pub fn group_index(&self) -> GroupIndex {
        GroupIndex::from_ids(&self.group_ids)
    }

    /// Check that `other` can be paired with `self`
    ///
    /// Paired designs score both models against the same resampled
    /// targets, so lengths, targets and group ids must coincide.
    ///
    /// # Errors
    ///
    /// Returns `ShapeMismatch` describing the first difference found.
    pub fn check_paired_with(&self, other: &Self) -> Result<()> {
        if self.len() != other.len() {
            return Err(StamboError::ShapeMismatch(format!(
                "paired samples differ in length: {} vs {}",
                self.len(),
                other.len()
            )));
        }
        if self.group_ids != other.group_ids {
            return Err(StamboError::ShapeMismatch(
                "paired samples differ in group structure".to_string(),
            ));
        }
        let same_targets = self
            .targets
            .iter()
            .zip(&other.targets)
            .all(|(a, b)| a.to_bits() == b.to_bits() || a == b);
        if !same_targets {
            return Err(StamboError::ShapeMismatch(
                "paired samples differ in targets".to_string(),
            ));
        }
        Ok(())
    }
}

/// Unique groups in first-appearance order with their member observations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupIndex {
    ids: Vec<GroupId>,
    members: Vec<Vec<usize>>,
    n_observations: usize,
}

impl GroupIndex {
    /// Index a sequence of group ids
    #[must_use]
    pub fn from_ids(group_ids: &[GroupId]) -> Self {
        let mut position: HashMap<GroupId, usize> = HashMap::new();
        let mut ids = Vec::new();
        let mut members: Vec<Vec<usize>> = Vec::new();

        for (obs, &gid) in group_ids.iter().enumerate() {
            let slot = *position.entry(gid).or_insert_with(|| {
                ids.push(gid);
                members.push(Vec::new());
                members.len() - 1
            });
            members[slot].push(obs);
        }

        Self {
            ids,
            members,
            n_observations: group_ids.len(),
        }
    }

    /// Number of unique groups (M)
    #[must_use]
    pub fn n_groups(&self) -> usize {
        self.ids.len()
    }

    /// Number of observations (N)
    #[must_use]
    pub const fn n_observations(&self) -> usize {
        self.n_observations
    }

    /// Group ids in first-appearance order
    #[must_use]
    pub fn ids(&self) -> &[GroupId] {
        &self.ids
    }

    /// Observation indices of the `slot`-th group
    #[must_use]
    pub fn members(&self, slot: usize) -> &[usize] {
        &self.members[slot]
    }

    /// Slot of a group id, if present
    #[must_use]
    pub fn slot_of(&self, gid: GroupId) -> Option<usize> {
        self.ids.iter().position(|&id| id == gid)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_groups_are_singletons() {
        let sample = GroupedSample::new(vec![0.1, 0.2, 0.3], vec![0.0, 1.0, 1.0]).unwrap();
        assert_eq!(sample.group_ids(), &[0, 1, 2]);
        assert_eq!(sample.group_index().n_groups(), 3);
    }

    #[test]
    fn test_length_mismatch() {
        let err = GroupedSample::new(vec![0.1, 0.2], vec![0.0]).unwrap_err();
        assert!(matches!(err, StamboError::ShapeMismatch(_)));

        let err = GroupedSample::with_groups(vec![0.1, 0.2], vec![0.0, 1.0], vec![1]).unwrap_err();
        assert!(matches!(err, StamboError::ShapeMismatch(_)));
    }

    #[test]
    fn test_empty_sample() {
        let err = GroupedSample::new(vec![], vec![]).unwrap_err();
        assert!(matches!(err, StamboError::InsufficientGroups(_)));
    }

    #[test]
    fn test_group_index_non_contiguous_ids() {
        let index = GroupIndex::from_ids(&[42, 7, 42, 1000, 7, 42]);
        assert_eq!(index.n_groups(), 3);
        assert_eq!(index.ids(), &[42, 7, 1000]);
        assert_eq!(index.members(0), &[0, 2, 5]);
        assert_eq!(index.members(1), &[1, 4]);
        assert_eq!(index.members(2), &[3]);
        assert_eq!(index.slot_of(1000), Some(2));
        assert_eq!(index.slot_of(3), None);
        assert_eq!(index.n_observations(), 6);
    }

    #[test]
    fn test_check_paired_with() {
        let a = GroupedSample::with_groups(vec![0.9, 0.1], vec![1.0, 0.0], vec![1, 2]).unwrap();
        let b = GroupedSample::with_groups(vec![0.4, 0.6], vec![1.0, 0.0], vec![1, 2]).unwrap();
        assert!(a.check_paired_with(&b).is_ok());

        let other_groups =
            GroupedSample::with_groups(vec![0.4, 0.6], vec![1.0, 0.0], vec![1, 1]).unwrap();
        assert!(a.check_paired_with(&other_groups).is_err());

        let other_targets = GroupedSample::with_groups(vec![0.4, 0.6], vec![0.0, 0.0], vec![1, 2])
            .unwrap();
        assert!(a.check_paired_with(&other_targets).is_err());

        let shorter = GroupedSample::new(vec![0.4], vec![1.0]).unwrap();
        assert!(a.check_paired_with(&shorter).is_err());
    }

    #[test]
    fn test_deserialize_validates_lengths() {
        let json = r#"{"predictions":[1.0,0.0],"targets":[1.0,0.0],"group_ids":[0,1,2]}"#;
        let err = serde_json::from_str::<GroupedSample>(json).unwrap_err();
        assert!(err.to_string().contains("group ids"), "{err}");

        let empty = r#"{"predictions":[],"targets":[]}"#;
        assert!(serde_json::from_str::<GroupedSample>(empty).is_err());
    }

    #[test]
    fn test_deserialize_round_trip_and_default_groups() {
        let sample =
            GroupedSample::with_groups(vec![0.2, 0.8, 0.5], vec![0.0, 1.0, 1.0], vec![9, 9, 4])
                .unwrap();
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(serde_json::from_str::<GroupedSample>(&json).unwrap(), sample);

        let ungrouped: GroupedSample =
            serde_json::from_str(r#"{"predictions":[0.1,0.2],"targets":[0.0,1.0]}"#).unwrap();
        assert_eq!(ungrouped.group_ids(), &[0, 1]);
    }
}
