//! Cluster-aware bootstrap resampling.
//!
//! A replicate draws M groups with replacement from the M unique groups of a
//! sample and includes every observation of each drawn group. Intra-group
//! correlation is carried into the replicate unchanged, so the bootstrap
//! distribution does not overstate precision on clustered data.
//!
//! ## Single-group fallback
//!
//! With exactly one group a group-level draw reproduces the full sample on
//! every replicate, giving a zero-variance distribution. In that case the
//! resampler falls back to the observation-level bootstrap (N indices drawn
//! with replacement from the N observations) and reports it through
//! [`Resampler::uses_fallback`] and a `warn!` event.
//!
//! ## Randomness
//!
//! Every replicate owns a ChaCha8 sub-stream selected by its index, so
//! replicates can be drawn in any order or in parallel and still be
//! bit-identical for a given seed.

use crate::error::{Result, StamboError};
use crate::sample::GroupIndex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// SplitMix64 finaliser used to derive independent unit seeds
#[must_use]
pub const fn derive_seed(root: u64, unit: u64) -> u64 {
    let mut z = root ^ unit.wrapping_add(1).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

/// Deterministic random source of one replicate
#[must_use]
pub fn replicate_rng(unit_seed: u64, replicate: usize) -> ChaCha8Rng {
    let mut rng = ChaCha8Rng::seed_from_u64(unit_seed);
    rng.set_stream(replicate as u64);
    rng
}

/// One bootstrap replicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replicate {
    /// Observation indices (a multiset; size may differ from N)
    pub indices: Vec<usize>,
    /// Slots of the drawn groups in draw order; empty under the fallback
    pub drawn_groups: Vec<usize>,
}

/// Group-level bootstrap resampler
#[derive(Debug, Clone)]
pub struct Resampler {
    index: GroupIndex,
}

impl Resampler {
    /// Create a resampler over a group index
    ///
    /// # Errors
    ///
    /// Returns `InsufficientGroups` if the index holds no group.
    pub fn new(index: GroupIndex) -> Result<Self> {
        if index.n_groups() == 0 || index.n_observations() == 0 {
            return Err(StamboError::InsufficientGroups(
                "cannot resample a sample without groups".to_string(),
            ));
        }
        if index.n_groups() == 1 {
            tracing::warn!(
                n_observations = index.n_observations(),
                "single group present, falling back to observation-level bootstrap"
            );
        }
        Ok(Self { index })
    }

    #[must_use]
    pub const fn group_index(&self) -> &GroupIndex {
        &self.index
    }

    /// Whether replicates are drawn at the observation level
    #[must_use]
    pub fn uses_fallback(&self) -> bool {
        self.index.n_groups() == 1
    }

    /// Draw one replicate
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Replicate {
        let mut indices = Vec::with_capacity(self.index.n_observations());
        let mut drawn_groups = Vec::new();
        self.draw_into(rng, &mut indices, &mut drawn_groups);
        Replicate {
            indices,
            drawn_groups,
        }
    }

    /// Draw one replicate into caller-owned buffers, clearing them first
    pub fn draw_into<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        indices: &mut Vec<usize>,
        drawn_groups: &mut Vec<usize>,
    ) {
        indices.clear();
        drawn_groups.clear();

        if self.uses_fallback() {
            let n = self.index.n_observations();
            indices.extend((0..n).map(|_| rng.gen_range(0..n)));
            return;
        }

        let m = self.index.n_groups();
        for _ in 0..m {
            let slot = rng.gen_range(0..m);
            drawn_groups.push(slot);
            indices.extend_from_slice(self.index.members(slot));
        }
    }

    /// Draw `n_replicates` independent replicates for a unit seed
    ///
    /// Replicate `b` depends only on `(unit_seed, b)`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `n_replicates` is zero.
    pub fn replicates(
        &self,
        n_replicates: usize,
        unit_seed: u64,
        parallel: bool,
    ) -> Result<Vec<Replicate>> {
        if n_replicates == 0 {
            return Err(StamboError::InvalidConfiguration(
                "number of replicates must be at least 1".to_string(),
            ));
        }
        let draw = |b: usize| self.draw(&mut replicate_rng(unit_seed, b));
        let replicates = if parallel {
            (0..n_replicates).into_par_iter().map(draw).collect()
        } else {
            (0..n_replicates).map(draw).collect()
        };
        Ok(replicates)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::sample::GroupIndex;
    use std::collections::HashMap;

    fn clustered_index() -> GroupIndex {
        // Groups of size 1, 2, 3 and 4 with scrambled ids
        GroupIndex::from_ids(&[9, 3, 3, 77, 77, 77, 5, 5, 5, 5])
    }

    #[test]
    fn test_draws_exactly_m_groups() {
        let resampler = Resampler::new(clustered_index()).unwrap();
        let mut rng = replicate_rng(1, 0);
        for _ in 0..200 {
            let replicate = resampler.draw(&mut rng);
            assert_eq!(replicate.drawn_groups.len(), 4);
        }
    }

    #[test]
    fn test_drawn_groups_are_included_in_full() {
        let index = clustered_index();
        let resampler = Resampler::new(index.clone()).unwrap();
        let mut rng = replicate_rng(2, 0);

        for _ in 0..200 {
            let replicate = resampler.draw(&mut rng);
            let mut expected: HashMap<usize, usize> = HashMap::new();
            for &slot in &replicate.drawn_groups {
                for &obs in index.members(slot) {
                    *expected.entry(obs).or_default() += 1;
                }
            }
            let mut actual: HashMap<usize, usize> = HashMap::new();
            for &obs in &replicate.indices {
                *actual.entry(obs).or_default() += 1;
            }
            assert_eq!(expected, actual);
        }
    }

    #[test]
    fn test_replicate_size_varies_with_unequal_groups() {
        let resampler = Resampler::new(clustered_index()).unwrap();
        let replicates = resampler.replicates(100, 3, false).unwrap();
        let sizes: std::collections::HashSet<usize> =
            replicates.iter().map(|r| r.indices.len()).collect();
        assert!(sizes.len() > 1, "replicate sizes should vary: {sizes:?}");
    }

    #[test]
    fn test_single_group_falls_back_to_observation_bootstrap() {
        let resampler = Resampler::new(GroupIndex::from_ids(&[4; 20])).unwrap();
        assert!(resampler.uses_fallback());

        let replicates = resampler.replicates(50, 11, false).unwrap();
        for replicate in &replicates {
            assert_eq!(replicate.indices.len(), 20);
            assert!(replicate.drawn_groups.is_empty());
            assert!(replicate.indices.iter().all(|&i| i < 20));
        }
        let first = &replicates[0].indices;
        assert!(
            replicates.iter().any(|r| &r.indices != first),
            "fallback replicates must not be constant"
        );
    }

    #[test]
    fn test_same_seed_is_bit_identical() {
        let resampler = Resampler::new(clustered_index()).unwrap();
        let a = resampler.replicates(64, 42, true).unwrap();
        let b = resampler.replicates(64, 42, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_different_seeds_differ() {
        let resampler = Resampler::new(clustered_index()).unwrap();
        let a = resampler.replicates(64, 42, false).unwrap();
        let b = resampler.replicates(64, 43, false).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_zero_replicates_rejected() {
        let resampler = Resampler::new(clustered_index()).unwrap();
        assert!(matches!(
            resampler.replicates(0, 1, false),
            Err(StamboError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_empty_index_rejected() {
        assert!(matches!(
            Resampler::new(GroupIndex::from_ids(&[])),
            Err(StamboError::InsufficientGroups(_))
        ));
    }

    #[test]
    fn test_derive_seed_spreads_units() {
        let seeds: std::collections::HashSet<u64> = (0..1000).map(|u| derive_seed(42, u)).collect();
        assert_eq!(seeds.len(), 1000);
        assert_ne!(derive_seed(42, 0), derive_seed(43, 0));
    }
}
