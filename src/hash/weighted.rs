//! Weighted consistent hashing with flow affinity.
//!
//! Selection is seeded from the flow id, so the same flow draws the
//! buckets in the same order on every call. A flow keeps its previous choice
//! at a node for as long as that edge stays an eligible candidate.

use std::num::NonZeroUsize;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::affinity::FlowAffinity;
use super::{HashFunction, RouterOptions};
use crate::error::RoutingError;
use crate::topology::{Bucket, GraphPathElement};

/// Upper bound of the selection keys drawn per call
const MAX_KEY: u32 = 10_000;

/// How bucket weights are normalised before selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashVariant {
    /// Divide by the largest weight; pick a random bucket and accept it
    /// with probability equal to its normalised weight, else drop it and
    /// draw again.
    #[default]
    MaxNormalized,
    /// Divide by the weight sum; draw one key and walk the buckets from it,
    /// spending the threshold on every rejected bucket.
    SumNormalized,
}

#[derive(Debug)]
pub struct WeightedHashFunction {
    options: RouterOptions,
    variant: HashVariant,
    affinity: FlowAffinity,
}

impl WeightedHashFunction {
    pub fn new(options: RouterOptions, variant: HashVariant, affinity_capacity: Option<NonZeroUsize>) -> Self {
        Self {
            options,
            variant,
            affinity: FlowAffinity::new(affinity_capacity),
        }
    }

    pub fn variant(&self) -> HashVariant {
        self.variant
    }

    pub fn affinity(&self) -> &FlowAffinity {
        &self.affinity
    }
}

impl HashFunction for WeightedHashFunction {
    fn choose_nexthop(&mut self, buckets: &[Bucket], flow_id: &str) -> Result<GraphPathElement, RoutingError> {
        let Some(first) = buckets.first() else {
            return Err(RoutingError::NoEligibleNexthop { node: String::new() });
        };
        let node = first.edge.from.clone();

        if let Some(remembered) = self.affinity.get(flow_id, &node) {
            let still_eligible = buckets
                .iter()
                .any(|bucket| bucket.edge == *remembered && bucket.weight > 0.0);
            if still_eligible {
                return Ok(remembered.clone());
            }
        }

        let max_weight = buckets.iter().map(|bucket| bucket.weight).fold(f64::NEG_INFINITY, f64::max);
        if !(max_weight > 0.0) {
            return Err(RoutingError::NoEligibleNexthop { node });
        }

        let mut rng = flow_rng(flow_id);
        let chosen = match self.variant {
            HashVariant::MaxNormalized => select_max_normalized(buckets, max_weight, &mut rng),
            HashVariant::SumNormalized => select_sum_normalized(buckets, &mut rng),
        }
        .ok_or_else(|| RoutingError::NoEligibleNexthop { node: node.clone() })?;

        debug!("Flow {} at {} hashed to {}", flow_id, node, chosen);
        self.affinity.remember(flow_id, &node, chosen.clone());
        Ok(chosen)
    }

    fn options(&self) -> &RouterOptions {
        &self.options
    }
}

/// Deterministic generator for one flow
fn flow_rng(flow_id: &str) -> StdRng {
    let digest = Sha256::digest(flow_id.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&digest);
    StdRng::from_seed(seed)
}

/// Biased coin in `[0, 1)` keyed by a drawn value
fn coin(key: u32) -> f64 {
    let digest = Sha256::digest(key.to_le_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    // 53 significant bits keep the quotient strictly below 1
    (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64
}

fn select_max_normalized(buckets: &[Bucket], max_weight: f64, rng: &mut StdRng) -> Option<GraphPathElement> {
    let mut remaining: Vec<(&GraphPathElement, f64)> = buckets
        .iter()
        .map(|bucket| (&bucket.edge, bucket.weight / max_weight))
        .collect();

    while !remaining.is_empty() {
        let key = rng.gen_range(0..=MAX_KEY);
        let position = key as usize % remaining.len();
        let (edge, weight) = remaining[position];
        if weight > 0.0 && coin(key) < weight {
            return Some(edge.clone());
        }
        remaining.remove(position);
    }
    None
}

fn select_sum_normalized(buckets: &[Bucket], rng: &mut StdRng) -> Option<GraphPathElement> {
    let total: f64 = buckets.iter().map(|bucket| bucket.weight.max(0.0)).sum();
    let mut remaining: Vec<(&GraphPathElement, f64)> = buckets
        .iter()
        .map(|bucket| (&bucket.edge, bucket.weight.max(0.0) / total))
        .collect();

    let key = rng.gen_range(0..=MAX_KEY);
    let mut threshold = coin(key);
    let mut last_eligible = None;

    while !remaining.is_empty() {
        let position = key as usize % remaining.len();
        let (edge, weight) = remaining.remove(position);
        if weight > 0.0 {
            if threshold < weight {
                return Some(edge.clone());
            }
            threshold -= weight;
            last_eligible = Some(edge);
        }
    }
    // Rounding can leave a sliver of threshold after the last bucket
    last_eligible.cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buckets(weights: &[(&str, f64)]) -> Vec<Bucket> {
        weights
            .iter()
            .map(|(to, weight)| Bucket::new(GraphPathElement::new("A", *to, 0), *weight))
            .collect()
    }

    fn hasher(variant: HashVariant) -> WeightedHashFunction {
        WeightedHashFunction::new(RouterOptions::default(), variant, None)
    }

    #[test]
    fn test_coin_range_and_determinism() {
        for key in 0..=MAX_KEY {
            let value = coin(key);
            assert!((0.0..1.0).contains(&value));
        }
        assert_eq!(coin(42), coin(42));
    }

    #[test]
    fn test_same_flow_same_choice_without_affinity() {
        let candidates = buckets(&[("B", 1.0), ("C", 1.0), ("D", 1.0)]);
        for variant in [HashVariant::MaxNormalized, HashVariant::SumNormalized] {
            let first = hasher(variant).choose_nexthop(&candidates, "flow-7").unwrap();
            let second = hasher(variant).choose_nexthop(&candidates, "flow-7").unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_zero_weights_are_never_chosen() {
        let candidates = buckets(&[("B", 0.0), ("D", 1.0)]);
        for variant in [HashVariant::MaxNormalized, HashVariant::SumNormalized] {
            let mut hash_fn = hasher(variant);
            for i in 0..200 {
                let chosen = hash_fn.choose_nexthop(&candidates, &format!("f{}", i)).unwrap();
                assert_eq!(chosen.to, "D");
            }
        }
    }

    #[test]
    fn test_all_zero_weights_fail() {
        let mut hash_fn = hasher(HashVariant::MaxNormalized);
        let candidates = buckets(&[("B", 0.0), ("D", 0.0)]);
        assert_eq!(
            hash_fn.choose_nexthop(&candidates, "f"),
            Err(RoutingError::NoEligibleNexthop { node: "A".to_string() })
        );
        assert!(matches!(
            hash_fn.choose_nexthop(&[], "f"),
            Err(RoutingError::NoEligibleNexthop { .. })
        ));
    }

    #[test]
    fn test_affinity_sticks_until_edge_disabled() {
        let mut hash_fn = hasher(HashVariant::MaxNormalized);
        let even = buckets(&[("B", 1.0), ("D", 1.0)]);
        let first = hash_fn.choose_nexthop(&even, "sticky").unwrap();

        // Shift nearly all weight away: the flow stays put
        let skewed: Vec<Bucket> = even
            .iter()
            .map(|b| Bucket::new(b.edge.clone(), if b.edge == first { 0.01 } else { 100.0 }))
            .collect();
        for _ in 0..10 {
            assert_eq!(hash_fn.choose_nexthop(&skewed, "sticky").unwrap(), first);
        }

        // Disable the remembered edge: a new choice is made and remembered
        let disabled: Vec<Bucket> = even
            .iter()
            .map(|b| Bucket::new(b.edge.clone(), if b.edge == first { 0.0 } else { 1.0 }))
            .collect();
        let moved = hash_fn.choose_nexthop(&disabled, "sticky").unwrap();
        assert_ne!(moved, first);
        assert_eq!(hash_fn.affinity().len(), 1);

        // Remembered edge gone from the candidate list entirely
        let without: Vec<Bucket> = even.iter().filter(|b| b.edge != moved).cloned().collect();
        assert_eq!(hash_fn.choose_nexthop(&without, "sticky").unwrap(), first);
    }

    #[test]
    fn test_weighted_split_follows_weights() {
        let candidates = buckets(&[("B", 3.0), ("D", 1.0)]);
        // Elimination favours the heavier bucket a little more than its
        // weight share: B wins outright half the time, plus 2/3 of the rest
        let expected = [(HashVariant::MaxNormalized, 5.0 / 6.0), (HashVariant::SumNormalized, 0.75)];
        for (variant, expected_share) in expected {
            let mut hash_fn = hasher(variant);
            let flows = 4000;
            let to_b = (0..flows)
                .filter(|i| hash_fn.choose_nexthop(&candidates, &format!("flow-{}", i)).unwrap().to == "B")
                .count();
            let share = to_b as f64 / flows as f64;
            assert!((share - expected_share).abs() < 0.04, "{:?} share of B was {}", variant, share);
        }
    }

    #[test]
    fn test_variant_deserializes_snake_case() {
        let variant: HashVariant = serde_yaml::from_str("sum_normalized").unwrap();
        assert_eq!(variant, HashVariant::SumNormalized);
        assert_eq!(HashVariant::default(), HashVariant::MaxNormalized);
    }
}
