//! Hash weights: per (node, destination) weighted candidate buckets.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::graph::Topology;
use super::types::{GraphPathElement, NodeId};

/// One candidate nexthop with its relative traffic share
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub edge: GraphPathElement,
    pub weight: f64,
}

impl Bucket {
    pub fn new(edge: GraphPathElement, weight: f64) -> Self {
        Self { edge, weight }
    }
}

/// Buckets keyed by (current node, destination node).
///
/// Produced externally once per iteration; the routing core only reads it,
/// apart from synthesising default buckets for edges it has never seen.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HashWeights {
    weights: BTreeMap<(NodeId, NodeId), Vec<Bucket>>,
}

impl HashWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed weights from the topology: at every node, for every other
    /// destination, one bucket per out-edge carrying that edge's weight.
    pub fn from_topology(topology: &Topology) -> Self {
        let mut hash_weights = Self::new();
        for current in topology.nodes() {
            let out_edges: Vec<_> = topology.out_edges(current).collect();
            for destination in topology.nodes() {
                if current == destination {
                    continue;
                }
                for (edge, attrs) in &out_edges {
                    hash_weights.put(current, destination, edge.clone(), attrs.weight);
                }
            }
        }
        hash_weights
    }

    /// Set the weight of `edge` for traffic at `current` heading to
    /// `destination`, replacing an existing bucket for the same edge.
    pub fn put(&mut self, current: &str, destination: &str, edge: GraphPathElement, weight: f64) {
        let buckets = self
            .weights
            .entry((current.to_string(), destination.to_string()))
            .or_default();

        match buckets.iter_mut().find(|bucket| bucket.edge == edge) {
            Some(bucket) => bucket.weight = weight,
            None => buckets.push(Bucket::new(edge, weight)),
        }
    }

    pub fn buckets(&self, current: &str, destination: &str) -> &[Bucket] {
        self.weights
            .get(&(current.to_string(), destination.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Buckets for the given candidate nexthops, in candidate order.
    ///
    /// Candidates without a stored bucket (the weights predate a topology
    /// change) get `default_weight` so new edges stay reachable.
    pub fn candidate_buckets(
        &self,
        current: &str,
        destination: &str,
        nexthops: &[GraphPathElement],
        default_weight: f64,
    ) -> Vec<Bucket> {
        let known: HashMap<&GraphPathElement, f64> = self
            .buckets(current, destination)
            .iter()
            .map(|bucket| (&bucket.edge, bucket.weight))
            .collect();

        nexthops
            .iter()
            .map(|nexthop| {
                let weight = known.get(nexthop).copied().unwrap_or_else(|| {
                    log::debug!("No bucket for {} towards {}, using default weight", nexthop, destination);
                    default_weight
                });
                Bucket::new(nexthop.clone(), weight)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}
