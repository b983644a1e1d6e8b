//! Nexthop selection and flow routing.
//!
//! A hash function picks one edge out of the candidate buckets offered at a
//! node. The flow router drives a path calculator and a hash function hop by
//! hop to build each flow's path and accounts the flow's bandwidth on the
//! traversed edges.

pub mod affinity;
pub mod first_bucket;
pub mod router;
pub mod weighted;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::RoutingError;
use crate::paths::PathCalculator;
use crate::topology::{Bucket, Flow, GraphPathElement, HashWeights, Topology};

pub use affinity::FlowAffinity;
pub use first_bucket::FirstBucketHashFunction;
pub use weighted::{HashVariant, WeightedHashFunction};

/// Routed path per flow id
pub type FlowPaths = BTreeMap<String, Vec<GraphPathElement>>;

/// Knobs shared by every hash function
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterOptions {
    /// Weight given to candidate edges that have no bucket yet
    pub default_weight: f64,
    /// Warn about paths that revisit a node
    pub check_cycles: bool,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            default_weight: 1.0,
            check_cycles: false,
        }
    }
}

pub trait HashFunction {
    /// Pick one of `buckets` for `flow_id`.
    ///
    /// All buckets share the same `from` node. Fails with
    /// `NoEligibleNexthop` when no bucket carries a positive weight.
    fn choose_nexthop(&mut self, buckets: &[Bucket], flow_id: &str) -> Result<GraphPathElement, RoutingError>;

    fn options(&self) -> &RouterOptions;

    /// Build the path of a single flow without touching edge loads
    fn route(
        &mut self,
        calculator: &mut dyn PathCalculator,
        topology: &Topology,
        flow: &Flow,
        hash_weights: &HashWeights,
        depth_limit: Option<usize>,
    ) -> Result<Vec<GraphPathElement>, RoutingError> {
        router::flow_path(self, calculator, topology, flow, hash_weights, depth_limit)
    }

    /// Route every flow and account bandwidth on the topology.
    ///
    /// Loads are reset first. Flows without a path are logged and left out
    /// of the result; failures unrelated to a single flow are returned.
    fn run(
        &mut self,
        calculator: &mut dyn PathCalculator,
        topology: &mut Topology,
        flows: &[Flow],
        hash_weights: &HashWeights,
        depth_limit: Option<usize>,
    ) -> Result<FlowPaths, RoutingError> {
        router::run(self, calculator, topology, flows, hash_weights, depth_limit)
    }
}
