//! Routing error types.
//!
//! Path calculators and hash functions return typed failures; the flow
//! router decides per flow whether a failure drops the flow or is only
//! worth a warning.

use crate::topology::NodeId;

/// Errors produced while preparing orderings, calculating nexthops or
/// routing flows.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RoutingError {
    /// No admissible nexthop set exists for the pair.
    #[error("No path found from {node} to {destination}")]
    NoPathFound { node: NodeId, destination: NodeId },

    /// The node has no DFS number in the current snapshot, usually because
    /// it was removed from the topology after weights were computed.
    #[error("Node {0} is not part of the current ordering")]
    NodeNotOrdered(NodeId),

    /// Every candidate bucket carries a zero weight.
    #[error("No eligible nexthop at node {node}: all candidate weights are zero")]
    NoEligibleNexthop { node: NodeId },

    /// A node repeats along a routed path. Logged, never returned.
    #[error("Cycle detected in path of flow {flow_id} at node {node}")]
    CycleDetected { flow_id: String, node: NodeId },

    #[error("Malformed topology: {0}")]
    MalformedTopology(String),

    /// `calculate` was called before `prepare_iteration`.
    #[error("Path calculator has not been prepared for the current topology")]
    NotPrepared,

    /// Unbounded walk exceeded the loop guard.
    #[error("Flow {flow_id} exceeded the hop budget after {hops} hops")]
    HopBudgetExhausted { flow_id: String, hops: usize },
}

impl RoutingError {
    /// Failures that only mean "this flow has no route right now".
    pub fn is_unroutable(&self) -> bool {
        matches!(
            self,
            Self::NoPathFound { .. }
                | Self::NodeNotOrdered(_)
                | Self::NoEligibleNexthop { .. }
                | Self::HopBudgetExhausted { .. }
        )
    }
}
