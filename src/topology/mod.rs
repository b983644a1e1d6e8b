//! Network topology module.
//!
//! This module contains the directed multigraph the routing core works on,
//! the flows routed over it, the hash weights that drive nexthop selection,
//! and link utilisation metrics.

pub mod types;
pub mod graph;
pub mod flow;
pub mod weights;
pub mod utilization;

// Re-export key types and functions for easier access
pub use types::{format_path, EdgeAttributes, GraphPathElement, NodeId};
pub use graph::Topology;
pub use flow::Flow;
pub use weights::{Bucket, HashWeights};
pub use utilization::{phi, utilization_report, UtilizationReport};
