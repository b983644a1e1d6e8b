//! Topology type definitions.
//!
//! Value types shared by the topology model, the path calculators and the
//! hash functions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable node identifier (GML label or numeric id rendered as text)
pub type NodeId = String;

/// Per-edge attributes of the topology multigraph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeAttributes {
    /// Hash weight assigned by the weight-assignment subsystem
    pub weight: f64,
    /// Link capacity
    pub bandwidth: f64,
    /// Load accumulated during the current routing pass
    #[serde(default)]
    pub current_bandwidth: f64,
}

impl EdgeAttributes {
    pub fn new(weight: f64, bandwidth: f64) -> Self {
        Self {
            weight,
            bandwidth,
            current_bandwidth: 0.0,
        }
    }

    /// Fraction of the capacity currently in use
    pub fn utilization(&self) -> f64 {
        self.current_bandwidth / self.bandwidth
    }
}

impl Default for EdgeAttributes {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

/// A traversed edge: `from -> to` over the parallel link `index`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GraphPathElement {
    pub from: NodeId,
    pub to: NodeId,
    pub index: usize,
}

impl GraphPathElement {
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>, index: usize) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            index,
        }
    }
}

impl fmt::Display for GraphPathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}#{}", self.from, self.to, self.index)
    }
}

/// Render a path as `A->B#0, B->C#1`
pub fn format_path(path: &[GraphPathElement]) -> String {
    path.iter()
        .map(|element| element.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
