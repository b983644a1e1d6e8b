//! Link utilisation metrics computed after a routing pass.

use serde::{Deserialize, Serialize};

use super::graph::Topology;
use super::types::GraphPathElement;

/// Load summary of a topology after flows were routed over it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationReport {
    /// Variance of per-edge utilisation
    pub phi: f64,
    pub mean_utilization: f64,
    pub max_utilization: f64,
    /// Edges carrying more than their capacity
    pub overloaded_edges: Vec<GraphPathElement>,
}

/// Population variance of `current_bandwidth / bandwidth` over all edges.
///
/// Lower is better balanced. Returns 0 for a topology without edges.
pub fn phi(topology: &Topology) -> f64 {
    let utilizations: Vec<f64> = topology.edges().map(|(_, attrs)| attrs.utilization()).collect();
    variance(&utilizations)
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Summarise link loads of the topology
pub fn utilization_report(topology: &Topology) -> UtilizationReport {
    let mut utilizations = Vec::with_capacity(topology.number_of_edges());
    let mut overloaded_edges = Vec::new();

    for (element, attrs) in topology.edges() {
        let utilization = attrs.utilization();
        if utilization > 1.0 {
            overloaded_edges.push(element);
        }
        utilizations.push(utilization);
    }

    let mean_utilization = if utilizations.is_empty() {
        0.0
    } else {
        utilizations.iter().sum::<f64>() / utilizations.len() as f64
    };
    let max_utilization = utilizations.iter().copied().fold(0.0, f64::max);

    UtilizationReport {
        phi: variance(&utilizations),
        mean_utilization,
        max_utilization,
        overloaded_edges,
    }
}
