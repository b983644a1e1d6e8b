//! Shortest-hop-only path calculator.
//!
//! Offers every out-edge that lies on some minimum-hop path to the
//! destination. Paths are always loop-free but often single-path.

use log::debug;

use super::PathCalculator;
use crate::error::RoutingError;
use crate::topology::{GraphPathElement, Topology};

#[derive(Debug, Default)]
pub struct ShortestHopCalculator {
    prepared: bool,
}

impl ShortestHopCalculator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PathCalculator for ShortestHopCalculator {
    fn prepare_iteration(&mut self, topology: &Topology) -> Result<(), RoutingError> {
        self.prepared = false;
        topology.validate()?;
        self.prepared = true;
        Ok(())
    }

    fn calculate(
        &mut self,
        topology: &Topology,
        source: &str,
        _previous_hop: Option<&str>,
        destination: &str,
        _flow_origin: &str,
    ) -> Result<Vec<GraphPathElement>, RoutingError> {
        if !self.prepared {
            return Err(RoutingError::NotPrepared);
        }
        for node in [source, destination] {
            if !topology.contains_node(node) {
                return Err(RoutingError::NodeNotOrdered(node.to_string()));
            }
        }

        let remaining = topology.hop_distances_to(destination);
        let candidates: Vec<GraphPathElement> = match remaining.get(source) {
            Some(&hops) if hops > 0 => topology
                .out_edges(source)
                .filter(|(edge, _)| remaining.get(&edge.to) == Some(&(hops - 1)))
                .map(|(edge, _)| edge)
                .collect(),
            _ => Vec::new(),
        };

        if candidates.is_empty() {
            return Err(RoutingError::NoPathFound {
                node: source.to_string(),
                destination: destination.to_string(),
            });
        }
        debug!("{} shortest-hop nexthops at {} towards {}", candidates.len(), source, destination);
        Ok(candidates)
    }
}
