//! Path calculation.
//!
//! A path calculator turns the current position of a flow into the set of
//! admissible nexthop edges. The DAG calculator keeps paths loop-free with
//! multipath diversity; the shortest-hop calculator is the simple baseline.

pub mod ordering;
pub mod distance_cache;
pub mod dag_calculator;
pub mod shortest_hop;

use crate::error::RoutingError;
use crate::topology::{GraphPathElement, Topology};

pub use dag_calculator::{DagCalculator, DEFAULT_LENGTH_CUTOFF};
pub use distance_cache::{DistanceCache, MAX_REMOVED};
pub use ordering::{Direction, Orderings};
pub use shortest_hop::ShortestHopCalculator;

/// Nexthop candidate source used by the flow router.
///
/// `prepare_iteration` must succeed for a topology snapshot before
/// `calculate` is called against it.
pub trait PathCalculator {
    /// Rebuild all per-snapshot state for `topology`
    fn prepare_iteration(&mut self, topology: &Topology) -> Result<(), RoutingError>;

    /// Admissible nexthops at `source` for traffic heading to `destination`.
    ///
    /// `previous_hop` is `None` for the first hop of a flow; `flow_origin` is
    /// the node the flow entered the network at. Candidate order carries no
    /// meaning.
    fn calculate(
        &mut self,
        topology: &Topology,
        source: &str,
        previous_hop: Option<&str>,
        destination: &str,
        flow_origin: &str,
    ) -> Result<Vec<GraphPathElement>, RoutingError>;

    /// Hop bound for a whole path from `source` to `destination`, if the
    /// calculator enforces one
    fn path_hop_limit(&self, _source: &str, _destination: &str) -> Result<Option<u32>, RoutingError> {
        Ok(None)
    }

    /// [`calculate`](Self::calculate) for a flow that may take at most
    /// `remaining_hops` more hops. Calculators without a path bound ignore it.
    fn calculate_within(
        &mut self,
        topology: &Topology,
        source: &str,
        previous_hop: Option<&str>,
        destination: &str,
        flow_origin: &str,
        _remaining_hops: Option<u32>,
    ) -> Result<Vec<GraphPathElement>, RoutingError> {
        self.calculate(topology, source, previous_hop, destination, flow_origin)
    }
}
