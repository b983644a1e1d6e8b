//! Loop-free nexthop calculation over the forward and reverse orderings.
//!
//! A walk that stays inside one ordering is monotone and therefore loop-free.
//! When no monotone path reaches the destination the calculator allows one
//! change of ordering ("direction change") along the way. Every candidate
//! must keep the remaining path within `ceil(original_length * cutoff)` hops.
//!
//! Routed flows also carry the bound of their first hop along the path: the
//! router passes the hops left, and a candidate is only offered while it can
//! still finish inside them. Every offered candidate has a continuation that
//! fits, so a bounded walk always reaches the destination without revisiting
//! a node.

use std::collections::HashSet;

use log::{debug, info};

use super::distance_cache::DistanceCache;
use super::ordering::{NodeTable, OrderingGraph, Orderings, Slot};
use super::PathCalculator;
use crate::error::RoutingError;
use crate::topology::{GraphPathElement, Topology};

/// Default tolerated path inflation over the shortest ordering path
pub const DEFAULT_LENGTH_CUTOFF: f64 = 1.5;

/// Orderings and distances of one topology snapshot
#[derive(Debug)]
struct PreparedState {
    orderings: Orderings,
    cache: DistanceCache,
}

#[derive(Debug)]
pub struct DagCalculator {
    length_cutoff: f64,
    state: Option<PreparedState>,
}

impl Default for DagCalculator {
    fn default() -> Self {
        Self::new(DEFAULT_LENGTH_CUTOFF)
    }
}

impl DagCalculator {
    pub fn new(length_cutoff: f64) -> Self {
        Self {
            length_cutoff,
            state: None,
        }
    }

    pub fn length_cutoff(&self) -> f64 {
        self.length_cutoff
    }

    pub fn is_prepared(&self) -> bool {
        self.state.is_some()
    }

    /// Orderings of the prepared snapshot
    pub fn orderings(&self) -> Option<&Orderings> {
        self.state.as_ref().map(|state| &state.orderings)
    }

    /// Hop bound applied to a flow entering the network at `source`.
    ///
    /// Based on the shorter of the two monotone distances; when neither
    /// ordering connects the pair the bound is derived from the node count.
    pub fn hop_limit(&self, source: &str, destination: &str) -> Result<u32, RoutingError> {
        let state = self.state.as_ref().ok_or(RoutingError::NotPrepared)?;
        let orderings = &state.orderings;
        let s = orderings.nodes.require(source)?;
        let d = orderings.nodes.require(destination)?;

        let search = Search::new(&state.cache, &orderings.nodes, self.length_cutoff, None);
        let original = search.original_length(&orderings.forward, &orderings.reverse, s, d);
        Ok(search.limit(original))
    }
}

impl PathCalculator for DagCalculator {
    fn prepare_iteration(&mut self, topology: &Topology) -> Result<(), RoutingError> {
        self.state = None;

        let orderings = Orderings::build(topology)?;
        let cache = DistanceCache::build(&orderings);
        info!(
            "Prepared DAG orderings rooted at {} ({} nodes, {} cached distances)",
            orderings.root,
            orderings.nodes.len(),
            cache.len()
        );

        self.state = Some(PreparedState { orderings, cache });
        Ok(())
    }

    fn calculate(
        &mut self,
        topology: &Topology,
        source: &str,
        previous_hop: Option<&str>,
        destination: &str,
        flow_origin: &str,
    ) -> Result<Vec<GraphPathElement>, RoutingError> {
        self.calculate_within(topology, source, previous_hop, destination, flow_origin, None)
    }

    fn path_hop_limit(&self, source: &str, destination: &str) -> Result<Option<u32>, RoutingError> {
        self.hop_limit(source, destination).map(Some)
    }

    fn calculate_within(
        &mut self,
        topology: &Topology,
        source: &str,
        previous_hop: Option<&str>,
        destination: &str,
        flow_origin: &str,
        remaining_hops: Option<u32>,
    ) -> Result<Vec<GraphPathElement>, RoutingError> {
        // Orderings may predate a node removal
        for node in [source, destination] {
            if !topology.contains_node(node) {
                return Err(RoutingError::NodeNotOrdered(node.to_string()));
            }
        }

        let state = self.state.as_mut().ok_or(RoutingError::NotPrepared)?;
        let PreparedState { orderings, cache } = state;
        let Orderings {
            nodes,
            forward,
            reverse,
            ..
        } = orderings;

        let s = nodes.require(source)?;
        let d = nodes.require(destination)?;
        let search = Search::new(cache, nodes, self.length_cutoff, remaining_hops);

        let candidates = match previous_hop {
            None => search.first_hop(forward, reverse, s, d),
            Some(previous) => {
                let p = nodes.require(previous)?;
                let mut hidden = vec![p];
                if let Some(origin) = nodes.slot(flow_origin) {
                    hidden.push(origin);
                }
                hidden.retain(|&slot| slot != s && slot != d);

                // The ordering that climbs from the previous hop to here
                // keeps the walk monotone; the other one is the fallback
                let (primary, secondary) = if forward.dfs_number(s) > forward.dfs_number(p) {
                    (forward, reverse)
                } else {
                    (reverse, forward)
                };
                search.subsequent_hop(primary, secondary, &hidden, s, d)
            }
        };

        if candidates.is_empty() {
            return Err(RoutingError::NoPathFound {
                node: source.to_string(),
                destination: destination.to_string(),
            });
        }

        debug!(
            "{} candidate nexthops at {} towards {}",
            candidates.len(),
            source,
            destination
        );
        Ok(candidates)
    }
}

/// Read-only view used by one `calculate` call
struct Search<'a> {
    cache: &'a DistanceCache,
    nodes: &'a NodeTable,
    cutoff: f64,
    /// Stand-in for "no monotone path": longer than any simple path
    max_length: u32,
    /// Hops the flow has left, caps every limit
    remaining: Option<u32>,
}

impl<'a> Search<'a> {
    fn new(cache: &'a DistanceCache, nodes: &'a NodeTable, cutoff: f64, remaining: Option<u32>) -> Self {
        Self {
            cache,
            nodes,
            cutoff,
            max_length: nodes.len() as u32 + 1,
            remaining,
        }
    }

    fn limit(&self, original: u32) -> u32 {
        let limit = (original as f64 * self.cutoff).ceil() as u32;
        self.remaining.map_or(limit, |remaining| limit.min(remaining))
    }

    fn original_length(&self, forward: &OrderingGraph, reverse: &OrderingGraph, s: Slot, d: Slot) -> u32 {
        let forward_length = self.cache.distance(forward, s, d);
        let reverse_length = self.cache.distance(reverse, s, d);
        forward_length
            .unwrap_or(self.max_length)
            .min(reverse_length.unwrap_or(self.max_length))
    }

    fn element(&self, from: Slot, to: Slot, index: usize) -> GraphPathElement {
        GraphPathElement::new(self.nodes.name(from).clone(), self.nodes.name(to).clone(), index)
    }

    /// Candidates for a flow's first hop: monotone candidates of both
    /// orderings plus direction-change candidates seeded from either.
    fn first_hop(
        &self,
        forward: &mut OrderingGraph,
        reverse: &mut OrderingGraph,
        s: Slot,
        d: Slot,
    ) -> Vec<GraphPathElement> {
        let original = self.original_length(forward, reverse, s, d);

        let mut candidates = Vec::new();
        candidates.extend(self.possible_nexthops(forward, s, d, original));
        candidates.extend(self.possible_nexthops(reverse, s, d, original));
        candidates.extend(self.nexthops_with_direction_change(forward, reverse, s, d, original));
        candidates.extend(self.nexthops_with_direction_change(reverse, forward, s, d, original));
        dedup_preserving_order(candidates)
    }

    /// Candidates once the walk has a previous hop. `hidden` stays removed
    /// from both orderings for the whole search.
    fn subsequent_hop(
        &self,
        primary: &mut OrderingGraph,
        secondary: &mut OrderingGraph,
        hidden: &[Slot],
        s: Slot,
        d: Slot,
    ) -> Vec<GraphPathElement> {
        let mut primary = primary.hide(hidden);
        let mut secondary = secondary.hide(hidden);

        for graph in [&*primary, &*secondary] {
            if let Some(length) = self.cache.distance(graph, s, d) {
                let candidates = self.possible_nexthops(graph, s, d, length);
                if !candidates.is_empty() {
                    return candidates;
                }
            }
        }

        let candidates =
            self.nexthops_with_direction_change(&primary, &mut secondary, s, d, self.max_length);
        if !candidates.is_empty() {
            return candidates;
        }
        self.nexthops_with_direction_change(&secondary, &mut primary, s, d, self.max_length)
    }

    /// Out-edges of `s` whose target reaches `d` inside `graph` within the
    /// stretch bound.
    fn possible_nexthops(&self, graph: &OrderingGraph, s: Slot, d: Slot, original: u32) -> Vec<GraphPathElement> {
        let limit = self.limit(original);
        graph
            .out_edges(s)
            .filter(|&(neighbor, _)| {
                self.cache
                    .distance(graph, neighbor, d)
                    .is_some_and(|length| length + 1 <= limit)
            })
            .map(|(neighbor, index)| self.element(s, neighbor, index))
            .collect()
    }

    /// Out-edges of `s` in `primary` after which the walk can finish in
    /// `secondary`, either right away or after more `primary` hops. `s` is
    /// hidden in `secondary` so the second leg cannot come back through it.
    fn nexthops_with_direction_change(
        &self,
        primary: &OrderingGraph,
        secondary: &mut OrderingGraph,
        s: Slot,
        d: Slot,
        original: u32,
    ) -> Vec<GraphPathElement> {
        let limit = self.limit(original);
        let secondary = secondary.hide(&[s]);

        let candidates = primary
            .out_edges(s)
            .filter(|&(neighbor, _)| {
                let direct = self
                    .cache
                    .distance(&secondary, neighbor, d)
                    .is_some_and(|length| length + 1 <= limit);
                direct || self.direction_change_possible(primary, &secondary, neighbor, d, limit)
            })
            .map(|(neighbor, index)| self.element(s, neighbor, index))
            .collect();
        candidates
    }

    /// Whether some node reachable from `start` in `primary` reaches `d` in
    /// `secondary` with the whole detour (plus the hop into `start`) inside
    /// `limit`.
    fn direction_change_possible(
        &self,
        primary: &OrderingGraph,
        secondary: &OrderingGraph,
        start: Slot,
        d: Slot,
        limit: u32,
    ) -> bool {
        primary
            .dfs_preorder(start)
            .into_iter()
            .filter(|&turn| turn != d)
            .any(|turn| {
                let first_leg = self.cache.distance(primary, start, turn);
                let second_leg = self.cache.distance(secondary, turn, d);
                match (first_leg, second_leg) {
                    (Some(first), Some(second)) => first + second + 1 <= limit,
                    _ => false,
                }
            })
    }
}

fn dedup_preserving_order(candidates: Vec<GraphPathElement>) -> Vec<GraphPathElement> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|candidate| seen.insert(candidate.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::EdgeAttributes;

    fn ring(names: &[&str]) -> Topology {
        let mut topology = Topology::new();
        for (i, a) in names.iter().enumerate() {
            let b = names[(i + 1) % names.len()];
            topology.add_link(a, b, EdgeAttributes::default());
        }
        topology
    }

    fn prepared(topology: &Topology) -> DagCalculator {
        let mut calculator = DagCalculator::default();
        calculator.prepare_iteration(topology).unwrap();
        calculator
    }

    fn targets(candidates: &[GraphPathElement]) -> Vec<&str> {
        let mut targets: Vec<&str> = candidates.iter().map(|e| e.to.as_str()).collect();
        targets.sort();
        targets
    }

    #[test]
    fn test_calculate_before_prepare_fails() {
        let topology = ring(&["A", "B", "C", "D"]);
        let mut calculator = DagCalculator::default();
        assert_eq!(
            calculator.calculate(&topology, "A", None, "C", "A"),
            Err(RoutingError::NotPrepared)
        );
    }

    #[test]
    fn test_ring_first_hop_offers_both_directions() {
        let topology = ring(&["A", "B", "C", "D"]);
        let mut calculator = prepared(&topology);

        let candidates = calculator.calculate(&topology, "A", None, "C", "A").unwrap();
        assert_eq!(targets(&candidates), vec!["B", "D"]);
        assert!(candidates.iter().all(|e| e.from == "A" && e.index == 0));
    }

    #[test]
    fn test_subsequent_hops_finish_the_ring() {
        let topology = ring(&["A", "B", "C", "D"]);
        let mut calculator = prepared(&topology);

        // A->D climbs the forward ordering, D->C needs the reverse one
        let via_d = calculator.calculate(&topology, "D", Some("A"), "C", "A").unwrap();
        assert_eq!(via_d, vec![GraphPathElement::new("D", "C", 0)]);

        let via_b = calculator.calculate(&topology, "B", Some("A"), "C", "A").unwrap();
        assert_eq!(via_b, vec![GraphPathElement::new("B", "C", 0)]);
    }

    #[test]
    fn test_previous_hop_and_origin_are_never_offered() {
        let topology = ring(&["n0", "n1", "n2", "n3", "n4", "n5"]);
        let mut calculator = prepared(&topology);

        let candidates = calculator.calculate(&topology, "n2", Some("n1"), "n4", "n1").unwrap();
        assert!(candidates.iter().all(|e| e.to != "n1"));
        assert_eq!(targets(&candidates), vec!["n3"]);
    }

    #[test]
    fn test_direction_change_takes_the_short_way_round() {
        let topology = ring(&["n0", "n1", "n2", "n3", "n4", "n5"]);
        let mut calculator = prepared(&topology);

        // Forward climb n1..n5 is 4 hops; n1->n0->n5 needs a direction change
        let candidates = calculator.calculate(&topology, "n1", None, "n5", "n1").unwrap();
        assert_eq!(targets(&candidates), vec!["n0", "n2"]);

        let next = calculator.calculate(&topology, "n0", Some("n1"), "n5", "n1").unwrap();
        assert_eq!(next, vec![GraphPathElement::new("n0", "n5", 0)]);
    }

    #[test]
    fn test_cutoff_excludes_long_detours() {
        let topology = ring(&["n0", "n1", "n2", "n3", "n4", "n5"]);
        let mut calculator = DagCalculator::new(1.0);
        calculator.prepare_iteration(&topology).unwrap();

        // n1->n3 forward is 2 hops; going round through n0 takes 4
        let candidates = calculator.calculate(&topology, "n1", None, "n3", "n1").unwrap();
        assert_eq!(targets(&candidates), vec!["n2"]);
        assert_eq!(calculator.hop_limit("n1", "n3"), Ok(2));
    }

    #[test]
    fn test_remaining_hops_cap_candidates() {
        let topology = ring(&["n0", "n1", "n2", "n3", "n4", "n5"]);
        let mut calculator = prepared(&topology);

        let unbounded = calculator.calculate(&topology, "n2", Some("n1"), "n4", "n1").unwrap();
        assert_eq!(targets(&unbounded), vec!["n3"]);
        let bounded = calculator
            .calculate_within(&topology, "n2", Some("n1"), "n4", "n1", Some(2))
            .unwrap();
        assert_eq!(bounded, unbounded);

        assert_eq!(
            calculator.calculate_within(&topology, "n2", Some("n1"), "n4", "n1", Some(1)),
            Err(RoutingError::NoPathFound {
                node: "n2".to_string(),
                destination: "n4".to_string()
            })
        );
        assert_eq!(calculator.path_hop_limit("n1", "n4"), Ok(Some(5)));
    }

    #[test]
    fn test_parallel_edges_are_separate_candidates() {
        let mut topology = Topology::new();
        topology.add_link("A", "B", EdgeAttributes::default());
        topology.add_edge("A", "B", EdgeAttributes::new(2.0, 1.0));
        topology.add_link("B", "C", EdgeAttributes::default());
        let mut calculator = prepared(&topology);

        let candidates = calculator.calculate(&topology, "A", None, "C", "A").unwrap();
        assert_eq!(
            candidates,
            vec![GraphPathElement::new("A", "B", 0), GraphPathElement::new("A", "B", 1)]
        );
    }

    #[test]
    fn test_removed_node_is_not_ordered() {
        let mut topology = ring(&["A", "B", "C", "D"]);
        let mut calculator = prepared(&topology);
        topology.remove_node("C");

        assert_eq!(
            calculator.calculate(&topology, "A", None, "C", "A"),
            Err(RoutingError::NodeNotOrdered("C".to_string()))
        );
    }

    #[test]
    fn test_unreachable_destination_has_no_path() {
        let mut topology = Topology::new();
        topology.add_edge("A", "B", EdgeAttributes::default());
        topology.add_edge("C", "B", EdgeAttributes::default());
        let mut calculator = prepared(&topology);

        assert!(matches!(
            calculator.calculate(&topology, "A", None, "C", "A"),
            Err(RoutingError::NoPathFound { node, destination }) if node == "A" && destination == "C"
        ));
    }

    #[test]
    fn test_calculate_is_idempotent() {
        let mut topology = ring(&["n0", "n1", "n2", "n3", "n4"]);
        topology.add_link("n0", "n2", EdgeAttributes::default());
        let mut calculator = prepared(&topology);

        let first = calculator.calculate(&topology, "n1", None, "n4", "n1").unwrap();
        let orderings = calculator.orderings().cloned();
        for _ in 0..3 {
            assert_eq!(calculator.calculate(&topology, "n1", None, "n4", "n1").unwrap(), first);
        }
        assert_eq!(calculator.orderings().cloned(), orderings);

        calculator.prepare_iteration(&topology).unwrap();
        assert_eq!(calculator.calculate(&topology, "n1", None, "n4", "n1").unwrap(), first);
    }

    #[test]
    fn test_failed_prepare_clears_state() {
        let topology = ring(&["A", "B", "C"]);
        let mut calculator = prepared(&topology);
        assert!(calculator.is_prepared());

        assert!(calculator.prepare_iteration(&Topology::new()).is_err());
        assert!(!calculator.is_prepared());
    }
}
