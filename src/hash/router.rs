//! Hop-by-hop flow routing and bandwidth accounting.

use std::collections::HashSet;

use log::{debug, error, info, warn};

use super::{FlowPaths, HashFunction};
use crate::error::RoutingError;
use crate::paths::PathCalculator;
use crate::topology::{format_path, Flow, GraphPathElement, HashWeights, NodeId, Topology};

/// Walk `flow` from its start node until it reaches its end node.
///
/// The calculator's path bound, when it has one, is fixed at the first hop
/// and every later hop is asked for candidates within the hops left. With a
/// `depth_limit` the path is cut after that many hops. Without one the walk
/// gives up after twice the node count, which no loop-free path can reach.
pub fn flow_path<H: HashFunction + ?Sized>(
    hash_fn: &mut H,
    calculator: &mut dyn PathCalculator,
    topology: &Topology,
    flow: &Flow,
    hash_weights: &HashWeights,
    depth_limit: Option<usize>,
) -> Result<Vec<GraphPathElement>, RoutingError> {
    let budget = depth_limit.unwrap_or(2 * topology.number_of_nodes());
    let default_weight = hash_fn.options().default_weight;

    let hop_limit = if flow.start == flow.end {
        None
    } else {
        calculator.path_hop_limit(&flow.start, &flow.end)?
    };

    let mut path = Vec::new();
    let mut current = flow.start.clone();
    let mut previous: Option<NodeId> = None;

    while current != flow.end {
        if path.len() >= budget {
            if depth_limit.is_some() {
                break;
            }
            return Err(RoutingError::HopBudgetExhausted {
                flow_id: flow.flow_id.clone(),
                hops: path.len(),
            });
        }

        let remaining = hop_limit.map(|limit| limit.saturating_sub(path.len() as u32));
        let nexthops = calculator.calculate_within(
            topology,
            &current,
            previous.as_deref(),
            &flow.end,
            &flow.start,
            remaining,
        )?;
        let buckets = hash_weights.candidate_buckets(&current, &flow.end, &nexthops, default_weight);
        let chosen = hash_fn.choose_nexthop(&buckets, &flow.flow_id)?;
        debug!("Flow {} at {}: {} of {} candidates", flow.flow_id, current, chosen, buckets.len());

        previous = Some(std::mem::replace(&mut current, chosen.to.clone()));
        path.push(chosen);
    }

    Ok(path)
}

/// First node that occurs twice along `path`, counting every `from` node
/// and the final `to` node.
pub fn repeated_node(path: &[GraphPathElement]) -> Option<&NodeId> {
    let last = path.last()?;
    let mut seen = HashSet::new();
    path.iter()
        .map(|element| &element.from)
        .chain(std::iter::once(&last.to))
        .find(|node| !seen.insert(*node))
}

/// Route every flow over a freshly reset topology and account its bandwidth.
///
/// Flows that cannot be routed right now are logged and left out of the
/// result; any other failure, such as an unprepared calculator, aborts the
/// pass.
pub fn run<H: HashFunction + ?Sized>(
    hash_fn: &mut H,
    calculator: &mut dyn PathCalculator,
    topology: &mut Topology,
    flows: &[Flow],
    hash_weights: &HashWeights,
    depth_limit: Option<usize>,
) -> Result<FlowPaths, RoutingError> {
    topology.reset_loads();
    let mut flow_paths = FlowPaths::new();

    for flow in flows {
        let path = match flow_path(hash_fn, calculator, topology, flow, hash_weights, depth_limit) {
            Ok(path) => path,
            Err(err @ RoutingError::NodeNotOrdered(_)) => {
                info!("Flow {} ({} -> {}) dropped: {}", flow.flow_id, flow.start, flow.end, err);
                continue;
            }
            Err(err) if err.is_unroutable() => {
                warn!("Failed to find path for flow {} ({} -> {}): {}", flow.flow_id, flow.start, flow.end, err);
                continue;
            }
            Err(err) => {
                error!("Routing flow {} failed: {}", flow.flow_id, err);
                return Err(err);
            }
        };

        if hash_fn.options().check_cycles {
            if let Some(node) = repeated_node(&path) {
                let cycle = RoutingError::CycleDetected {
                    flow_id: flow.flow_id.clone(),
                    node: node.clone(),
                };
                warn!("{}: {}", cycle, format_path(&path));
            }
        }

        for element in &path {
            match topology.edge_mut(&element.from, &element.to, element.index) {
                Some(attrs) => attrs.current_bandwidth += flow.bandwidth,
                None => debug!("Edge {} of flow {} is gone, load not accounted", element, flow.flow_id),
            }
        }
        flow_paths.insert(flow.flow_id.clone(), path);
    }

    info!("Routed {} of {} flows", flow_paths.len(), flows.len());
    Ok(flow_paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{FirstBucketHashFunction, HashVariant, RouterOptions, WeightedHashFunction};
    use crate::paths::{DagCalculator, PathCalculator};
    use crate::topology::EdgeAttributes;

    fn chain(nodes: &[&str]) -> Topology {
        let mut topology = Topology::new();
        for pair in nodes.windows(2) {
            topology.add_link(pair[0], pair[1], EdgeAttributes::new(1.0, 100.0));
        }
        topology
    }

    /// Calculator that always offers the first out-edge, loops included
    struct FirstEdge;

    impl PathCalculator for FirstEdge {
        fn prepare_iteration(&mut self, _topology: &Topology) -> Result<(), RoutingError> {
            Ok(())
        }

        fn calculate(
            &mut self,
            topology: &Topology,
            source: &str,
            _previous_hop: Option<&str>,
            _destination: &str,
            _flow_origin: &str,
        ) -> Result<Vec<GraphPathElement>, RoutingError> {
            Ok(topology.out_edges(source).map(|(edge, _)| edge).take(1).collect())
        }
    }

    /// Twelve-link mesh where per-hop bounds let r00 -> r07 take four hops
    fn mesh() -> Topology {
        let mut topology = Topology::new();
        let links = [
            ("r00", "r01"),
            ("r00", "r02"),
            ("r00", "r04"),
            ("r00", "r05"),
            ("r01", "r03"),
            ("r01", "r08"),
            ("r02", "r05"),
            ("r03", "r04"),
            ("r03", "r09"),
            ("r04", "r07"),
            ("r05", "r06"),
            ("r07", "r08"),
        ];
        for (a, b) in links {
            topology.add_link(a, b, EdgeAttributes::new(1.0, 100.0));
        }
        topology
    }

    #[test]
    fn test_hop_limit_holds_for_the_whole_path() {
        let topology = mesh();
        let mut calculator = DagCalculator::default();
        calculator.prepare_iteration(&topology).unwrap();
        let limit = calculator.hop_limit("r00", "r07").unwrap() as usize;
        assert_eq!(limit, 3);

        let mut hash_fn = WeightedHashFunction::new(RouterOptions::default(), HashVariant::MaxNormalized, None);
        let weights = HashWeights::from_topology(&topology);
        for i in 0..200 {
            let flow = Flow::new(format!("flow-{}", i), "r00", "r07", 1.0);
            let path = flow_path(&mut hash_fn, &mut calculator, &topology, &flow, &weights, None).unwrap();
            assert!(path.len() <= limit, "{} exceeds {} hops", format_path(&path), limit);
            assert_eq!(path.last().map(|e| e.to.as_str()), Some("r07"));
            assert_eq!(repeated_node(&path), None);
        }
    }

    #[test]
    fn test_run_fails_without_prepared_calculator() {
        let mut topology = chain(&["A", "B", "C"]);
        let mut calculator = DagCalculator::default();
        let mut hash_fn = FirstBucketHashFunction::new(RouterOptions::default());
        let flows = vec![Flow::new("first", "A", "C", 1.0), Flow::new("second", "C", "A", 1.0)];

        let result = run(&mut hash_fn, &mut calculator, &mut topology, &flows, &HashWeights::new(), None);
        assert_eq!(result, Err(RoutingError::NotPrepared));
        assert_eq!(topology.edge("A", "B", 0).unwrap().current_bandwidth, 0.0);
    }

    #[test]
    fn test_repeated_node() {
        let path = vec![
            GraphPathElement::new("A", "B", 0),
            GraphPathElement::new("B", "A", 0),
            GraphPathElement::new("A", "C", 0),
        ];
        assert_eq!(repeated_node(&path).map(String::as_str), Some("A"));
        assert_eq!(repeated_node(&path[..1]), None);
        assert_eq!(repeated_node(&[]), None);

        let back_to_start = vec![GraphPathElement::new("A", "B", 0), GraphPathElement::new("B", "A", 0)];
        assert_eq!(repeated_node(&back_to_start).map(String::as_str), Some("A"));
    }

    #[test]
    fn test_depth_limit_truncates_path() {
        let topology = chain(&["A", "B", "C", "D"]);
        let mut calculator = DagCalculator::default();
        calculator.prepare_iteration(&topology).unwrap();
        let mut hash_fn = FirstBucketHashFunction::new(RouterOptions::default());
        let flow = Flow::new("f", "A", "D", 1.0);
        let weights = HashWeights::new();

        let path = flow_path(&mut hash_fn, &mut calculator, &topology, &flow, &weights, Some(2)).unwrap();
        assert_eq!(path, vec![GraphPathElement::new("A", "B", 0), GraphPathElement::new("B", "C", 0)]);

        let empty = flow_path(&mut hash_fn, &mut calculator, &topology, &flow, &weights, Some(0)).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_flow_at_destination_has_empty_path() {
        let topology = chain(&["A", "B"]);
        let mut calculator = DagCalculator::default();
        calculator.prepare_iteration(&topology).unwrap();
        let mut hash_fn = FirstBucketHashFunction::new(RouterOptions::default());
        let flow = Flow::new("f", "B", "B", 1.0);

        let path = flow_path(&mut hash_fn, &mut calculator, &topology, &flow, &HashWeights::new(), None).unwrap();
        assert!(path.is_empty());
    }

    #[test]
    fn test_looping_walk_hits_hop_budget() {
        // A <-> B with C only reachable from nowhere: FirstEdge bounces forever
        let mut topology = chain(&["A", "B"]);
        topology.add_node("C");
        let mut hash_fn = FirstBucketHashFunction::new(RouterOptions::default());
        let flow = Flow::new("loop", "A", "C", 1.0);

        let result = flow_path(&mut hash_fn, &mut FirstEdge, &topology, &flow, &HashWeights::new(), None);
        assert_eq!(
            result,
            Err(RoutingError::HopBudgetExhausted {
                flow_id: "loop".to_string(),
                hops: 6
            })
        );
    }

    #[test]
    fn test_run_accounts_bandwidth_and_skips_failures() {
        let mut topology = chain(&["A", "B", "C"]);
        topology.add_node("Z");
        let mut calculator = DagCalculator::default();
        calculator.prepare_iteration(&topology).unwrap();
        let mut hash_fn = FirstBucketHashFunction::new(RouterOptions {
            default_weight: 1.0,
            check_cycles: true,
        });
        let flows = vec![
            Flow::new("ok", "A", "C", 4.0),
            Flow::new("back", "C", "B", 1.5),
            Flow::new("unreachable", "A", "Z", 1.0),
        ];

        let paths = run(&mut hash_fn, &mut calculator, &mut topology, &flows, &HashWeights::new(), None)
            .unwrap();
        assert_eq!(paths.len(), 2);
        assert!(!paths.contains_key("unreachable"));
        assert_eq!(topology.edge("A", "B", 0).unwrap().current_bandwidth, 4.0);
        assert_eq!(topology.edge("B", "C", 0).unwrap().current_bandwidth, 4.0);
        assert_eq!(topology.edge("C", "B", 0).unwrap().current_bandwidth, 1.5);

        // A second pass starts from clean loads
        let again = run(&mut hash_fn, &mut calculator, &mut topology, &flows[..1], &HashWeights::new(), None)
            .unwrap();
        assert_eq!(again.len(), 1);
        assert_eq!(topology.edge("B", "C", 0).unwrap().current_bandwidth, 4.0);
        assert_eq!(topology.edge("C", "B", 0).unwrap().current_bandwidth, 0.0);
    }

    #[test]
    fn test_run_drops_flows_to_removed_nodes() {
        let mut topology = chain(&["A", "B", "C"]);
        let mut calculator = DagCalculator::default();
        calculator.prepare_iteration(&topology).unwrap();
        let mut hash_fn = FirstBucketHashFunction::new(RouterOptions::default());
        let flow = Flow::new("f", "A", "C", 2.0);
        let path = hash_fn
            .route(&mut calculator, &topology, &flow, &HashWeights::new(), None)
            .unwrap();
        assert_eq!(path.len(), 2);

        topology.remove_node("C");
        let paths = run(&mut hash_fn, &mut calculator, &mut topology, &[flow], &HashWeights::new(), None)
            .unwrap();
        assert!(paths.is_empty());
        assert_eq!(topology.edge("A", "B", 0).unwrap().current_bandwidth, 0.0);
    }
}
