//! Routing iteration orchestrator.
//!
//! This module wires the configured path calculator and hash function
//! together and runs one routing pass over a topology snapshot.

use crate::config::{HashFunctionKind, PathCalculatorKind, RoutingConfig};
use crate::hash::{FirstBucketHashFunction, FlowPaths, HashFunction, WeightedHashFunction};
use crate::paths::{DagCalculator, PathCalculator, ShortestHopCalculator};
use crate::topology::{utilization_report, Flow, HashWeights, Topology, UtilizationReport};
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::info;
use serde::Serialize;
use std::time::{Duration, Instant};

/// Outcome of one routing pass
#[derive(Debug, Clone, Serialize)]
pub struct IterationReport {
    pub paths: FlowPaths,
    /// Flows that could not be routed, in input order
    pub dropped_flows: Vec<String>,
    pub utilization: UtilizationReport,
}

pub fn build_path_calculator(routing: &RoutingConfig) -> Box<dyn PathCalculator> {
    match routing.path_calculator {
        PathCalculatorKind::Dag => Box::new(DagCalculator::new(routing.length_cutoff_fraction)),
        PathCalculatorKind::ShortestHop => Box::new(ShortestHopCalculator::new()),
    }
}

pub fn build_hash_function(routing: &RoutingConfig) -> Box<dyn HashFunction> {
    let options = routing.router_options();
    match routing.hash_function {
        HashFunctionKind::Weighted => Box::new(WeightedHashFunction::new(
            options,
            routing.hash_variant,
            routing.affinity_capacity(),
        )),
        HashFunctionKind::FirstBucket => Box::new(FirstBucketHashFunction::new(options)),
    }
}

/// Flows whose validity window contains `at`; every flow when `at` is None
pub fn active_flows(flows: &[Flow], at: Option<Duration>) -> Vec<Flow> {
    flows
        .iter()
        .filter(|flow| at.map_or(true, |at| flow.is_active_at(at)))
        .cloned()
        .collect()
}

/// Prepare the calculator for `topology`, route `flows` and summarise link
/// loads. A failed preparation aborts the iteration, as does any routing
/// failure that is not specific to one flow.
pub fn run_iteration(
    calculator: &mut dyn PathCalculator,
    hash_fn: &mut dyn HashFunction,
    topology: &mut Topology,
    flows: &[Flow],
    hash_weights: &HashWeights,
    depth_limit: Option<usize>,
) -> Result<IterationReport> {
    let started = Instant::now();
    calculator
        .prepare_iteration(topology)
        .wrap_err("Failed to prepare path calculator for the topology")?;

    let paths = hash_fn
        .run(calculator, topology, flows, hash_weights, depth_limit)
        .wrap_err("Routing pass aborted")?;
    let dropped_flows: Vec<String> = flows
        .iter()
        .filter(|flow| !paths.contains_key(&flow.flow_id))
        .map(|flow| flow.flow_id.clone())
        .collect();
    let utilization = utilization_report(topology);

    info!(
        "Iteration routed {} flows, dropped {}, phi {:.6}, max utilization {:.3} ({:?})",
        paths.len(),
        dropped_flows.len(),
        utilization.phi,
        utilization.max_utilization,
        started.elapsed()
    );

    Ok(IterationReport {
        paths,
        dropped_flows,
        utilization,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::EdgeAttributes;

    fn ring() -> Topology {
        let mut topology = Topology::new();
        for (a, b) in [("A", "B"), ("B", "C"), ("C", "D"), ("D", "A")] {
            topology.add_link(a, b, EdgeAttributes::new(1.0, 10.0));
        }
        topology
    }

    #[test]
    fn test_run_iteration_with_each_calculator() {
        for kind in [PathCalculatorKind::Dag, PathCalculatorKind::ShortestHop] {
            let routing = RoutingConfig {
                path_calculator: kind,
                debug_check_cycles: true,
                ..RoutingConfig::default()
            };
            let mut calculator = build_path_calculator(&routing);
            let mut hash_fn = build_hash_function(&routing);
            let mut topology = ring();
            let weights = HashWeights::from_topology(&topology);
            let flows = vec![Flow::new("f1", "A", "C", 5.0), Flow::new("f2", "B", "Z", 1.0)];

            let report = run_iteration(
                calculator.as_mut(),
                hash_fn.as_mut(),
                &mut topology,
                &flows,
                &weights,
                routing.depth_limit,
            )
            .unwrap();

            assert_eq!(report.paths["f1"].len(), 2, "{:?}", kind);
            assert_eq!(report.dropped_flows, vec!["f2".to_string()]);
            assert!((report.utilization.max_utilization - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_prepare_failure_is_fatal() {
        let routing = RoutingConfig::default();
        let mut calculator = build_path_calculator(&routing);
        let mut hash_fn = build_hash_function(&routing);
        let mut topology = Topology::new();

        let result = run_iteration(
            calculator.as_mut(),
            hash_fn.as_mut(),
            &mut topology,
            &[],
            &HashWeights::new(),
            None,
        );
        assert!(result.is_err());
    }

    /// Prepares fine, then reports a broken snapshot for every flow
    struct CorruptSnapshot;

    impl PathCalculator for CorruptSnapshot {
        fn prepare_iteration(&mut self, _topology: &Topology) -> Result<(), crate::RoutingError> {
            Ok(())
        }

        fn calculate(
            &mut self,
            _topology: &Topology,
            _source: &str,
            _previous_hop: Option<&str>,
            _destination: &str,
            _flow_origin: &str,
        ) -> Result<Vec<crate::topology::GraphPathElement>, crate::RoutingError> {
            Err(crate::RoutingError::MalformedTopology("ordering out of date".to_string()))
        }
    }

    #[test]
    fn test_routing_failure_is_fatal() {
        let mut hash_fn = build_hash_function(&RoutingConfig::default());
        let mut topology = ring();
        let flows = vec![Flow::new("f1", "A", "C", 5.0)];

        let result = run_iteration(
            &mut CorruptSnapshot,
            hash_fn.as_mut(),
            &mut topology,
            &flows,
            &HashWeights::new(),
            None,
        );
        let err = result.unwrap_err();
        assert!(format!("{:?}", err).contains("ordering out of date"));
    }

    #[test]
    fn test_active_flows() {
        let mut late = Flow::new("late", "A", "B", 1.0);
        late.start_time = Duration::from_secs(60);
        let flows = vec![Flow::new("early", "A", "B", 1.0), late];

        assert_eq!(active_flows(&flows, None).len(), 2);
        let now: Vec<String> = active_flows(&flows, Some(Duration::from_secs(10)))
            .into_iter()
            .map(|flow| flow.flow_id)
            .collect();
        assert_eq!(now, vec!["early".to_string()]);
    }

    #[test]
    fn test_report_serializes() {
        let routing = RoutingConfig {
            hash_function: HashFunctionKind::FirstBucket,
            ..RoutingConfig::default()
        };
        let mut calculator = build_path_calculator(&routing);
        let mut hash_fn = build_hash_function(&routing);
        let mut topology = ring();
        let flows = vec![Flow::new("f1", "A", "B", 1.0)];

        let report = run_iteration(
            calculator.as_mut(),
            hash_fn.as_mut(),
            &mut topology,
            &flows,
            &HashWeights::new(),
            None,
        )
        .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["paths"]["f1"][0]["to"], "B");
        assert!(json["dropped_flows"].as_array().unwrap().is_empty());
    }
}
