//! # DTE Router - Loop-free multipath routing for traffic engineering
//!
//! This library computes per-flow paths over a directed multigraph that
//! changes between routing iterations, spreading traffic across several
//! loop-free nexthops according to per-edge hash weights.
//!
//! ## Overview
//!
//! Every iteration starts from a topology snapshot. The DAG path calculator
//! derives two DFS orderings of the snapshot (forward and reverse) and keeps
//! a cache of shortest distances inside each ordering, including distances
//! with up to three nodes hidden. At each hop it offers the edges that keep
//! the flow on a path no longer than the length cutoff allows. A weighted
//! hash function then picks one of those edges per flow, and remembers the
//! choice so a flow keeps its nexthop while it remains a candidate.
//!
//! ## Key Features
//!
//! - **Loop-free multipath**: candidates follow one DFS ordering, with at most one switch to the other
//! - **Bounded stretch**: paths stay within `length_cutoff_fraction` of the shortest ordering path
//! - **Weighted consistent hashing**: deterministic per-flow choice proportional to bucket weights
//! - **Flow affinity**: flows stick to their nexthop across iterations, optionally LRU-bounded
//! - **Utilization reporting**: per-edge loads, phi cost and overloaded links
//!
//! ## Architecture
//!
//! - `topology`: Multigraph, flows, hash weights and utilization metrics
//! - `paths`: DFS orderings, distance cache and path calculators
//! - `hash`: Hash functions, flow affinity and the flow router
//! - `config`: Type-safe configuration structures and YAML parsing
//! - `config_loader`: Configuration and topology file loading
//! - `gml_parser`: GML graph parser for topology files
//! - `orchestrator`: One routing iteration from configuration to report
//! - `error`: Routing error kinds
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use dte_router::{config_loader, orchestrator};
//! use dte_router::topology::HashWeights;
//!
//! let config_path = Path::new("router.yaml");
//! let config = config_loader::load_config(config_path)?;
//! let mut topology = config_loader::load_topology(&config, config_path)?;
//! let weights = HashWeights::from_topology(&topology);
//!
//! let mut calculator = orchestrator::build_path_calculator(&config.routing);
//! let mut hash_fn = orchestrator::build_hash_function(&config.routing);
//! let report = orchestrator::run_iteration(
//!     calculator.as_mut(),
//!     hash_fn.as_mut(),
//!     &mut topology,
//!     &config.flows,
//!     &weights,
//!     config.routing.depth_limit,
//! )?;
//! println!("phi = {}", report.utilization.phi);
//! # Ok::<(), color_eyre::eyre::Error>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! general:
//!   log_level: info
//!
//! routing:
//!   path_calculator: dag           # or shortest_hop
//!   hash_function: weighted        # or first_bucket
//!   hash_variant: max_normalized   # or sum_normalized
//!   length_cutoff_fraction: 1.5
//!   default_weight: 1.0
//!   affinity_capacity: 100000
//!
//! network:
//!   path: "topology.gml"
//!
//! flows:
//!   - id: "f1"
//!     start: "A"
//!     end: "C"
//!     bandwidth: 10.0
//!     start_time: "0s"
//!     end_time: "1h"
//! ```
//!
//! ## Error Handling
//!
//! Routing operations return `Result<T, RoutingError>`; a single unroutable
//! flow never aborts an iteration. File loading and orchestration use
//! `color_eyre` for error reporting with context.

pub mod error;
pub mod topology;
pub mod paths;
pub mod hash;
pub mod config;
pub mod config_loader;
pub mod gml_parser;
pub mod orchestrator;

pub use error::RoutingError;
