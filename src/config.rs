use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::num::NonZeroUsize;

use crate::hash::{HashVariant, RouterOptions};
use crate::paths::DEFAULT_LENGTH_CUTOFF;
use crate::topology::Flow;

/// Top-level router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.routing.validate()?;

        if self.network.path.trim().is_empty() {
            return Err(ValidationError::InvalidNetwork(
                "GML path cannot be empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for flow in &self.flows {
            if flow.flow_id.is_empty() {
                return Err(ValidationError::InvalidFlow(format!(
                    "flow from {} to {} has an empty id",
                    flow.start, flow.end
                )));
            }
            if !seen.insert(flow.flow_id.as_str()) {
                return Err(ValidationError::InvalidFlow(format!(
                    "duplicate flow id {}",
                    flow.flow_id
                )));
            }
            if !flow.bandwidth.is_finite() || flow.bandwidth <= 0.0 {
                return Err(ValidationError::InvalidFlow(format!(
                    "flow {} has invalid bandwidth {}",
                    flow.flow_id, flow.bandwidth
                )));
            }
            if let Some(end_time) = flow.end_time {
                if end_time <= flow.start_time {
                    return Err(ValidationError::InvalidFlow(format!(
                        "flow {} ends before it starts",
                        flow.flow_id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Shared general configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Which path calculator routes the flows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathCalculatorKind {
    /// Loop-free multipath over DFS orderings
    #[default]
    Dag,
    /// Minimum-hop paths only
    ShortestHop,
}

/// Which hash function picks among candidate nexthops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashFunctionKind {
    /// Weighted consistent hashing with flow affinity
    #[default]
    Weighted,
    /// First bucket with a positive weight
    FirstBucket,
}

/// Routing core settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub path_calculator: PathCalculatorKind,
    pub hash_function: HashFunctionKind,
    pub hash_variant: HashVariant,
    /// Tolerated path inflation over the shortest ordering path
    pub length_cutoff_fraction: f64,
    /// Weight for candidate edges missing from the hash weights
    pub default_weight: f64,
    pub debug_check_cycles: bool,
    /// Bound on remembered flow choices; unbounded when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affinity_capacity: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth_limit: Option<usize>,
}

impl RoutingConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !self.length_cutoff_fraction.is_finite() || self.length_cutoff_fraction <= 1.0 {
            return Err(ValidationError::InvalidRouting(format!(
                "length_cutoff_fraction must be greater than 1.0, got {}",
                self.length_cutoff_fraction
            )));
        }
        if !self.default_weight.is_finite() || self.default_weight < 0.0 {
            return Err(ValidationError::InvalidRouting(format!(
                "default_weight must be a non-negative number, got {}",
                self.default_weight
            )));
        }
        if self.affinity_capacity == Some(0) {
            return Err(ValidationError::InvalidRouting(
                "affinity_capacity must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            default_weight: self.default_weight,
            check_cycles: self.debug_check_cycles,
        }
    }

    pub fn affinity_capacity(&self) -> Option<NonZeroUsize> {
        self.affinity_capacity.and_then(NonZeroUsize::new)
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            path_calculator: PathCalculatorKind::default(),
            hash_function: HashFunctionKind::default(),
            hash_variant: HashVariant::default(),
            length_cutoff_fraction: DEFAULT_LENGTH_CUTOFF,
            default_weight: 1.0,
            debug_check_cycles: false,
            affinity_capacity: None,
            depth_limit: None,
        }
    }
}

/// Topology source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// GML file, relative paths resolve against the config file's directory
    pub path: String,
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid routing configuration: {0}")]
    InvalidRouting(String),
    #[error("Invalid network configuration: {0}")]
    InvalidNetwork(String),
    #[error("Invalid flow configuration: {0}")]
    InvalidFlow(String),
}
