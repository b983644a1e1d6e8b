//! Traffic flows routed over the topology.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::NodeId;

/// A single traffic flow.
///
/// Only `start`, `end`, `flow_id` and `bandwidth` take part in routing; the
/// validity window is carried for callers that select the active flow set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    #[serde(rename = "id")]
    pub flow_id: String,
    pub start: NodeId,
    pub end: NodeId,
    /// Bandwidth demand added to every traversed edge
    pub bandwidth: f64,
    #[serde(default, with = "humantime_serde")]
    pub start_time: Duration,
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub end_time: Option<Duration>,
}

impl Flow {
    pub fn new(
        flow_id: impl Into<String>,
        start: impl Into<NodeId>,
        end: impl Into<NodeId>,
        bandwidth: f64,
    ) -> Self {
        Self {
            flow_id: flow_id.into(),
            start: start.into(),
            end: end.into(),
            bandwidth,
            start_time: Duration::ZERO,
            end_time: None,
        }
    }

    /// Whether the flow's validity window contains `at`.
    /// The window is half-open: `[start_time, end_time)`.
    pub fn is_active_at(&self, at: Duration) -> bool {
        if at < self.start_time {
            return false;
        }
        match self.end_time {
            Some(end) => at < end,
            None => true,
        }
    }
}
