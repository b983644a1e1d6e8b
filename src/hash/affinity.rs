//! Flow affinity memory: the edge last chosen for a flow at a node.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;

use crate::topology::{GraphPathElement, NodeId};

/// Remembered choices keyed by (flow id, node).
///
/// Unbounded unless a capacity is given, in which case the least recently
/// used entries are evicted first.
pub struct FlowAffinity {
    entries: LruCache<(String, NodeId), GraphPathElement>,
    capacity: Option<NonZeroUsize>,
}

impl FlowAffinity {
    pub fn new(capacity: Option<NonZeroUsize>) -> Self {
        let entries = match capacity {
            Some(capacity) => LruCache::new(capacity),
            None => LruCache::unbounded(),
        };
        Self { entries, capacity }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    /// Edge remembered for `flow_id` at `node`; refreshes its recency
    pub fn get(&mut self, flow_id: &str, node: &str) -> Option<&GraphPathElement> {
        self.entries.get(&(flow_id.to_string(), node.to_string()))
    }

    pub fn remember(&mut self, flow_id: &str, node: &str, edge: GraphPathElement) {
        self.entries.put((flow_id.to_string(), node.to_string()), edge);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> Option<NonZeroUsize> {
        self.capacity
    }
}

impl Default for FlowAffinity {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl fmt::Debug for FlowAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowAffinity")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
