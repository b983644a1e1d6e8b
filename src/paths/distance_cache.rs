//! Precomputed hop distances under small node-removal sets.
//!
//! Route construction only ever hides up to three nodes of an ordering at
//! once (previous hop, flow origin, and the current node during a direction
//! change). For every such removal set and every ordered pair the shortest
//! hop distance is computed once per snapshot, turning candidate checks into
//! table lookups. A missing entry means "no path", not an error.

use std::collections::{BTreeSet, HashMap};

use log::debug;
use rayon::prelude::*;

use super::ordering::{Direction, OrderingGraph, Orderings, Slot};

/// Largest removal set that is precomputed
pub const MAX_REMOVED: usize = 3;

/// Sorted removal set of at most [`MAX_REMOVED`] nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct RemovedSet {
    slots: [Slot; MAX_REMOVED],
    len: u8,
}

impl RemovedSet {
    /// `None` when the set is too large to have been precomputed
    fn new<'a>(sorted: impl IntoIterator<Item = &'a Slot>) -> Option<Self> {
        let mut slots = [Slot::MAX; MAX_REMOVED];
        let mut len = 0usize;
        for &slot in sorted {
            if len == MAX_REMOVED {
                return None;
            }
            slots[len] = slot;
            len += 1;
        }
        Some(Self {
            slots,
            len: len as u8,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    direction: Direction,
    source: Slot,
    destination: Slot,
    removed: RemovedSet,
}

#[derive(Debug, Clone, Default)]
pub struct DistanceCache {
    distances: HashMap<CacheKey, u32>,
}

impl DistanceCache {
    /// Populate the cache for both orderings of a snapshot
    pub fn build(orderings: &Orderings) -> Self {
        let mut cache = Self::default();
        for graph in [&orderings.forward, &orderings.reverse] {
            let entries = sweep(graph);
            debug!(
                "Cached {} {:?} distances over {} nodes",
                entries.len(),
                graph.direction(),
                graph.node_count()
            );
            if cache.distances.is_empty() {
                cache.distances = entries;
            } else {
                cache.distances.extend(entries);
            }
        }
        cache
    }

    /// Hop distance from `source` to `destination` in `graph` with the
    /// graph's currently hidden nodes removed.
    ///
    /// Hidden endpoints have no distance. Removal sets beyond the
    /// precomputed size fall back to a live search on the graph.
    pub fn distance(&self, graph: &OrderingGraph, source: Slot, destination: Slot) -> Option<u32> {
        if !graph.contains(source) || !graph.contains(destination) {
            return None;
        }

        match RemovedSet::new(graph.hidden()) {
            Some(removed) => {
                let key = CacheKey {
                    direction: graph.direction(),
                    source,
                    destination,
                    removed,
                };
                self.distances.get(&key).copied()
            }
            None => graph.distance(source, destination),
        }
    }

    pub fn len(&self) -> usize {
        self.distances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distances.is_empty()
    }
}

/// Every removal set of up to [`MAX_REMOVED`] nodes, each sorted
fn removal_sets(slots: &[Slot]) -> Vec<Vec<Slot>> {
    let mut sets = vec![Vec::new()];
    for (i, &first) in slots.iter().enumerate() {
        sets.push(vec![first]);
        for (j, &second) in slots.iter().enumerate().skip(i + 1) {
            sets.push(vec![first, second]);
            for &third in slots.iter().skip(j + 1) {
                sets.push(vec![first, second, third]);
            }
        }
    }
    sets
}

/// BFS from every visible node under every removal set. Each rayon worker
/// hides nodes on its own clone of the graph and fills its own map; the
/// maps are merged pairwise.
fn sweep(graph: &OrderingGraph) -> HashMap<CacheKey, u32> {
    let slots: Vec<Slot> = graph.slots().collect();
    let direction = graph.direction();

    removal_sets(&slots)
        .par_iter()
        .fold(
            || (graph.clone(), HashMap::new()),
            |(mut scratch, mut found), removed| {
                {
                    let view = scratch.hide(removed);
                    if let Some(removed_set) = RemovedSet::new(view.hidden()) {
                        for source in view.slots().collect::<BTreeSet<_>>() {
                            for (destination, hops) in view.bfs_from(source) {
                                let key = CacheKey {
                                    direction,
                                    source,
                                    destination,
                                    removed: removed_set,
                                };
                                found.insert(key, hops);
                            }
                        }
                    }
                }
                (scratch, found)
            },
        )
        .map(|(_, found)| found)
        .reduce(HashMap::new, |mut merged, mut found| {
            if found.len() > merged.len() {
                std::mem::swap(&mut merged, &mut found);
            }
            merged.extend(found);
            merged
        })
}
