//! DFS-based acyclic orderings of the topology.
//!
//! The topology is treated as undirected and numbered by a depth-first
//! traversal. Every directed edge then lands in exactly one of two DAGs:
//! the forward ordering (edges climbing in DFS number) or the reverse
//! ordering (edges descending in DFS number, renumbered so they climb
//! there too). A walk that stays inside one ordering can never loop.
//!
//! Node and neighbor iteration is lexicographic by node identifier. The DFS
//! root is the first node, in that order, whose DFS tree has the longest
//! root-to-leaf path.

use std::collections::{BTreeSet, HashMap};
use std::ops::{Deref, DerefMut};

use log::{debug, warn};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{depth_first_search, Bfs, Dfs, DfsEvent, EdgeRef, IntoNeighbors, NodeFiltered};

use crate::error::RoutingError;
use crate::topology::{EdgeAttributes, NodeId, Topology};

/// Dense internal node handle. Slot `i` carries forward DFS number `i + 1`.
pub type Slot = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Mapping between node identifiers and slots for one snapshot
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeTable {
    names: Vec<NodeId>,
    slots: HashMap<NodeId, Slot>,
}

impl NodeTable {
    fn push(&mut self, node: &NodeId) -> Slot {
        let slot = self.names.len() as Slot;
        self.names.push(node.clone());
        self.slots.insert(node.clone(), slot);
        slot
    }

    pub fn slot(&self, node: &str) -> Option<Slot> {
        self.slots.get(node).copied()
    }

    /// Slot of an ordered node, or `NodeNotOrdered`
    pub fn require(&self, node: &str) -> Result<Slot, RoutingError> {
        self.slot(node)
            .ok_or_else(|| RoutingError::NodeNotOrdered(node.to_string()))
    }

    pub fn name(&self, slot: Slot) -> &NodeId {
        &self.names[slot as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
struct OrderedEdge {
    index: usize,
    attributes: EdgeAttributes,
}

fn node_index(slot: Slot) -> NodeIndex {
    NodeIndex::new(slot as usize)
}

fn slot_of(node: NodeIndex) -> Slot {
    node.index() as Slot
}

/// One acyclic ordering: ordered nodes with their DFS numbers and the
/// topology edges compatible with the ordering's direction.
///
/// Node weights are DFS numbers and node index `i` is slot `i`. Hidden
/// nodes stay in the graph and are filtered out of every query.
#[derive(Debug, Clone)]
pub struct OrderingGraph {
    direction: Direction,
    graph: DiGraph<u32, OrderedEdge>,
    hidden: BTreeSet<Slot>,
}

impl PartialEq for OrderingGraph {
    fn eq(&self, other: &Self) -> bool {
        let nodes = |graph: &DiGraph<u32, OrderedEdge>| -> Vec<u32> {
            graph.raw_nodes().iter().map(|node| node.weight).collect()
        };
        let edges = |graph: &DiGraph<u32, OrderedEdge>| -> Vec<(NodeIndex, NodeIndex, OrderedEdge)> {
            graph
                .raw_edges()
                .iter()
                .map(|edge| (edge.source(), edge.target(), edge.weight.clone()))
                .collect()
        };

        self.direction == other.direction
            && self.hidden == other.hidden
            && nodes(&self.graph) == nodes(&other.graph)
            && edges(&self.graph) == edges(&other.graph)
    }
}

impl OrderingGraph {
    fn new(direction: Direction, dfs_numbers: impl IntoIterator<Item = u32>) -> Self {
        let mut graph = DiGraph::new();
        for dfs_number in dfs_numbers {
            graph.add_node(dfs_number);
        }
        Self {
            direction,
            graph,
            hidden: BTreeSet::new(),
        }
    }

    fn add_edge(&mut self, from: Slot, to: Slot, index: usize, attributes: EdgeAttributes) {
        self.graph
            .add_edge(node_index(from), node_index(to), OrderedEdge { index, attributes });
    }

    /// Graph view without the hidden nodes
    fn visible(&self) -> NodeFiltered<&DiGraph<u32, OrderedEdge>, impl Fn(NodeIndex) -> bool + '_> {
        let hidden = &self.hidden;
        NodeFiltered::from_fn(&self.graph, move |node: NodeIndex| !hidden.contains(&slot_of(node)))
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn dfs_number(&self, slot: Slot) -> Option<u32> {
        if !self.contains(slot) {
            return None;
        }
        self.graph.node_weight(node_index(slot)).copied()
    }

    pub fn contains(&self, slot: Slot) -> bool {
        (slot as usize) < self.graph.node_count() && !self.hidden.contains(&slot)
    }

    /// Visible nodes in slot order
    pub fn slots(&self) -> impl Iterator<Item = Slot> + '_ {
        self.graph
            .node_indices()
            .map(slot_of)
            .filter(|slot| !self.hidden.contains(slot))
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count() - self.hidden.len()
    }

    pub fn edge_count(&self) -> usize {
        self.graph
            .raw_edges()
            .iter()
            .filter(|edge| self.contains(slot_of(edge.source())) && self.contains(slot_of(edge.target())))
            .count()
    }

    /// Nodes currently hidden, sorted
    pub fn hidden(&self) -> &BTreeSet<Slot> {
        &self.hidden
    }

    /// Visible out-edges of `slot` as `(target, parallel index)`, sorted
    pub fn out_edges(&self, slot: Slot) -> impl Iterator<Item = (Slot, usize)> {
        let mut edges: Vec<(Slot, usize)> = if self.contains(slot) {
            self.graph
                .edges(node_index(slot))
                .map(|edge| (slot_of(edge.target()), edge.weight().index))
                .filter(|(to, _)| self.contains(*to))
                .collect()
        } else {
            Vec::new()
        };
        edges.sort_unstable();
        edges.into_iter()
    }

    pub fn edge(&self, from: Slot, to: Slot, index: usize) -> Option<&EdgeAttributes> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        self.graph
            .edges(node_index(from))
            .find(|edge| edge.target() == node_index(to) && edge.weight().index == index)
            .map(|edge| &edge.weight().attributes)
    }

    /// Temporarily hide `slots` and their incident edges.
    ///
    /// The returned guard derefs to the graph; dropping it unhides the
    /// nodes again on every exit path. Slots that are absent or already
    /// hidden are skipped.
    pub fn hide(&mut self, slots: &[Slot]) -> HiddenNodes<'_> {
        let mut added = Vec::with_capacity(slots.len());
        for &slot in slots {
            if self.contains(slot) {
                self.hidden.insert(slot);
                added.push(slot);
            }
        }
        HiddenNodes { graph: self, added }
    }

    /// Hop distances from `source` to every reachable visible node
    pub fn bfs_from(&self, source: Slot) -> Vec<(Slot, u32)> {
        if !self.contains(source) {
            return Vec::new();
        }

        let visible = self.visible();
        let start = node_index(source);
        let mut depths = vec![None; self.graph.node_count()];
        depths[start.index()] = Some(0u32);

        let mut reached = Vec::new();
        let mut bfs = Bfs::new(&visible, start);
        while let Some(node) = bfs.next(&visible) {
            let hops = depths[node.index()].unwrap_or(0);
            reached.push((slot_of(node), hops));
            for next in (&visible).neighbors(node) {
                depths[next.index()].get_or_insert(hops + 1);
            }
        }
        reached
    }

    /// Shortest hop distance between two visible nodes
    pub fn distance(&self, source: Slot, destination: Slot) -> Option<u32> {
        self.bfs_from(source)
            .into_iter()
            .find(|(node, _)| *node == destination)
            .map(|(_, hops)| hops)
    }

    /// Nodes reachable from `start` in depth-first discovery order,
    /// excluding `start` itself. Lower slots are visited first.
    pub fn dfs_preorder(&self, start: Slot) -> Vec<Slot> {
        if !self.contains(start) {
            return Vec::new();
        }

        let visible = self.visible();
        let start = node_index(start);
        let mut order = Vec::new();
        let mut dfs = Dfs::new(&visible, start);
        while let Some(node) = dfs.next(&visible) {
            if node != start {
                order.push(slot_of(node));
            }
        }
        order
    }
}

/// Scoped hide of ordering nodes; unhides them when dropped.
pub struct HiddenNodes<'g> {
    graph: &'g mut OrderingGraph,
    added: Vec<Slot>,
}

impl HiddenNodes<'_> {
    /// Unhide now instead of at end of scope
    pub fn restore(self) {}
}

impl Deref for HiddenNodes<'_> {
    type Target = OrderingGraph;

    fn deref(&self) -> &OrderingGraph {
        self.graph
    }
}

impl DerefMut for HiddenNodes<'_> {
    fn deref_mut(&mut self) -> &mut OrderingGraph {
        self.graph
    }
}

impl Drop for HiddenNodes<'_> {
    fn drop(&mut self) {
        for slot in self.added.drain(..) {
            self.graph.hidden.remove(&slot);
        }
    }
}

/// Both orderings of one topology snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct Orderings {
    pub nodes: NodeTable,
    pub forward: OrderingGraph,
    pub reverse: OrderingGraph,
    pub root: NodeId,
}

impl Orderings {
    /// Build forward and reverse orderings for `topology`.
    ///
    /// Nodes unreachable from the chosen root get no DFS number and are
    /// left out of both orderings.
    pub fn build(topology: &Topology) -> Result<Self, RoutingError> {
        topology.validate()?;

        let adjacency = undirected_graph(topology);
        let root = choose_root(&adjacency).ok_or_else(|| {
            RoutingError::MalformedTopology("topology has no nodes".to_string())
        })?;

        let mut nodes = NodeTable::default();
        for (node, _) in dfs_with_depth(&adjacency, root) {
            nodes.push(adjacency[node]);
        }

        let ordered = nodes.len();
        if ordered < topology.number_of_nodes() {
            warn!(
                "Topology is disconnected: {} of {} nodes unreachable from root {} are not ordered",
                topology.number_of_nodes() - ordered,
                topology.number_of_nodes(),
                adjacency[root]
            );
        }

        let max_number = ordered as u32 + 1;
        let mut forward = OrderingGraph::new(Direction::Forward, 1..=ordered as u32);
        let mut reverse = OrderingGraph::new(Direction::Reverse, (1..=ordered as u32).map(|n| max_number - n));

        // Insert by slot so neighbor order never depends on node names
        let mut edges = Vec::new();
        for (element, attributes) in topology.edges() {
            let (Some(from), Some(to)) = (nodes.slot(&element.from), nodes.slot(&element.to)) else {
                continue;
            };
            if from != to {
                edges.push((from, to, element.index, attributes));
            }
        }
        edges.sort_by_key(|&(from, to, index, _)| (from, to, index));

        for (from, to, index, attributes) in edges {
            // Slots follow DFS numbers, so comparing slots compares numbers
            if from < to {
                forward.add_edge(from, to, index, attributes.clone());
            } else {
                reverse.add_edge(from, to, index, attributes.clone());
            }
        }

        debug!(
            "Built orderings from root {}: {} nodes, {} forward edges, {} reverse edges",
            adjacency[root],
            ordered,
            forward.edge_count(),
            reverse.edge_count()
        );

        Ok(Self {
            root: adjacency[root].clone(),
            nodes,
            forward,
            reverse,
        })
    }

    pub fn graph(&self, direction: Direction) -> &OrderingGraph {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Reverse => &self.reverse,
        }
    }
}

/// Undirected adjacency of the topology as a petgraph digraph with one edge
/// per direction. Node indices follow lexicographic node order.
fn undirected_graph(topology: &Topology) -> DiGraph<&NodeId, ()> {
    let neighbors = topology.undirected_neighbors();
    let mut graph = DiGraph::with_capacity(neighbors.len(), 0);
    let indices: HashMap<&NodeId, NodeIndex> = neighbors
        .keys()
        .map(|&node| (node, graph.add_node(node)))
        .collect();

    for (node, adjacent) in &neighbors {
        // petgraph lists the most recently added neighbor first
        for neighbor in adjacent.iter().rev() {
            graph.add_edge(indices[node], indices[neighbor], ());
        }
    }
    graph
}

/// Depth-first preorder over the undirected adjacency, with each node's
/// depth in the DFS tree (root = 1).
fn dfs_with_depth(graph: &DiGraph<&NodeId, ()>, root: NodeIndex) -> Vec<(NodeIndex, usize)> {
    let mut depths = vec![1usize; graph.node_count()];
    let mut order = Vec::new();
    depth_first_search(graph, Some(root), |event| match event {
        DfsEvent::TreeEdge(parent, child) => depths[child.index()] = depths[parent.index()] + 1,
        DfsEvent::Discover(node, _) => order.push((node, depths[node.index()])),
        _ => {}
    });
    order
}

/// First node (lexicographic) whose DFS tree has the longest root-to-leaf path
fn choose_root(graph: &DiGraph<&NodeId, ()>) -> Option<NodeIndex> {
    let mut best: Option<(NodeIndex, usize)> = None;
    for node in graph.node_indices() {
        let longest = dfs_with_depth(graph, node)
            .into_iter()
            .map(|(_, depth)| depth)
            .max()
            .unwrap_or(1);
        if best.map_or(true, |(_, best_len)| longest > best_len) {
            best = Some((node, longest));
        }
    }
    best.map(|(node, _)| node)
}
