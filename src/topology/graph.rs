//! Directed multigraph holding the network topology.
//!
//! Backed by a petgraph `StableDiGraph`, so node and edge handles survive
//! node removal. Parallel edges between the same ordered pair carry their
//! insertion position as `index`, dense from 0. Nodes iterate in
//! lexicographic order, which is the stable order every derived structure
//! (DFS root choice, neighbor visits) relies on.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use petgraph::visit::{Bfs, EdgeRef, Reversed};

use super::types::{EdgeAttributes, GraphPathElement, NodeId};
use crate::error::RoutingError;

/// Edge weight: parallel index among `from -> to` links plus attributes
#[derive(Debug, Clone, PartialEq)]
struct Link {
    index: usize,
    attributes: EdgeAttributes,
}

#[derive(Debug, Clone, Default)]
pub struct Topology {
    graph: StableDiGraph<NodeId, Link>,
    indices: BTreeMap<NodeId, NodeIndex>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: impl Into<NodeId>) {
        self.ensure_node(node.into());
    }

    fn ensure_node(&mut self, node: NodeId) -> NodeIndex {
        if let Some(&index) = self.indices.get(&node) {
            return index;
        }
        let index = self.graph.add_node(node.clone());
        self.indices.insert(node, index);
        index
    }

    /// Add a directed edge, creating missing endpoints. Returns the parallel
    /// index of the new edge.
    pub fn add_edge(
        &mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        attributes: EdgeAttributes,
    ) -> usize {
        let from = self.ensure_node(from.into());
        let to = self.ensure_node(to.into());

        let index = self.graph.edges(from).filter(|edge| edge.target() == to).count();
        self.graph.add_edge(from, to, Link { index, attributes });
        index
    }

    /// Add one edge in each direction between `a` and `b`
    pub fn add_link(&mut self, a: &str, b: &str, attributes: EdgeAttributes) {
        self.add_edge(a, b, attributes.clone());
        self.add_edge(b, a, attributes);
    }

    /// Remove a node together with every incident edge.
    /// Returns false if the node did not exist.
    pub fn remove_node(&mut self, node: &str) -> bool {
        match self.indices.remove(node) {
            Some(index) => self.graph.remove_node(index).is_some(),
            None => false,
        }
    }

    pub fn contains_node(&self, node: &str) -> bool {
        self.indices.contains_key(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.indices.keys()
    }

    pub fn number_of_nodes(&self) -> usize {
        self.indices.len()
    }

    pub fn number_of_edges(&self) -> usize {
        self.graph.edge_count()
    }

    fn edge_id(&self, from: &str, to: &str, index: usize) -> Option<EdgeIndex> {
        let from = *self.indices.get(from)?;
        let to = *self.indices.get(to)?;
        self.graph
            .edges(from)
            .find(|edge| edge.target() == to && edge.weight().index == index)
            .map(|edge| edge.id())
    }

    pub fn edge(&self, from: &str, to: &str, index: usize) -> Option<&EdgeAttributes> {
        let id = self.edge_id(from, to, index)?;
        self.graph.edge_weight(id).map(|link| &link.attributes)
    }

    pub fn edge_mut(&mut self, from: &str, to: &str, index: usize) -> Option<&mut EdgeAttributes> {
        let id = self.edge_id(from, to, index)?;
        self.graph.edge_weight_mut(id).map(|link| &mut link.attributes)
    }

    /// All parallel edges `from -> to`, ordered by index
    pub fn edges_between(&self, from: &str, to: &str) -> Vec<&EdgeAttributes> {
        self.out_edges(from)
            .filter(|(element, _)| element.to == to)
            .map(|(_, attrs)| attrs)
            .collect()
    }

    /// Every directed edge, ordered by (from, to, index)
    pub fn edges(&self) -> impl Iterator<Item = (GraphPathElement, &EdgeAttributes)> {
        self.indices.keys().flat_map(move |node| self.out_edges(node))
    }

    /// Out-edges of `node`, ordered by (to, index)
    pub fn out_edges<'a>(
        &'a self,
        node: &str,
    ) -> impl Iterator<Item = (GraphPathElement, &'a EdgeAttributes)> + 'a {
        let mut edges: Vec<(GraphPathElement, &'a EdgeAttributes)> = match self.indices.get(node) {
            Some(&index) => self
                .graph
                .edges(index)
                .map(|edge| {
                    let link = edge.weight();
                    let element = GraphPathElement::new(
                        self.graph[edge.source()].as_str(),
                        self.graph[edge.target()].as_str(),
                        link.index,
                    );
                    (element, &link.attributes)
                })
                .collect(),
            None => Vec::new(),
        };
        edges.sort_by(|(a, _), (b, _)| a.cmp(b));
        edges.into_iter()
    }

    /// Undirected adjacency: distinct neighbors of every node, ignoring
    /// edge direction and parallel links
    pub fn undirected_neighbors(&self) -> BTreeMap<&NodeId, BTreeSet<&NodeId>> {
        self.indices
            .iter()
            .map(|(node, &index)| {
                let neighbors = self
                    .graph
                    .neighbors_undirected(index)
                    // Self loops carry no ordering information
                    .filter(|&neighbor| neighbor != index)
                    .map(|neighbor| &self.graph[neighbor])
                    .collect();
                (node, neighbors)
            })
            .collect()
    }

    /// Hop distance from every node that can reach `destination`, following
    /// edge direction. Empty when `destination` is unknown.
    pub fn hop_distances_to(&self, destination: &str) -> HashMap<NodeId, usize> {
        let Some(&target) = self.indices.get(destination) else {
            return HashMap::new();
        };

        let incoming = Reversed(&self.graph);
        let mut hops = HashMap::from([(target, 0usize)]);
        let mut bfs = Bfs::new(incoming, target);
        while let Some(node) = bfs.next(incoming) {
            let next_hops = hops.get(&node).copied().unwrap_or(0) + 1;
            for previous in self.graph.neighbors_directed(node, petgraph::Direction::Incoming) {
                hops.entry(previous).or_insert(next_hops);
            }
        }

        hops.into_iter()
            .map(|(node, distance)| (self.graph[node].clone(), distance))
            .collect()
    }

    /// Update the hash weight of one edge. Returns false if the edge is gone.
    pub fn set_weight(&mut self, element: &GraphPathElement, weight: f64) -> bool {
        match self.edge_mut(&element.from, &element.to, element.index) {
            Some(attrs) => {
                attrs.weight = weight;
                true
            }
            None => false,
        }
    }

    /// Zero every edge's load accumulator before a routing pass
    pub fn reset_loads(&mut self) {
        let ids: Vec<EdgeIndex> = self.graph.edge_indices().collect();
        for id in ids {
            self.graph[id].attributes.current_bandwidth = 0.0;
        }
    }

    /// Check the invariants the routing core depends on
    pub fn validate(&self) -> Result<(), RoutingError> {
        if self.indices.is_empty() {
            return Err(RoutingError::MalformedTopology(
                "topology has no nodes".to_string(),
            ));
        }

        for (element, attrs) in self.edges() {
            if !attrs.weight.is_finite() || attrs.weight < 0.0 {
                return Err(RoutingError::MalformedTopology(format!(
                    "edge {} has invalid weight {}",
                    element, attrs.weight
                )));
            }
            if !attrs.bandwidth.is_finite() || attrs.bandwidth <= 0.0 {
                return Err(RoutingError::MalformedTopology(format!(
                    "edge {} has invalid bandwidth {}",
                    element, attrs.bandwidth
                )));
            }
        }

        Ok(())
    }
}
