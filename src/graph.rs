//! Immutable road graph with an embedded proximity index
//!
//! The graph is loaded once from a provider (node ids with locations plus
//! directed edges with length and optional bearing) and never mutated. All
//! matching-time metadata - the node-id lookup, the undirected candidate
//! adjacency, the longest edge length and the [`DualPoleIndex`] over the node
//! locations - is precomputed in a single construction pass.

use crate::{DualPoleIndex, Result, SnapError, index::validate_location};
use geo::Point;
use smallvec::SmallVec;
use std::collections::HashMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Opaque node identifier assigned by the graph provider
pub type NodeId = i64;

/// A graph node as supplied by the provider
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GraphNode {
    pub id: NodeId,
    /// x = longitude, y = latitude, degrees
    pub position: Point<f64>,
}

impl GraphNode {
    pub fn new(id: NodeId, lat: f64, lon: f64) -> Self {
        Self {
            id,
            position: Point::new(lon, lat),
        }
    }
}

/// A directed edge in the provider's wire form
///
/// `bearing` is degrees clockwise from north at the edge's start; values of
/// zero or below are the provider's "unknown" sentinel. `length` is the road
/// length in meters and may exceed the geodesic chord between the endpoints.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GraphEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub length: f64,
    pub bearing: f64,
}

/// Resolved per-edge attributes after loading
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EdgeAttrs {
    /// Road length in meters
    pub length: f64,
    /// Bearing in degrees, `None` when the provider sent the sentinel
    pub bearing: Option<f64>,
}

/// Immutable node/edge store with precomputed matching metadata
#[derive(Debug, Clone)]
pub struct RoadGraph {
    /// Node ids, parallel to the coordinate arrays
    ids: Vec<NodeId>,
    lats: Vec<f64>,
    lons: Vec<f64>,
    /// Node id to dense index
    id_lookup: HashMap<NodeId, usize>,
    /// Directed edge attributes keyed by dense endpoint indices
    edges: HashMap<(usize, usize), EdgeAttrs>,
    /// Undirected candidate adjacency per node
    adjacency: Vec<SmallVec<[usize; 4]>>,
    /// Longest edge length over the whole graph, 0 for an edge-less graph
    max_edge_length: f64,
    /// Proximity index over the node locations, built once, lives as long
    /// as the graph
    index: DualPoleIndex,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl RoadGraph {
    /// Build a graph from provider nodes and directed edges
    ///
    /// Index construction errors (empty node set, degenerate bounding box,
    /// invalid coordinates) propagate. A repeated node id is rejected, as is
    /// an edge naming an unknown node id or carrying a negative or non-finite
    /// length; a duplicate directed edge replaces the earlier definition with
    /// a warning.
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("graph::new");

        let mut ids = Vec::with_capacity(nodes.len());
        let mut lats = Vec::with_capacity(nodes.len());
        let mut lons = Vec::with_capacity(nodes.len());
        let mut id_lookup = HashMap::with_capacity(nodes.len());

        for node in &nodes {
            validate_location(node.position)?;
            // A repeated id would leave a ghost row whose id resolves to a
            // different dense index
            if id_lookup.insert(node.id, ids.len()).is_some() {
                return Err(SnapError::DuplicateNode(node.id));
            }
            ids.push(node.id);
            lats.push(node.position.y());
            lons.push(node.position.x());
        }

        let mut edge_table: HashMap<(usize, usize), EdgeAttrs> =
            HashMap::with_capacity(edges.len());
        let mut adjacency: Vec<SmallVec<[usize; 4]>> = vec![SmallVec::new(); ids.len()];

        for edge in &edges {
            let from = *id_lookup
                .get(&edge.from)
                .ok_or(SnapError::UnknownNode(edge.from))?;
            let to = *id_lookup
                .get(&edge.to)
                .ok_or(SnapError::UnknownNode(edge.to))?;

            if !edge.length.is_finite() || edge.length < 0.0 {
                return Err(SnapError::InvalidEdgeLength {
                    from: edge.from,
                    to: edge.to,
                    length: edge.length,
                });
            }

            let attrs = EdgeAttrs {
                length: edge.length,
                // At or below zero is the provider's "unknown" sentinel
                bearing: (edge.bearing > 0.0).then_some(edge.bearing),
            };
            if edge_table.insert((from, to), attrs).is_some() {
                tracing::warn!(
                    from = edge.from,
                    to = edge.to,
                    "duplicate directed edge, keeping the later definition"
                );
            } else {
                // First sighting of this direction: record candidate adjacency
                if !adjacency[from].contains(&to) {
                    adjacency[from].push(to);
                }
                if !adjacency[to].contains(&from) {
                    adjacency[to].push(from);
                }
            }
        }

        // Taken over the surviving definitions, so a replaced duplicate
        // cannot pin a stale maximum
        let max_edge_length = edge_table
            .values()
            .map(|attrs| attrs.length)
            .fold(0.0, f64::max);

        let index = DualPoleIndex::new(lats.clone(), lons.clone())?;

        tracing::debug!(
            nodes = ids.len(),
            edges = edge_table.len(),
            max_edge_length,
            "loaded road graph"
        );

        Ok(Self {
            ids,
            lats,
            lons,
            id_lookup,
            edges: edge_table,
            adjacency,
            max_edge_length,
            index,
        })
    }

    /// Number of nodes
    #[inline]
    pub fn node_count(&self) -> usize {
        self.ids.len()
    }

    /// Provider id of a node by dense index
    #[inline]
    pub fn node_id(&self, index: usize) -> Option<NodeId> {
        self.ids.get(index).copied()
    }

    /// Dense index of a node by provider id
    #[inline]
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        self.id_lookup.get(&id).copied()
    }

    /// Location of a node by dense index (x = lon, y = lat)
    #[inline]
    pub fn position(&self, index: usize) -> Option<Point<f64>> {
        let lat = *self.lats.get(index)?;
        Some(Point::new(self.lons[index], lat))
    }

    /// Undirected candidate neighbours of a node
    #[inline]
    pub fn neighbors(&self, index: usize) -> &[usize] {
        self.adjacency
            .get(index)
            .map(|adj| adj.as_slice())
            .unwrap_or(&[])
    }

    /// Attributes of the directed edge between two dense indices
    #[inline]
    pub fn edge(&self, from: usize, to: usize) -> Option<&EdgeAttrs> {
        self.edges.get(&(from, to))
    }

    /// Longest edge length over the whole graph, precomputed at load time
    #[inline]
    pub fn max_edge_length(&self) -> f64 {
        self.max_edge_length
    }

    /// The proximity index over the node locations
    #[inline]
    pub fn index(&self) -> &DualPoleIndex {
        &self.index
    }
}
