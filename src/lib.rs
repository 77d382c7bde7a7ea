//! road-snap - GPS-to-Road-Graph Snapping
//!
//! This library snaps GPS fixes to the edges of a static road graph. Given an
//! immutable set of graph nodes (lat/lon) and directed edges (length and
//! optional bearing), it finds the directed edge that best fits a query
//! location and optional heading.
//!
//! # Architecture
//!
//! - **[`DualPoleIndex`]**: Static proximity index answering radius and
//!   k-nearest-neighbour queries via triangle-inequality pruning against two
//!   fixed vantage poles
//! - **[`RoadGraph`]**: Immutable node/edge store with precomputed metadata
//!   and an embedded index over the node locations
//! - **[`EdgeMatcher`]**: Candidate edge enumeration and scoring, with
//!   bearing-based direction disambiguation
//! - **[`NodeLocationCache`]**: Append-only node-id to location cache for
//!   embedding pipelines
//!
//! # Performance Characteristics
//!
//! - **Build Time**: O(N log N) for the two sorted-distance arrays
//! - **Query Time**: O(log N + C) where C is the pruned candidate count
//! - **Memory**: O(N) for coordinates + O(N) per pole ordering
//!
//! The index and graph are read-only after construction, so concurrent
//! queries from multiple threads need no locking.

mod cache;
mod graph;
mod index;
mod matcher;

pub mod geodesic;
pub mod geometry;

// Public API exports
pub use cache::NodeLocationCache;
pub use graph::{EdgeAttrs, GraphEdge, GraphNode, NodeId, RoadGraph};
pub use index::DualPoleIndex;
pub use matcher::{EdgeMatcher, GpsFix, MatchOutcome, MatchedEdge};

/// Error types for index construction and queries
#[derive(Debug, thiserror::Error)]
pub enum SnapError {
    #[error("empty point set: the index requires at least one location")]
    EmptyPointSet,

    #[error("coordinate array length mismatch: {lats} latitudes vs {lons} longitudes")]
    LengthMismatch { lats: usize, lons: usize },

    #[error("invalid coordinate: ({lat}, {lon})")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("degenerate bounding box: {reason}")]
    DegenerateBounds { reason: String },

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("duplicate node id {0}")]
    DuplicateNode(NodeId),

    #[error("edge references unknown node id {0}")]
    UnknownNode(NodeId),

    #[error("invalid edge length {length} for edge {from} -> {to}")]
    InvalidEdgeLength { from: NodeId, to: NodeId, length: f64 },
}

pub type Result<T> = std::result::Result<T, SnapError>;
