//! Append-only node-location cache for embedding pipelines
//!
//! Ingestion pipelines around the matcher repeatedly resolve node ids to
//! locations from several worker threads. Rather than a shared mutable
//! global, the cache is an explicit object passed by reference: an
//! append-only mapping from node id to location, safe for concurrent readers
//! and writers. Entries are never updated or removed - the first write for a
//! node id wins.

use crate::NodeId;
use dashmap::DashMap;
use geo::Point;

/// Concurrent append-only map from node id to location
#[derive(Debug, Default)]
pub struct NodeLocationCache {
    locations: DashMap<NodeId, Point<f64>>,
}

impl NodeLocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a location for a node id
    ///
    /// Returns `true` if the entry was added; a node id that is already
    /// present keeps its original location and `false` is returned.
    pub fn insert(&self, id: NodeId, location: Point<f64>) -> bool {
        let mut added = false;
        self.locations.entry(id).or_insert_with(|| {
            added = true;
            location
        });
        added
    }

    /// Look up a cached location
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<Point<f64>> {
        self.locations.get(&id).map(|entry| *entry.value())
    }

    /// Look up a location, computing and caching it on a miss
    pub fn get_or_insert_with<F>(&self, id: NodeId, resolve: F) -> Point<f64>
    where
        F: FnOnce() -> Point<f64>,
    {
        *self.locations.entry(id).or_insert_with(resolve).value()
    }

    /// Number of cached node ids
    #[inline]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}
