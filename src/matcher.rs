//! Edge matching - snapping a GPS fix to the best-fitting graph edge
//!
//! Candidate generation is shared by both scoring criteria: the nearest node
//! distance seeds a search disc of `max_edge_length + r0`, which guarantees
//! that for any graph-adjacent pair with one endpoint within `r0` of the
//! query, the other endpoint is inside the disc too. Graph-adjacent candidate
//! pairs are then scored either by the length ratio
//! `edge_length / (d_u + d_v)` (approaches 1.0 exactly when the fix lies on
//! the segment) or by the true minimum distance to the segment.
//!
//! Every call is a pure function of the immutable graph and the inputs, so a
//! single matcher can serve one worker per incoming fix with no locking.

use crate::{NodeId, Result, RoadGraph, SnapError, geometry};
use geo::Point;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single GPS observation
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GpsFix {
    /// x = longitude, y = latitude, degrees
    pub location: Point<f64>,
    /// Observed heading in degrees clockwise from north, if available
    pub bearing: Option<f64>,
}

impl GpsFix {
    pub fn new(lat: f64, lon: f64, bearing: Option<f64>) -> Self {
        Self {
            location: Point::new(lon, lat),
            bearing,
        }
    }
}

/// A directed edge selected for a query, with its score
///
/// `score` is the length ratio for [`EdgeMatcher::matching_edge`] (larger is
/// better, 1.0 means the fix lies on the segment) and the minimum distance in
/// meters for [`EdgeMatcher::nearest_edge`] (smaller is better).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MatchedEdge {
    pub from: NodeId,
    pub to: NodeId,
    pub score: f64,
}

/// Result of an edge-matching query
///
/// `OnNode` and `NoMatch` are normal branches, not errors: a fix can coincide
/// with an existing node, and a fix near isolated nodes has no valid edge.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MatchOutcome {
    /// The best-fitting directed edge
    Edge(MatchedEdge),
    /// The fix coincides with an existing node; no edge is guessed
    OnNode { node: NodeId, distance: f64 },
    /// No graph-adjacent candidate pair near the fix
    NoMatch,
}

/// How a candidate pair is scored
#[derive(Clone, Copy)]
enum Criterion {
    /// Maximize `edge_length / (d_u + d_v)`
    LengthRatio,
    /// Minimize the point-to-segment distance
    SegmentDistance,
}

/// Snaps GPS fixes to the edges of a borrowed immutable [`RoadGraph`]
#[derive(Debug, Clone, Copy)]
pub struct EdgeMatcher<'g> {
    graph: &'g RoadGraph,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<'g> EdgeMatcher<'g> {
    pub fn new(graph: &'g RoadGraph) -> Self {
        Self { graph }
    }

    /// Best edge by the length-ratio criterion
    ///
    /// If the fix is within `min_r` meters of an existing node the result is
    /// [`MatchOutcome::OnNode`]; a non-positive `min_r` disables that check.
    /// When `bearing` is given and the winning edge exists in both directions
    /// with known bearings, the better-aligned direction is returned.
    pub fn matching_edge(
        &self,
        location: Point<f64>,
        bearing: Option<f64>,
        min_r: f64,
    ) -> Result<MatchOutcome> {
        #[cfg(feature = "profiling")]
        profiling::scope!("matcher::matching_edge");

        self.best_edge(location, bearing, min_r, Criterion::LengthRatio)
    }

    /// Best edge by true minimum distance to the segment
    ///
    /// Identical candidate generation to [`Self::matching_edge`]; the score
    /// is the distance in meters from the fix to the nearest point of the
    /// segment (perpendicular foot, or an endpoint when the foot falls
    /// outside the segment).
    pub fn nearest_edge(
        &self,
        location: Point<f64>,
        bearing: Option<f64>,
        min_r: f64,
    ) -> Result<MatchOutcome> {
        #[cfg(feature = "profiling")]
        profiling::scope!("matcher::nearest_edge");

        self.best_edge(location, bearing, min_r, Criterion::SegmentDistance)
    }

    /// Bulk [`Self::matching_edge`] over an ordered fix sequence
    ///
    /// Fixes are matched in parallel against the shared immutable graph;
    /// the output order follows the input order.
    pub fn matching_edges(&self, fixes: &[GpsFix], min_r: f64) -> Result<Vec<MatchOutcome>> {
        fixes
            .par_iter()
            .map(|fix| self.matching_edge(fix.location, fix.bearing, min_r))
            .collect()
    }

    /// Bulk [`Self::nearest_edge`] over an ordered fix sequence
    pub fn nearest_edges(&self, fixes: &[GpsFix], min_r: f64) -> Result<Vec<MatchOutcome>> {
        fixes
            .par_iter()
            .map(|fix| self.nearest_edge(fix.location, fix.bearing, min_r))
            .collect()
    }

    /// Candidate generation and scoring shared by both criteria
    fn best_edge(
        &self,
        location: Point<f64>,
        bearing: Option<f64>,
        min_r: f64,
        criterion: Criterion,
    ) -> Result<MatchOutcome> {
        if !min_r.is_finite() {
            return Err(SnapError::InvalidQuery {
                reason: format!("min_r must be finite, got {min_r}"),
            });
        }
        if let Some(observed) = bearing
            && !observed.is_finite()
        {
            return Err(SnapError::InvalidQuery {
                reason: format!("bearing must be finite, got {observed}"),
            });
        }

        let graph = self.graph;

        // Scalar nearest-node distance; the index is never empty
        let nearest = graph.index().query_knn(location, 1)?;
        let (nearest_idx, r0) = nearest[0];
        if r0 <= min_r {
            return Ok(MatchOutcome::OnNode {
                node: graph.node_id(nearest_idx).unwrap_or_default(),
                distance: r0,
            });
        }

        // Both endpoints of any edge touching the r0-disc fit in this radius
        let radius = graph.max_edge_length() + r0;
        let candidates = graph.index().query_radius(location, radius)?;

        let distances: HashMap<usize, f64> = candidates.iter().copied().collect();
        let mut visited: HashSet<(usize, usize)> = HashSet::new();
        let mut best: Option<(usize, usize, f64)> = None;

        for &(u, d_u) in &candidates {
            for &v in graph.neighbors(u) {
                let Some(&d_v) = distances.get(&v) else {
                    continue;
                };
                if !visited.insert((u, v)) {
                    continue;
                }
                visited.insert((v, u));

                // Score the direction that exists, preferring u -> v
                let (from, to, attrs) = match (graph.edge(u, v), graph.edge(v, u)) {
                    (Some(attrs), _) => (u, v, attrs),
                    (None, Some(attrs)) => (v, u, attrs),
                    (None, None) => continue,
                };

                let score = match criterion {
                    Criterion::LengthRatio => {
                        if attrs.length + d_u + d_v == 0.0 {
                            // Zero-length edge at the query point: skip the
                            // pair rather than infer a fallback score
                            continue;
                        }
                        attrs.length / (d_u + d_v)
                    }
                    Criterion::SegmentDistance => {
                        geometry::point_to_segment_distance(d_u, attrs.length, d_v)
                    }
                };

                let improves = match (criterion, best) {
                    (_, None) => true,
                    (Criterion::LengthRatio, Some((_, _, s))) => score > s,
                    (Criterion::SegmentDistance, Some((_, _, s))) => score < s,
                };
                if improves {
                    best = Some((from, to, score));
                }
            }
        }

        let Some((mut from, mut to, score)) = best else {
            return Ok(MatchOutcome::NoMatch);
        };

        if let Some(observed) = bearing {
            (from, to) = self.resolve_direction(from, to, observed);
        }

        Ok(MatchOutcome::Edge(MatchedEdge {
            from: graph.node_id(from).unwrap_or_default(),
            to: graph.node_id(to).unwrap_or_default(),
            score,
        }))
    }

    /// Flip the edge direction when the reverse edge aligns better with the
    /// observed bearing
    ///
    /// Only applies when both directions exist with known bearings; the
    /// cosine comparison handles the 0/360 wraparound.
    fn resolve_direction(&self, from: usize, to: usize, observed: f64) -> (usize, usize) {
        let forward = self.graph.edge(from, to).and_then(|e| e.bearing);
        let reverse = self.graph.edge(to, from).and_then(|e| e.bearing);

        if let (Some(fwd), Some(rev)) = (forward, reverse)
            && geometry::bearing_alignment(rev, observed) > geometry::bearing_alignment(fwd, observed)
        {
            return (to, from);
        }
        (from, to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geodesic::{displace, haversine};
    use crate::{GraphEdge, GraphNode};

    fn edge(from: NodeId, to: NodeId, length: f64, bearing: f64) -> GraphEdge {
        GraphEdge {
            from,
            to,
            length,
            bearing,
        }
    }

    /// Two nodes 200 m apart along bearing 10, edges in both directions
    fn corridor_graph() -> (RoadGraph, Point<f64>, Point<f64>) {
        let a = Point::new(-83.0, 42.0);
        let b = displace(a, 10.0, 200.0);
        let length = haversine(a, b);

        let graph = RoadGraph::new(
            vec![
                GraphNode { id: 1, position: a },
                GraphNode { id: 2, position: b },
            ],
            vec![edge(1, 2, length, 10.0), edge(2, 1, length, 190.0)],
        )
        .unwrap();
        (graph, a, b)
    }

    #[test]
    fn test_midpoint_matches_edge() {
        let a = GraphNode::new(1, 42.0, -83.0);
        let b = GraphNode::new(2, 42.001, -83.001);
        let length = haversine(a.position, b.position);
        let graph = RoadGraph::new(vec![a, b], vec![edge(1, 2, length, 0.0)]).unwrap();
        let matcher = EdgeMatcher::new(&graph);

        let midpoint = Point::new(-83.0005, 42.0005);
        let outcome = matcher.matching_edge(midpoint, None, 1.0).unwrap();

        match outcome {
            MatchOutcome::Edge(m) => {
                assert_eq!((m.from, m.to), (1, 2));
                assert!(m.score > 0.999, "ratio {}", m.score);
            }
            other => panic!("expected edge, got {other:?}"),
        }
    }

    #[test]
    fn test_fix_on_node_reports_on_node() {
        let (graph, a, _) = corridor_graph();
        let matcher = EdgeMatcher::new(&graph);

        let outcome = matcher.matching_edge(a, None, 1.0).unwrap();
        match outcome {
            MatchOutcome::OnNode { node, distance } => {
                assert_eq!(node, 1);
                assert!(distance <= 1.0);
            }
            other => panic!("expected on-node, got {other:?}"),
        }
    }

    #[test]
    fn test_bearing_selects_direction() {
        let (graph, a, b) = corridor_graph();
        let matcher = EdgeMatcher::new(&graph);

        // Slightly off the midpoint so the fix is not on a node
        let mid = Point::new((a.x() + b.x()) / 2.0, (a.y() + b.y()) / 2.0);
        let fix = displace(mid, 100.0, 5.0);

        let outcome = matcher.matching_edge(fix, Some(15.0), 1.0).unwrap();
        match outcome {
            MatchOutcome::Edge(m) => assert_eq!((m.from, m.to), (1, 2)),
            other => panic!("expected edge, got {other:?}"),
        }

        let outcome = matcher.matching_edge(fix, Some(185.0), 1.0).unwrap();
        match outcome {
            MatchOutcome::Edge(m) => assert_eq!((m.from, m.to), (2, 1)),
            other => panic!("expected edge, got {other:?}"),
        }

        // Same disambiguation applies to the distance criterion
        let outcome = matcher.nearest_edge(fix, Some(185.0), 1.0).unwrap();
        match outcome {
            MatchOutcome::Edge(m) => assert_eq!((m.from, m.to), (2, 1)),
            other => panic!("expected edge, got {other:?}"),
        }
    }

    #[test]
    fn test_nearest_edge_on_segment_distance_zero() {
        let (graph, a, _) = corridor_graph();
        let matcher = EdgeMatcher::new(&graph);

        // A fix 80 m along the corridor lies on the segment
        let fix = displace(a, 10.0, 80.0);
        let outcome = matcher.nearest_edge(fix, None, 1.0).unwrap();

        match outcome {
            MatchOutcome::Edge(m) => {
                assert!(m.score < 0.05, "distance {}", m.score);
            }
            other => panic!("expected edge, got {other:?}"),
        }
    }

    #[test]
    fn test_nearest_edge_projection_beyond_endpoint() {
        let (graph, a, b) = corridor_graph();
        let matcher = EdgeMatcher::new(&graph);

        // 60 m past the far endpoint: a^2 > b^2 + c^2, nearest is min(a, c)
        let fix = displace(a, 10.0, 260.0);
        let expected = haversine(fix, b);

        let outcome = matcher.nearest_edge(fix, None, 1.0).unwrap();
        match outcome {
            MatchOutcome::Edge(m) => {
                assert!(
                    (m.score - expected).abs() < 0.05,
                    "distance {} vs endpoint distance {expected}",
                    m.score
                );
            }
            other => panic!("expected edge, got {other:?}"),
        }
    }

    #[test]
    fn test_isolated_nodes_yield_no_match() {
        let graph = RoadGraph::new(
            vec![
                GraphNode::new(1, 42.0, -83.0),
                GraphNode::new(2, 42.001, -83.001),
                GraphNode::new(3, 42.002, -83.002),
            ],
            Vec::new(),
        )
        .unwrap();
        let matcher = EdgeMatcher::new(&graph);

        let fix = Point::new(-83.0004, 42.0004);
        assert_eq!(matcher.matching_edge(fix, None, 1.0).unwrap(), MatchOutcome::NoMatch);
        assert_eq!(matcher.nearest_edge(fix, None, 1.0).unwrap(), MatchOutcome::NoMatch);
    }

    #[test]
    fn test_zero_length_edge_skipped() {
        // Nodes 1 and 2 coincide and are joined by a zero-length edge; the
        // fix sits exactly on them, so that pair's denominator is zero
        let a = GraphNode::new(1, 42.0, -83.0);
        let a2 = GraphNode::new(2, 42.0, -83.0);
        let c = GraphNode::new(3, 42.001, -83.001);
        let length = haversine(a.position, c.position);

        let graph = RoadGraph::new(
            vec![a, a2, c],
            vec![edge(1, 2, 0.0, 0.0), edge(1, 3, length, 0.0)],
        )
        .unwrap();
        let matcher = EdgeMatcher::new(&graph);

        // Negative min_r disables the on-node short-circuit
        let outcome = matcher
            .matching_edge(Point::new(-83.0, 42.0), None, -1.0)
            .unwrap();
        match outcome {
            MatchOutcome::Edge(m) => {
                assert_eq!((m.from, m.to), (1, 3));
                assert!(m.score.is_finite());
            }
            other => panic!("expected edge, got {other:?}"),
        }
    }

    #[test]
    fn test_nearest_edge_ignores_zero_length_edge() {
        // Coincident nodes 1 and 2 joined by a zero-length edge; its
        // degenerate score must not displace the real edge 1 -> 3
        let a = GraphNode::new(1, 42.0, -83.0);
        let a2 = GraphNode::new(2, 42.0, -83.0);
        let c = GraphNode::new(3, 42.001, -83.001);
        let length = haversine(a.position, c.position);

        let graph = RoadGraph::new(
            vec![a, a2, c],
            vec![edge(1, 2, 0.0, 0.0), edge(1, 3, length, 0.0)],
        )
        .unwrap();
        let matcher = EdgeMatcher::new(&graph);

        // On the real segment, roughly midway
        let outcome = matcher
            .nearest_edge(Point::new(-83.0005, 42.0005), None, 1.0)
            .unwrap();
        match outcome {
            MatchOutcome::Edge(m) => {
                assert_eq!((m.from, m.to), (1, 3));
                assert!(m.score.is_finite());
                assert!(m.score < 1.0, "distance {}", m.score);
            }
            other => panic!("expected edge, got {other:?}"),
        }
    }

    #[test]
    fn test_single_direction_edge_is_not_flipped() {
        // Only 1 -> 2 exists; an opposing observed bearing must not flip it
        let a = GraphNode::new(1, 42.0, -83.0);
        let b = GraphNode::new(2, 42.001, -83.001);
        let length = haversine(a.position, b.position);
        let graph = RoadGraph::new(vec![a, b], vec![edge(1, 2, length, 325.0)]).unwrap();
        let matcher = EdgeMatcher::new(&graph);

        let midpoint = Point::new(-83.0005, 42.0005);
        let outcome = matcher.matching_edge(midpoint, Some(145.0), 1.0).unwrap();
        match outcome {
            MatchOutcome::Edge(m) => assert_eq!((m.from, m.to), (1, 2)),
            other => panic!("expected edge, got {other:?}"),
        }
    }

    #[test]
    fn test_bulk_matching_preserves_order() {
        let (graph, a, b) = corridor_graph();
        let matcher = EdgeMatcher::new(&graph);

        let mid = Point::new((a.x() + b.x()) / 2.0, (a.y() + b.y()) / 2.0);
        let fixes = vec![
            GpsFix {
                location: mid,
                bearing: Some(15.0),
            },
            GpsFix {
                location: a,
                bearing: None,
            },
            GpsFix {
                location: mid,
                bearing: Some(185.0),
            },
        ];

        let outcomes = matcher.matching_edges(&fixes, 1.0).unwrap();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], MatchOutcome::Edge(m) if (m.from, m.to) == (1, 2)));
        assert!(matches!(outcomes[1], MatchOutcome::OnNode { node: 1, .. }));
        assert!(matches!(outcomes[2], MatchOutcome::Edge(m) if (m.from, m.to) == (2, 1)));

        let nearest = matcher.nearest_edges(&fixes, 1.0).unwrap();
        assert_eq!(nearest.len(), 3);
        assert!(matches!(nearest[1], MatchOutcome::OnNode { node: 1, .. }));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let (graph, _, _) = corridor_graph();
        let matcher = EdgeMatcher::new(&graph);

        let err = matcher
            .matching_edge(Point::new(f64::NAN, 42.0), None, 1.0)
            .unwrap_err();
        assert!(matches!(err, SnapError::InvalidCoordinate { .. }));

        let err = matcher
            .matching_edge(Point::new(-83.0, 42.0), None, f64::NAN)
            .unwrap_err();
        assert!(matches!(err, SnapError::InvalidQuery { .. }));

        let err = matcher
            .matching_edge(Point::new(-83.0, 42.0), Some(f64::NAN), 1.0)
            .unwrap_err();
        assert!(matches!(err, SnapError::InvalidQuery { .. }));
    }

    #[test]
    fn test_best_of_several_edges() {
        // A small cross of edges; the fix sits on the east-west road
        let center = GraphNode::new(1, 42.0, -83.0);
        let north = GraphNode::new(2, 42.002, -83.0001);
        let east = GraphNode::new(3, 42.0001, -82.998);
        let l_n = haversine(center.position, north.position);
        let l_e = haversine(center.position, east.position);

        let graph = RoadGraph::new(
            vec![center, north, east],
            vec![edge(1, 2, l_n, 0.0), edge(1, 3, l_e, 90.0)],
        )
        .unwrap();
        let matcher = EdgeMatcher::new(&graph);

        // Halfway to the east node
        let fix = Point::new(-82.999, 42.00005);
        let outcome = matcher.matching_edge(fix, None, 1.0).unwrap();
        match outcome {
            MatchOutcome::Edge(m) => assert_eq!((m.from, m.to), (1, 3)),
            other => panic!("expected edge, got {other:?}"),
        }

        let outcome = matcher.nearest_edge(fix, None, 1.0).unwrap();
        match outcome {
            MatchOutcome::Edge(m) => {
                assert_eq!((m.from, m.to), (1, 3));
                assert!(m.score < 20.0);
            }
            other => panic!("expected edge, got {other:?}"),
        }
    }
}
