//! Dual-pole proximity index for radius and k-nearest-neighbour queries
//!
//! This module provides a static spatial index over a fixed set of (lat, lon)
//! points. Instead of a tree, it keeps two arrays of point indices sorted by
//! geodesic distance to two fixed vantage poles. By the triangle inequality,
//! any point within `r` of a query must lie within `[d - r, d + r]` of each
//! pole, where `d` is the query's own distance to that pole; intersecting the
//! two binary-searched windows yields a small candidate superset that is then
//! exact-filtered. The poles are placed 90 degrees of longitude apart to
//! decorrelate the two orderings, which is what makes the intersection
//! selective - correctness never depends on pole placement.
//!
//! The indexed point set is fixed for the index's lifetime; there is no
//! insert or delete API. Rebuilding means constructing from scratch.

use crate::{Result, SnapError, geodesic};
use geo::{Coord, Point, Rect};
use std::collections::HashSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Static proximity index over N points using two vantage poles
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DualPoleIndex {
    /// Indexed point latitudes in degrees
    lats: Vec<f64>,
    /// Indexed point longitudes in degrees
    lons: Vec<f64>,
    /// Vantage poles, fixed at construction and never recomputed
    pole0: Point<f64>,
    pole1: Point<f64>,
    /// Point indices sorted ascending by distance to each pole
    order0: Vec<usize>,
    order1: Vec<usize>,
    /// Distances parallel to the order arrays, sorted ascending
    sorted0: Vec<f64>,
    sorted1: Vec<f64>,
    /// Points per square meter of the bounding box, seeds the KNN radius
    density: f64,
}

/// Point indices and sorted distances for one pole
fn sorted_distances(lats: &[f64], lons: &[f64], pole: Point<f64>) -> (Vec<usize>, Vec<f64>) {
    let dists = geodesic::haversine_to_point(lats, lons, pole);

    let mut order: Vec<usize> = (0..dists.len()).collect();
    order.sort_unstable_by(|&i, &j| dists[i].total_cmp(&dists[j]));

    let sorted = order.iter().map(|&i| dists[i]).collect();
    (order, sorted)
}

/// Reject non-finite or out-of-range query/input coordinates before any
/// distance comparison can see NaN
pub(crate) fn validate_location(location: Point<f64>) -> Result<()> {
    let (lat, lon) = (location.y(), location.x());
    if !lat.is_finite() || !lon.is_finite() || lat.abs() > 90.0 || lon.abs() > 180.0 {
        return Err(SnapError::InvalidCoordinate { lat, lon });
    }
    Ok(())
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl DualPoleIndex {
    /// Build an index over parallel latitude/longitude arrays (degrees)
    ///
    /// Pole placement follows the bounding box: both poles share a latitude
    /// a quarter turn away from the data (below it when any point is in the
    /// northern hemisphere, above it otherwise), and their longitudes are 90
    /// degrees apart.
    ///
    /// # Errors
    /// * [`SnapError::EmptyPointSet`] for zero points
    /// * [`SnapError::LengthMismatch`] for unequal array lengths
    /// * [`SnapError::InvalidCoordinate`] for NaN or out-of-range input
    /// * [`SnapError::DegenerateBounds`] when the bounding box has no area
    ///   (single point, or all points on one meridian or parallel)
    pub fn new(lats: Vec<f64>, lons: Vec<f64>) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::new");

        if lats.is_empty() {
            return Err(SnapError::EmptyPointSet);
        }
        if lats.len() != lons.len() {
            return Err(SnapError::LengthMismatch {
                lats: lats.len(),
                lons: lons.len(),
            });
        }
        for (&lat, &lon) in lats.iter().zip(lons.iter()) {
            validate_location(Point::new(lon, lat))?;
        }

        let bounds = bounding_box(&lats, &lons);
        let (min, max) = (bounds.min(), bounds.max());

        // Geodesic height along the west edge, width along the south edge
        let h = geodesic::haversine(Point::new(min.x, min.y), Point::new(min.x, max.y));
        let w = geodesic::haversine(Point::new(min.x, min.y), Point::new(max.x, min.y));
        if w <= 0.0 || h <= 0.0 {
            return Err(SnapError::DegenerateBounds {
                reason: format!("bounding box is {w} m wide by {h} m tall"),
            });
        }
        let density = lats.len() as f64 / (w * h);

        let pole_lat = if max.y > 0.0 { min.y - 90.0 } else { max.y + 90.0 };
        let pole0_lon = (max.x - min.x) / 2.0 - 45.0;
        let pole0 = Point::new(pole0_lon, pole_lat);
        let pole1 = Point::new(pole0_lon + 90.0, pole_lat);

        Ok(Self::build(lats, lons, pole0, pole1, density))
    }

    /// Assemble the index for a fixed pole pair
    fn build(
        lats: Vec<f64>,
        lons: Vec<f64>,
        pole0: Point<f64>,
        pole1: Point<f64>,
        density: f64,
    ) -> Self {
        let ((order0, sorted0), (order1, sorted1)) = rayon::join(
            || sorted_distances(&lats, &lons, pole0),
            || sorted_distances(&lats, &lons, pole1),
        );

        tracing::debug!(
            points = lats.len(),
            density,
            "built dual-pole index over {} points",
            lats.len()
        );

        Self {
            lats,
            lons,
            pole0,
            pole1,
            order0,
            order1,
            sorted0,
            sorted1,
            density,
        }
    }

    /// Build with explicit poles; pole placement must not affect results
    #[cfg(test)]
    fn with_poles(
        lats: Vec<f64>,
        lons: Vec<f64>,
        pole0: Point<f64>,
        pole1: Point<f64>,
    ) -> Result<Self> {
        let reference = Self::new(lats, lons)?;
        Ok(Self::build(
            reference.lats,
            reference.lons,
            pole0,
            pole1,
            reference.density,
        ))
    }

    /// Number of indexed points
    #[inline]
    pub fn len(&self) -> usize {
        self.lats.len()
    }

    /// Always false: construction rejects the empty point set
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lats.is_empty()
    }

    /// Points per square meter of the indexed bounding box
    #[inline]
    pub fn density(&self) -> f64 {
        self.density
    }

    /// Location of an indexed point
    #[inline]
    pub fn location(&self, index: usize) -> Option<Point<f64>> {
        let lat = *self.lats.get(index)?;
        Some(Point::new(self.lons[index], lat))
    }

    /// All point indices within `r` meters of `location`, with distances
    ///
    /// The result is exact (no false positives or negatives) and sorted by
    /// ascending point index.
    pub fn query_radius(&self, location: Point<f64>, r: f64) -> Result<Vec<(usize, f64)>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::query_radius");

        validate_location(location)?;
        if !r.is_finite() || r < 0.0 {
            return Err(SnapError::InvalidQuery {
                reason: format!("radius must be finite and non-negative, got {r}"),
            });
        }

        let d0 = geodesic::haversine(location, self.pole0);
        let d1 = geodesic::haversine(location, self.pole1);

        let mut matches: Vec<(usize, f64)> = self
            .window_intersection(d0, d1, r)
            .into_iter()
            .filter_map(|i| {
                let d = geodesic::haversine(
                    location,
                    Point::new(self.lons[i], self.lats[i]),
                );
                (d <= r).then_some((i, d))
            })
            .collect();

        matches.sort_unstable_by_key(|&(i, _)| i);
        Ok(matches)
    }

    /// The exact `k` nearest point indices and distances
    ///
    /// Ties are broken by ascending point index. `k` larger than the point
    /// count returns every point.
    ///
    /// The search seeds a radius from the uniform-disk density estimate
    /// `2 * sqrt(k / density)` and expands it geometrically until the
    /// dual-window candidate superset holds `min(k, N)` members whose k-th
    /// exact distance is within the radius; once the windows cover all N
    /// points the loop stops regardless of `k`, so termination does not
    /// depend on the data distribution.
    pub fn query_knn(&self, location: Point<f64>, k: usize) -> Result<Vec<(usize, f64)>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("index::query_knn");

        validate_location(location)?;
        if k == 0 {
            return Err(SnapError::InvalidQuery {
                reason: "k must be at least 1".to_string(),
            });
        }
        let needed = k.min(self.len());

        let d0 = geodesic::haversine(location, self.pole0);
        let d1 = geodesic::haversine(location, self.pole1);

        let mut r = 2.0 * (k as f64 / self.density).sqrt();
        loop {
            let candidates = self.window_intersection(d0, d1, r);
            if candidates.len() >= needed {
                let covers_all = candidates.len() == self.len();

                let mut matches: Vec<(usize, f64)> = candidates
                    .into_iter()
                    .map(|i| {
                        let d = geodesic::haversine(
                            location,
                            Point::new(self.lons[i], self.lats[i]),
                        );
                        (i, d)
                    })
                    .collect();
                matches.sort_unstable_by(|(i, a), (j, b)| a.total_cmp(b).then(i.cmp(j)));
                matches.truncate(needed);

                // Every point within r of the query is a candidate, so the
                // answer is proven exact once the k-th distance fits inside
                // r; full coverage settles it regardless of k
                if covers_all || matches[needed - 1].1 <= r {
                    return Ok(matches);
                }
            }
            r *= 4.0;
            tracing::trace!(radius = r, needed, "expanding knn search radius");
        }
    }

    /// Candidate superset for a radius around known pole distances
    ///
    /// Binary-searches each pole's sorted-distance array for the window
    /// `[d - r, d + r]` and intersects the two index windows. Every point
    /// within `r` of the query is guaranteed to survive (triangle
    /// inequality); the exact filter happens at the call sites.
    fn window_intersection(&self, d0: f64, d1: f64, r: f64) -> Vec<usize> {
        let w0 = window(&self.sorted0, d0, r);
        let w1 = window(&self.sorted1, d1, r);

        let c0 = &self.order0[w0.0..w0.1];
        let c1 = &self.order1[w1.0..w1.1];

        // Hash the smaller window, scan the larger
        let (probe, scan) = if c0.len() <= c1.len() { (c0, c1) } else { (c1, c0) };
        let probe: HashSet<usize> = probe.iter().copied().collect();

        scan.iter().copied().filter(|i| probe.contains(i)).collect()
    }
}

/// Inclusive window `[center - r, center + r]` in a sorted distance array
fn window(sorted: &[f64], center: f64, r: f64) -> (usize, usize) {
    let lo = sorted.partition_point(|&d| d < center - r);
    let hi = sorted.partition_point(|&d| d <= center + r);
    (lo, hi)
}

/// Bounding box of parallel coordinate arrays (x = lon, y = lat)
fn bounding_box(lats: &[f64], lons: &[f64]) -> Rect<f64> {
    let mut min_lat = f64::INFINITY;
    let mut max_lat = f64::NEG_INFINITY;
    let mut min_lon = f64::INFINITY;
    let mut max_lon = f64::NEG_INFINITY;

    for (&lat, &lon) in lats.iter().zip(lons.iter()) {
        min_lat = min_lat.min(lat);
        max_lat = max_lat.max(lat);
        min_lon = min_lon.min(lon);
        max_lon = max_lon.max(lon);
    }

    Rect::new(
        Coord {
            x: min_lon,
            y: min_lat,
        },
        Coord {
            x: max_lon,
            y: max_lat,
        },
    )
}
