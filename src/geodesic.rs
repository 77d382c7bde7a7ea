//! Great-circle distance and bearing helpers
//!
//! All distances are haversine distances in meters on a sphere of radius
//! [`EARTH_RADIUS_M`]. Locations use the `geo` crate convention throughout the
//! crate: `Point::x()` is longitude, `Point::y()` is latitude, both in
//! degrees.

use geo::Point;
use rayon::prelude::*;

/// Spherical Earth radius in meters (WGS84 equatorial)
pub const EARTH_RADIUS_M: f64 = 6378137.0;

/// Haversine distance between two locations in meters
///
/// The haversine intermediate is clamped to `[0, 1]` so that floating-point
/// rounding on near-identical or near-antipodal inputs cannot produce NaN.
#[inline]
pub fn haversine(from: Point<f64>, to: Point<f64>) -> f64 {
    let lat1 = from.y().to_radians();
    let lat2 = to.y().to_radians();
    let d_lat = (to.y() - from.y()).to_radians();
    let d_lon = (to.x() - from.x()).to_radians();

    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let a = a.clamp(0.0, 1.0);

    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Elementwise haversine distance from parallel coordinate arrays to a single
/// location
///
/// This is the hot path for building pole orderings and filtering candidate
/// sets, so it avoids allocating intermediate points.
pub fn haversine_to_point(lats: &[f64], lons: &[f64], to: Point<f64>) -> Vec<f64> {
    assert_eq!(lats.len(), lons.len());

    let lat2 = to.y().to_radians();
    let cos_lat2 = lat2.cos();

    lats.iter()
        .zip(lons.iter())
        .map(|(&lat, &lon)| {
            let lat1 = lat.to_radians();
            let d_lat = (to.y() - lat).to_radians();
            let d_lon = (to.x() - lon).to_radians();
            let a =
                (d_lat / 2.0).sin().powi(2) + lat1.cos() * cos_lat2 * (d_lon / 2.0).sin().powi(2);
            let a = a.clamp(0.0, 1.0);
            EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
        })
        .collect()
}

/// Elementwise haversine distance over equal-length coordinate arrays
pub fn haversine_elementwise(
    lats1: &[f64],
    lons1: &[f64],
    lats2: &[f64],
    lons2: &[f64],
) -> Vec<f64> {
    assert_eq!(lats1.len(), lons1.len());
    assert_eq!(lats2.len(), lons2.len());
    assert_eq!(lats1.len(), lats2.len());

    (0..lats1.len())
        .map(|i| {
            haversine(
                Point::new(lons1[i], lats1[i]),
                Point::new(lons2[i], lats2[i]),
            )
        })
        .collect()
}

/// Full pairwise distance matrix between two location arrays
///
/// Row `i` holds the distances from `(lats1[i], lons1[i])` to every location
/// in the second array. Rows are computed in parallel; used for bulk
/// candidate scoring.
pub fn haversine_matrix(
    lats1: &[f64],
    lons1: &[f64],
    lats2: &[f64],
    lons2: &[f64],
) -> Vec<Vec<f64>> {
    assert_eq!(lats1.len(), lons1.len());
    assert_eq!(lats2.len(), lons2.len());

    lats1
        .par_iter()
        .zip(lons1.par_iter())
        .map(|(&lat, &lon)| haversine_to_point(lats2, lons2, Point::new(lon, lat)))
        .collect()
}

/// Destination point from a start location, a bearing and a distance
///
/// # Arguments
/// * `from` - Start location
/// * `bearing_deg` - Bearing in degrees, north is zero, measured clockwise
/// * `meters` - Distance to displace from the start location
#[inline]
pub fn displace(from: Point<f64>, bearing_deg: f64, meters: f64) -> Point<f64> {
    let delta = meters / EARTH_RADIUS_M;
    let theta = bearing_deg.to_radians();
    let lat1 = from.y().to_radians();
    let lon1 = from.x().to_radians();

    let lat2 = (lat1.sin() * delta.cos() + lat1.cos() * delta.sin() * theta.cos()).asin();
    let lon2 = lon1
        + (theta.sin() * delta.sin() * lat1.cos()).atan2(delta.cos() - lat1.sin() * lat2.sin());

    Point::new(lon2.to_degrees(), lat2.to_degrees())
}

/// Bearings along a path of consecutive locations
///
/// Returns one bearing per consecutive pair, in degrees `[0, 360)`. Embedding
/// trajectory pipelines use this to derive the observed heading passed to the
/// matcher.
pub fn path_bearings(lats: &[f64], lons: &[f64]) -> Vec<f64> {
    assert_eq!(lats.len(), lons.len());
    if lats.len() < 2 {
        return Vec::new();
    }

    (0..lats.len() - 1)
        .map(|i| {
            let lat0 = lats[i].to_radians();
            let lat1 = lats[i + 1].to_radians();
            let d_lon = (lons[i + 1] - lons[i]).to_radians();

            let y = d_lon.sin() * lat1.cos();
            let x = lat0.cos() * lat1.sin() - lat0.sin() * lat1.cos() * d_lon.cos();
            (y.atan2(x).to_degrees() + 360.0) % 360.0
        })
        .collect()
}
