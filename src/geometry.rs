//! Degenerate-safe triangle geometry for edge scoring
//!
//! Edge candidates are scored from the three side lengths of the triangle
//! formed by the query location and the two edge endpoints. Road-snapping
//! triangles are routinely near-degenerate (the query sits almost exactly on
//! the edge), so the area computation uses the numerically stable sorted form
//! of Heron's formula.

/// Triangle area from three side lengths
///
/// Uses the Kahan rearrangement of Heron's formula: with the sides sorted so
/// that `a >= b >= c`, the product `(a+(b+c))(c-(a-b))(c+(a-b))(a+(b-c))`
/// loses far less precision than the textbook semiperimeter form. A slightly
/// negative product from rounding on a flat triangle is clamped to zero
/// instead of producing NaN.
pub fn heron_area(a: f64, b: f64, c: f64) -> f64 {
    let mut s = [a, b, c];
    s.sort_unstable_by(|x, y| y.total_cmp(x));
    let [a, b, c] = s;

    let product = (a + (b + c)) * (c - (a - b)) * (c + (a - b)) * (a + (b - c));
    product.max(0.0).sqrt() / 4.0
}

/// Height of the triangle over the side of length `base`
///
/// For edge scoring this is the perpendicular distance from the query
/// location to the edge's supporting line.
#[inline]
pub fn heron_height(a: f64, b: f64, c: f64, base: f64) -> f64 {
    2.0 * heron_area(a, b, c) / base
}

/// Minimum distance from a query location to a segment, from side lengths
///
/// `a` and `c` are the distances from the query to the two endpoints and `b`
/// is the segment length. When the angle at either endpoint is obtuse the
/// perpendicular foot falls outside the segment and the nearest point is an
/// endpoint; otherwise the distance is the triangle height over `b`. A
/// zero-length segment degenerates to its endpoints, so the distance is
/// `min(a, c)` without dividing by the base.
pub fn point_to_segment_distance(a: f64, b: f64, c: f64) -> f64 {
    if b <= 0.0 || a * a > b * b + c * c || c * c > a * a + b * b {
        a.min(c)
    } else {
        heron_height(a, b, c, b)
    }
}

/// Cosine alignment between a stored edge bearing and an observed bearing
///
/// Both in degrees clockwise from north. Larger is better aligned; the
/// cosine handles the 0/360 wraparound without any modulo logic.
#[inline]
pub fn bearing_alignment(stored_deg: f64, observed_deg: f64) -> f64 {
    (stored_deg - observed_deg).to_radians().cos()
}
