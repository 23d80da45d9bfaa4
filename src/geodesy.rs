//! Spherical-Earth geodesy between two GPS fixes.
//!
//! No ellipsoid correction is applied; at photo-sequence spacing (meters to
//! a few hundred meters) the difference is far below GPS noise.

/// Mean Earth radius used by [`distance`], in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Initial compass bearing from `point_a` to `point_b`.
///
/// Both points are `(latitude, longitude)` in decimal degrees. The result is
/// in degrees clockwise from north, normalized to `[0, 360)`. Identical
/// points give `0.0`.
///
/// ```rust
/// use azipi::geodesy::bearing;
///
/// let east = bearing((0.0, 0.0), (0.0, 1.0));
/// assert!((east - 90.0).abs() < 1e-9);
/// ```
pub fn bearing(point_a: (f64, f64), point_b: (f64, f64)) -> f64 {
    let lat1 = point_a.0.to_radians();
    let lat2 = point_b.0.to_radians();
    let diff_long = (point_b.1 - point_a.1).to_radians();

    let x = diff_long.sin() * lat2.cos();
    let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * diff_long.cos();

    let initial = x.atan2(y).to_degrees();
    let compass = (initial + 360.0) % 360.0;

    // -1e-15 + 360 rounds to exactly 360.0, which the modulo maps to 0.0.
    if compass >= 360.0 { 0.0 } else { compass }
}

/// Haversine great-circle distance in meters.
///
/// Note the argument order: longitude first for each point.
pub fn distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let (lon1, lat1, lon2, lat2) = (
        lon1.to_radians(),
        lat1.to_radians(),
        lon2.to_radians(),
        lat2.to_radians(),
    );
    let dlon = lon2 - lon1;
    let dlat = lat2 - lat1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair above 1.0 for antipodal points.
    let c = 2.0 * a.sqrt().min(1.0).asin();

    c * EARTH_RADIUS_KM * 1000.0
}
