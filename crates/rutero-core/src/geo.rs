//! # Geo Module
//!
//! Great-circle distance between coordinates.
//!
//! ## Where This Is Used
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Nearest-Distributor Matching                        │
//! │                                                                         │
//! │  Order (lat, lon) ──┐                                                  │
//! │                     ├──► distance_km(order, distributor) per candidate │
//! │  Distributor A ─────┤         │                                        │
//! │  Distributor B ─────┘         ▼                                        │
//! │                        minimum distance wins                           │
//! │                                                                         │
//! │  EVERY assignment decision in the system flows through this function   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Contract
//! `distance_km` is pure and total: no error cases, no I/O. Callers must
//! reject unknown/NaN coordinates *before* calling it (see
//! `validation::validate_coordinates`); the function itself does not.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers (spherical model).
const EARTH_RADIUS_KM: f64 = 6371.0;

// =============================================================================
// Point
// =============================================================================

/// A WGS84-style latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    /// Creates a point from decimal-degree latitude and longitude.
    #[inline]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Point { lat, lon }
    }

    /// Formats the point as `"lat,lon"` the way routing providers expect
    /// waypoints to be written.
    pub fn to_waypoint(&self) -> String {
        format!("{},{}", self.lat, self.lon)
    }
}

// =============================================================================
// Haversine Distance
// =============================================================================

/// Converts decimal degrees to radians.
#[inline]
fn deg2rad(deg: f64) -> f64 {
    deg * (std::f64::consts::PI / 180.0)
}

/// Great-circle distance between two points, in kilometers.
///
/// Uses the haversine formula on a spherical Earth of radius 6371 km.
/// Accurate to well under 0.5% for delivery-scale distances, which is more
/// than enough to rank distributors by proximity.
///
/// ## Example
/// ```rust
/// use rutero_core::geo::{distance_km, Point};
///
/// let a = Point::new(-17.7833, -63.1821);
/// let b = Point::new(-17.7833, -63.1821);
/// assert_eq!(distance_km(a, b), 0.0);
/// ```
pub fn distance_km(a: Point, b: Point) -> f64 {
    let d_lat = deg2rad(b.lat - a.lat);
    let d_lon = deg2rad(b.lon - a.lon);

    let h = (d_lat / 2.0).sin().powi(2)
        + deg2rad(a.lat).cos() * deg2rad(b.lat).cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_KM * c
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = Point::new(-17.78, -63.18);
        assert_eq!(distance_km(p, p), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = Point::new(-17.7833, -63.1821);
        let b = Point::new(-16.5000, -68.1500);
        let ab = distance_km(a, b);
        let ba = distance_km(b, a);
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn test_known_distance() {
        // Santa Cruz de la Sierra -> La Paz is roughly 550 km great-circle.
        let santa_cruz = Point::new(-17.7833, -63.1821);
        let la_paz = Point::new(-16.5000, -68.1500);
        let d = distance_km(santa_cruz, la_paz);
        assert!(d > 500.0 && d < 600.0, "got {d}");
    }

    #[test]
    fn test_small_offsets_rank_correctly() {
        let origin = Point::new(-17.78, -63.18);
        let near = Point::new(-17.79, -63.19); // ~1.6 km
        let far = Point::new(-17.85, -63.25);  // ~11 km
        assert!(distance_km(origin, near) < distance_km(origin, far));
    }

    #[test]
    fn test_to_waypoint_format() {
        let p = Point::new(-17.78, -63.18);
        assert_eq!(p.to_waypoint(), "-17.78,-63.18");
    }
}
