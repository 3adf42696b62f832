//! # Routing Provider Boundary
//!
//! The directions/geocoding seam and its Google-Maps-backed implementation.
//!
//! ## Boundary Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Routing Provider Boundary                           │
//! │                                                                         │
//! │  RoutePlanner ──► RoutingProvider::optimized_route(origin, stops)      │
//! │                        │                                                │
//! │                        ▼                                                │
//! │  one HTTP call: origin, ordered destinations, optimize flag            │
//! │                        │                                                │
//! │                        ▼                                                │
//! │  OptimizedRoute {                                                      │
//! │      polyline,            ← overview geometry                          │
//! │      legs[distance/time], ← per-leg meters/seconds                     │
//! │      waypoint_order,      ← permutation of input indices               │
//! │  }                                                                      │
//! │                                                                         │
//! │  Non-"OK" provider status → typed RoutingProvider error; transport     │
//! │  failures and timeouts surface the same way, never as silent success.  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use rutero_core::geo::Point;

use crate::error::{DispatchError, DispatchResult};

// =============================================================================
// Boundary Types
// =============================================================================

/// One leg of a computed route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteLeg {
    /// Leg length in meters.
    pub distance_m: i64,
    /// Leg driving time in seconds.
    pub duration_s: i64,
}

/// Provider response mapped to the boundary contract.
#[derive(Debug, Clone)]
pub struct OptimizedRoute {
    /// Encoded overview polyline, when the provider returns one.
    pub polyline: Option<String>,
    /// Per-leg figures; origin→stop1, stop1→stop2, ...
    pub legs: Vec<RouteLeg>,
    /// The visiting order as a permutation of input stop indices. Empty
    /// means the provider applied no reordering.
    pub waypoint_order: Vec<usize>,
}

/// Directions seam. One call per plan; the provider reorders waypoints
/// internally when `optimize` is set.
#[async_trait]
pub trait RoutingProvider: Send + Sync {
    /// Computes a route from `origin` through every stop, ending at the
    /// last stop in input order.
    async fn optimized_route(
        &self,
        origin: Point,
        stops: &[Point],
        optimize: bool,
    ) -> DispatchResult<OptimizedRoute>;
}

/// Reverse-geocoding seam, used by simulated intake to resolve a delivery
/// address from coordinates.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Best-effort address for a point; `None` when the provider has no
    /// result for it.
    async fn reverse_geocode(&self, point: Point) -> DispatchResult<Option<String>>;
}

// =============================================================================
// Google Maps Client
// =============================================================================

const DIRECTIONS_URL: &str = "https://maps.googleapis.com/maps/api/directions/json";
const GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

/// Google Directions/Geocoding client.
///
/// Holds a dedicated reqwest client so the request timeout applies to every
/// provider call; a timeout surfaces as a `RoutingProvider` error, not a
/// hung plan.
#[derive(Debug, Clone)]
pub struct GoogleMapsClient {
    http: reqwest::Client,
    api_key: String,
}

impl GoogleMapsClient {
    /// Creates a client with the given API key and per-request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> DispatchResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(DispatchError::Configuration(
                "routing API key is empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Configuration(format!("HTTP client: {e}")))?;

        Ok(GoogleMapsClient { http, api_key })
    }

    fn transport_error(e: reqwest::Error) -> DispatchError {
        let status = if e.is_timeout() { "TIMEOUT" } else { "TRANSPORT" };
        DispatchError::RoutingProvider {
            status: status.to_string(),
            reason: e.to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// Wire types (only the fields the core consumes)
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct DirectionsResponse {
    status: String,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    routes: Vec<DirectionsRoute>,
}

#[derive(Debug, Deserialize)]
struct DirectionsRoute {
    #[serde(default)]
    overview_polyline: Option<OverviewPolyline>,
    #[serde(default)]
    legs: Vec<DirectionsLeg>,
    #[serde(default)]
    waypoint_order: Vec<usize>,
}

#[derive(Debug, Deserialize)]
struct OverviewPolyline {
    points: String,
}

#[derive(Debug, Deserialize)]
struct DirectionsLeg {
    #[serde(default)]
    distance: Option<ValueField>,
    #[serde(default)]
    duration: Option<ValueField>,
}

#[derive(Debug, Deserialize)]
struct ValueField {
    value: i64,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    formatted_address: String,
}

#[async_trait]
impl RoutingProvider for GoogleMapsClient {
    async fn optimized_route(
        &self,
        origin: Point,
        stops: &[Point],
        optimize: bool,
    ) -> DispatchResult<OptimizedRoute> {
        // The planner never calls with zero stops, but guard anyway: the
        // provider rejects a request without a destination.
        let destination = stops.last().ok_or_else(|| {
            DispatchError::InvalidInput("route requires at least one stop".to_string())
        })?;

        let waypoints = stops
            .iter()
            .map(Point::to_waypoint)
            .collect::<Vec<_>>()
            .join("|");
        let waypoints = if optimize {
            format!("optimize:true|{waypoints}")
        } else {
            waypoints
        };

        debug!(stops = stops.len(), optimize, "Requesting directions");

        let response = self
            .http
            .get(DIRECTIONS_URL)
            .query(&[
                ("origin", origin.to_waypoint()),
                ("destination", destination.to_waypoint()),
                ("waypoints", waypoints),
                ("mode", "driving".to_string()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(Self::transport_error)?
            .error_for_status()
            .map_err(Self::transport_error)?;

        let body: DirectionsResponse = response.json().await.map_err(Self::transport_error)?;

        if body.status != "OK" {
            return Err(DispatchError::RoutingProvider {
                reason: body
                    .error_message
                    .unwrap_or_else(|| "provider returned a non-success status".to_string()),
                status: body.status,
            });
        }

        let route = body.routes.into_iter().next().ok_or_else(|| {
            DispatchError::RoutingProvider {
                status: "OK".to_string(),
                reason: "response contained no routes".to_string(),
            }
        })?;

        Ok(OptimizedRoute {
            polyline: route.overview_polyline.map(|p| p.points),
            legs: route
                .legs
                .into_iter()
                .map(|leg| RouteLeg {
                    distance_m: leg.distance.map(|d| d.value).unwrap_or(0),
                    duration_s: leg.duration.map(|d| d.value).unwrap_or(0),
                })
                .collect(),
            waypoint_order: route.waypoint_order,
        })
    }
}

#[async_trait]
impl Geocoder for GoogleMapsClient {
    async fn reverse_geocode(&self, point: Point) -> DispatchResult<Option<String>> {
        let response = self
            .http
            .get(GEOCODE_URL)
            .query(&[
                ("latlng", point.to_waypoint()),
                ("key", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(Self::transport_error)?
            .error_for_status()
            .map_err(Self::transport_error)?;

        let body: GeocodeResponse = response.json().await.map_err(Self::transport_error)?;

        // ZERO_RESULTS is a valid "no address here", not a failure.
        if body.status != "OK" {
            return Ok(None);
        }

        Ok(body.results.into_iter().next().map(|r| r.formatted_address))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_empty_api_key() {
        let err = GoogleMapsClient::new("  ", Duration::from_secs(10)).unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
    }

    #[test]
    fn test_directions_response_parses_provider_shape() {
        let json = r#"{
            "status": "OK",
            "routes": [{
                "overview_polyline": { "points": "abc123" },
                "legs": [
                    { "distance": { "value": 1200 }, "duration": { "value": 300 } },
                    { "distance": { "value": 800 },  "duration": { "value": 240 } }
                ],
                "waypoint_order": [1, 0]
            }]
        }"#;

        let parsed: DirectionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.status, "OK");
        let route = &parsed.routes[0];
        assert_eq!(route.waypoint_order, vec![1, 0]);
        assert_eq!(route.legs.len(), 2);
        assert_eq!(route.legs[0].distance.as_ref().unwrap().value, 1200);
    }

    #[test]
    fn test_directions_response_tolerates_missing_fields() {
        let json = r#"{ "status": "ZERO_RESULTS" }"#;
        let parsed: DirectionsResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.status, "ZERO_RESULTS");
        assert!(parsed.routes.is_empty());
        assert!(parsed.error_message.is_none());
    }

    #[test]
    fn test_geocode_response_parses() {
        let json = r#"{
            "status": "OK",
            "results": [{ "formatted_address": "Av. Banzer 123, Santa Cruz" }]
        }"#;
        let parsed: GeocodeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.results[0].formatted_address, "Av. Banzer 123, Santa Cruz");
    }
}
