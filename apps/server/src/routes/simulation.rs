//! Simulated order ingestion and its monitoring listing.

use axum::{extract::State, routing::post, Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use rutero_core::geo::Point;
use rutero_core::OrderOrigin;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(_state: AppState) -> Router<AppState> {
    Router::new().route("/simulation/orders", post(ingest_orders).get(list_orders))
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    count: usize,
    lat: f64,
    lng: f64,
    /// Scatter radius around the center, defaults to 5 km.
    radius_km: Option<f64>,
}

async fn ingest_orders(
    State(state): State<AppState>,
    Json(body): Json<IngestRequest>,
) -> Result<Json<Value>, ApiError> {
    let orders = state
        .orders
        .simulate_orders(
            body.count,
            Point::new(body.lat, body.lng),
            body.radius_km.unwrap_or(5.0),
        )
        .await?;

    Ok(Json(json!({
        "message": format!("{} simulated orders created", orders.len()),
        "orders": orders,
    })))
}

async fn list_orders(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let orders = state
        .orders
        .list_recent(OrderOrigin::Simulated, 100)
        .await?;
    Ok(Json(json!({ "orders": orders })))
}
