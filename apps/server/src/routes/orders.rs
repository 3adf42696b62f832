//! Order intake, tracking, delivery registration and the manual
//! assignment trigger.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use rutero_core::OrderStatus;
use rutero_db::UnassignedScope;
use rutero_dispatch::CreateOrder;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/assign", post(assign_pending))
        .route("/orders/{id}", get(get_order).delete(remove_order))
        .route("/orders/{id}/status", get(get_order_status))
        .route("/orders/{id}/delivery", post(register_delivery))
}

async fn create_order(
    State(state): State<AppState>,
    Json(body): Json<CreateOrder>,
) -> Result<Json<Value>, ApiError> {
    let order = state.orders.create_order(body).await?;
    Ok(Json(json!({ "order": order })))
}

/// Manual reconciliation pass over every origin. Shares the engine entry
/// point with the 5-minute scheduler (which is scoped to simulated orders).
async fn assign_pending(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let report = state
        .assignment
        .reconcile_unassigned(UnassignedScope::AllOrigins)
        .await?;

    Ok(Json(json!({
        "message": format!("Assignment complete: {}/{} orders assigned", report.assigned, report.total),
        "assigned": report.assigned,
        "total": report.total,
    })))
}

async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let detail = state.orders.get_detail(&id).await?;
    Ok(Json(json!({
        "order": detail.order,
        "payments": detail.payments,
    })))
}

async fn get_order_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let (status, paid) = state.orders.get_status(&id).await?;
    Ok(Json(json!({ "status": status, "paid": paid })))
}

#[derive(Debug, Deserialize)]
struct RegisterDeliveryRequest {
    status: String,
    observation: Option<String>,
    lat: f64,
    lng: f64,
}

async fn register_delivery(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<RegisterDeliveryRequest>,
) -> Result<Json<Value>, ApiError> {
    let status: OrderStatus = body
        .status
        .parse()
        .map_err(rutero_dispatch::DispatchError::Validation)?;

    let order = state
        .orders
        .register_delivery(&id, status, body.observation, body.lat, body.lng)
        .await?;

    Ok(Json(json!({ "order": order })))
}

async fn remove_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state.orders.remove(&id).await?;
    Ok(Json(json!({ "deleted": true })))
}
