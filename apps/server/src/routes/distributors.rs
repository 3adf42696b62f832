//! Distributor registry, sign-in location updates, and the driver-facing
//! views: open orders, optimized routes, statistics and history.

use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use rutero_core::geo::Point;
use rutero_core::validation::validate_coordinates;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router(_state: AppState) -> Router<AppState> {
    Router::new()
        .route("/distributors", get(list_distributors))
        .route("/distributors/register", post(register_distributor))
        .route("/distributors/sign-in", post(record_sign_in))
        .route("/distributors/{id}", get(get_distributor))
        .route("/distributors/{id}/orders", get(open_orders))
        .route("/distributors/{id}/route", get(plan_route))
        .route("/distributors/{id}/route/custom", post(plan_custom_route))
        .route("/distributors/{id}/stats", get(stats))
        .route("/distributors/{id}/history", get(history))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    name: Option<String>,
    min_capacity: Option<i64>,
}

async fn list_distributors(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiError> {
    let distributors = if let Some(name) = query.name {
        state.directory.search_by_name(&name).await?
    } else if let Some(min) = query.min_capacity {
        state.directory.list_with_min_capacity(min).await?
    } else {
        state.directory.list_all().await?
    };

    Ok(Json(json!({ "distributors": distributors })))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    owner_id: String,
    name: String,
    contact: String,
}

/// Registration events from the identity provider: one distributor per
/// owner, replay-safe.
async fn register_distributor(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<Value>, ApiError> {
    let distributor = state
        .directory
        .register_owner(&body.owner_id, &body.name, &body.contact)
        .await?;
    Ok(Json(json!({ "distributor": distributor })))
}

#[derive(Debug, Deserialize)]
struct SignInRequest {
    owner_id: String,
    lat: f64,
    lng: f64,
}

/// Sign-in events from the identity provider carrying the driver's
/// position. Authentication happened upstream.
async fn record_sign_in(
    State(state): State<AppState>,
    Json(body): Json<SignInRequest>,
) -> Result<Json<Value>, ApiError> {
    let distributor = state
        .directory
        .record_sign_in(&body.owner_id, body.lat, body.lng)
        .await?;
    Ok(Json(json!({ "distributor": distributor })))
}

async fn get_distributor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let distributor = state.directory.get(&id).await?;
    Ok(Json(json!({ "distributor": distributor })))
}

async fn open_orders(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let orders = state.directory.open_orders(&id).await?;
    Ok(Json(json!({ "orders": orders })))
}

#[derive(Debug, Deserialize)]
struct RouteQuery {
    lat: f64,
    lng: f64,
}

async fn plan_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<RouteQuery>,
) -> Result<Json<Value>, ApiError> {
    let start: Point = validate_coordinates(query.lat, query.lng)
        .map_err(rutero_dispatch::DispatchError::Validation)?;

    let plan = state.planner.plan_route(&id, start).await?;
    Ok(Json(json!({ "plan": plan })))
}

#[derive(Debug, Deserialize)]
struct CustomRouteRequest {
    lat: f64,
    lng: f64,
    order_ids: Vec<String>,
}

async fn plan_custom_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CustomRouteRequest>,
) -> Result<Json<Value>, ApiError> {
    let start: Point = validate_coordinates(body.lat, body.lng)
        .map_err(rutero_dispatch::DispatchError::Validation)?;

    let plan = state
        .planner
        .plan_custom_route(&id, start, &body.order_ids)
        .await?;
    Ok(Json(json!({ "plan": plan })))
}

async fn stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let stats = state.directory.stats(&id).await?;
    Ok(Json(json!({ "stats": stats })))
}

async fn history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let deliveries = state.directory.history(&id).await?;
    Ok(Json(json!({ "deliveries": deliveries })))
}
