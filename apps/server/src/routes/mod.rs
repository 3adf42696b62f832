//! HTTP route modules.
//!
//! Thin handlers only: each one validates/extracts, calls a dispatch
//! engine, and maps the result to JSON. Business rules live in
//! `rutero-dispatch`.

use axum::Router;

use crate::state::AppState;

pub mod distributors;
pub mod orders;
pub mod payments;
pub mod simulation;

/// Build the application router.
pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(orders::router(state.clone()))
        .merge(distributors::router(state.clone()))
        .merge(payments::router(state.clone()))
        .merge(simulation::router(state))
}
