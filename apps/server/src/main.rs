//! # Rutero Server
//!
//! HTTP shell for the dispatch and fulfillment core.
//!
//! ## Boot Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  .env ──► config ──► SQLite (+ migrations) ──► engines                 │
//! │                                        │                                │
//! │                                        ├──► reconcile scheduler        │
//! │                                        │    (background, 5 min)        │
//! │                                        │                                │
//! │                                        └──► axum router (port 8080)    │
//! │                                                                         │
//! │  SIGINT/SIGTERM ──► stop accepting ──► scheduler.shutdown ──► db.close │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde_json::{json, Value};
use tracing::info;

use rutero_db::{Database, DbConfig};
use rutero_dispatch::{
    AssignmentEngine, DistributorDirectory, GoogleMapsClient, OrderService, PaymentGateway,
    PaymentProcessor, ReconcileScheduler, RoutePlanner, RoutingProvider, StripeCheckout,
};

use crate::config::ServerConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env for local development; absent in production is fine.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    info!("Starting Rutero server...");

    let config = ServerConfig::load()?;
    info!(
        port = config.http_port,
        database = %config.database_path,
        routing = config.maps_api_key.is_some(),
        gateway = config.gateway_secret_key.is_some(),
        "Configuration loaded"
    );

    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("Database ready");

    // Provider clients are optional: a missing credential disables that
    // boundary (calls fail with a configuration error) without stopping
    // the process.
    let maps_client = match &config.maps_api_key {
        Some(key) => Some(Arc::new(GoogleMapsClient::new(
            key.clone(),
            config.provider_timeout(),
        )?)),
        None => {
            tracing::warn!("GOOGLE_MAPS_API_KEY not set; route planning is disabled");
            None
        }
    };
    let routing: Option<Arc<dyn RoutingProvider>> =
        maps_client.clone().map(|c| c as Arc<dyn RoutingProvider>);
    let geocoder = maps_client
        .clone()
        .map(|c| c as Arc<dyn rutero_dispatch::Geocoder>);

    let gateway: Option<Arc<dyn PaymentGateway>> = match &config.gateway_secret_key {
        Some(secret) => Some(Arc::new(StripeCheckout::new(
            secret.clone(),
            config.checkout_currency.clone(),
            config.checkout_success_url.clone(),
            config.checkout_cancel_url.clone(),
            config.provider_timeout(),
        )?)),
        None => {
            tracing::warn!("STRIPE_SECRET_KEY not set; gateway payments are disabled");
            None
        }
    };

    let assignment = AssignmentEngine::new(db.clone());
    let state = AppState {
        db: db.clone(),
        assignment: assignment.clone(),
        planner: RoutePlanner::new(db.clone(), routing),
        payments: PaymentProcessor::new(db.clone(), gateway),
        orders: OrderService::new(db.clone(), geocoder),
        directory: DistributorDirectory::new(db.clone()),
        config: Arc::new(config.clone()),
    };

    // The recurring reconciliation pass: started at boot, stopped at
    // shutdown, same engine entry point as POST /orders/assign.
    let scheduler = ReconcileScheduler::spawn(assignment, config.reconcile_interval());

    let app = Router::new()
        .route("/health", get(health))
        .merge(routes::router(state.clone()))
        .with_state(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!(%addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await;
    db.close().await;

    info!("Server shutdown complete");
    Ok(())
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Json<Value> {
    let db_status = if state.db.health_check().await {
        "connected"
    } else {
        "unavailable"
    };
    Json(json!({ "status": "ok", "database": db_status }))
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
