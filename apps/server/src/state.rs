//! Shared app state for Axum handlers.
//!
//! One engine instance of each kind is built at boot and cloned into every
//! handler; all of them share the same database pool, so nothing is cached
//! across requests.

use std::sync::Arc;

use rutero_db::Database;
use rutero_dispatch::{
    AssignmentEngine, DistributorDirectory, OrderService, PaymentProcessor, RoutePlanner,
};

use crate::config::ServerConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub assignment: AssignmentEngine,
    pub planner: RoutePlanner,
    pub payments: PaymentProcessor,
    pub orders: OrderService,
    pub directory: DistributorDirectory,
    pub config: Arc<ServerConfig>,
}
