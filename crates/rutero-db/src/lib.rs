//! # rutero-db: Database Layer for Rutero
//!
//! This crate provides database access for the Rutero dispatch service.
//! It uses SQLite for storage with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Rutero Data Flow                               │
//! │                                                                         │
//! │  Dispatch engine (reconcile_unassigned, create_payment, ...)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     rutero-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐    ┌──────────────┐ │   │
//! │  │   │   Database    │    │  Repositories  │    │  Migrations  │ │   │
//! │  │   │   (pool.rs)   │    │ (order.rs ...) │    │  (embedded)  │ │   │
//! │  │   │               │    │                │    │              │ │   │
//! │  │   │ SqlitePool    │◄───│ OrderRepo      │    │ 001_init.sql │ │   │
//! │  │   │ Connection    │    │ DistributorRepo│    │              │ │   │
//! │  │   │ Management    │    │ PaymentRepo    │    │              │ │   │
//! │  │   └───────────────┘    └────────────────┘    └──────────────┘ │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │                         SQLite Database                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Conditional Updates
//!
//! The dispatch engines never do read-then-save on shared rows. Every
//! contended mutation is a single conditional UPDATE whose WHERE clause
//! names the expected prior state ("assign only while unassigned",
//! "complete only while pending", "deliver only while undelivered"), and
//! the repository reports whether the row was actually changed. SQLite
//! executes each statement atomically, which is all the serialization the
//! engines need.
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Repository implementations (order, distributor, payment)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rutero_db::{Database, DbConfig};
//!
//! let config = DbConfig::new("path/to/rutero.db");
//! let db = Database::new(config).await?;
//!
//! let open = db.orders().list_open_for_distributor("d-1", 23).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::distributor::{DistributorRepository, NewDistributor};
pub use repository::order::{NewOrder, OrderRepository, UnassignedScope};
pub use repository::payment::{NewPayment, PaymentRepository};
