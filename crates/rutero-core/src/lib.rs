//! # rutero-core: Pure Business Logic for Rutero
//!
//! This crate is the **heart** of Rutero, a dispatch and fulfillment service
//! for a goods-distribution business. It contains all business logic as pure
//! functions and types with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Rutero Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    HTTP API (apps/server)                       │   │
//! │  │    intake ──► assignment ──► routing ──► payment ──► delivered  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │              rutero-dispatch (Engines & Providers)              │   │
//! │  │    AssignmentEngine, RoutePlanner, PaymentProcessor             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ rutero-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │    geo    │  │   money   │  │ validation│  │   │
//! │  │   │   Order   │  │ haversine │  │   Money   │  │   rules   │  │   │
//! │  │   │Distributor│  │   Point   │  │  (cents)  │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    rutero-db (Database Layer)                   │   │
//! │  │              SQLite queries, migrations, repositories           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Order, Distributor, Payment, RoutePlan)
//! - [`geo`] - Great-circle distance on coordinates
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic - same input = same output
//! 2. **No I/O**: Database, network, file system access is FORBIDDEN here
//! 3. **Integer Money**: All monetary values are in cents (i64) to avoid float errors
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use rutero_core::geo::{distance_km, Point};
//!
//! let warehouse = Point::new(-17.7833, -63.1821);
//! let customer = Point::new(-17.8000, -63.2000);
//!
//! // Great-circle distance on a spherical Earth (km)
//! let d = distance_km(warehouse, customer);
//! assert!(d > 0.0 && d < 5.0);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod geo;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use rutero_core::Money` instead of
// `use rutero_core::money::Money`

pub use error::{CoreError, ValidationError};
pub use geo::{distance_km, Point};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum number of delivery stops in a single routing request.
///
/// The external directions provider accepts at most 23 waypoints per
/// request, so route planning loads at most this many open orders.
pub const MAX_ROUTE_WAYPOINTS: usize = 23;

/// Default capacity assigned to a distributor created from a sign-up event.
pub const DEFAULT_DISTRIBUTOR_CAPACITY: i64 = 10;
