//! # rutero-dispatch: Dispatch & Fulfillment Engines
//!
//! This crate contains the hard parts of Rutero: matching unassigned orders
//! to the nearest distributor without double-assignment, planning optimized
//! multi-stop routes through an external directions provider, and settling
//! payments - synchronously for local methods, asynchronously through
//! gateway webhooks - while flipping each order to `delivered` exactly once.
//!
//! ## Control Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  intake ──► unassigned order                                           │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │  AssignmentEngine (manual trigger or 5-min scheduler)                  │
//! │                  │ conditional write: "only while unassigned"          │
//! │                  ▼                                                      │
//! │  RoutePlanner ──► optimized itinerary for the distributor              │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │  PaymentProcessor                                                      │
//! │    ├── cash/transfer: completed payment + delivered, synchronously     │
//! │    └── qr/gateway: pending payment + checkout URL ──► webhook ──►      │
//! │        confirm (idempotent) ──► delivered                              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency Rules
//!
//! 1. Every contended mutation is a conditional repository write; a lost
//!    race is retried at most once, then surfaced as
//!    [`error::DispatchError::ConcurrentModification`].
//! 2. No lock or transaction is held across a provider call; gateway and
//!    directions requests happen before/after the local state transition.
//! 3. Entities are never cached across operations - every decision rereads
//!    the store.

// =============================================================================
// Module Declarations
// =============================================================================

pub mod assignment;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod orders;
pub mod payments;
pub mod planner;
pub mod routing;
pub mod scheduler;

// =============================================================================
// Re-exports
// =============================================================================

pub use assignment::{AssignmentEngine, ReconcileReport};
pub use directory::DistributorDirectory;
pub use error::{DispatchError, DispatchResult};
pub use gateway::{CheckoutSession, PaymentGateway, StripeCheckout};
pub use orders::{CreateOrder, OrderDetail, OrderService};
pub use payments::{PaymentOutcome, PaymentProcessor};
pub use planner::RoutePlanner;
pub use routing::{Geocoder, GoogleMapsClient, OptimizedRoute, RouteLeg, RoutingProvider};
pub use scheduler::{ReconcileScheduler, SchedulerHandle};
