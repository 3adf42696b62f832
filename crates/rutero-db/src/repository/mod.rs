//! # Repository Module
//!
//! Database repository implementations for Rutero.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern Explained                         │
//! │                                                                         │
//! │  The Repository pattern abstracts database access behind a clean API.  │
//! │                                                                         │
//! │  Dispatch engine                                                       │
//! │       │                                                                 │
//! │       │  db.orders().assign_if_unassigned(order_id, dist_id)           │
//! │       │  ↓                                                              │
//! │       ▼                                                                 │
//! │  OrderRepository                                                       │
//! │  ├── get_by_id(&self, id)                                              │
//! │  ├── list_unassigned(&self, scope)                                     │
//! │  ├── assign_if_unassigned(&self, order_id, distributor_id)             │
//! │  └── mark_delivered_if_open(&self, order_id, observation, coords)      │
//! │       │                                                                 │
//! │       │  single conditional SQL statement                               │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! │                                                                         │
//! │  The conditional writes return whether the row actually changed, so   │
//! │  callers can detect a lost optimistic race without a transaction.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`order::OrderRepository`] - Order queries + conditional transitions
//! - [`distributor::DistributorRepository`] - Distributor registry
//! - [`payment::PaymentRepository`] - Payment inserts + state transitions

pub mod distributor;
pub mod order;
pub mod payment;
