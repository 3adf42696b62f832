//! # Distributor Directory
//!
//! Distributor registry operations: creation from identity registration,
//! sign-in coordinate updates, the driver's open-order listing, statistics
//! and delivery history.
//!
//! ## Identity Boundary
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  registration event (owner_id, name, contact)                          │
//! │       └── register_owner: one distributor per identity owner,          │
//! │           default vehicle/capacity, idempotent                        │
//! │                                                                         │
//! │  sign-in event (owner_id, lat, lon)                                    │
//! │       └── record_sign_in: refresh last-known coordinates - the sole    │
//! │           input to nearest-match assignment                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Authentication itself happens upstream; these entry points consume
//! already-authenticated events.

use tracing::{info, warn};

use rutero_core::validation::{validate_coordinates, validate_name};
use rutero_core::{Distributor, DistributorStats, Order, DEFAULT_DISTRIBUTOR_CAPACITY};
use rutero_db::{Database, NewDistributor};

use crate::error::{DispatchError, DispatchResult};

/// How many delivered orders the history view returns.
const HISTORY_LIMIT: i64 = 50;

// =============================================================================
// Distributor Directory
// =============================================================================

/// Registry operations over the distributor store.
#[derive(Debug, Clone)]
pub struct DistributorDirectory {
    db: Database,
}

impl DistributorDirectory {
    /// Creates a new directory.
    pub fn new(db: Database) -> Self {
        DistributorDirectory { db }
    }

    /// Ensures a distributor exists for an identity owner.
    ///
    /// Called on registration events. Idempotent: an existing distributor
    /// for the owner is returned unchanged, so replayed events are safe.
    pub async fn register_owner(
        &self,
        owner_id: &str,
        name: &str,
        contact: &str,
    ) -> DispatchResult<Distributor> {
        validate_name("name", name)?;

        if let Some(existing) = self.db.distributors().get_by_owner(owner_id).await? {
            return Ok(existing);
        }

        let distributor = self
            .db
            .distributors()
            .insert(NewDistributor {
                name: name.to_string(),
                contact: contact.to_string(),
                vehicle: "to be assigned".to_string(),
                capacity: DEFAULT_DISTRIBUTOR_CAPACITY,
                latitude: None,
                longitude: None,
                owner_id: Some(owner_id.to_string()),
            })
            .await?;

        info!(owner_id, distributor = %distributor.name, "Distributor registered for owner");
        Ok(distributor)
    }

    /// Consumes a sign-in event: refreshes the linked distributor's
    /// last-known coordinates.
    ///
    /// Returns `None` (after a warning) when the owner has no distributor -
    /// a sign-in from a non-driver account is not an error.
    pub async fn record_sign_in(
        &self,
        owner_id: &str,
        lat: f64,
        lon: f64,
    ) -> DispatchResult<Option<Distributor>> {
        validate_coordinates(lat, lon)?;

        let Some(distributor) = self.db.distributors().get_by_owner(owner_id).await? else {
            warn!(owner_id, "Sign-in event for an owner without a distributor");
            return Ok(None);
        };

        self.db
            .distributors()
            .update_coordinates(&distributor.id, lat, lon)
            .await?;

        info!(
            distributor = %distributor.name,
            lat,
            lon,
            "Distributor coordinates updated on sign-in"
        );

        Ok(self.db.distributors().get_by_id(&distributor.id).await?)
    }

    /// Gets a distributor, failing with `NotFound` when absent.
    pub async fn get(&self, distributor_id: &str) -> DispatchResult<Distributor> {
        self.db
            .distributors()
            .get_by_id(distributor_id)
            .await?
            .ok_or_else(|| DispatchError::distributor_not_found(distributor_id))
    }

    /// All distributors.
    pub async fn list_all(&self) -> DispatchResult<Vec<Distributor>> {
        Ok(self.db.distributors().list_all().await?)
    }

    /// Exact-name search.
    pub async fn search_by_name(&self, name: &str) -> DispatchResult<Vec<Distributor>> {
        Ok(self.db.distributors().search_by_name(name).await?)
    }

    /// Distributors with at least the given nominal capacity.
    pub async fn list_with_min_capacity(&self, min: i64) -> DispatchResult<Vec<Distributor>> {
        Ok(self.db.distributors().list_with_min_capacity(min).await?)
    }

    /// The distributor's undelivered orders in creation order, for the
    /// driver app.
    pub async fn open_orders(&self, distributor_id: &str) -> DispatchResult<Vec<Order>> {
        self.get(distributor_id).await?;
        Ok(self
            .db
            .orders()
            .list_open_in_creation_order(distributor_id)
            .await?)
    }

    /// Delivery figures for the driver dashboard.
    pub async fn stats(&self, distributor_id: &str) -> DispatchResult<DistributorStats> {
        self.get(distributor_id).await?;

        let (total, delivered, pending, revenue_cents) = self
            .db
            .orders()
            .stats_for_distributor(distributor_id)
            .await?;

        let delivery_rate_pct = if total > 0 {
            (delivered * 100 + total / 2) / total
        } else {
            0
        };

        Ok(DistributorStats {
            total_orders: total,
            delivered_orders: delivered,
            pending_orders: pending,
            revenue_cents,
            delivery_rate_pct,
        })
    }

    /// The most recent delivered orders for the distributor.
    pub async fn history(&self, distributor_id: &str) -> DispatchResult<Vec<Order>> {
        self.get(distributor_id).await?;
        Ok(self
            .db
            .orders()
            .delivered_history(distributor_id, HISTORY_LIMIT)
            .await?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
