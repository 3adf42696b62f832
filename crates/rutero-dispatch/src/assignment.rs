//! # Assignment Engine
//!
//! Matches unassigned orders to the geographically nearest distributor.
//!
//! ## Reconciliation Pass
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconciliation Pass                                │
//! │                                                                         │
//! │  1. SCAN: unassigned, undelivered orders (optionally one origin)       │
//! │                                                                         │
//! │  2. For each order, in stable id order:                                │
//! │     ├── no delivery coordinates? → skip, counted as not assigned       │
//! │     ├── best_distributor_for(point) → none? → skip                     │
//! │     └── assign_if_unassigned(order, distributor)                       │
//! │            │                                                            │
//! │            ├── true  → assigned++                                      │
//! │            └── false → someone else won the row; reread, retry ONCE    │
//! │                        if it still looks unassigned, else move on      │
//! │                                                                         │
//! │  3. Report { assigned, total } - per-order failures are logged and     │
//! │     never abort the rest of the pass.                                  │
//! │                                                                         │
//! │  Two overlapping passes (timer + manual) may both reach step 2 for    │
//! │  the same order; the conditional write guarantees exactly one wins.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Nearest-distributor selection is a deliberately greedy, stateless
//! heuristic: it ignores capacity and current load, so one distributor can
//! accumulate unbounded work. That matches the dispatch policy this system
//! ships with.

use serde::Serialize;
use tracing::{debug, info, warn};

use rutero_core::geo::{distance_km, Point};
use rutero_core::Distributor;
use rutero_db::{Database, UnassignedScope};

use crate::error::{DispatchError, DispatchResult};

// =============================================================================
// Reconcile Report
// =============================================================================

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Orders this pass actually assigned.
    pub assigned: usize,
    /// Unassigned orders the pass looked at.
    pub total: usize,
}

// =============================================================================
// Assignment Engine
// =============================================================================

/// Nearest-distributor matching over the shared store.
///
/// Stateless between calls: every pass rereads distributors and orders so
/// concurrent passes and webhook traffic never see stale entities.
#[derive(Debug, Clone)]
pub struct AssignmentEngine {
    db: Database,
}

impl AssignmentEngine {
    /// Creates a new assignment engine.
    pub fn new(db: Database) -> Self {
        AssignmentEngine { db }
    }

    /// Picks the distributor with strictly minimal great-circle distance to
    /// the given point.
    ///
    /// Candidates are scanned in ascending-id order and ties keep the first
    /// seen, so the choice is deterministic. Returns `None` when no
    /// distributor has known coordinates.
    pub async fn best_distributor_for(&self, point: Point) -> DispatchResult<Option<Distributor>> {
        let candidates = self.db.distributors().list_with_coordinates().await?;

        if candidates.is_empty() {
            debug!("No distributors with known coordinates");
            return Ok(None);
        }

        let mut best: Option<(f64, Distributor)> = None;
        for candidate in candidates {
            // list_with_coordinates only returns rows with both columns set;
            // position() additionally drops non-finite values.
            let Some(position) = candidate.position() else {
                continue;
            };

            let distance = distance_km(point, position);
            debug!(
                distributor = %candidate.name,
                distance_km = format!("{distance:.2}"),
                "Distance to candidate"
            );

            match &best {
                Some((best_distance, _)) if distance >= *best_distance => {}
                _ => best = Some((distance, candidate)),
            }
        }

        Ok(best.map(|(_, distributor)| distributor))
    }

    /// Assigns every unassigned, undelivered order in scope to its nearest
    /// distributor.
    ///
    /// Safe to run concurrently with itself: assignment goes through a
    /// conditional write, so an order is handed to exactly one distributor
    /// no matter how many passes overlap. Orders without coordinates, and
    /// orders for which no distributor qualifies, are skipped and show up
    /// in the report as `total - assigned`.
    pub async fn reconcile_unassigned(
        &self,
        scope: UnassignedScope,
    ) -> DispatchResult<ReconcileReport> {
        let orders = self.db.orders().list_unassigned(scope).await?;
        let total = orders.len();

        if total == 0 {
            debug!("No orders pending assignment");
            return Ok(ReconcileReport { assigned: 0, total });
        }

        let mut assigned = 0;
        for order in orders {
            match self.assign_one(&order.id).await {
                Ok(true) => assigned += 1,
                Ok(false) => {}
                // An individual failure must not starve the rest of the pass.
                Err(e) => warn!(order = %order.code, error = %e, "Assignment failed"),
            }
        }

        info!(assigned, total, "Reconciliation pass complete");
        Ok(ReconcileReport { assigned, total })
    }

    /// Assigns a single order, tolerating races with concurrent passes.
    ///
    /// Returns `Ok(false)` when the order can't be assigned right now (no
    /// coordinates, no candidates, or another pass got there first).
    async fn assign_one(&self, order_id: &str) -> DispatchResult<bool> {
        // Reread inside the per-order step: the scan snapshot may be stale
        // by the time this order's turn comes.
        let Some(order) = self.db.orders().get_by_id(order_id).await? else {
            return Ok(false);
        };
        if order.distributor_id.is_some() || order.is_delivered {
            return Ok(false);
        }

        let Some(point) = order.delivery_point() else {
            warn!(order = %order.code, "Order has no usable delivery coordinates");
            return Ok(false);
        };

        let Some(distributor) = self.best_distributor_for(point).await? else {
            warn!(order = %order.code, "No distributor available for assignment");
            return Ok(false);
        };

        if self
            .db
            .orders()
            .assign_if_unassigned(&order.id, &distributor.id)
            .await?
        {
            info!(order = %order.code, distributor = %distributor.name, "Order assigned");
            return Ok(true);
        }

        // Lost the race. Reread: if the order is genuinely taken we are
        // done; otherwise retry the conditional write once before giving up.
        let Some(current) = self.db.orders().get_by_id(&order.id).await? else {
            return Ok(false);
        };
        if current.distributor_id.is_some() || current.is_delivered {
            debug!(order = %order.code, "Order taken by a concurrent pass");
            return Ok(false);
        }

        if self
            .db
            .orders()
            .assign_if_unassigned(&order.id, &distributor.id)
            .await?
        {
            info!(order = %order.code, distributor = %distributor.name, "Order assigned on retry");
            return Ok(true);
        }

        Err(DispatchError::ConcurrentModification {
            entity: "Order",
            id: order.id,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rutero_core::{OrderOrigin, OrderStatus};
    use rutero_db::{DbConfig, NewDistributor, NewOrder};

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn insert_distributor(db: &Database, name: &str, coords: Option<(f64, f64)>) -> String {
        db.distributors()
            .insert(NewDistributor {
                name: name.to_string(),
                contact: "777-00000".to_string(),
                vehicle: "moto".to_string(),
                capacity: 10,
                latitude: coords.map(|c| c.0),
                longitude: coords.map(|c| c.1),
                owner_id: None,
            })
            .await
            .unwrap()
            .id
    }

    async fn insert_order(
        db: &Database,
        code: &str,
        coords: Option<(f64, f64)>,
        origin: OrderOrigin,
    ) -> String {
        db.orders()
            .insert(NewOrder {
                code: code.to_string(),
                customer: "Maria".to_string(),
                product: "Agua 20L".to_string(),
                quantity: 1,
                unit_price_cents: 1500,
                delivery_address: None,
                latitude: coords.map(|c| c.0),
                longitude: coords.map(|c| c.1),
                distributor_id: None,
                origin,
                observation: String::new(),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_best_distributor_minimizes_distance() {
        let db = test_db().await;
        let engine = AssignmentEngine::new(db.clone());

        // ~2 km and ~9 km from the query point.
        let near = insert_distributor(&db, "Near", Some((-17.7650, -63.1900))).await;
        let _far = insert_distributor(&db, "Far", Some((-17.7100, -63.2300))).await;

        let best = engine
            .best_distributor_for(Point::new(-17.78, -63.18))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.id, near);
    }

    #[tokio::test]
    async fn test_best_distributor_none_without_coordinates() {
        let db = test_db().await;
        let engine = AssignmentEngine::new(db.clone());

        insert_distributor(&db, "Unknown position", None).await;

        let best = engine
            .best_distributor_for(Point::new(-17.78, -63.18))
            .await
            .unwrap();
        assert!(best.is_none());
    }

    #[tokio::test]
    async fn test_tie_breaks_on_first_seen() {
        let db = test_db().await;
        let engine = AssignmentEngine::new(db.clone());

        // Identical coordinates: the ascending-id scan keeps the first row.
        let a = insert_distributor(&db, "A", Some((-17.79, -63.19))).await;
        let b = insert_distributor(&db, "B", Some((-17.79, -63.19))).await;
        let first = if a < b { a } else { b };

        let best = engine
            .best_distributor_for(Point::new(-17.78, -63.18))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(best.id, first);
    }

    #[tokio::test]
    async fn test_reconcile_assigns_nearest_and_reports_counts() {
        let db = test_db().await;
        let engine = AssignmentEngine::new(db.clone());

        let near = insert_distributor(&db, "Near", Some((-17.7650, -63.1900))).await;
        insert_distributor(&db, "Far", Some((-17.7100, -63.2300))).await;

        let with_coords =
            insert_order(&db, "ORD-0001", Some((-17.78, -63.18)), OrderOrigin::Web).await;
        // No coordinates: skipped, still counted in total.
        insert_order(&db, "ORD-0002", None, OrderOrigin::Web).await;

        let report = engine
            .reconcile_unassigned(UnassignedScope::AllOrigins)
            .await
            .unwrap();
        assert_eq!(report, ReconcileReport { assigned: 1, total: 2 });

        let order = db.orders().get_by_id(&with_coords).await.unwrap().unwrap();
        assert_eq!(order.distributor_id, Some(near));
    }

    #[tokio::test]
    async fn test_reconcile_scope_limits_to_origin() {
        let db = test_db().await;
        let engine = AssignmentEngine::new(db.clone());

        insert_distributor(&db, "Near", Some((-17.7650, -63.1900))).await;
        insert_order(&db, "ORD-0001", Some((-17.78, -63.18)), OrderOrigin::Web).await;
        insert_order(
            &db,
            "ORD-0002",
            Some((-17.78, -63.18)),
            OrderOrigin::Simulated,
        )
        .await;

        let report = engine
            .reconcile_unassigned(UnassignedScope::Origin(OrderOrigin::Simulated))
            .await
            .unwrap();
        assert_eq!(report, ReconcileReport { assigned: 1, total: 1 });
    }

    #[tokio::test]
    async fn test_concurrent_passes_assign_exactly_once() {
        let db = test_db().await;
        let engine = AssignmentEngine::new(db.clone());

        insert_distributor(&db, "Near", Some((-17.7650, -63.1900))).await;
        let order_id =
            insert_order(&db, "ORD-0001", Some((-17.78, -63.18)), OrderOrigin::Web).await;

        let (a, b) = tokio::join!(
            engine.reconcile_unassigned(UnassignedScope::AllOrigins),
            engine.reconcile_unassigned(UnassignedScope::AllOrigins),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        // Exactly one pass won the conditional write.
        assert_eq!(a.assigned + b.assigned, 1);

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert!(order.distributor_id.is_some());
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_delivered_orders_never_reconciled() {
        let db = test_db().await;
        let engine = AssignmentEngine::new(db.clone());

        insert_distributor(&db, "Near", Some((-17.7650, -63.1900))).await;
        let order_id =
            insert_order(&db, "ORD-0001", Some((-17.78, -63.18)), OrderOrigin::Web).await;
        db.orders()
            .mark_delivered_if_open(&order_id, "done", None)
            .await
            .unwrap();

        let report = engine
            .reconcile_unassigned(UnassignedScope::AllOrigins)
            .await
            .unwrap();
        assert_eq!(report, ReconcileReport { assigned: 0, total: 0 });
    }
}
