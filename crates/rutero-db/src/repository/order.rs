//! # Order Repository
//!
//! Database operations for orders.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Order Lifecycle                                   │
//! │                                                                         │
//! │  1. INTAKE                                                             │
//! │     └── insert() → Order { status: pending, distributor: none }        │
//! │                                                                         │
//! │  2. ASSIGNMENT (manual or scheduled pass)                              │
//! │     └── assign_if_unassigned() → row changes only while unassigned     │
//! │                                                                         │
//! │  3. FULFILLMENT (payment confirmation or delivery registration)        │
//! │     └── mark_delivered_if_open() → status=delivered + is_delivered=1   │
//! │         in ONE statement, only while undelivered                       │
//! │     └── close_if_open() → cancelled / misdelivered, never overwrites   │
//! │         a delivered order                                              │
//! │                                                                         │
//! │  4. (OPTIONAL) ADMIN REMOVE                                            │
//! │     └── delete() → the one sanctioned deletion path                    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The conditional writes return `true` only when the row actually changed;
//! a `false` means the optimistic condition no longer held (lost race or
//! already-terminal state) and the caller decides what that means.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use rutero_core::{Order, OrderOrigin, OrderStatus};

/// Columns fetched for every order row, kept in one place so listings and
/// point lookups stay in sync with the struct.
const ORDER_COLUMNS: &str = "id, code, customer, product, quantity, unit_price_cents, \
     total_cents, status, is_delivered, delivery_address, latitude, longitude, \
     distributor_id, origin, observation, created_at";

// =============================================================================
// New Order
// =============================================================================

/// Input for inserting an order. The repository computes the id, the
/// timestamp and the total (`quantity × unit_price_cents`) so the money
/// invariant holds at the first write.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub code: String,
    pub customer: String,
    pub product: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub delivery_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub distributor_id: Option<String>,
    pub origin: OrderOrigin,
    pub observation: String,
}

/// Scope filter for unassigned-order scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnassignedScope {
    /// Every unassigned, undelivered order (manual pass).
    AllOrigins,
    /// Only orders from one intake path (the scheduled pass uses Simulated).
    Origin(OrderOrigin),
}

// =============================================================================
// Order Repository
// =============================================================================

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool) -> Self {
        OrderRepository { pool }
    }

    /// Gets an order by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Order>> {
        let order = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    /// Inserts an order and returns the stored row.
    pub async fn insert(&self, new: NewOrder) -> DbResult<Order> {
        let id = Uuid::new_v4().to_string();
        let total_cents = new.quantity * new.unit_price_cents;
        let created_at = Utc::now();

        debug!(id = %id, code = %new.code, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (
                id, code, customer, product, quantity, unit_price_cents,
                total_cents, status, is_delivered, delivery_address,
                latitude, longitude, distributor_id, origin, observation,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.code)
        .bind(&new.customer)
        .bind(&new.product)
        .bind(new.quantity)
        .bind(new.unit_price_cents)
        .bind(total_cents)
        .bind(OrderStatus::Pending)
        .bind(&new.delivery_address)
        .bind(new.latitude)
        .bind(new.longitude)
        .bind(&new.distributor_id)
        .bind(new.origin)
        .bind(&new.observation)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Order {
            id,
            code: new.code,
            customer: new.customer,
            product: new.product,
            quantity: new.quantity,
            unit_price_cents: new.unit_price_cents,
            total_cents,
            status: OrderStatus::Pending,
            is_delivered: false,
            delivery_address: new.delivery_address,
            latitude: new.latitude,
            longitude: new.longitude,
            distributor_id: new.distributor_id,
            origin: new.origin,
            observation: new.observation,
            created_at,
        })
    }

    // =========================================================================
    // Scans
    // =========================================================================

    /// Lists unassigned, undelivered orders for a reconciliation pass.
    ///
    /// Ascending-id order keeps concurrent passes walking the same sequence.
    pub async fn list_unassigned(&self, scope: UnassignedScope) -> DbResult<Vec<Order>> {
        let orders = match scope {
            UnassignedScope::AllOrigins => {
                sqlx::query_as::<_, Order>(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders \
                     WHERE distributor_id IS NULL AND is_delivered = 0 \
                     ORDER BY id ASC"
                ))
                .fetch_all(&self.pool)
                .await?
            }
            UnassignedScope::Origin(origin) => {
                sqlx::query_as::<_, Order>(&format!(
                    "SELECT {ORDER_COLUMNS} FROM orders \
                     WHERE distributor_id IS NULL AND is_delivered = 0 AND origin = ? \
                     ORDER BY id ASC"
                ))
                .bind(origin)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(orders)
    }

    /// A distributor's open orders in stable id order, capped for routing.
    pub async fn list_open_for_distributor(
        &self,
        distributor_id: &str,
        limit: i64,
    ) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE distributor_id = ? AND is_delivered = 0 \
             ORDER BY id ASC LIMIT ?"
        ))
        .bind(distributor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// A distributor's open orders in creation order, for the driver app.
    pub async fn list_open_in_creation_order(&self, distributor_id: &str) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE distributor_id = ? AND is_delivered = 0 \
             ORDER BY created_at ASC"
        ))
        .bind(distributor_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Open orders for a distributor restricted to an explicit id set
    /// (custom route planning). Unknown, delivered or foreign ids simply
    /// don't come back.
    pub async fn list_open_by_ids(
        &self,
        distributor_id: &str,
        ids: &[String],
    ) -> DbResult<Vec<Order>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        // SQLite can't bind an array; expand one placeholder per id.
        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE distributor_id = ? AND is_delivered = 0 AND id IN ({placeholders}) \
             ORDER BY id ASC"
        );

        let mut query = sqlx::query_as::<_, Order>(&sql).bind(distributor_id);
        for id in ids {
            query = query.bind(id);
        }

        Ok(query.fetch_all(&self.pool).await?)
    }

    /// Recently ingested orders for one origin (monitoring listings).
    pub async fn list_by_origin(&self, origin: OrderOrigin, limit: i64) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE origin = ? ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(origin)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    /// Total number of orders ever created (business-code generation).
    pub async fn count_all(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    // =========================================================================
    // Conditional Transitions
    // =========================================================================

    /// Assigns a distributor only while the order is still unassigned and
    /// undelivered. Returns `true` when this call won the assignment.
    ///
    /// Two overlapping reconciliation passes both computing a match for the
    /// same order land here; exactly one sees `true`.
    pub async fn assign_if_unassigned(
        &self,
        order_id: &str,
        distributor_id: &str,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET distributor_id = ?
            WHERE id = ? AND distributor_id IS NULL AND is_delivered = 0
            "#,
        )
        .bind(distributor_id)
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Marks an order delivered only while it is still undelivered, keeping
    /// `status` and `is_delivered` consistent in one statement.
    ///
    /// Supplied coordinates overwrite the delivery position; absent ones
    /// leave it untouched (a delivered order never loses its coordinates).
    /// Returns `false` when the order was already delivered - callers treat
    /// that as an idempotent no-op, not a failure.
    pub async fn mark_delivered_if_open(
        &self,
        order_id: &str,
        observation: &str,
        coordinates: Option<(f64, f64)>,
    ) -> DbResult<bool> {
        let (lat, lon) = match coordinates {
            Some((lat, lon)) => (Some(lat), Some(lon)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = 'delivered',
                is_delivered = 1,
                observation = ?,
                latitude = COALESCE(?, latitude),
                longitude = COALESCE(?, longitude)
            WHERE id = ? AND is_delivered = 0
            "#,
        )
        .bind(observation)
        .bind(lat)
        .bind(lon)
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Records a terminal non-delivery outcome (`cancelled` /
    /// `misdelivered`) only while the order is undelivered. A delivered
    /// order never regresses.
    pub async fn close_if_open(
        &self,
        order_id: &str,
        status: OrderStatus,
        observation: &str,
        coordinates: Option<(f64, f64)>,
    ) -> DbResult<bool> {
        let (lat, lon) = match coordinates {
            Some((lat, lon)) => (Some(lat), Some(lon)),
            None => (None, None),
        };

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = ?,
                observation = ?,
                latitude = COALESCE(?, latitude),
                longitude = COALESCE(?, longitude)
            WHERE id = ? AND is_delivered = 0
            "#,
        )
        .bind(status)
        .bind(observation)
        .bind(lat)
        .bind(lon)
        .bind(order_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Administrative removal. The one sanctioned deletion path.
    pub async fn delete(&self, order_id: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(order_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Aggregates
    // =========================================================================

    /// (total, delivered, open, delivered revenue in cents) for one
    /// distributor.
    pub async fn stats_for_distributor(
        &self,
        distributor_id: &str,
    ) -> DbResult<(i64, i64, i64, i64)> {
        let row: (i64, i64, i64, Option<i64>) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(is_delivered), 0),
                COALESCE(SUM(1 - is_delivered), 0),
                SUM(CASE WHEN is_delivered = 1 THEN total_cents END)
            FROM orders
            WHERE distributor_id = ?
            "#,
        )
        .bind(distributor_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.0, row.1, row.2, row.3.unwrap_or(0)))
    }

    /// Most recent delivered orders for one distributor.
    pub async fn delivered_history(
        &self,
        distributor_id: &str,
        limit: i64,
    ) -> DbResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE distributor_id = ? AND is_delivered = 1 \
             ORDER BY created_at DESC LIMIT ?"
        ))
        .bind(distributor_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::distributor::NewDistributor;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn order_input(code: &str) -> NewOrder {
        NewOrder {
            code: code.to_string(),
            customer: "Maria Flores".to_string(),
            product: "Agua 20L".to_string(),
            quantity: 3,
            unit_price_cents: 1500,
            delivery_address: Some("Av. Banzer 123".to_string()),
            latitude: Some(-17.78),
            longitude: Some(-63.18),
            distributor_id: None,
            origin: OrderOrigin::Web,
            observation: String::new(),
        }
    }

    async fn insert_distributor(db: &Database, name: &str) -> String {
        db.distributors()
            .insert(NewDistributor {
                name: name.to_string(),
                contact: "777-00000".to_string(),
                vehicle: "moto".to_string(),
                capacity: 10,
                latitude: Some(-17.79),
                longitude: Some(-63.19),
                owner_id: None,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_insert_computes_total() {
        let db = test_db().await;
        let order = db.orders().insert(order_input("ORD-0001")).await.unwrap();

        assert_eq!(order.total_cents, 4500);
        assert_eq!(order.status, OrderStatus::Pending);
        assert!(!order.is_delivered);

        let reloaded = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.total_cents, reloaded.quantity * reloaded.unit_price_cents);
        assert!(reloaded.fulfillment_consistent());
    }

    #[tokio::test]
    async fn test_assign_is_conditional() {
        let db = test_db().await;
        let order = db.orders().insert(order_input("ORD-0001")).await.unwrap();
        let d1 = insert_distributor(&db, "Carlos").await;
        let d2 = insert_distributor(&db, "Lucia").await;

        assert!(db.orders().assign_if_unassigned(&order.id, &d1).await.unwrap());
        // Second writer loses: the order is no longer unassigned.
        assert!(!db.orders().assign_if_unassigned(&order.id, &d2).await.unwrap());

        let reloaded = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.distributor_id, Some(d1));
    }

    #[tokio::test]
    async fn test_mark_delivered_is_idempotent_and_keeps_flag_consistent() {
        let db = test_db().await;
        let order = db.orders().insert(order_input("ORD-0001")).await.unwrap();

        assert!(db
            .orders()
            .mark_delivered_if_open(&order.id, "Delivered on cash payment", Some((-17.8, -63.2)))
            .await
            .unwrap());
        // Second transition is a no-op.
        assert!(!db
            .orders()
            .mark_delivered_if_open(&order.id, "again", None)
            .await
            .unwrap());

        let reloaded = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, OrderStatus::Delivered);
        assert!(reloaded.is_delivered);
        assert!(reloaded.fulfillment_consistent());
        assert_eq!(reloaded.latitude, Some(-17.8));
        assert_eq!(reloaded.observation, "Delivered on cash payment");
    }

    #[tokio::test]
    async fn test_close_never_overwrites_delivered() {
        let db = test_db().await;
        let order = db.orders().insert(order_input("ORD-0001")).await.unwrap();

        db.orders()
            .mark_delivered_if_open(&order.id, "done", None)
            .await
            .unwrap();

        let changed = db
            .orders()
            .close_if_open(&order.id, OrderStatus::Cancelled, "customer absent", None)
            .await
            .unwrap();
        assert!(!changed);

        let reloaded = db.orders().get_by_id(&order.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn test_unassigned_scope_filters_origin() {
        let db = test_db().await;
        db.orders().insert(order_input("ORD-0001")).await.unwrap();
        let mut simulated = order_input("ORD-0002");
        simulated.origin = OrderOrigin::Simulated;
        db.orders().insert(simulated).await.unwrap();

        let all = db
            .orders()
            .list_unassigned(UnassignedScope::AllOrigins)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);

        let scoped = db
            .orders()
            .list_unassigned(UnassignedScope::Origin(OrderOrigin::Simulated))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].code, "ORD-0002");
    }

    #[tokio::test]
    async fn test_stats_and_history() {
        let db = test_db().await;
        let dist = insert_distributor(&db, "Carlos").await;

        for i in 0..3 {
            let mut input = order_input(&format!("ORD-000{i}"));
            input.distributor_id = Some(dist.clone());
            let order = db.orders().insert(input).await.unwrap();
            if i < 2 {
                db.orders()
                    .mark_delivered_if_open(&order.id, "done", None)
                    .await
                    .unwrap();
            }
        }

        let (total, delivered, open, revenue) =
            db.orders().stats_for_distributor(&dist).await.unwrap();
        assert_eq!((total, delivered, open), (3, 2, 1));
        assert_eq!(revenue, 9000); // two delivered orders at 4500 each

        let history = db.orders().delivered_history(&dist, 50).await.unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|o| o.is_delivered));
    }

    #[tokio::test]
    async fn test_list_open_by_ids_filters_foreign_and_delivered() {
        let db = test_db().await;
        let dist = insert_distributor(&db, "Carlos").await;

        let mut a = order_input("ORD-0001");
        a.distributor_id = Some(dist.clone());
        let a = db.orders().insert(a).await.unwrap();

        let mut b = order_input("ORD-0002");
        b.distributor_id = Some(dist.clone());
        let b = db.orders().insert(b).await.unwrap();
        db.orders()
            .mark_delivered_if_open(&b.id, "done", None)
            .await
            .unwrap();

        let c = db.orders().insert(order_input("ORD-0003")).await.unwrap();

        let ids = vec![a.id.clone(), b.id.clone(), c.id.clone()];
        let open = db.orders().list_open_by_ids(&dist, &ids).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, a.id);
    }
}
