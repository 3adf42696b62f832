//! # Payment Repository
//!
//! Database operations for payments.
//!
//! ## Payment State Machine (storage view)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   insert(pending) ──► complete_if_pending ──► completed   (terminal)   │
//! │                  └──► reject_if_pending  ──► rejected     (terminal)   │
//! │                                                                         │
//! │   insert_completed ─────────────────────────► completed   (terminal)   │
//! │   (local methods, webhook audit rows)                                  │
//! │                                                                         │
//! │   Rows are NEVER deleted and NEVER leave a terminal state.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The two `*_if_pending` transitions are conditional single statements;
//! a `false` return means the payment had already settled (lost race or
//! duplicate webhook) and the caller decides whether that is an error.

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use rutero_core::{Payment, PaymentMethod, PaymentStatus};

const PAYMENT_COLUMNS: &str =
    "id, order_id, method, amount_cents, checkout_url, status, created_at";

// =============================================================================
// New Payment
// =============================================================================

/// Input for inserting a payment.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub order_id: String,
    pub method: PaymentMethod,
    pub amount_cents: i64,
    pub checkout_url: Option<String>,
    pub status: PaymentStatus,
}

// =============================================================================
// Payment Repository
// =============================================================================

/// Repository for payment database operations.
#[derive(Debug, Clone)]
pub struct PaymentRepository {
    pool: SqlitePool,
}

impl PaymentRepository {
    /// Creates a new PaymentRepository.
    pub fn new(pool: SqlitePool) -> Self {
        PaymentRepository { pool }
    }

    /// Gets a payment by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Inserts a payment and returns the stored row.
    pub async fn insert(&self, new: NewPayment) -> DbResult<Payment> {
        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();

        debug!(
            id = %id,
            order_id = %new.order_id,
            method = new.method.as_str(),
            status = new.status.as_str(),
            "Inserting payment"
        );

        sqlx::query(
            r#"
            INSERT INTO payments (
                id, order_id, method, amount_cents, checkout_url, status,
                created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new.order_id)
        .bind(new.method)
        .bind(new.amount_cents)
        .bind(&new.checkout_url)
        .bind(new.status)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Payment {
            id,
            order_id: new.order_id,
            method: new.method,
            amount_cents: new.amount_cents,
            checkout_url: new.checkout_url,
            status: new.status,
            created_at,
        })
    }

    /// All payments recorded for an order, oldest first.
    pub async fn list_for_order(&self, order_id: &str) -> DbResult<Vec<Payment>> {
        let payments = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE order_id = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    /// The order's `pending` payment, if any.
    ///
    /// The state machine keeps at most one payment pending per order, but
    /// the query is defensive: oldest pending row first.
    pub async fn find_pending_for_order(&self, order_id: &str) -> DbResult<Option<Payment>> {
        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE order_id = ? AND status = 'pending' \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(payment)
    }

    /// Number of completed payments for an order.
    pub async fn count_completed_for_order(&self, order_id: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM payments WHERE order_id = ? AND status = 'completed'",
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    // =========================================================================
    // Conditional Transitions
    // =========================================================================

    /// Completes a payment only while it is still pending, optionally
    /// attaching the checkout URL the gateway reported.
    ///
    /// Returns `false` when the payment had already settled.
    pub async fn complete_if_pending(
        &self,
        payment_id: &str,
        checkout_url: Option<&str>,
    ) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'completed',
                checkout_url = COALESCE(?, checkout_url)
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(checkout_url)
        .bind(payment_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Rejects a payment only while it is still pending.
    pub async fn reject_if_pending(&self, payment_id: &str) -> DbResult<bool> {
        let result =
            sqlx::query("UPDATE payments SET status = 'rejected' WHERE id = ? AND status = 'pending'")
                .bind(payment_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::order::NewOrder;
    use rutero_core::OrderOrigin;

    async fn test_db_with_order() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = db
            .orders()
            .insert(NewOrder {
                code: "ORD-0001".to_string(),
                customer: "Maria".to_string(),
                product: "Agua 20L".to_string(),
                quantity: 1,
                unit_price_cents: 15000,
                delivery_address: None,
                latitude: None,
                longitude: None,
                distributor_id: None,
                origin: OrderOrigin::Web,
                observation: String::new(),
            })
            .await
            .unwrap();
        (db, order.id)
    }

    fn pending_payment(order_id: &str) -> NewPayment {
        NewPayment {
            order_id: order_id.to_string(),
            method: PaymentMethod::Qr,
            amount_cents: 15000,
            checkout_url: Some("https://pay.example/cs_123".to_string()),
            status: PaymentStatus::Pending,
        }
    }

    #[tokio::test]
    async fn test_complete_if_pending_settles_once() {
        let (db, order_id) = test_db_with_order().await;
        let repo = db.payments();

        let payment = repo.insert(pending_payment(&order_id)).await.unwrap();

        assert!(repo
            .complete_if_pending(&payment.id, Some("https://pay.example/cs_123"))
            .await
            .unwrap());
        // Terminal: the second transition reports no change.
        assert!(!repo.complete_if_pending(&payment.id, None).await.unwrap());
        assert!(!repo.reject_if_pending(&payment.id).await.unwrap());

        let reloaded = repo.get_by_id(&payment.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, PaymentStatus::Completed);
    }

    #[tokio::test]
    async fn test_find_pending_and_completed_count() {
        let (db, order_id) = test_db_with_order().await;
        let repo = db.payments();

        assert!(repo.find_pending_for_order(&order_id).await.unwrap().is_none());
        assert_eq!(repo.count_completed_for_order(&order_id).await.unwrap(), 0);

        let payment = repo.insert(pending_payment(&order_id)).await.unwrap();
        let pending = repo.find_pending_for_order(&order_id).await.unwrap().unwrap();
        assert_eq!(pending.id, payment.id);

        repo.complete_if_pending(&payment.id, None).await.unwrap();
        assert!(repo.find_pending_for_order(&order_id).await.unwrap().is_none());
        assert_eq!(repo.count_completed_for_order(&order_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_payment_requires_existing_order() {
        let (db, _order_id) = test_db_with_order().await;
        let repo = db.payments();

        let result = repo.insert(pending_payment("missing-order")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_for_order_keeps_audit_rows() {
        let (db, order_id) = test_db_with_order().await;
        let repo = db.payments();

        let first = repo.insert(pending_payment(&order_id)).await.unwrap();
        repo.reject_if_pending(&first.id).await.unwrap();
        repo.insert(NewPayment {
            status: PaymentStatus::Completed,
            ..pending_payment(&order_id)
        })
        .await
        .unwrap();

        let all = repo.list_for_order(&order_id).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].status, PaymentStatus::Rejected);
        assert_eq!(all[1].status, PaymentStatus::Completed);
    }
}
