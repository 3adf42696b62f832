//! # Payment/Fulfillment State Machine
//!
//! Drives payment settlement and the order's delivered transition.
//!
//! ## States
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Payment:   pending ──► completed   (terminal)                         │
//! │                    └──► rejected    (terminal)                         │
//! │                                                                         │
//! │  Order:     pending ──► delivered   (terminal here; cancelled /        │
//! │                                      misdelivered only via manual      │
//! │                                      delivery registration)            │
//! │                                                                         │
//! │  LOCAL methods (cash, transfer):                                       │
//! │      create_payment ──► completed payment ──► delivered, synchronously │
//! │                                                                         │
//! │  GATEWAY methods (qr, gateway):                                        │
//! │      create_payment ──► checkout session + pending payment             │
//! │      ... webhook completed ──► confirm (IDEMPOTENT) ──► delivered      │
//! │      ... webhook expired   ──► pending payment rejected                │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Idempotence & Races
//!
//! The gateway delivers webhooks at least once. Confirmation therefore:
//! settles the existing pending payment when there is one, records a fresh
//! completed payment when there isn't (a second identical delivery adds one
//! audit row, never a failure), and applies the delivered transition as a
//! conditional write that no-ops on an already-delivered order. A webhook
//! racing a manual delivery registration converges on `delivered` no matter
//! which side wins; a delivered order never regresses.
//!
//! Gateway calls happen before any local write; nothing is locked across
//! the network call.

use std::sync::Arc;

use tracing::{info, warn};

use rutero_core::geo::Point;
use rutero_core::{Payment, PaymentMethod, PaymentStatus};
use rutero_db::{Database, DbError, NewPayment};

use crate::error::{DispatchError, DispatchResult};
use crate::gateway::PaymentGateway;

// =============================================================================
// Delivered Transition (shared with delivery registration)
// =============================================================================

/// Applies the delivered transition: `status = delivered`, `is_delivered =
/// true`, audit observation, optional delivery coordinates - one
/// conditional statement, retried once on a lost race.
///
/// Returns `Ok(true)` when this call performed the transition and
/// `Ok(false)` when the order was already delivered (idempotent no-op).
pub(crate) async fn deliver_order(
    db: &Database,
    order_id: &str,
    observation: &str,
    coords: Option<Point>,
) -> DispatchResult<bool> {
    let coords = coords.map(|p| (p.lat, p.lon));

    // Two attempts: the initial write plus one internal retry.
    for _ in 0..2 {
        if db
            .orders()
            .mark_delivered_if_open(order_id, observation, coords)
            .await?
        {
            return Ok(true);
        }

        let Some(order) = db.orders().get_by_id(order_id).await? else {
            return Err(DispatchError::order_not_found(order_id));
        };
        if order.is_delivered {
            // Someone else (webhook, manual registration) got there first.
            return Ok(false);
        }
        // Undelivered yet the conditional write matched nothing: the row
        // moved under us between statements. Retry once.
    }

    Err(DispatchError::ConcurrentModification {
        entity: "Order",
        id: order_id.to_string(),
    })
}

// =============================================================================
// Payment Outcome
// =============================================================================

/// Result of `create_payment`.
#[derive(Debug, Clone)]
pub struct PaymentOutcome {
    pub payment: Payment,
    /// Hosted checkout URL (gateway methods only).
    pub checkout_url: Option<String>,
    /// QR data URL of the checkout URL (gateway methods only).
    pub qr_image: Option<String>,
    /// Whether this call transitioned the order to delivered.
    pub order_delivered: bool,
}

// =============================================================================
// Payment Processor
// =============================================================================

/// The payment/fulfillment state machine over the shared store.
#[derive(Clone)]
pub struct PaymentProcessor {
    db: Database,
    /// Absent when no gateway credential was configured; gateway-mediated
    /// methods then fail with a `Configuration` error.
    gateway: Option<Arc<dyn PaymentGateway>>,
}

impl PaymentProcessor {
    /// Creates a new payment processor.
    pub fn new(db: Database, gateway: Option<Arc<dyn PaymentGateway>>) -> Self {
        PaymentProcessor { db, gateway }
    }

    /// Creates a payment for an order.
    ///
    /// Local methods (`cash`, `transfer`) settle synchronously: a completed
    /// payment is recorded and the order is marked delivered in the same
    /// call. Gateway methods (`qr`, `gateway`) open a checkout session and
    /// record a *pending* payment; the order is untouched until the
    /// completion webhook arrives.
    ///
    /// A non-positive `amount_cents` falls back to the order's total.
    pub async fn create_payment(
        &self,
        order_id: &str,
        method: PaymentMethod,
        amount_cents: i64,
        coords: Option<Point>,
    ) -> DispatchResult<PaymentOutcome> {
        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DispatchError::order_not_found(order_id))?;

        let amount_cents = if amount_cents <= 0 {
            order.total_cents
        } else {
            amount_cents
        };

        if method.is_gateway_mediated() {
            let gateway = self.gateway.as_ref().ok_or_else(|| {
                DispatchError::Configuration("payment gateway not configured".to_string())
            })?;

            // Network call first; no local state is held across it.
            let session = gateway
                .create_checkout(&order.id, &format!("Order {}", order.code), amount_cents)
                .await?;

            let payment = self
                .insert_pending(order_id, method, amount_cents, &session.url)
                .await?;

            info!(
                order = %order.code,
                payment_id = %payment.id,
                session_id = %session.session_id,
                "Gateway payment initiated"
            );

            return Ok(PaymentOutcome {
                payment,
                checkout_url: Some(session.url),
                qr_image: Some(session.qr_image),
                order_delivered: false,
            });
        }

        // Local method: settle immediately, then flip the order.
        let payment = self
            .db
            .payments()
            .insert(NewPayment {
                order_id: order.id.clone(),
                method,
                amount_cents,
                checkout_url: None,
                status: PaymentStatus::Completed,
            })
            .await?;

        let observation = format!("Delivered on {} payment", method.as_str());
        let order_delivered = deliver_order(&self.db, &order.id, &observation, coords).await?;

        info!(
            order = %order.code,
            payment_id = %payment.id,
            method = method.as_str(),
            order_delivered,
            "Local payment settled"
        );

        Ok(PaymentOutcome {
            payment,
            checkout_url: None,
            qr_image: None,
            order_delivered,
        })
    }

    /// Records a `pending` payment, keeping at most one pending per order.
    ///
    /// An existing pending payment (an abandoned earlier checkout) is
    /// superseded: rejected first, then replaced. The partial unique index
    /// backs this up under concurrency; losing the insert race is retried
    /// once after rejecting the winner's predecessor.
    async fn insert_pending(
        &self,
        order_id: &str,
        method: PaymentMethod,
        amount_cents: i64,
        checkout_url: &str,
    ) -> DispatchResult<Payment> {
        for attempt in 0..2 {
            if let Some(stale) = self.db.payments().find_pending_for_order(order_id).await? {
                warn!(
                    order_id,
                    superseded = %stale.id,
                    "Superseding pending payment with a new checkout"
                );
                self.db.payments().reject_if_pending(&stale.id).await?;
            }

            match self
                .db
                .payments()
                .insert(NewPayment {
                    order_id: order_id.to_string(),
                    method,
                    amount_cents,
                    checkout_url: Some(checkout_url.to_string()),
                    status: PaymentStatus::Pending,
                })
                .await
            {
                Ok(payment) => return Ok(payment),
                // Unique(order_id WHERE pending): another initiation won
                // between our check and insert.
                Err(DbError::UniqueViolation { .. }) if attempt == 0 => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Err(DispatchError::ConcurrentModification {
            entity: "Payment",
            id: order_id.to_string(),
        })
    }

    /// Handles a gateway `completed` webhook event. Idempotent.
    ///
    /// Settles the order's pending payment when one exists; otherwise
    /// records a fresh completed payment (an at-least-once redelivery adds
    /// an audit row instead of failing). Either way the order is then
    /// marked delivered, which no-ops when it already is.
    pub async fn confirm_gateway_payment(
        &self,
        order_id: &str,
        method: PaymentMethod,
        amount_cents: Option<i64>,
        checkout_url: Option<&str>,
        coords: Option<Point>,
    ) -> DispatchResult<Payment> {
        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DispatchError::order_not_found(order_id))?;

        let payment = match self.db.payments().find_pending_for_order(order_id).await? {
            Some(pending) => {
                let settled = self
                    .db
                    .payments()
                    .complete_if_pending(&pending.id, checkout_url)
                    .await?;
                if !settled {
                    // A concurrent confirmation settled it between the read
                    // and the write; nothing more to record.
                    info!(order = %order.code, payment_id = %pending.id,
                        "Pending payment already settled by a concurrent confirmation");
                }
                self.db
                    .payments()
                    .get_by_id(&pending.id)
                    .await?
                    .ok_or_else(|| DispatchError::NotFound {
                        entity: "Payment",
                        id: pending.id.clone(),
                    })?
            }
            None => {
                // Redelivered webhook or a checkout initiated outside this
                // service: record the confirmation rather than failing.
                warn!(
                    order = %order.code,
                    "Gateway confirmation without a pending payment; recording completed payment"
                );
                let amount_cents = amount_cents.filter(|a| *a > 0).unwrap_or(order.total_cents);
                self.db
                    .payments()
                    .insert(NewPayment {
                        order_id: order.id.clone(),
                        method,
                        amount_cents,
                        checkout_url: checkout_url.map(str::to_string),
                        status: PaymentStatus::Completed,
                    })
                    .await?
            }
        };

        let reference = checkout_url.unwrap_or(method.as_str());
        let observation =
            format!("Delivered automatically after confirmed gateway payment ({reference})");
        let delivered_now = deliver_order(&self.db, &order.id, &observation, coords).await?;

        info!(
            order = %order.code,
            payment_id = %payment.id,
            delivered_now,
            "Gateway payment confirmed"
        );

        Ok(payment)
    }

    /// Handles a gateway `expired` webhook event: rejects the pending
    /// payment if one exists. Order status is never touched.
    pub async fn expire_gateway_payment(&self, order_id: &str) -> DispatchResult<bool> {
        let Some(pending) = self.db.payments().find_pending_for_order(order_id).await? else {
            return Ok(false);
        };

        let rejected = self.db.payments().reject_if_pending(&pending.id).await?;
        if rejected {
            info!(order_id, payment_id = %pending.id, "Pending payment rejected on session expiry");
        }
        Ok(rejected)
    }

    /// True iff at least one payment for the order is completed.
    pub async fn is_order_paid(&self, order_id: &str) -> DispatchResult<bool> {
        Ok(self
            .db
            .payments()
            .count_completed_for_order(order_id)
            .await?
            > 0)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rutero_core::{OrderOrigin, OrderStatus};
    use rutero_db::{DbConfig, NewOrder};

    use crate::gateway::CheckoutSession;

    struct FakeGateway {
        calls: AtomicUsize,
    }

    impl FakeGateway {
        fn arc() -> Arc<Self> {
            Arc::new(FakeGateway {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        async fn create_checkout(
            &self,
            order_id: &str,
            _description: &str,
            _amount_cents: i64,
        ) -> DispatchResult<CheckoutSession> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CheckoutSession {
                session_id: format!("cs_test_{n}"),
                url: format!("https://pay.example/{order_id}/{n}"),
                qr_image: "data:image/svg+xml;base64,AAAA".to_string(),
            })
        }
    }

    async fn test_db_with_order(total_cents: i64) -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let order = db
            .orders()
            .insert(NewOrder {
                code: "ORD-0001".to_string(),
                customer: "Maria".to_string(),
                product: "Agua 20L".to_string(),
                quantity: 1,
                unit_price_cents: total_cents,
                delivery_address: None,
                latitude: Some(-17.78),
                longitude: Some(-63.18),
                distributor_id: None,
                origin: OrderOrigin::Web,
                observation: String::new(),
            })
            .await
            .unwrap();
        (db, order.id)
    }

    #[tokio::test]
    async fn test_cash_payment_delivers_synchronously() {
        let (db, order_id) = test_db_with_order(15000).await;
        let processor = PaymentProcessor::new(db.clone(), None);

        let outcome = processor
            .create_payment(&order_id, PaymentMethod::Cash, 15000, Some(Point::new(-17.8, -63.2)))
            .await
            .unwrap();

        assert!(outcome.order_delivered);
        assert_eq!(outcome.payment.status, PaymentStatus::Completed);
        assert_eq!(outcome.payment.amount_cents, 15000);
        assert!(outcome.checkout_url.is_none());

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert!(order.is_delivered);
        assert_eq!(order.status, OrderStatus::Delivered);
        assert!(order.fulfillment_consistent());
        assert_eq!(order.latitude, Some(-17.8));
        assert_eq!(order.observation, "Delivered on cash payment");

        assert!(processor.is_order_paid(&order_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_non_positive_amount_falls_back_to_order_total() {
        let (db, order_id) = test_db_with_order(12300).await;
        let processor = PaymentProcessor::new(db, None);

        let outcome = processor
            .create_payment(&order_id, PaymentMethod::Transfer, 0, None)
            .await
            .unwrap();
        assert_eq!(outcome.payment.amount_cents, 12300);
    }

    #[tokio::test]
    async fn test_qr_payment_stays_pending_until_confirmation() {
        let (db, order_id) = test_db_with_order(15000).await;
        let processor = PaymentProcessor::new(db.clone(), Some(FakeGateway::arc()));

        let outcome = processor
            .create_payment(&order_id, PaymentMethod::Qr, 15000, None)
            .await
            .unwrap();

        assert!(!outcome.order_delivered);
        assert_eq!(outcome.payment.status, PaymentStatus::Pending);
        let url = outcome.checkout_url.unwrap();
        assert!(url.contains(&order_id));
        assert!(outcome.qr_image.unwrap().starts_with("data:image/"));

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert!(!order.is_delivered);
        assert!(!processor.is_order_paid(&order_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_gateway_method_without_gateway_is_configuration_error() {
        let (db, order_id) = test_db_with_order(15000).await;
        let processor = PaymentProcessor::new(db, None);

        let err = processor
            .create_payment(&order_id, PaymentMethod::Qr, 15000, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let processor = PaymentProcessor::new(db, None);

        let err = processor
            .create_payment("missing", PaymentMethod::Cash, 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { entity: "Order", .. }));
    }

    #[tokio::test]
    async fn test_confirmation_settles_pending_and_delivers() {
        let (db, order_id) = test_db_with_order(15000).await;
        let processor = PaymentProcessor::new(db.clone(), Some(FakeGateway::arc()));

        let outcome = processor
            .create_payment(&order_id, PaymentMethod::Qr, 15000, None)
            .await
            .unwrap();
        let url = outcome.checkout_url.unwrap();

        let payment = processor
            .confirm_gateway_payment(&order_id, PaymentMethod::Qr, Some(15000), Some(&url), None)
            .await
            .unwrap();

        assert_eq!(payment.id, outcome.payment.id);
        assert_eq!(payment.status, PaymentStatus::Completed);

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert!(order.is_delivered);
        assert!(order.observation.contains(&url));
        assert!(processor.is_order_paid(&order_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_double_confirmation_is_idempotent() {
        let (db, order_id) = test_db_with_order(15000).await;
        let processor = PaymentProcessor::new(db.clone(), Some(FakeGateway::arc()));

        processor
            .create_payment(&order_id, PaymentMethod::Qr, 15000, None)
            .await
            .unwrap();

        for _ in 0..2 {
            processor
                .confirm_gateway_payment(&order_id, PaymentMethod::Qr, Some(15000), None, None)
                .await
                .unwrap();
        }

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert!(order.is_delivered);
        assert!(order.fulfillment_consistent());

        // First confirmation settled the pending payment; the redelivery
        // added exactly one completed audit row. Never more.
        let payments = db.payments().list_for_order(&order_id).await.unwrap();
        let completed = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .count();
        assert_eq!(payments.len(), 2);
        assert_eq!(completed, 2);
        assert!(payments.iter().all(|p| p.status != PaymentStatus::Pending));
    }

    #[tokio::test]
    async fn test_confirmation_without_any_payment_records_audit_row() {
        let (db, order_id) = test_db_with_order(15000).await;
        let processor = PaymentProcessor::new(db.clone(), None);

        let payment = processor
            .confirm_gateway_payment(&order_id, PaymentMethod::Gateway, None, None, None)
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Completed);
        assert_eq!(payment.amount_cents, 15000); // defaulted to order total

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert!(order.is_delivered);
    }

    #[tokio::test]
    async fn test_expiry_rejects_pending_and_leaves_order_alone() {
        let (db, order_id) = test_db_with_order(15000).await;
        let processor = PaymentProcessor::new(db.clone(), Some(FakeGateway::arc()));

        let outcome = processor
            .create_payment(&order_id, PaymentMethod::Qr, 15000, None)
            .await
            .unwrap();

        assert!(processor.expire_gateway_payment(&order_id).await.unwrap());
        // Nothing left to expire.
        assert!(!processor.expire_gateway_payment(&order_id).await.unwrap());

        let payment = db
            .payments()
            .get_by_id(&outcome.payment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Rejected);

        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert!(!order.is_delivered);
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[tokio::test]
    async fn test_new_checkout_supersedes_stale_pending() {
        let (db, order_id) = test_db_with_order(15000).await;
        let processor = PaymentProcessor::new(db.clone(), Some(FakeGateway::arc()));

        let first = processor
            .create_payment(&order_id, PaymentMethod::Qr, 15000, None)
            .await
            .unwrap();
        let second = processor
            .create_payment(&order_id, PaymentMethod::Qr, 15000, None)
            .await
            .unwrap();

        let stale = db
            .payments()
            .get_by_id(&first.payment.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stale.status, PaymentStatus::Rejected);

        let pending = db
            .payments()
            .find_pending_for_order(&order_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.id, second.payment.id);
    }

    #[tokio::test]
    async fn test_cash_on_delivered_order_is_a_no_op_transition() {
        let (db, order_id) = test_db_with_order(15000).await;
        let processor = PaymentProcessor::new(db.clone(), None);

        processor
            .create_payment(&order_id, PaymentMethod::Cash, 15000, None)
            .await
            .unwrap();
        // A second local payment still records funds but cannot re-deliver.
        let outcome = processor
            .create_payment(&order_id, PaymentMethod::Transfer, 500, None)
            .await
            .unwrap();

        assert!(!outcome.order_delivered);
        let order = db.orders().get_by_id(&order_id).await.unwrap().unwrap();
        assert!(order.is_delivered);
        // The no-op transition must not rewrite the audit observation.
        assert_eq!(order.observation, "Delivered on cash payment");
    }
}
