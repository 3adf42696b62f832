//! # Domain Types
//!
//! Core domain types used throughout Rutero.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Order       │   │   Distributor   │   │    Payment      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  code (business)│   │  name           │   │  order_id (FK)  │       │
//! │  │  status         │   │  lat/lon        │   │  method         │       │
//! │  │  total_cents    │   │  capacity       │   │  amount_cents   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │   OrderStatus   │   │  PaymentMethod  │   │  PaymentStatus  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Pending        │   │  Cash  Transfer │   │  Pending        │       │
//! │  │  Delivered      │   │  Qr    Gateway  │   │  Completed      │       │
//! │  │  Cancelled      │   └─────────────────┘   │  Rejected       │       │
//! │  │  Misdelivered   │                         └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Dual-Key Identity Pattern
//! Orders have:
//! - `id`: UUID v4 - immutable, used for database relations
//! - `code`: human-readable business id (`ORD-0001`) shown to customers
//!   and drivers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Point;
use crate::money::Money;

// =============================================================================
// Order Status
// =============================================================================

/// The fulfillment status of an order.
///
/// `Delivered` is terminal for the payment path; `Cancelled` and
/// `Misdelivered` are terminal alternates reachable only through manual
/// delivery registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Awaiting assignment and/or delivery.
    Pending,
    /// Goods handed over and payment confirmed.
    Delivered,
    /// Delivery called off.
    Cancelled,
    /// Driver reported a failed or wrong delivery.
    Misdelivered,
}

impl OrderStatus {
    /// Canonical lowercase form, matching storage and the wire.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Misdelivered => "misdelivered",
        }
    }

    /// True when this status closes the order for routing purposes.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatus::Pending)
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = crate::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            "misdelivered" => Ok(OrderStatus::Misdelivered),
            other => Err(crate::ValidationError::NotAllowed {
                field: format!("status '{other}'"),
                allowed: vec![
                    "pending".into(),
                    "delivered".into(),
                    "cancelled".into(),
                    "misdelivered".into(),
                ],
            }),
        }
    }
}

// =============================================================================
// Order Origin
// =============================================================================

/// Where an order entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum OrderOrigin {
    /// Created manually through the web intake.
    Web,
    /// Ingested by the order simulator.
    Simulated,
}

impl OrderOrigin {
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderOrigin::Web => "web",
            OrderOrigin::Simulated => "simulated",
        }
    }
}

// =============================================================================
// Payment Method
// =============================================================================

/// How a payment is (or will be) collected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Physical cash handed to the driver.
    Cash,
    /// Bank transfer confirmed by the driver.
    Transfer,
    /// Checkout-session QR scanned by the customer.
    Qr,
    /// Checkout session opened directly at the gateway.
    Gateway,
}

impl PaymentMethod {
    /// Gateway-mediated methods settle asynchronously through a webhook;
    /// local methods settle synchronously at creation time.
    pub const fn is_gateway_mediated(&self) -> bool {
        matches!(self, PaymentMethod::Qr | PaymentMethod::Gateway)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Transfer => "transfer",
            PaymentMethod::Qr => "qr",
            PaymentMethod::Gateway => "gateway",
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = crate::ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "transfer" => Ok(PaymentMethod::Transfer),
            "qr" => Ok(PaymentMethod::Qr),
            "gateway" => Ok(PaymentMethod::Gateway),
            other => Err(crate::ValidationError::NotAllowed {
                field: format!("method '{other}'"),
                allowed: vec![
                    "cash".into(),
                    "transfer".into(),
                    "qr".into(),
                    "gateway".into(),
                ],
            }),
        }
    }
}

// =============================================================================
// Payment Status
// =============================================================================

/// Lifecycle state of a payment.
///
/// `pending → {completed, rejected}`; terminal states never transition
/// again, and payment rows are never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Rejected,
}

impl PaymentStatus {
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Rejected => "rejected",
        }
    }
}

// =============================================================================
// Order
// =============================================================================

/// A customer order, tracked from intake through delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Human-readable business code (`ORD-0001`).
    pub code: String,

    /// Customer display name.
    pub customer: String,

    /// Product description.
    pub product: String,

    /// Units ordered.
    pub quantity: i64,

    /// Price per unit in cents.
    pub unit_price_cents: i64,

    /// Always `quantity × unit_price_cents` at last write.
    pub total_cents: i64,

    /// Fulfillment status.
    pub status: OrderStatus,

    /// Redundant with `status == Delivered`; kept for fast filtering and
    /// updated in the same statement as every status change.
    pub is_delivered: bool,

    /// Free-text delivery address.
    pub delivery_address: Option<String>,

    /// Delivery latitude; unknown until intake or delivery provides it.
    pub latitude: Option<f64>,

    /// Delivery longitude.
    pub longitude: Option<f64>,

    /// Assigned distributor; null until the Assignment Engine matches one.
    pub distributor_id: Option<String>,

    /// Intake path this order arrived through.
    pub origin: OrderOrigin,

    /// Free-text audit note stamped by intake, assignment and fulfillment.
    pub observation: String,

    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Returns the order total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }

    /// Returns the unit price as Money.
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    /// The delivery coordinates, if both are known and finite.
    ///
    /// This is the only place order coordinates become a `Point`, so the
    /// "callers validate before computing distance" rule holds everywhere.
    pub fn delivery_point(&self) -> Option<Point> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Some(Point::new(lat, lon))
            }
            _ => None,
        }
    }

    /// Checks the status/flag consistency invariant.
    pub fn fulfillment_consistent(&self) -> bool {
        self.is_delivered == (self.status == OrderStatus::Delivered)
    }
}

// =============================================================================
// Distributor
// =============================================================================

/// A field agent/vehicle responsible for deliveries.
///
/// A slowly-changing value object: coordinates are refreshed by identity
/// sign-in events and delivery completions, everything else rarely moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Distributor {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display name.
    pub name: String,

    /// Phone or email used by dispatchers.
    pub contact: String,

    /// Vehicle descriptor ("moto roja", "camioneta 4x4", ...).
    pub vehicle: String,

    /// Nominal carrying capacity (informational; assignment ignores it).
    pub capacity: i64,

    /// Last-known latitude; null until the first sign-in reports one.
    pub latitude: Option<f64>,

    /// Last-known longitude.
    pub longitude: Option<f64>,

    /// Identity owner this distributor was created for.
    pub owner_id: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Distributor {
    /// Last-known position, if both coordinates are known and finite.
    pub fn position(&self) -> Option<Point> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => {
                Some(Point::new(lat, lon))
            }
            _ => None,
        }
    }
}

// =============================================================================
// Payment
// =============================================================================

/// A record of funds received or pending for an order.
///
/// An order accumulates payments over time, but at most one may be
/// `pending` at any instant (enforced by the payment state machine).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Owning order.
    pub order_id: String,

    pub method: PaymentMethod,

    /// Amount in cents.
    pub amount_cents: i64,

    /// External checkout URL for gateway-mediated payments.
    pub checkout_url: Option<String>,

    pub status: PaymentStatus,

    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }
}

// =============================================================================
// Route Plan
// =============================================================================

/// One stop in an optimized delivery itinerary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteStop {
    /// Visiting position, 1-based.
    pub position: u32,
    pub order_id: String,
    pub code: String,
    pub customer: String,
    pub product: String,
    pub address: Option<String>,
    pub total_cents: i64,
    /// True when at least one payment for the order is completed.
    pub paid: bool,
    pub lat: f64,
    pub lon: f64,
}

/// Aggregate route figures summed across all legs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSummary {
    /// Encoded overview polyline from the provider, when present.
    pub polyline: Option<String>,
    /// Total distance in kilometers, rounded to 2 decimals.
    pub distance_km: f64,
    /// Total driving time in whole minutes.
    pub duration_min: i64,
}

/// An ordered itinerary for a distributor's open orders.
///
/// Zero eligible stops is a *successful* empty plan (`stops` empty,
/// `route` none), never an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePlan {
    /// Where the distributor starts from.
    pub origin: Point,
    pub stops: Vec<RouteStop>,
    pub route: Option<RouteSummary>,
}

impl RoutePlan {
    /// The "nothing to route" result.
    pub fn empty(origin: Point) -> Self {
        RoutePlan {
            origin,
            stops: Vec::new(),
            route: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }
}

// =============================================================================
// Distributor Statistics
// =============================================================================

/// Per-distributor delivery figures for the driver dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributorStats {
    pub total_orders: i64,
    pub delivered_orders: i64,
    pub pending_orders: i64,
    /// Revenue across delivered orders, in cents.
    pub revenue_cents: i64,
    /// delivered / total, as a whole percentage (0 when no orders).
    pub delivery_rate_pct: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_status_round_trip() {
        for s in ["pending", "delivered", "cancelled", "misdelivered"] {
            let parsed: OrderStatus = s.parse().unwrap();
            assert_eq!(parsed.as_str(), s);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_gateway_mediated_methods() {
        assert!(PaymentMethod::Qr.is_gateway_mediated());
        assert!(PaymentMethod::Gateway.is_gateway_mediated());
        assert!(!PaymentMethod::Cash.is_gateway_mediated());
        assert!(!PaymentMethod::Transfer.is_gateway_mediated());
    }

    #[test]
    fn test_payment_status_terminality() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Rejected.is_terminal());
    }

    fn sample_order() -> Order {
        Order {
            id: "o-1".into(),
            code: "ORD-0001".into(),
            customer: "Maria".into(),
            product: "Agua 20L".into(),
            quantity: 2,
            unit_price_cents: 1500,
            total_cents: 3000,
            status: OrderStatus::Pending,
            is_delivered: false,
            delivery_address: Some("Av. Banzer 123".into()),
            latitude: Some(-17.78),
            longitude: Some(-63.18),
            distributor_id: None,
            origin: OrderOrigin::Web,
            observation: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_delivery_point_requires_both_coordinates() {
        let mut order = sample_order();
        assert!(order.delivery_point().is_some());

        order.longitude = None;
        assert!(order.delivery_point().is_none());

        order.longitude = Some(f64::NAN);
        assert!(order.delivery_point().is_none());
    }

    #[test]
    fn test_fulfillment_consistency() {
        let mut order = sample_order();
        assert!(order.fulfillment_consistent());

        order.status = OrderStatus::Delivered;
        assert!(!order.fulfillment_consistent());

        order.is_delivered = true;
        assert!(order.fulfillment_consistent());
    }
}
