//! # Order Service
//!
//! Order intake (manual and simulated), delivery registration and the
//! order-facing queries.
//!
//! ## Intake Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Order Intake                                   │
//! │                                                                         │
//! │  create_order(input)                                                   │
//! │       │                                                                 │
//! │       ├── validate customer/product/quantity/price/coordinates         │
//! │       ├── next business code: ORD-0001, ORD-0002, ...                  │
//! │       ├── coordinates known? → nearest distributor assigned right      │
//! │       │   away, with an audit observation naming them                  │
//! │       └── insert (status: pending, total = qty × unit price)           │
//! │                                                                         │
//! │  simulate_orders(count, center, radius)                                │
//! │       └── plausible orders jittered around the center, reverse-       │
//! │           geocoded when a geocoder is configured, origin: simulated   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery registration shares the delivered transition with the payment
//! state machine, so a driver submitting "delivered" and a gateway webhook
//! racing on the same order converge exactly like two webhooks would.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use rutero_core::geo::Point;
use rutero_core::validation::{
    validate_coordinates, validate_name, validate_product, validate_quantity, validate_unit_price,
};
use rutero_core::{Order, OrderOrigin, OrderStatus, Payment, ValidationError};
use rutero_db::{Database, NewOrder};

use crate::assignment::AssignmentEngine;
use crate::error::{DispatchError, DispatchResult};
use crate::payments::deliver_order;
use crate::routing::Geocoder;

// =============================================================================
// Inputs & Views
// =============================================================================

/// Input for creating an order.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrder {
    pub customer: String,
    pub product: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    pub delivery_address: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub origin: OrderOrigin,
}

/// An order with its payment records (explicit scoped query, not an eager
/// relation).
#[derive(Debug, Clone, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub payments: Vec<Payment>,
}

/// Catalog used by the simulator.
const SIMULATED_PRODUCTS: &[(&str, i64)] = &[
    ("Agua 20L", 1500),
    ("Gas GLP 10kg", 6500),
    ("Harina 25kg", 18500),
    ("Arroz 50kg", 32000),
    ("Aceite 5L", 7800),
];

const SIMULATED_CUSTOMERS: &[&str] = &[
    "Tienda Don Pedro",
    "Almacen La Esquina",
    "Mercado Los Pozos",
    "Pension El Trompillo",
    "Micromercado 21",
];

/// Roughly one degree of latitude in kilometers.
const KM_PER_DEGREE: f64 = 111.0;

// =============================================================================
// Order Service
// =============================================================================

/// Intake, delivery registration and order queries.
#[derive(Clone)]
pub struct OrderService {
    db: Database,
    assignment: AssignmentEngine,
    /// Absent when no geocoding credential was configured; simulated
    /// intake then falls back to coordinate-formatted addresses.
    geocoder: Option<Arc<dyn Geocoder>>,
}

impl OrderService {
    /// Creates a new order service.
    pub fn new(db: Database, geocoder: Option<Arc<dyn Geocoder>>) -> Self {
        let assignment = AssignmentEngine::new(db.clone());
        OrderService {
            db,
            assignment,
            geocoder,
        }
    }

    /// Creates an order, assigning the nearest distributor immediately when
    /// the delivery coordinates are already known.
    pub async fn create_order(&self, input: CreateOrder) -> DispatchResult<Order> {
        validate_name("customer", &input.customer)?;
        validate_product(&input.product)?;
        validate_quantity(input.quantity)?;
        validate_unit_price(input.unit_price_cents)?;

        let point = match (input.latitude, input.longitude) {
            (Some(lat), Some(lon)) => Some(validate_coordinates(lat, lon)?),
            (None, None) => None,
            _ => {
                return Err(ValidationError::InvalidCoordinate {
                    field: "coordinates".to_string(),
                    reason: "latitude and longitude must be provided together".to_string(),
                }
                .into())
            }
        };

        let code = self.next_code().await?;

        // Intake-time assignment is best-effort; the reconciliation passes
        // pick up anything left unassigned here.
        let (distributor_id, observation) = match point {
            Some(p) => match self.assignment.best_distributor_for(p).await? {
                Some(distributor) => {
                    let note = format!("Assigned automatically to {}", distributor.name);
                    (Some(distributor.id), note)
                }
                None => (None, "Created without an available distributor".to_string()),
            },
            None => (None, String::new()),
        };

        let order = self
            .db
            .orders()
            .insert(NewOrder {
                code,
                customer: input.customer,
                product: input.product,
                quantity: input.quantity,
                unit_price_cents: input.unit_price_cents,
                delivery_address: input.delivery_address,
                latitude: point.map(|p| p.lat),
                longitude: point.map(|p| p.lon),
                distributor_id,
                origin: input.origin,
                observation,
            })
            .await?;

        info!(code = %order.code, origin = order.origin.as_str(), "Order created");
        Ok(order)
    }

    /// Next sequential business code (`ORD-0001`).
    async fn next_code(&self) -> DispatchResult<String> {
        let count = self.db.orders().count_all().await?;
        Ok(format!("ORD-{:04}", count + 1))
    }

    /// Ingests a batch of plausible simulated orders scattered around a
    /// center point.
    ///
    /// Addresses come from the geocoder when one is configured; otherwise
    /// a coordinate-formatted placeholder keeps the order routable.
    pub async fn simulate_orders(
        &self,
        count: usize,
        center: Point,
        radius_km: f64,
    ) -> DispatchResult<Vec<Order>> {
        validate_coordinates(center.lat, center.lon)?;
        if radius_km <= 0.0 || !radius_km.is_finite() {
            return Err(ValidationError::MustBePositive {
                field: "radius_km".to_string(),
            }
            .into());
        }

        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            // Draw every random value before the first await: ThreadRng
            // must not live across suspension points.
            let (point, product, unit_price_cents, quantity, customer) = {
                let mut rng = rand::thread_rng();
                let angle = rng.gen::<f64>() * std::f64::consts::TAU;
                let distance = rng.gen::<f64>() * radius_km;
                let lat = center.lat + distance / KM_PER_DEGREE * angle.cos();
                let lon = center.lon
                    + distance / (KM_PER_DEGREE * center.lat.to_radians().cos().abs().max(0.1))
                        * angle.sin();

                let (product, unit_price_cents) =
                    SIMULATED_PRODUCTS[rng.gen_range(0..SIMULATED_PRODUCTS.len())];
                let quantity = rng.gen_range(1..=5);
                let customer = SIMULATED_CUSTOMERS[rng.gen_range(0..SIMULATED_CUSTOMERS.len())];

                (Point::new(lat, lon), product, unit_price_cents, quantity, customer)
            };

            let address = self.resolve_address(point).await;

            let order = self
                .create_order(CreateOrder {
                    customer: customer.to_string(),
                    product: product.to_string(),
                    quantity,
                    unit_price_cents,
                    delivery_address: Some(address),
                    latitude: Some(point.lat),
                    longitude: Some(point.lon),
                    origin: OrderOrigin::Simulated,
                })
                .await?;
            created.push(order);
        }

        info!(count = created.len(), "Simulated orders ingested");
        Ok(created)
    }

    /// Best-effort reverse geocode with a coordinate fallback; a provider
    /// hiccup never fails intake.
    async fn resolve_address(&self, point: Point) -> String {
        if let Some(geocoder) = &self.geocoder {
            match geocoder.reverse_geocode(point).await {
                Ok(Some(address)) => return address,
                Ok(None) => {}
                Err(e) => warn!(error = %e, "Reverse geocoding failed"),
            }
        }
        format!("Near {:.5}, {:.5}", point.lat, point.lon)
    }

    /// Registers the outcome of a delivery stop reported by the driver.
    ///
    /// `delivered` goes through the shared conditional delivered
    /// transition; `cancelled` / `misdelivered` close the order without
    /// ever overwriting an already-delivered one. The driver's reported
    /// position also refreshes the distributor's last-known coordinates.
    pub async fn register_delivery(
        &self,
        order_id: &str,
        status: OrderStatus,
        observation: Option<String>,
        lat: f64,
        lon: f64,
    ) -> DispatchResult<Order> {
        let point = validate_coordinates(lat, lon)?;

        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DispatchError::order_not_found(order_id))?;

        match status {
            OrderStatus::Pending => {
                return Err(DispatchError::InvalidInput(
                    "delivery registration requires a terminal status".to_string(),
                ));
            }
            OrderStatus::Delivered => {
                let observation =
                    observation.unwrap_or_else(|| "Delivered by distributor".to_string());
                deliver_order(&self.db, &order.id, &observation, Some(point)).await?;

                // Opportunistic position refresh: the driver is standing at
                // the delivery point right now.
                if let Some(distributor_id) = &order.distributor_id {
                    self.db
                        .distributors()
                        .update_coordinates(distributor_id, lat, lon)
                        .await?;
                }
            }
            OrderStatus::Cancelled | OrderStatus::Misdelivered => {
                let observation = observation.unwrap_or_default();
                let changed = self
                    .db
                    .orders()
                    .close_if_open(&order.id, status, &observation, Some((lat, lon)))
                    .await?;
                if !changed {
                    return Err(DispatchError::InvalidInput(format!(
                        "order {} is already delivered",
                        order.code
                    )));
                }
            }
        }

        info!(order = %order.code, status = status.as_str(), "Delivery registered");

        self.db
            .orders()
            .get_by_id(&order.id)
            .await?
            .ok_or_else(|| DispatchError::order_not_found(order_id))
    }

    /// Status plus paid flag for tracking screens.
    pub async fn get_status(&self, order_id: &str) -> DispatchResult<(OrderStatus, bool)> {
        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DispatchError::order_not_found(order_id))?;

        let paid = self
            .db
            .payments()
            .count_completed_for_order(&order.id)
            .await?
            > 0;

        Ok((order.status, paid))
    }

    /// Order with its full payment history.
    pub async fn get_detail(&self, order_id: &str) -> DispatchResult<OrderDetail> {
        let order = self
            .db
            .orders()
            .get_by_id(order_id)
            .await?
            .ok_or_else(|| DispatchError::order_not_found(order_id))?;

        let payments = self.db.payments().list_for_order(&order.id).await?;

        Ok(OrderDetail { order, payments })
    }

    /// Recently ingested orders for one origin.
    pub async fn list_recent(&self, origin: OrderOrigin, limit: i64) -> DispatchResult<Vec<Order>> {
        Ok(self.db.orders().list_by_origin(origin, limit).await?)
    }

    /// Explicit administrative removal.
    pub async fn remove(&self, order_id: &str) -> DispatchResult<()> {
        if !self.db.orders().delete(order_id).await? {
            return Err(DispatchError::order_not_found(order_id));
        }
        info!(order_id, "Order removed");
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
