//! # Route Planner
//!
//! Builds an optimized multi-stop itinerary for a distributor's open orders.
//!
//! ## Planning Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Route Planning                                   │
//! │                                                                         │
//! │  1. LOAD: up to 23 open orders for the distributor                     │
//! │     (23 = the provider's waypoint ceiling)                             │
//! │                                                                         │
//! │  2. FILTER: keep orders with usable delivery coordinates               │
//! │     └── zero left? → SUCCESSFUL empty plan, not an error               │
//! │                                                                         │
//! │  3. ONE provider call: origin → all stops, optimize:true,              │
//! │     destination = last stop in input order                             │
//! │     (the provider reorders waypoints; we never hold a lock here)       │
//! │                                                                         │
//! │  4. MAP BACK: waypoint_order is a permutation of input indices;        │
//! │     walk it to produce stops 1..n, each carrying the order's code,     │
//! │     customer, product, address, total and paid flag                    │
//! │                                                                         │
//! │  5. AGGREGATE: distance (km) and duration (min) summed over legs       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Provider failures surface as `RoutingProvider` errors and are not
//! retried here; the caller decides. A missing credential is a
//! `Configuration` failure - fatal to the call, not the process.

use std::sync::Arc;

use tracing::{debug, info};

use rutero_core::geo::Point;
use rutero_core::{Order, RoutePlan, RouteStop, RouteSummary, MAX_ROUTE_WAYPOINTS};
use rutero_db::Database;

use crate::error::{DispatchError, DispatchResult};
use crate::routing::RoutingProvider;

// =============================================================================
// Route Planner
// =============================================================================

/// Plans delivery itineraries through the routing provider boundary.
#[derive(Clone)]
pub struct RoutePlanner {
    db: Database,
    /// Absent when no routing credential was configured; planning calls
    /// then fail with a `Configuration` error while the rest of the
    /// process keeps running.
    provider: Option<Arc<dyn RoutingProvider>>,
}

impl RoutePlanner {
    /// Creates a new route planner.
    pub fn new(db: Database, provider: Option<Arc<dyn RoutingProvider>>) -> Self {
        RoutePlanner { db, provider }
    }

    /// Plans a route over the distributor's open orders.
    pub async fn plan_route(&self, distributor_id: &str, start: Point) -> DispatchResult<RoutePlan> {
        self.require_distributor(distributor_id).await?;

        let orders = self
            .db
            .orders()
            .list_open_for_distributor(distributor_id, MAX_ROUTE_WAYPOINTS as i64)
            .await?;

        self.plan(start, orders).await
    }

    /// Plans a route restricted to an explicit set of the distributor's
    /// open orders (the driver sequencing a hand-picked subset).
    pub async fn plan_custom_route(
        &self,
        distributor_id: &str,
        start: Point,
        order_ids: &[String],
    ) -> DispatchResult<RoutePlan> {
        self.require_distributor(distributor_id).await?;

        let mut orders = self
            .db
            .orders()
            .list_open_by_ids(distributor_id, order_ids)
            .await?;
        // The provider's waypoint ceiling applies here too.
        orders.truncate(MAX_ROUTE_WAYPOINTS);

        self.plan(start, orders).await
    }

    async fn require_distributor(&self, distributor_id: &str) -> DispatchResult<()> {
        self.db
            .distributors()
            .get_by_id(distributor_id)
            .await?
            .ok_or_else(|| DispatchError::distributor_not_found(distributor_id))?;
        Ok(())
    }

    /// Shared planning core for both entry points.
    async fn plan(&self, start: Point, orders: Vec<Order>) -> DispatchResult<RoutePlan> {
        // Orders without usable coordinates can't be routed; they stay
        // assigned but don't appear in the itinerary.
        let stops: Vec<(Order, Point)> = orders
            .into_iter()
            .filter_map(|order| order.delivery_point().map(|point| (order, point)))
            .collect();

        if stops.is_empty() {
            debug!("Nothing to route");
            return Ok(RoutePlan::empty(start));
        }

        let provider = self.provider.as_ref().ok_or_else(|| {
            DispatchError::Configuration("routing provider not configured".to_string())
        })?;

        let points: Vec<Point> = stops.iter().map(|(_, point)| *point).collect();
        // Provider call happens with no lock or transaction held.
        let route = provider.optimized_route(start, &points, true).await?;

        let visit_order = Self::visit_order(&route.waypoint_order, stops.len());

        let mut plan_stops = Vec::with_capacity(stops.len());
        for (seq, idx) in visit_order.into_iter().enumerate() {
            let (order, point) = &stops[idx];
            // Scoped query per stop: "does this order have a completed
            // payment" - never a preloaded relation.
            let paid = self
                .db
                .payments()
                .count_completed_for_order(&order.id)
                .await?
                > 0;

            plan_stops.push(RouteStop {
                position: (seq + 1) as u32,
                order_id: order.id.clone(),
                code: order.code.clone(),
                customer: order.customer.clone(),
                product: order.product.clone(),
                address: order.delivery_address.clone(),
                total_cents: order.total_cents,
                paid,
                lat: point.lat,
                lon: point.lon,
            });
        }

        let distance_m: i64 = route.legs.iter().map(|leg| leg.distance_m).sum();
        let duration_s: i64 = route.legs.iter().map(|leg| leg.duration_s).sum();

        let summary = RouteSummary {
            polyline: route.polyline,
            distance_km: (distance_m as f64 / 1000.0 * 100.0).round() / 100.0,
            duration_min: (duration_s as f64 / 60.0).round() as i64,
        };

        info!(
            stops = plan_stops.len(),
            distance_km = summary.distance_km,
            duration_min = summary.duration_min,
            "Route planned"
        );

        Ok(RoutePlan {
            origin: start,
            stops: plan_stops,
            route: Some(summary),
        })
    }

    /// Sanitizes the provider's visiting order.
    ///
    /// A well-formed `waypoint_order` is a permutation of `0..stop_count`.
    /// Anything else (empty for single-stop routes, out-of-range or
    /// duplicated indices) falls back to input order so no stop is lost.
    fn visit_order(waypoint_order: &[usize], stop_count: usize) -> Vec<usize> {
        let mut seen = vec![false; stop_count];
        let mut visit = Vec::with_capacity(stop_count);

        for &idx in waypoint_order {
            if idx < stop_count && !seen[idx] {
                seen[idx] = true;
                visit.push(idx);
            }
        }

        if visit.len() == stop_count {
            visit
        } else {
            (0..stop_count).collect()
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use rutero_core::{OrderOrigin, PaymentMethod, PaymentStatus};
    use rutero_db::{DbConfig, NewDistributor, NewOrder, NewPayment};

    use crate::routing::{OptimizedRoute, RouteLeg};

    /// Canned provider recording the request it received.
    struct FakeProvider {
        response: DispatchResult<OptimizedRoute>,
        requests: Mutex<Vec<(Point, Vec<Point>, bool)>>,
    }

    impl FakeProvider {
        fn ok(route: OptimizedRoute) -> Arc<Self> {
            Arc::new(FakeProvider {
                response: Ok(route),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: &str, reason: &str) -> Arc<Self> {
            Arc::new(FakeProvider {
                response: Err(DispatchError::RoutingProvider {
                    status: status.to_string(),
                    reason: reason.to_string(),
                }),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl RoutingProvider for FakeProvider {
        async fn optimized_route(
            &self,
            origin: Point,
            stops: &[Point],
            optimize: bool,
        ) -> DispatchResult<OptimizedRoute> {
            self.requests
                .lock()
                .unwrap()
                .push((origin, stops.to_vec(), optimize));
            match &self.response {
                Ok(route) => Ok(route.clone()),
                Err(DispatchError::RoutingProvider { status, reason }) => {
                    Err(DispatchError::RoutingProvider {
                        status: status.clone(),
                        reason: reason.clone(),
                    })
                }
                Err(_) => unreachable!(),
            }
        }
    }

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    async fn insert_distributor(db: &Database) -> String {
        db.distributors()
            .insert(NewDistributor {
                name: "Carlos".to_string(),
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

    async fn insert_open_order(
        db: &Database,
        code: &str,
        distributor_id: &str,
        coords: Option<(f64, f64)>,
    ) -> String {
        db.orders()
            .insert(NewOrder {
                code: code.to_string(),
                customer: format!("Customer {code}"),
                product: "Agua 20L".to_string(),
                quantity: 2,
                unit_price_cents: 1500,
                delivery_address: Some(format!("Street {code}")),
                latitude: coords.map(|c| c.0),
                longitude: coords.map(|c| c.1),
                distributor_id: Some(distributor_id.to_string()),
                origin: OrderOrigin::Web,
                observation: String::new(),
            })
            .await
            .unwrap()
            .id
    }

    fn two_leg_route(waypoint_order: Vec<usize>) -> OptimizedRoute {
        OptimizedRoute {
            polyline: Some("encoded123".to_string()),
            legs: vec![
                RouteLeg { distance_m: 1200, duration_s: 300 },
                RouteLeg { distance_m: 1300, duration_s: 330 },
                RouteLeg { distance_m: 500, duration_s: 90 },
            ],
            waypoint_order,
        }
    }

    #[tokio::test]
    async fn test_unknown_distributor_is_not_found() {
        let db = test_db().await;
        let planner = RoutePlanner::new(db, Some(FakeProvider::ok(two_leg_route(vec![]))));

        let err = planner
            .plan_route("missing", Point::new(-17.78, -63.18))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { entity: "Distributor", .. }));
    }

    #[tokio::test]
    async fn test_zero_open_orders_is_successful_empty_plan() {
        let db = test_db().await;
        let dist = insert_distributor(&db).await;
        let provider = FakeProvider::ok(two_leg_route(vec![]));
        let planner = RoutePlanner::new(db, Some(provider.clone()));

        let plan = planner
            .plan_route(&dist, Point::new(-17.78, -63.18))
            .await
            .unwrap();

        assert!(plan.is_empty());
        assert!(plan.route.is_none());
        // No provider call for an empty plan.
        assert!(provider.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orders_without_coordinates_are_filtered() {
        let db = test_db().await;
        let dist = insert_distributor(&db).await;
        insert_open_order(&db, "ORD-0001", &dist, None).await;
        let provider = FakeProvider::ok(two_leg_route(vec![]));
        let planner = RoutePlanner::new(db, Some(provider.clone()));

        let plan = planner
            .plan_route(&dist, Point::new(-17.78, -63.18))
            .await
            .unwrap();
        assert!(plan.is_empty());
    }

    #[tokio::test]
    async fn test_visit_order_maps_back_onto_orders() {
        let db = test_db().await;
        let dist = insert_distributor(&db).await;
        let a = insert_open_order(&db, "ORD-0001", &dist, Some((-17.78, -63.18))).await;
        let b = insert_open_order(&db, "ORD-0002", &dist, Some((-17.80, -63.20))).await;

        // Mark the first order paid so the flag shows up in its stop.
        db.payments()
            .insert(NewPayment {
                order_id: a.clone(),
                method: PaymentMethod::Cash,
                amount_cents: 3000,
                checkout_url: None,
                status: PaymentStatus::Completed,
            })
            .await
            .unwrap();

        // Provider says: visit the second input stop first.
        let provider = FakeProvider::ok(two_leg_route(vec![1, 0]));
        let planner = RoutePlanner::new(db, Some(provider.clone()));

        let plan = planner
            .plan_route(&dist, Point::new(-17.77, -63.17))
            .await
            .unwrap();

        assert_eq!(plan.stops.len(), 2);
        assert_eq!(plan.stops[0].order_id, b);
        assert_eq!(plan.stops[0].position, 1);
        assert!(!plan.stops[0].paid);
        assert_eq!(plan.stops[1].order_id, a);
        assert_eq!(plan.stops[1].position, 2);
        assert!(plan.stops[1].paid);
        assert_eq!(plan.stops[1].total_cents, 3000);

        let summary = plan.route.unwrap();
        assert_eq!(summary.polyline.as_deref(), Some("encoded123"));
        assert_eq!(summary.distance_km, 3.0); // 3000 m
        assert_eq!(summary.duration_min, 12); // 720 s

        // The request carried the optimize flag and both stops.
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].1.len(), 2);
        assert!(requests[0].2);
    }

    #[tokio::test]
    async fn test_empty_waypoint_order_falls_back_to_input_order() {
        let db = test_db().await;
        let dist = insert_distributor(&db).await;
        let a = insert_open_order(&db, "ORD-0001", &dist, Some((-17.78, -63.18))).await;

        let provider = FakeProvider::ok(OptimizedRoute {
            polyline: None,
            legs: vec![RouteLeg { distance_m: 900, duration_s: 60 }],
            waypoint_order: vec![],
        });
        let planner = RoutePlanner::new(db, Some(provider));

        let plan = planner
            .plan_route(&dist, Point::new(-17.77, -63.17))
            .await
            .unwrap();
        assert_eq!(plan.stops.len(), 1);
        assert_eq!(plan.stops[0].order_id, a);
        assert_eq!(plan.route.unwrap().distance_km, 0.9);
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_with_status() {
        let db = test_db().await;
        let dist = insert_distributor(&db).await;
        insert_open_order(&db, "ORD-0001", &dist, Some((-17.78, -63.18))).await;

        let planner =
            RoutePlanner::new(db, Some(FakeProvider::failing("OVER_QUERY_LIMIT", "quota")));
        let err = planner
            .plan_route(&dist, Point::new(-17.77, -63.17))
            .await
            .unwrap_err();

        match err {
            DispatchError::RoutingProvider { status, .. } => assert_eq!(status, "OVER_QUERY_LIMIT"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_provider_is_configuration_error() {
        let db = test_db().await;
        let dist = insert_distributor(&db).await;
        insert_open_order(&db, "ORD-0001", &dist, Some((-17.78, -63.18))).await;

        let planner = RoutePlanner::new(db, None);
        let err = planner
            .plan_route(&dist, Point::new(-17.77, -63.17))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_custom_route_restricts_to_requested_ids() {
        let db = test_db().await;
        let dist = insert_distributor(&db).await;
        let a = insert_open_order(&db, "ORD-0001", &dist, Some((-17.78, -63.18))).await;
        let _b = insert_open_order(&db, "ORD-0002", &dist, Some((-17.80, -63.20))).await;

        let provider = FakeProvider::ok(OptimizedRoute {
            polyline: None,
            legs: vec![RouteLeg { distance_m: 700, duration_s: 120 }],
            waypoint_order: vec![0],
        });
        let planner = RoutePlanner::new(db, Some(provider));

        let plan = planner
            .plan_custom_route(&dist, Point::new(-17.77, -63.17), &[a.clone()])
            .await
            .unwrap();

        assert_eq!(plan.stops.len(), 1);
        assert_eq!(plan.stops[0].order_id, a);
    }
}
