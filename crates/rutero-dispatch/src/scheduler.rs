//! # Reconcile Scheduler
//!
//! Background task that runs the scheduled reconciliation pass.
//!
//! ## Task Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Reconcile Scheduler                                │
//! │                                                                         │
//! │  boot ──► ReconcileScheduler::spawn(engine, every 5 min)               │
//! │              │                                                          │
//! │              ▼                                                          │
//! │  loop {                                                                │
//! │      select! {                                                         │
//! │          interval.tick() → engine.reconcile_unassigned(Simulated)      │
//! │          shutdown.recv() → break                                       │
//! │      }                                                                 │
//! │  }                                                                     │
//! │              ▲                                                          │
//! │  shutdown ───┘  SchedulerHandle::shutdown() (graceful, at exit)        │
//! │                                                                         │
//! │  The scheduled pass is scoped to simulated/ingested orders; the        │
//! │  manual trigger calls the SAME engine entry point with no scope.       │
//! │  Overlap between a slow pass and the next tick (or a manual call) is   │
//! │  tolerated: per-order conditional writes make double-assignment        │
//! │  impossible, so there is no pass-level mutex.                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{error, info};

use rutero_core::OrderOrigin;
use rutero_db::UnassignedScope;

use crate::assignment::AssignmentEngine;

/// Default period between scheduled reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(5 * 60);

// =============================================================================
// Scheduler
// =============================================================================

/// Owns the recurring reconciliation task.
pub struct ReconcileScheduler {
    engine: AssignmentEngine,
    interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SchedulerHandle {
    /// Signals the scheduler to stop after the current iteration.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl ReconcileScheduler {
    /// Spawns the scheduler as a background task and returns its handle.
    ///
    /// Started once at boot; the handle's `shutdown` is called during
    /// graceful process shutdown.
    pub fn spawn(engine: AssignmentEngine, interval: Duration) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let scheduler = ReconcileScheduler {
            engine,
            interval,
            shutdown_rx,
        };
        tokio::spawn(scheduler.run());

        SchedulerHandle { shutdown_tx }
    }

    /// Runs the scheduler loop.
    async fn run(mut self) {
        info!(period_secs = self.interval.as_secs(), "Reconcile scheduler starting");

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick of tokio's interval fires immediately; consume it
        // so the first pass happens one period after boot.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self
                        .engine
                        .reconcile_unassigned(UnassignedScope::Origin(OrderOrigin::Simulated))
                        .await
                    {
                        Ok(report) => info!(
                            assigned = report.assigned,
                            total = report.total,
                            "Scheduled reconciliation pass finished"
                        ),
                        // The next tick retries; a failed pass never kills
                        // the scheduler.
                        Err(e) => error!(error = %e, "Scheduled reconciliation pass failed"),
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Reconcile scheduler shutting down");
                    break;
                }
            }
        }

        info!("Reconcile scheduler stopped");
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
