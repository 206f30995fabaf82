//! Expiration sweeper.
//!
//! One pass expires every order whose hold lapsed, finishes every release
//! left half done, and recovers confirmations stuck in `SETTLING` for longer
//! than the grace period. A pass is idempotent and safe to run concurrently
//! with itself and with webhook handling; per-order failures are counted and
//! never abort the pass.

use crate::environment::Clock;
use crate::error::{BoxOfficeError, Result};
use crate::lifecycle::OrderLifecycleController;
use crate::metrics;
use crate::orders::{OrderStatus, OrderStore};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

/// Counts from one sweeper pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Orders moved to `Expired`
    pub expired: usize,
    /// Releases finished for orders found in `Releasing`
    pub resumed: usize,
    /// Stuck confirmations completed as `Paid`
    pub settled: usize,
    /// Orders that needed nothing by the time they were looked at
    pub skipped: usize,
    /// Orders whose handling failed; retried on the next pass
    pub failed: usize,
}

impl SweepReport {
    /// Whether the pass changed or attempted anything.
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.expired + self.resumed + self.settled + self.failed == 0
    }
}

/// Reclaims seats from lapsed and interrupted orders.
pub struct ExpirationSweeper {
    orders: Arc<dyn OrderStore>,
    controller: Arc<OrderLifecycleController>,
    clock: Arc<dyn Clock>,
    settling_grace: Duration,
}

impl ExpirationSweeper {
    /// Creates a sweeper. Orders in `Settling` are only touched once they have
    /// been there for `settling_grace`.
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderStore>,
        controller: Arc<OrderLifecycleController>,
        clock: Arc<dyn Clock>,
        settling_grace: Duration,
    ) -> Self {
        Self {
            orders,
            controller,
            clock,
            settling_grace,
        }
    }

    /// Runs one pass.
    ///
    /// # Errors
    ///
    /// Only when the order store cannot be queried; failures on individual
    /// orders are reported in [`SweepReport::failed`].
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        let started = Instant::now();
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for order in self.orders.due_for_expiry(now).await? {
            match self.controller.expire_lapsed(order.id).await {
                Ok(done) if done.status == OrderStatus::Expired => report.expired += 1,
                Ok(_) => report.skipped += 1,
                Err(err) => {
                    tracing::warn!(order_id = %order.id, error = %err, "Failed to expire order");
                    report.failed += 1;
                }
            }
        }

        for order in self.orders.in_status(&OrderStatus::RELEASING).await? {
            let order_id = order.id;
            match self.controller.resume_release(order).await {
                Ok(done) if done.status.is_terminal() => report.resumed += 1,
                Ok(_) => report.skipped += 1,
                Err(err) => {
                    tracing::warn!(order_id = %order_id, error = %err, "Failed to resume seat release");
                    report.failed += 1;
                }
            }
        }

        let cutoff = now - self.settling_grace;
        let stuck = self
            .orders
            .in_status(&[OrderStatus::Settling])
            .await?
            .into_iter()
            .filter(|order| order.updated_at < cutoff);
        for order in stuck {
            let order_id = order.id;
            match self.controller.recover_settling(order).await {
                Ok(done) if done.status == OrderStatus::Paid => report.settled += 1,
                Ok(_) => report.skipped += 1,
                // seats were lost; the controller expired the order and flagged the payment
                Err(BoxOfficeError::InvalidTransition { .. }) => report.expired += 1,
                Err(err) => {
                    tracing::warn!(order_id = %order_id, error = %err, "Failed to recover settling order");
                    report.failed += 1;
                }
            }
        }

        metrics::record_sweep(&report, started.elapsed().as_secs_f64());
        if report.is_idle() {
            tracing::debug!("Sweep found nothing to do");
        } else {
            tracing::info!(
                expired = report.expired,
                resumed = report.resumed,
                settled = report.settled,
                skipped = report.skipped,
                failed = report.failed,
                "Sweep completed"
            );
        }
        Ok(report)
    }

    /// Runs [`ExpirationSweeper::sweep_now`] every `period` on a background task.
    #[must_use]
    pub fn spawn_ticker(self: Arc<Self>, period: std::time::Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(err) = self.sweep_now().await {
                    tracing::error!(error = %err, "Sweep failed");
                }
            }
        })
    }
}
