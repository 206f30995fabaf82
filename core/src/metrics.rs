//! Business metrics for the box office.
//!
//! # Exported Metrics
//!
//! ## Counters
//! - `boxoffice_holds_total{outcome}` - Seat selection attempts by outcome
//! - `boxoffice_orders_total{status}` - Order transitions by resulting status
//! - `boxoffice_seats_sold_total` - Seats sold
//! - `boxoffice_revenue_cents_total` - Revenue from paid orders in cents
//! - `boxoffice_sweeps_total` - Sweeper passes
//! - `boxoffice_sweep_orders_total{outcome}` - Orders handled by the sweeper
//! - `boxoffice_reconciliation_flags_total{reason}` - Payments flagged for follow-up
//!
//! ## Histograms
//! - `boxoffice_sweep_duration_seconds` - Duration of a sweeper pass

use crate::collaborators::ReconciliationReason;
use crate::orders::OrderStatus;
use crate::sweeper::SweepReport;
use metrics::{describe_counter, describe_histogram};

/// Outcome label of a seat selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HoldOutcomeLabel {
    /// Seats held
    Held,
    /// Another order holds some seats
    Conflict,
    /// Rejected before touching the seat store
    Rejected,
}

impl HoldOutcomeLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Conflict => "conflict",
            Self::Rejected => "rejected",
        }
    }
}

/// Initialize and register all metric descriptions.
///
/// Call once at startup, before any metric is recorded.
pub fn register_metrics() {
    describe_counter!("boxoffice_holds_total", "Seat selection attempts by outcome (held, conflict, rejected)");
    describe_counter!("boxoffice_orders_total", "Order transitions by resulting status");
    describe_counter!("boxoffice_seats_sold_total", "Total number of seats sold");
    describe_counter!("boxoffice_revenue_cents_total", "Revenue from paid orders in cents");
    describe_counter!("boxoffice_sweeps_total", "Expiration sweeper passes");
    describe_counter!("boxoffice_sweep_orders_total", "Orders handled by the sweeper by outcome");
    describe_counter!(
        "boxoffice_reconciliation_flags_total",
        "Payments flagged for refund or manual follow-up"
    );
    describe_histogram!("boxoffice_sweep_duration_seconds", "Duration of an expiration sweeper pass");

    tracing::info!("Box office metrics registered");
}

/// Record a seat selection attempt.
pub fn record_hold(outcome: HoldOutcomeLabel, seats: usize) {
    metrics::counter!("boxoffice_holds_total", "outcome" => outcome.as_str()).increment(1);
    tracing::debug!(outcome = outcome.as_str(), seats, "Recorded hold metric");
}

/// Record an order reaching `status`.
pub fn record_order_status(status: OrderStatus) {
    metrics::counter!("boxoffice_orders_total", "status" => status.as_str()).increment(1);
}

/// Record a completed sale.
pub fn record_sale(seats: usize, revenue_cents: u64) {
    metrics::counter!("boxoffice_seats_sold_total").increment(seats as u64);
    metrics::counter!("boxoffice_revenue_cents_total").increment(revenue_cents);
    tracing::debug!(seats, revenue_cents, "Recorded sale metric");
}

/// Record one sweeper pass.
pub fn record_sweep(report: &SweepReport, duration_secs: f64) {
    metrics::counter!("boxoffice_sweeps_total").increment(1);
    for (outcome, count) in [
        ("expired", report.expired),
        ("resumed", report.resumed),
        ("settled", report.settled),
        ("failed", report.failed),
    ] {
        if count > 0 {
            metrics::counter!("boxoffice_sweep_orders_total", "outcome" => outcome).increment(count as u64);
        }
    }
    metrics::histogram!("boxoffice_sweep_duration_seconds").record(duration_secs);
}

/// Record a payment flagged for reconciliation.
pub fn record_reconciliation_flag(reason: ReconciliationReason) {
    metrics::counter!("boxoffice_reconciliation_flags_total", "reason" => reason.as_str()).increment(1);
}
