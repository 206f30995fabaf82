//! Post-payment collaborators and the reconciliation ledger.
//!
//! Notifications and invoices run after an order is paid; their failures are
//! logged and never undo the sale. Payments that cannot be honoured are
//! recorded in a [`ReconciliationSink`] for refund or manual follow-up.

use crate::error::Result;
use crate::metrics;
use crate::orders::Order;
use crate::types::{ExternalTransactionRef, OrderId, Timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Tells the buyer their order is paid.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// # Errors
    ///
    /// Delivery failure; the caller only logs it.
    async fn order_paid(&self, order: &Order) -> Result<()>;
}

/// Issues the fiscal invoice for a paid order.
#[async_trait]
pub trait InvoiceService: Send + Sync {
    /// # Errors
    ///
    /// Issuing failure; the caller only logs it.
    async fn issue_invoice(&self, order: &Order) -> Result<()>;
}

/// Notifier that only writes a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn order_paid(&self, order: &Order) -> Result<()> {
        tracing::info!(order_id = %order.id, user_id = %order.user_id, seats = order.items.len(), "Order paid notification");
        Ok(())
    }
}

/// Invoice service that only writes a log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingInvoiceService;

#[async_trait]
impl InvoiceService for TracingInvoiceService {
    async fn issue_invoice(&self, order: &Order) -> Result<()> {
        tracing::info!(order_id = %order.id, total = %order.total, "Invoice requested");
        Ok(())
    }
}

// ============================================================================
// Reconciliation
// ============================================================================

/// Why a payment needs follow-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationReason {
    /// Confirmation arrived after the order expired or was cancelled
    LateConfirmation,
    /// Confirmed, but the seats could not be marked sold
    SeatsLost,
    /// The gateway opened a checkout for an order that left `AwaitingPayment`
    OrphanedPayment,
}

impl ReconciliationReason {
    /// Metric / log label
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::LateConfirmation => "late_confirmation",
            Self::SeatsLost => "seats_lost",
            Self::OrphanedPayment => "orphaned_payment",
        }
    }
}

/// A payment that needs refund or manual follow-up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationFlag {
    /// Order the payment was for
    pub order_id: OrderId,
    /// Gateway reference, when known
    pub payment_ref: Option<ExternalTransactionRef>,
    /// Why
    pub reason: ReconciliationReason,
    /// When it was flagged
    pub flagged_at: Timestamp,
}

/// Records payments that need follow-up. Flags are keyed by order id.
#[async_trait]
pub trait ReconciliationSink: Send + Sync {
    /// Records a flag. Returns `false` if the order was already flagged.
    ///
    /// # Errors
    ///
    /// Backend failure.
    async fn flag(&self, flag: ReconciliationFlag) -> Result<bool>;

    /// Flags not yet resolved.
    ///
    /// # Errors
    ///
    /// Backend failure.
    async fn open_flags(&self) -> Result<Vec<ReconciliationFlag>>;
}

/// In-memory reconciliation ledger.
#[derive(Debug, Default)]
pub struct InMemoryReconciliationLedger {
    flags: Mutex<HashMap<OrderId, ReconciliationFlag>>,
}

impl InMemoryReconciliationLedger {
    /// Creates an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconciliationSink for InMemoryReconciliationLedger {
    async fn flag(&self, flag: ReconciliationFlag) -> Result<bool> {
        let mut flags = self.flags.lock().await;
        if flags.contains_key(&flag.order_id) {
            tracing::debug!(order_id = %flag.order_id, "Order already flagged for reconciliation");
            return Ok(false);
        }

        tracing::warn!(
            order_id = %flag.order_id,
            payment_ref = ?flag.payment_ref.as_ref().map(ExternalTransactionRef::as_str),
            reason = flag.reason.as_str(),
            "Payment flagged for reconciliation"
        );
        metrics::record_reconciliation_flag(flag.reason);
        flags.insert(flag.order_id, flag);
        Ok(true)
    }

    async fn open_flags(&self) -> Result<Vec<ReconciliationFlag>> {
        let mut open: Vec<_> = self.flags.lock().await.values().cloned().collect();
        open.sort_by_key(|flag| flag.flagged_at);
        Ok(open)
    }
}
