//! Order lifecycle controller.
//!
//! ```text
//! PENDING --(payment initiated)--> AWAITING_PAYMENT
//! PENDING | AWAITING_PAYMENT --(hold lapsed, payment denied)--> RELEASING(EXPIRED) --> EXPIRED
//! PENDING | AWAITING_PAYMENT --(cancel)--> RELEASING(CANCELLED) --> CANCELLED
//! AWAITING_PAYMENT --(payment confirmed)--> SETTLING --> PAID
//! ```
//!
//! Every transition starts with a compare-and-set claim on the order status.
//! The claimant then performs the seat writes and records the final status.
//! A claimant that fails midway leaves the order in `SETTLING` or `RELEASING`,
//! where the sweeper picks it up again.

use crate::auth::Principal;
use crate::collaborators::{InvoiceService, Notifier, ReconciliationFlag, ReconciliationReason, ReconciliationSink};
use crate::environment::Clock;
use crate::error::{BoxOfficeError, Result};
use crate::metrics;
use crate::orders::{CasOutcome, ItemsUpdate, Order, OrderStatus, OrderStore, OrderUpdate, ReleaseTarget};
use crate::payment_gateway::{PaymentGateway, PaymentSettings};
use crate::retry::{RetryPolicy, retry_transient};
use crate::seats::SeatStore;
use crate::types::{ExternalTransactionRef, OrderId};
use std::sync::Arc;

/// Dependencies of the lifecycle controller.
#[derive(Clone)]
pub struct LifecycleEnvironment {
    /// Seat status
    pub seats: Arc<dyn SeatStore>,
    /// Order status
    pub orders: Arc<dyn OrderStore>,
    /// Outbound payment initiation
    pub gateway: Arc<dyn PaymentGateway>,
    /// Buyer notification after payment
    pub notifier: Arc<dyn Notifier>,
    /// Invoice issuing after payment
    pub invoices: Arc<dyn InvoiceService>,
    /// Payments needing follow-up
    pub reconciliation: Arc<dyn ReconciliationSink>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

/// Drives orders between statuses and keeps seat status in step.
pub struct OrderLifecycleController {
    env: LifecycleEnvironment,
    payment: PaymentSettings,
    retry: RetryPolicy,
}

impl OrderLifecycleController {
    /// Creates a controller
    #[must_use]
    pub const fn new(env: LifecycleEnvironment, payment: PaymentSettings, retry: RetryPolicy) -> Self {
        Self { env, payment, retry }
    }

    /// Loads an order for its owner or an admin.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::NotFound`] or [`BoxOfficeError::Forbidden`].
    pub async fn order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        principal.require_owner(order.user_id, true)?;
        Ok(order)
    }

    /// Loads the order a gateway reference belongs to.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::NotFound`] for an unknown reference.
    pub async fn order_for_payment(&self, reference: &ExternalTransactionRef) -> Result<Order> {
        self.load_by_reference(reference).await
    }

    // ========================================================================
    // Payment
    // ========================================================================

    /// Opens a checkout with the payment gateway.
    ///
    /// Moves a `Pending` order to `AwaitingPayment` before calling the gateway.
    /// An order already `AwaitingPayment` without a reference (an earlier
    /// attempt failed at the gateway) may be retried; one with a reference is
    /// returned unchanged. The hold deadline is never extended.
    ///
    /// # Errors
    ///
    /// - [`BoxOfficeError::InvalidTransition`] if the order is past payment or its hold lapsed
    /// - [`BoxOfficeError::ExternalFailure`] when the gateway fails
    pub async fn initiate_payment(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        principal.require_owner(order.user_id, false)?;

        match order.status {
            OrderStatus::AwaitingPayment if order.payment_ref.is_some() => return Ok(order),
            OrderStatus::Pending | OrderStatus::AwaitingPayment => {}
            other => return Err(BoxOfficeError::invalid_transition(order_id, other, "initiate payment for")),
        }

        let now = self.env.clock.now();
        if order.hold_elapsed(now) {
            return Err(BoxOfficeError::invalid_transition(order_id, "hold expired", "initiate payment for"));
        }

        let claimed = if order.status == OrderStatus::Pending {
            match self
                .env
                .orders
                .compare_and_set(
                    order_id,
                    &[OrderStatus::Pending],
                    OrderUpdate::status(OrderStatus::AwaitingPayment, now),
                )
                .await?
            {
                CasOutcome::Applied(claimed) => {
                    metrics::record_order_status(OrderStatus::AwaitingPayment);
                    claimed
                }
                CasOutcome::Rejected(current) => {
                    return Err(BoxOfficeError::invalid_transition(order_id, current.status, "initiate payment for"));
                }
            }
        } else {
            order
        };

        let request = self.payment.build_request(&claimed, now);
        let reference = match self.env.gateway.initiate(request).await {
            Ok(reference) => reference,
            Err(err) => {
                tracing::warn!(order_id = %order_id, error = %err, "Payment initiation failed");
                return Err(err.into());
            }
        };

        let update = OrderUpdate::status(OrderStatus::AwaitingPayment, self.env.clock.now())
            .with_payment_ref(reference.clone());
        match self
            .env
            .orders
            .compare_and_set(order_id, &[OrderStatus::AwaitingPayment], update)
            .await?
        {
            CasOutcome::Applied(order) => {
                tracing::info!(order_id = %order_id, payment_ref = %reference, total = %order.total, "Payment initiated");
                Ok(order)
            }
            CasOutcome::Rejected(current) => {
                // the order expired or was cancelled while the gateway was working
                self.flag(&current, Some(reference), ReconciliationReason::OrphanedPayment)
                    .await;
                Err(BoxOfficeError::invalid_transition(order_id, current.status, "record payment for"))
            }
        }
    }

    /// Handles the gateway's confirmation for `reference`.
    ///
    /// Confirming an order that is already `Paid` (or settling) returns it
    /// unchanged. Confirming an order that expired or was cancelled is
    /// rejected and the payment is flagged for refund. A confirmation that
    /// arrives after the hold lapsed expires the order first, whether or not
    /// the sweeper has reached it yet.
    ///
    /// # Errors
    ///
    /// - [`BoxOfficeError::NotFound`] for an unknown reference
    /// - [`BoxOfficeError::InvalidTransition`] when the order can no longer be
    ///   paid, including when its seats could not be marked sold
    pub async fn confirm_payment(&self, reference: &ExternalTransactionRef) -> Result<Order> {
        let order = self.load_by_reference(reference).await?;

        match order.status {
            OrderStatus::Paid | OrderStatus::Settling => {
                tracing::debug!(order_id = %order.id, status = %order.status, "Duplicate payment confirmation");
                return Ok(order);
            }
            OrderStatus::AwaitingPayment if order.hold_elapsed(self.env.clock.now()) => {
                return self.expire_on_late_confirmation(order, reference).await;
            }
            OrderStatus::AwaitingPayment => {}
            OrderStatus::Pending => {
                return Err(BoxOfficeError::invalid_transition(order.id, order.status, "confirm payment for"));
            }
            OrderStatus::Expired | OrderStatus::Cancelled | OrderStatus::Releasing(_) => {
                return Err(self.reject_late_confirmation(&order, reference).await);
            }
        }

        let claim = OrderUpdate::status(OrderStatus::Settling, self.env.clock.now());
        match self
            .env
            .orders
            .compare_and_set(order.id, &[OrderStatus::AwaitingPayment], claim)
            .await?
        {
            CasOutcome::Applied(settling) => self.settle(settling).await,
            CasOutcome::Rejected(current) if matches!(current.status, OrderStatus::Paid | OrderStatus::Settling) => {
                Ok(current)
            }
            CasOutcome::Rejected(current) => Err(self.reject_late_confirmation(&current, reference).await),
        }
    }

    /// Handles the gateway's denial for `reference`: the order expires and
    /// its seats are released.
    ///
    /// A denial for an order that is already terminal is a no-op. A denial
    /// that arrives after a confirmation was claimed is ignored.
    ///
    /// # Errors
    ///
    /// - [`BoxOfficeError::NotFound`] for an unknown reference
    /// - [`BoxOfficeError::Storage`] if seats could not be released (the
    ///   order stays releasing and the sweeper finishes it)
    pub async fn deny_payment(&self, reference: &ExternalTransactionRef) -> Result<Order> {
        let order = self.load_by_reference(reference).await?;

        match order.status {
            OrderStatus::AwaitingPayment => {}
            OrderStatus::Settling => {
                tracing::warn!(order_id = %order.id, payment_ref = %reference, "Payment denial after confirmation; ignored");
                return Ok(order);
            }
            OrderStatus::Pending => {
                return Err(BoxOfficeError::invalid_transition(order.id, order.status, "deny payment for"));
            }
            OrderStatus::Paid | OrderStatus::Expired | OrderStatus::Cancelled | OrderStatus::Releasing(_) => {
                tracing::debug!(order_id = %order.id, status = %order.status, "Duplicate payment denial");
                return Ok(order);
            }
        }

        tracing::info!(order_id = %order.id, payment_ref = %reference, "Payment denied");
        match self
            .claim_release(order.id, &[OrderStatus::AwaitingPayment], ReleaseTarget::Expired)
            .await?
        {
            CasOutcome::Applied(releasing) => self.finish_release(releasing, ReleaseTarget::Expired).await,
            CasOutcome::Rejected(current) => Ok(current),
        }
    }

    // ========================================================================
    // Cancellation and expiry
    // ========================================================================

    /// Cancels an order on behalf of its owner or an admin.
    ///
    /// Cancelling an already cancelled order returns it unchanged.
    ///
    /// # Errors
    ///
    /// - [`BoxOfficeError::Forbidden`] for another user's order
    /// - [`BoxOfficeError::InvalidTransition`] for a paid, settling or expired order
    /// - [`BoxOfficeError::Storage`] if seats could not be released
    pub async fn cancel(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;
        principal.require_owner(order.user_id, true)?;

        let current = match order.status {
            OrderStatus::Pending | OrderStatus::AwaitingPayment => {
                match self
                    .claim_release(order_id, &OrderStatus::ACTIVE, ReleaseTarget::Cancelled)
                    .await?
                {
                    CasOutcome::Applied(releasing) => {
                        tracing::info!(order_id = %order_id, by = %principal.user_id, "Order cancelled");
                        return self.finish_release(releasing, ReleaseTarget::Cancelled).await;
                    }
                    CasOutcome::Rejected(current) => current,
                }
            }
            _ => order,
        };

        match current.status {
            OrderStatus::Cancelled => Ok(current),
            OrderStatus::Releasing(ReleaseTarget::Cancelled) => {
                self.finish_release(current, ReleaseTarget::Cancelled).await
            }
            other => Err(BoxOfficeError::invalid_transition(order_id, other, "cancel")),
        }
    }

    /// Expires an order whose hold has lapsed and releases its seats.
    ///
    /// Orders that are terminal, settling, or whose hold has not lapsed are
    /// returned unchanged. An order already releasing has its release finished.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Storage`] if seats could not be released; the order
    /// stays releasing.
    pub async fn expire_lapsed(&self, order_id: OrderId) -> Result<Order> {
        let order = self.load(order_id).await?;

        let current = match order.status {
            OrderStatus::Pending | OrderStatus::AwaitingPayment if order.hold_elapsed(self.env.clock.now()) => {
                match self
                    .claim_release(order_id, &OrderStatus::ACTIVE, ReleaseTarget::Expired)
                    .await?
                {
                    CasOutcome::Applied(releasing) => {
                        tracing::info!(order_id = %order_id, hold_expires_at = %releasing.hold_expires_at, "Order hold lapsed");
                        return self.finish_release(releasing, ReleaseTarget::Expired).await;
                    }
                    CasOutcome::Rejected(current) => current,
                }
            }
            _ => order,
        };

        match current.status {
            OrderStatus::Releasing(target) => self.finish_release(current, target).await,
            _ => Ok(current),
        }
    }

    /// Finishes the release of an order left in `Releasing`.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Storage`] if seats still cannot be released.
    pub async fn resume_release(&self, order: Order) -> Result<Order> {
        match order.status {
            OrderStatus::Releasing(target) => self.finish_release(order, target).await,
            _ => Ok(order),
        }
    }

    /// Recovers an order left in `Settling`.
    ///
    /// The seats are marked sold again (a no-op for seats already sold). If
    /// that succeeds the order is paid; otherwise it is expired and flagged.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::InvalidTransition`] when the seats were lost,
    /// [`BoxOfficeError::Storage`] on store failure.
    pub async fn recover_settling(&self, order: Order) -> Result<Order> {
        if order.status != OrderStatus::Settling {
            return Ok(order);
        }
        tracing::warn!(order_id = %order.id, since = %order.updated_at, "Recovering order stuck in settling");
        self.settle(order).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.env
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| BoxOfficeError::not_found("order", order_id))
    }

    async fn load_by_reference(&self, reference: &ExternalTransactionRef) -> Result<Order> {
        self.env
            .orders
            .find_by_payment_ref(reference)
            .await?
            .ok_or_else(|| BoxOfficeError::not_found("payment", reference))
    }

    /// Marks the seats of a `Settling` order sold and records it paid.
    async fn settle(&self, order: Order) -> Result<Order> {
        let seat_ids = order.seat_ids();
        match self.env.seats.mark_sold(&seat_ids, order.id).await {
            Ok(()) => self.record_paid(order).await,
            Err(err @ BoxOfficeError::InvalidTransition { .. }) => {
                tracing::warn!(order_id = %order.id, error = %err, "Seats lost before payment settled; expiring order");
                self.flag(&order, order.payment_ref.clone(), ReconciliationReason::SeatsLost)
                    .await;
                if let CasOutcome::Applied(releasing) = self
                    .claim_release(order.id, &[OrderStatus::Settling], ReleaseTarget::Expired)
                    .await?
                {
                    // a release failure leaves the order releasing for the sweeper
                    let _ = self.finish_release(releasing, ReleaseTarget::Expired).await;
                }
                Err(err)
            }
            Err(err) => {
                tracing::error!(order_id = %order.id, error = %err, "Failed to mark seats sold; order left settling");
                Err(err)
            }
        }
    }

    async fn record_paid(&self, order: Order) -> Result<Order> {
        let now = self.env.clock.now();
        let outcome = retry_transient(&self.retry, "record_paid", || {
            self.env.orders.compare_and_set(
                order.id,
                &[OrderStatus::Settling],
                OrderUpdate::status(OrderStatus::Paid, now),
            )
        })
        .await?;

        let paid = match outcome {
            CasOutcome::Applied(paid) => paid,
            CasOutcome::Rejected(current) if current.status == OrderStatus::Paid => return Ok(current),
            CasOutcome::Rejected(current) => {
                return Err(BoxOfficeError::invalid_transition(order.id, current.status, "record payment for"));
            }
        };

        tracing::info!(order_id = %paid.id, total = %paid.total, seats = paid.items.len(), "Order paid");
        metrics::record_order_status(OrderStatus::Paid);
        metrics::record_sale(paid.items.len(), paid.total.cents());

        if let Err(err) = self.env.notifier.order_paid(&paid).await {
            tracing::error!(order_id = %paid.id, error = %err, "Failed to send payment notification");
        }
        if let Err(err) = self.env.invoices.issue_invoice(&paid).await {
            tracing::error!(order_id = %paid.id, error = %err, "Failed to issue invoice");
        }
        Ok(paid)
    }

    async fn claim_release(
        &self,
        order_id: OrderId,
        expected: &[OrderStatus],
        target: ReleaseTarget,
    ) -> Result<CasOutcome> {
        self.env
            .orders
            .compare_and_set(
                order_id,
                expected,
                OrderUpdate::status(OrderStatus::Releasing(target), self.env.clock.now()),
            )
            .await
    }

    /// Releases the seats of a claimed order, then records its final status.
    async fn finish_release(&self, order: Order, target: ReleaseTarget) -> Result<Order> {
        let seat_ids = order.seat_ids();
        let released = match retry_transient(&self.retry, "release_seats", || {
            self.env.seats.release(&seat_ids, order.id)
        })
        .await
        {
            Ok(released) => released,
            Err(err) => {
                tracing::error!(order_id = %order.id, error = %err, "Seat release failed; order left releasing");
                return Err(err);
            }
        };

        let expected = [OrderStatus::Releasing(target)];
        let update = OrderUpdate::status(target.terminal_status(), self.env.clock.now()).with_items(ItemsUpdate::Clear);
        let outcome = retry_transient(&self.retry, "record_release", || {
            self.env.orders.compare_and_set(order.id, &expected, update.clone())
        })
        .await?;

        match outcome {
            CasOutcome::Applied(done) => {
                tracing::info!(order_id = %done.id, status = %done.status, released, "Order closed and seats released");
                metrics::record_order_status(done.status);
                Ok(done)
            }
            CasOutcome::Rejected(current) if current.status == target.terminal_status() => Ok(current),
            CasOutcome::Rejected(current) => {
                Err(BoxOfficeError::invalid_transition(order.id, current.status, "close"))
            }
        }
    }

    /// Expires an `AwaitingPayment` order whose hold lapsed before the
    /// confirmation arrived, then rejects the confirmation.
    async fn expire_on_late_confirmation(&self, order: Order, reference: &ExternalTransactionRef) -> Result<Order> {
        let current = match self
            .claim_release(order.id, &[OrderStatus::AwaitingPayment], ReleaseTarget::Expired)
            .await?
        {
            CasOutcome::Applied(releasing) => {
                tracing::info!(order_id = %order.id, hold_expires_at = %releasing.hold_expires_at, "Order hold lapsed before payment confirmation");
                match self.finish_release(releasing.clone(), ReleaseTarget::Expired).await {
                    Ok(expired) => expired,
                    // the sweeper finishes the release
                    Err(_) => releasing,
                }
            }
            CasOutcome::Rejected(current) if matches!(current.status, OrderStatus::Paid | OrderStatus::Settling) => {
                return Ok(current);
            }
            CasOutcome::Rejected(current) => current,
        };
        Err(self.reject_late_confirmation(&current, reference).await)
    }

    async fn reject_late_confirmation(&self, order: &Order, reference: &ExternalTransactionRef) -> BoxOfficeError {
        tracing::warn!(order_id = %order.id, status = %order.status, payment_ref = %reference, "Payment confirmed for an order that is no longer payable");
        self.flag(order, Some(reference.clone()), ReconciliationReason::LateConfirmation)
            .await;
        BoxOfficeError::invalid_transition(order.id, order.status, "confirm payment for")
    }

    async fn flag(&self, order: &Order, payment_ref: Option<ExternalTransactionRef>, reason: ReconciliationReason) {
        let flag = ReconciliationFlag {
            order_id: order.id,
            payment_ref,
            reason,
            flagged_at: self.env.clock.now(),
        };
        if let Err(err) = self.env.reconciliation.flag(flag).await {
            tracing::error!(order_id = %order.id, reason = reason.as_str(), error = %err, "Failed to record reconciliation flag");
        }
    }
}
