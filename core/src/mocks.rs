//! Test doubles for the box office collaborators.
//!
//! Enabled by the `test-utils` feature (on by default) so integration tests
//! and downstream crates can drive the workflow deterministically.

use crate::catalog::SessionSetup;
use crate::collaborators::{InvoiceService, Notifier};
use crate::environment::Clock;
use crate::error::{BoxOfficeError, Result};
use crate::orders::Order;
use crate::payment_gateway::{GatewayResult, PaymentGateway, PaymentGatewayError, PaymentRequest};
use crate::seats::{HoldOutcome, SeatStore};
use crate::types::{EventSessionId, ExternalTransactionRef, OrderId, SeatId, SeatRecord, SeatState};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// Clock
// ============================================================================

/// Clock that only moves when told to.
///
/// # Example
///
/// ```
/// use boxoffice_core::mocks::FixedClock;
/// use boxoffice_core::environment::Clock;
/// use chrono::Duration;
///
/// let clock = FixedClock::default();
/// let start = clock.now();
/// clock.advance(Duration::minutes(15));
/// assert_eq!(clock.now() - start, Duration::minutes(15));
/// ```
#[derive(Debug)]
pub struct FixedClock {
    time: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// A clock frozen at `time`
    #[must_use]
    pub const fn new(time: DateTime<Utc>) -> Self {
        Self {
            time: Mutex::new(time),
        }
    }

    /// Moves the clock forward
    pub fn advance(&self, by: Duration) {
        let mut time = lock(&self.time);
        *time += by;
    }

    /// Sets the clock
    pub fn set(&self, time: DateTime<Utc>) {
        *lock(&self.time) = time;
    }
}

impl Default for FixedClock {
    /// 2025-01-01 00:00:00 UTC
    fn default() -> Self {
        Self::new(DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.time)
    }
}

// ============================================================================
// Payment gateway
// ============================================================================

/// Gateway that records requests and can be told to fail.
#[derive(Debug, Default)]
pub struct ScriptedPaymentGateway {
    requests: Mutex<Vec<PaymentRequest>>,
    fail_next: AtomicBool,
    issued: AtomicUsize,
}

impl ScriptedPaymentGateway {
    /// Creates a gateway that succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The next initiation fails with a timeout
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Requests that reached the gateway, failed ones included
    #[must_use]
    pub fn requests(&self) -> Vec<PaymentRequest> {
        lock(&self.requests).clone()
    }
}

impl PaymentGateway for ScriptedPaymentGateway {
    fn initiate(
        &self,
        request: PaymentRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<ExternalTransactionRef>> + Send + '_>> {
        Box::pin(async move {
            lock(&self.requests).push(request);
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(PaymentGatewayError::Timeout);
            }
            let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(ExternalTransactionRef::new(format!("scripted-{n}")))
        })
    }
}

// ============================================================================
// Notifier / invoices
// ============================================================================

/// Records paid orders; acts as both notifier and invoice service.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    paid: Mutex<Vec<OrderId>>,
    invoiced: Mutex<Vec<OrderId>>,
    failing: AtomicBool,
}

impl RecordingNotifier {
    /// Creates a notifier that succeeds
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call fail (and record nothing)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Orders a paid notification was sent for
    #[must_use]
    pub fn paid_orders(&self) -> Vec<OrderId> {
        lock(&self.paid).clone()
    }

    /// Orders an invoice was issued for
    #[must_use]
    pub fn invoiced_orders(&self) -> Vec<OrderId> {
        lock(&self.invoiced).clone()
    }

    fn record(&self, into: &Mutex<Vec<OrderId>>, order: &Order) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(BoxOfficeError::ExternalFailure("notification channel down".into()));
        }
        lock(into).push(order.id);
        Ok(())
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn order_paid(&self, order: &Order) -> Result<()> {
        self.record(&self.paid, order)
    }
}

#[async_trait]
impl InvoiceService for RecordingNotifier {
    async fn issue_invoice(&self, order: &Order) -> Result<()> {
        self.record(&self.invoiced, order)
    }
}

// ============================================================================
// Seat store with injected failures
// ============================================================================

/// Wraps a seat store and fails a configurable number of upcoming calls.
pub struct FlakySeatStore {
    inner: Arc<dyn SeatStore>,
    release_failures: AtomicUsize,
    mark_sold_failures: AtomicUsize,
}

impl FlakySeatStore {
    /// Wraps `inner`; no failures are scheduled.
    #[must_use]
    pub fn new(inner: Arc<dyn SeatStore>) -> Self {
        Self {
            inner,
            release_failures: AtomicUsize::new(0),
            mark_sold_failures: AtomicUsize::new(0),
        }
    }

    /// The next `count` releases fail with a storage error.
    pub fn fail_releases(&self, count: usize) {
        self.release_failures.store(count, Ordering::SeqCst);
    }

    /// The next `count` mark-sold calls fail with a storage error.
    pub fn fail_mark_sold(&self, count: usize) {
        self.mark_sold_failures.store(count, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl SeatStore for FlakySeatStore {
    async fn initialize_session(&self, setup: &SessionSetup, seats: &[SeatRecord]) -> Result<()> {
        self.inner.initialize_session(setup, seats).await
    }

    async fn load_sessions(&self) -> Result<Vec<(SessionSetup, Vec<SeatRecord>)>> {
        self.inner.load_sessions().await
    }

    async fn try_hold(&self, seats: &[SeatId], order_id: OrderId) -> Result<HoldOutcome> {
        self.inner.try_hold(seats, order_id).await
    }

    async fn mark_sold(&self, seats: &[SeatId], order_id: OrderId) -> Result<()> {
        if Self::take_failure(&self.mark_sold_failures) {
            return Err(BoxOfficeError::Storage("injected mark_sold failure".into()));
        }
        self.inner.mark_sold(seats, order_id).await
    }

    async fn release(&self, seats: &[SeatId], order_id: OrderId) -> Result<usize> {
        if Self::take_failure(&self.release_failures) {
            return Err(BoxOfficeError::Storage("injected release failure".into()));
        }
        self.inner.release(seats, order_id).await
    }

    async fn snapshot(&self, session_id: EventSessionId) -> Result<HashMap<SeatId, SeatState>> {
        self.inner.snapshot(session_id).await
    }

    async fn seat_states(&self, seats: &[SeatId]) -> Result<Vec<(SeatId, SeatState)>> {
        self.inner.seat_states(seats).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_only_on_request() {
        let clock = FixedClock::default();
        let start = clock.now();
        assert_eq!(clock.now(), start);
        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now() - start, Duration::seconds(90));
    }

    #[test]
    fn flaky_counter_runs_down() {
        let counter = AtomicUsize::new(2);
        assert!(FlakySeatStore::take_failure(&counter));
        assert!(FlakySeatStore::take_failure(&counter));
        assert!(!FlakySeatStore::take_failure(&counter));
    }
}
