//! The assembled box office: catalog, stores and workflow components wired
//! together behind one handle.

use crate::auth::Principal;
use crate::catalog::{SeatCatalog, SessionMap, SessionSetup};
use crate::collaborators::{
    InMemoryReconciliationLedger, InvoiceService, Notifier, ReconciliationFlag, ReconciliationSink,
    TracingInvoiceService, TracingNotifier,
};
use crate::dashboard::{SessionDashboard, session_dashboard};
use crate::environment::{Clock, SystemClock};
use crate::error::Result;
use crate::lifecycle::{LifecycleEnvironment, OrderLifecycleController};
use crate::orders::{InMemoryOrderStore, Order, OrderStore};
use crate::payment_gateway::{MockPaymentGateway, PaymentGateway, PaymentSettings};
use crate::reservation::{HoldPolicy, ReservationManager, SelectionRequest};
use crate::retry::RetryPolicy;
use crate::seats::{InMemorySeatStore, SeatStore};
use crate::sweeper::{ExpirationSweeper, SweepReport};
use crate::types::{EventSessionId, ExternalTransactionRef, OrderId, SeatId, SeatLabel, SeatStatus};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Tunables of the box office.
#[derive(Clone, Debug)]
pub struct BoxOfficeSettings {
    /// Hold duration and per-order seat limit
    pub hold: HoldPolicy,
    /// Largest session layout accepted at setup
    pub max_seats_per_session: u64,
    /// How long an order may sit in `Settling` before the sweeper recovers it
    pub settling_grace: Duration,
    /// Payment request parameters
    pub payment: PaymentSettings,
    /// Backoff for seat release and final status writes
    pub retry: RetryPolicy,
}

impl Default for BoxOfficeSettings {
    fn default() -> Self {
        Self {
            hold: HoldPolicy::default(),
            max_seats_per_session: 150,
            settling_grace: Duration::minutes(5),
            payment: PaymentSettings::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Result of a session setup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session id
    pub session_id: EventSessionId,
    /// Seats created
    pub seats: usize,
}

/// One entry of a seat status snapshot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatAvailability {
    /// Seat id
    pub id: SeatId,
    /// Seat label
    pub label: SeatLabel,
    /// Current status
    pub status: SeatStatus,
}

/// Builder for [`BoxOffice`]. Anything not set falls back to the in-memory
/// or logging implementation.
#[derive(Default)]
pub struct BoxOfficeBuilder {
    seats: Option<Arc<dyn SeatStore>>,
    orders: Option<Arc<dyn OrderStore>>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    notifier: Option<Arc<dyn Notifier>>,
    invoices: Option<Arc<dyn InvoiceService>>,
    reconciliation: Option<Arc<dyn ReconciliationSink>>,
    clock: Option<Arc<dyn Clock>>,
    settings: BoxOfficeSettings,
}

impl BoxOfficeBuilder {
    /// Seat store
    #[must_use]
    pub fn seats(mut self, seats: Arc<dyn SeatStore>) -> Self {
        self.seats = Some(seats);
        self
    }

    /// Order store
    #[must_use]
    pub fn orders(mut self, orders: Arc<dyn OrderStore>) -> Self {
        self.orders = Some(orders);
        self
    }

    /// Payment gateway
    #[must_use]
    pub fn gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = Some(gateway);
        self
    }

    /// Paid-order notifier
    #[must_use]
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Invoice service
    #[must_use]
    pub fn invoices(mut self, invoices: Arc<dyn InvoiceService>) -> Self {
        self.invoices = Some(invoices);
        self
    }

    /// Reconciliation sink
    #[must_use]
    pub fn reconciliation(mut self, reconciliation: Arc<dyn ReconciliationSink>) -> Self {
        self.reconciliation = Some(reconciliation);
        self
    }

    /// Time source
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Tunables
    #[must_use]
    pub fn settings(mut self, settings: BoxOfficeSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Wires the components together.
    #[must_use]
    pub fn build(self) -> BoxOffice {
        let settings = self.settings;
        let seats = self.seats.unwrap_or_else(|| Arc::new(InMemorySeatStore::new()));
        let orders = self.orders.unwrap_or_else(|| Arc::new(InMemoryOrderStore::new()));
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock::new()));
        let reconciliation = self
            .reconciliation
            .unwrap_or_else(|| Arc::new(InMemoryReconciliationLedger::new()));
        let catalog = Arc::new(SeatCatalog::new(settings.max_seats_per_session));

        let env = LifecycleEnvironment {
            seats: Arc::clone(&seats),
            orders: Arc::clone(&orders),
            gateway: self.gateway.unwrap_or_else(MockPaymentGateway::shared),
            notifier: self.notifier.unwrap_or_else(|| Arc::new(TracingNotifier)),
            invoices: self.invoices.unwrap_or_else(|| Arc::new(TracingInvoiceService)),
            reconciliation: Arc::clone(&reconciliation),
            clock: Arc::clone(&clock),
        };
        let lifecycle = Arc::new(OrderLifecycleController::new(
            env,
            settings.payment.clone(),
            settings.retry.clone(),
        ));
        let reservations = ReservationManager::new(
            Arc::clone(&catalog),
            Arc::clone(&seats),
            Arc::clone(&orders),
            Arc::clone(&clock),
            settings.hold,
        );
        let sweeper = Arc::new(ExpirationSweeper::new(
            Arc::clone(&orders),
            Arc::clone(&lifecycle),
            clock,
            settings.settling_grace,
        ));

        BoxOffice {
            catalog,
            seats,
            orders,
            reconciliation,
            reservations,
            lifecycle,
            sweeper,
        }
    }
}

/// Handle to every box office operation.
pub struct BoxOffice {
    catalog: Arc<SeatCatalog>,
    seats: Arc<dyn SeatStore>,
    orders: Arc<dyn OrderStore>,
    reconciliation: Arc<dyn ReconciliationSink>,
    reservations: ReservationManager,
    lifecycle: Arc<OrderLifecycleController>,
    sweeper: Arc<ExpirationSweeper>,
}

impl BoxOffice {
    /// Starts a builder
    #[must_use]
    pub fn builder() -> BoxOfficeBuilder {
        BoxOfficeBuilder::default()
    }

    /// The sweeper, for running it on a ticker
    #[must_use]
    pub fn sweeper(&self) -> Arc<ExpirationSweeper> {
        Arc::clone(&self.sweeper)
    }

    /// Rebuilds the catalog from the sessions stored in the seat store.
    /// Returns how many sessions were loaded.
    ///
    /// # Errors
    ///
    /// Seat store failure.
    pub async fn restore_catalog(&self) -> Result<usize> {
        let sessions = self.seats.load_sessions().await?;
        let count = sessions.len();
        for (setup, seats) in sessions {
            self.catalog.register(setup, seats)?;
        }
        tracing::info!(sessions = count, "Seat catalog restored");
        Ok(count)
    }

    /// Creates a session and all of its seats (admin only).
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::Forbidden`] for non-admins,
    /// [`crate::BoxOfficeError::Validation`] for an invalid layout.
    pub async fn setup_session(&self, principal: &Principal, setup: SessionSetup) -> Result<SessionSummary> {
        principal.require_admin()?;
        let records = self.catalog.plan_session(&setup)?;
        self.seats.initialize_session(&setup, &records).await?;

        let summary = SessionSummary {
            session_id: setup.session_id,
            seats: records.len(),
        };
        tracing::info!(session_id = %summary.session_id, seats = summary.seats, event = %setup.event_name, "Session created");
        self.catalog.register(setup, records)?;
        Ok(summary)
    }

    /// Seat map of a session with prices and live status.
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::NotFound`] for an unknown session.
    pub async fn session_map(&self, session_id: EventSessionId) -> Result<SessionMap> {
        let snapshot = self.seats.snapshot(session_id).await?;
        self.catalog.resolve_map(session_id, &snapshot)
    }

    /// Status of every seat of a session, in layout order.
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::NotFound`] for an unknown session.
    pub async fn seat_snapshot(&self, session_id: EventSessionId) -> Result<Vec<SeatAvailability>> {
        let records = self.catalog.seats(session_id)?;
        let snapshot = self.seats.snapshot(session_id).await?;
        Ok(records
            .into_iter()
            .map(|seat| SeatAvailability {
                status: snapshot
                    .get(&seat.id)
                    .map_or(SeatStatus::Reserved, |state| state.status()),
                id: seat.id,
                label: seat.label,
            })
            .collect())
    }

    /// See [`ReservationManager::select`].
    ///
    /// # Errors
    ///
    /// See [`ReservationManager::select`].
    pub async fn select_seats(&self, principal: &Principal, request: SelectionRequest) -> Result<Order> {
        self.reservations.select(principal, request).await
    }

    /// See [`OrderLifecycleController::order`].
    ///
    /// # Errors
    ///
    /// See [`OrderLifecycleController::order`].
    pub async fn order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        self.lifecycle.order(principal, order_id).await
    }

    /// See [`OrderLifecycleController::initiate_payment`].
    ///
    /// # Errors
    ///
    /// See [`OrderLifecycleController::initiate_payment`].
    pub async fn initiate_payment(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        self.lifecycle.initiate_payment(principal, order_id).await
    }

    /// See [`OrderLifecycleController::confirm_payment`].
    ///
    /// # Errors
    ///
    /// See [`OrderLifecycleController::confirm_payment`].
    pub async fn confirm_payment(&self, reference: &ExternalTransactionRef) -> Result<Order> {
        self.lifecycle.confirm_payment(reference).await
    }

    /// See [`OrderLifecycleController::order_for_payment`].
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::NotFound`] for an unknown reference.
    pub async fn order_for_payment(&self, reference: &ExternalTransactionRef) -> Result<Order> {
        self.lifecycle.order_for_payment(reference).await
    }

    /// See [`OrderLifecycleController::deny_payment`].
    ///
    /// # Errors
    ///
    /// See [`OrderLifecycleController::deny_payment`].
    pub async fn deny_payment(&self, reference: &ExternalTransactionRef) -> Result<Order> {
        self.lifecycle.deny_payment(reference).await
    }

    /// See [`OrderLifecycleController::cancel`].
    ///
    /// # Errors
    ///
    /// See [`OrderLifecycleController::cancel`].
    pub async fn cancel_order(&self, principal: &Principal, order_id: OrderId) -> Result<Order> {
        self.lifecycle.cancel(principal, order_id).await
    }

    /// Runs one sweeper pass.
    ///
    /// # Errors
    ///
    /// See [`ExpirationSweeper::sweep_now`].
    pub async fn sweep_now(&self) -> Result<SweepReport> {
        self.sweeper.sweep_now().await
    }

    /// Sales summary of a session (admin only).
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::Forbidden`] for non-admins,
    /// [`crate::BoxOfficeError::NotFound`] for an unknown session.
    pub async fn dashboard(&self, principal: &Principal, session_id: EventSessionId) -> Result<SessionDashboard> {
        principal.require_admin()?;
        session_dashboard(
            &self.catalog,
            self.seats.as_ref(),
            self.orders.as_ref(),
            self.reconciliation.as_ref(),
            session_id,
        )
        .await
    }

    /// Open reconciliation flags (admin only).
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::Forbidden`] for non-admins.
    pub async fn open_reconciliations(&self, principal: &Principal) -> Result<Vec<ReconciliationFlag>> {
        principal.require_admin()?;
        self.reconciliation.open_flags().await
    }
}
