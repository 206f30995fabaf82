//! Reservation manager: turns a seat-label selection into a time-boxed hold.
//!
//! Seats are held in the seat store before the order record is written. If the
//! order write fails the just-held seats are released again, so a failed
//! selection never leaves seats reserved for an order that does not exist.

use crate::auth::Principal;
use crate::catalog::SeatCatalog;
use crate::environment::Clock;
use crate::error::{BoxOfficeError, Result};
use crate::metrics::{self, HoldOutcomeLabel};
use crate::orders::{CasOutcome, ItemsUpdate, Order, OrderItem, OrderStatus, OrderStore, OrderUpdate};
use crate::seats::{HoldOutcome, SeatStore};
use crate::types::{EventSessionId, OrderId, SeatId, SeatLabel, SeatRef};
use chrono::Duration;
use std::collections::HashSet;
use std::sync::Arc;

/// Limits applied to every selection.
#[derive(Clone, Copy, Debug)]
pub struct HoldPolicy {
    /// How long a new order holds its seats
    pub hold_duration: Duration,
    /// Seat limit per order
    pub max_seats_per_order: usize,
}

impl Default for HoldPolicy {
    fn default() -> Self {
        Self {
            hold_duration: Duration::minutes(15),
            max_seats_per_order: 5,
        }
    }
}

/// A client's seat selection.
#[derive(Clone, Debug)]
pub struct SelectionRequest {
    /// Session the seats belong to
    pub session_id: EventSessionId,
    /// Existing `Pending` order to add to, or `None` for a new order
    pub order_id: Option<OrderId>,
    /// Seat labels, as shown on the map
    pub labels: Vec<SeatLabel>,
}

/// Holds seats for orders.
pub struct ReservationManager {
    catalog: Arc<SeatCatalog>,
    seats: Arc<dyn SeatStore>,
    orders: Arc<dyn OrderStore>,
    clock: Arc<dyn Clock>,
    policy: HoldPolicy,
}

impl ReservationManager {
    /// Creates a reservation manager
    #[must_use]
    pub fn new(
        catalog: Arc<SeatCatalog>,
        seats: Arc<dyn SeatStore>,
        orders: Arc<dyn OrderStore>,
        clock: Arc<dyn Clock>,
        policy: HoldPolicy,
    ) -> Self {
        Self {
            catalog,
            seats,
            orders,
            clock,
            policy,
        }
    }

    /// The limits in force
    #[must_use]
    pub const fn policy(&self) -> HoldPolicy {
        self.policy
    }

    /// Holds the selected seats for a new order, or adds them to the caller's
    /// existing `Pending` order.
    ///
    /// A new order's hold lapses `hold_duration` from now; adding seats keeps
    /// the existing order's deadline. Labels already in the order are ignored.
    ///
    /// # Errors
    ///
    /// - [`BoxOfficeError::Validation`] for an empty selection or a session mismatch
    /// - [`BoxOfficeError::NotFound`] for an unknown order or session
    /// - [`BoxOfficeError::Forbidden`] when the order belongs to another user
    /// - [`BoxOfficeError::InvalidTransition`] when the order is no longer `Pending`
    ///   or its hold lapsed
    /// - [`BoxOfficeError::LimitExceeded`] past the per-order seat limit; nothing is held
    /// - [`BoxOfficeError::UnknownSeats`] for labels the session does not have
    /// - [`BoxOfficeError::SeatsUnavailable`] when another order holds a seat
    pub async fn select(&self, principal: &Principal, request: SelectionRequest) -> Result<Order> {
        let result = self.try_select(principal, request).await;
        match &result {
            Ok(order) => metrics::record_hold(HoldOutcomeLabel::Held, order.items.len()),
            Err(BoxOfficeError::SeatsUnavailable { seats }) => {
                metrics::record_hold(HoldOutcomeLabel::Conflict, seats.len());
            }
            Err(_) => metrics::record_hold(HoldOutcomeLabel::Rejected, 0),
        }
        result
    }

    async fn try_select(&self, principal: &Principal, request: SelectionRequest) -> Result<Order> {
        let labels = dedupe(request.labels);
        if labels.is_empty() {
            return Err(BoxOfficeError::Validation("select at least one seat".into()));
        }

        let existing = match request.order_id {
            Some(order_id) => Some(self.load_extendable(principal, order_id, request.session_id).await?),
            None => None,
        };

        let resolved = self.catalog.resolve_labels(request.session_id, &labels)?;
        let fresh: Vec<SeatRef> = resolved
            .into_iter()
            .filter(|seat| existing.as_ref().is_none_or(|order| !order.contains_seat(seat.id)))
            .collect();

        let held_already = existing.as_ref().map_or(0, |order| order.items.len());
        let requested = held_already + fresh.len();
        if requested > self.policy.max_seats_per_order {
            return Err(BoxOfficeError::LimitExceeded {
                max: self.policy.max_seats_per_order,
                requested,
            });
        }

        match existing {
            Some(order) if fresh.is_empty() => Ok(order),
            Some(order) => self.extend(order, fresh).await,
            None => self.create(principal, request.session_id, fresh).await,
        }
    }

    async fn load_extendable(
        &self,
        principal: &Principal,
        order_id: OrderId,
        session_id: EventSessionId,
    ) -> Result<Order> {
        let order = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| BoxOfficeError::not_found("order", order_id))?;

        principal.require_owner(order.user_id, false)?;
        if order.session_id != session_id {
            return Err(BoxOfficeError::Validation(format!(
                "order {order_id} belongs to another session"
            )));
        }
        if order.status != OrderStatus::Pending {
            return Err(BoxOfficeError::invalid_transition(order_id, order.status, "add seats to"));
        }
        if order.hold_elapsed(self.clock.now()) {
            return Err(BoxOfficeError::invalid_transition(order_id, "hold expired", "add seats to"));
        }
        Ok(order)
    }

    /// Holds `seats` for the order and returns the ones this call moved out of
    /// `Available`.
    async fn hold(&self, order_id: OrderId, seats: &[SeatRef]) -> Result<Vec<SeatId>> {
        let ids: Vec<SeatId> = seats.iter().map(|seat| seat.id).collect();
        match self.seats.try_hold(&ids, order_id).await? {
            HoldOutcome::Held { newly_held } => Ok(newly_held),
            HoldOutcome::Conflict(taken) => Err(unavailable(order_id, seats, &taken)),
        }
    }

    async fn create(&self, principal: &Principal, session_id: EventSessionId, seats: Vec<SeatRef>) -> Result<Order> {
        let order_id = OrderId::new();
        let held = self.hold(order_id, &seats).await?;

        let now = self.clock.now();
        let written = match Order::pending(
            order_id,
            session_id,
            principal.user_id,
            seats.into_iter().map(OrderItem::from).collect(),
            now,
            now + self.policy.hold_duration,
        ) {
            Ok(order) => self.orders.insert(&order).await.map(|()| order),
            Err(err) => Err(err),
        };

        match written {
            Ok(order) => {
                tracing::info!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    seats = order.items.len(),
                    hold_expires_at = %order.hold_expires_at,
                    "Order created with seat hold"
                );
                metrics::record_order_status(OrderStatus::Pending);
                Ok(order)
            }
            Err(err) => {
                self.undo_hold(order_id, &held).await;
                Err(err)
            }
        }
    }

    /// Adds seats to a `Pending` order.
    ///
    /// Only the call that moved a seat out of `Available` may append it to the
    /// order or release it again. A seat that was already `Reserved(order)` but
    /// is not among the order's items belongs to a concurrent selection that has
    /// not been written yet, and is reported as unavailable.
    async fn extend(&self, order: Order, seats: Vec<SeatRef>) -> Result<Order> {
        let newly_held = self.hold(order.id, &seats).await?;

        let in_flight = match self.held_elsewhere(order.id, &seats, &newly_held).await {
            Ok(in_flight) => in_flight,
            Err(err) => {
                self.undo_hold(order.id, &newly_held).await;
                return Err(err);
            }
        };
        if !in_flight.is_empty() {
            self.undo_hold(order.id, &newly_held).await;
            return Err(unavailable(order.id, &seats, &in_flight));
        }

        let items: Vec<OrderItem> = seats
            .into_iter()
            .filter(|seat| newly_held.contains(&seat.id))
            .map(OrderItem::from)
            .collect();
        let update = OrderUpdate::status(OrderStatus::Pending, self.clock.now()).with_items(ItemsUpdate::Append {
            items,
            max_items: self.policy.max_seats_per_order,
        });

        match self.orders.compare_and_set(order.id, &[OrderStatus::Pending], update).await {
            Ok(CasOutcome::Applied(updated)) => {
                tracing::info!(order_id = %updated.id, seats = updated.items.len(), "Seats added to order");
                Ok(updated)
            }
            Ok(CasOutcome::Rejected(current)) => {
                self.undo_hold(order.id, &newly_held).await;
                if current.status == OrderStatus::Pending {
                    Err(BoxOfficeError::LimitExceeded {
                        max: self.policy.max_seats_per_order,
                        requested: current.items.len() + newly_held.len(),
                    })
                } else {
                    Err(BoxOfficeError::invalid_transition(order.id, current.status, "add seats to"))
                }
            }
            Err(err) => {
                // The append may have landed; keep whatever the order records.
                match self.orders.get(order.id).await {
                    Ok(current) => {
                        let orphaned: Vec<SeatId> = newly_held
                            .iter()
                            .copied()
                            .filter(|id| current.as_ref().is_none_or(|stored| !stored.contains_seat(*id)))
                            .collect();
                        self.undo_hold(order.id, &orphaned).await;
                    }
                    Err(reload) => tracing::error!(
                        order_id = %order.id,
                        error = %reload,
                        "Could not reload order after failed append; seats left held"
                    ),
                }
                Err(err)
            }
        }
    }

    /// Seats of `seats` that were already `Reserved(order)` before this call but
    /// that the stored order does not list.
    async fn held_elsewhere(&self, order_id: OrderId, seats: &[SeatRef], newly_held: &[SeatId]) -> Result<Vec<SeatId>> {
        let reheld: Vec<SeatId> = seats
            .iter()
            .map(|seat| seat.id)
            .filter(|id| !newly_held.contains(id))
            .collect();
        if reheld.is_empty() {
            return Ok(reheld);
        }

        let current = self
            .orders
            .get(order_id)
            .await?
            .ok_or_else(|| BoxOfficeError::not_found("order", order_id))?;
        Ok(reheld.into_iter().filter(|id| !current.contains_seat(*id)).collect())
    }

    /// Releases seats held for an order write that did not happen.
    ///
    /// A failure here leaves the seats reserved for an order id that no
    /// store knows about; it is logged for manual cleanup.
    async fn undo_hold(&self, order_id: OrderId, seats: &[SeatId]) {
        if seats.is_empty() {
            return;
        }
        if let Err(err) = self.seats.release(seats, order_id).await {
            tracing::error!(order_id = %order_id, error = %err, "Failed to release seats after order write failed");
        }
    }
}

fn unavailable(order_id: OrderId, seats: &[SeatRef], taken: &[SeatId]) -> BoxOfficeError {
    let labels = seats
        .iter()
        .filter(|seat| taken.contains(&seat.id))
        .map(|seat| seat.label.clone())
        .collect();
    tracing::info!(order_id = %order_id, taken = taken.len(), "Seat hold conflict");
    BoxOfficeError::SeatsUnavailable { seats: labels }
}

fn dedupe(labels: Vec<SeatLabel>) -> Vec<SeatLabel> {
    let mut seen = HashSet::new();
    labels
        .into_iter()
        .filter(|label| !label.as_str().is_empty() && seen.insert(label.clone()))
        .collect()
}
