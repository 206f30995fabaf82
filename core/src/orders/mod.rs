//! Orders and their storage.
//!
//! Order status changes only through [`OrderStore::compare_and_set`]: the
//! update applies only if the stored status is one of the expected statuses.
//! Whoever wins that conditional write owns the transition.

mod memory;

pub use memory::InMemoryOrderStore;

use crate::error::{BoxOfficeError, Result};
use crate::types::{
    EventSessionId, ExternalTransactionRef, Money, OrderId, SeatId, SeatLabel, SeatRef, Timestamp, UserId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Status
// ============================================================================

/// Final status an order is being released into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReleaseTarget {
    /// Hold lapsed or payment denied
    Expired,
    /// User or admin cancelled
    Cancelled,
}

impl ReleaseTarget {
    /// The terminal status reached once seats are released.
    #[must_use]
    pub const fn terminal_status(self) -> OrderStatus {
        match self {
            Self::Expired => OrderStatus::Expired,
            Self::Cancelled => OrderStatus::Cancelled,
        }
    }
}

/// Order lifecycle status.
///
/// `Settling` and `Releasing` are recoverable in-between states: the order has
/// been claimed for a transition whose seat writes are still in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum OrderStatus {
    /// Seats held, payment not started
    Pending,
    /// Payment initiated with the gateway
    AwaitingPayment,
    /// Payment confirmed, seats being marked sold
    Settling,
    /// Seats being released
    Releasing(ReleaseTarget),
    /// Paid; seats sold
    Paid,
    /// Hold lapsed or payment denied; seats released
    Expired,
    /// Cancelled; seats released
    Cancelled,
}

impl OrderStatus {
    /// Statuses in which the hold is live and the order may still change.
    pub const ACTIVE: [Self; 2] = [Self::Pending, Self::AwaitingPayment];

    /// Both releasing statuses.
    pub const RELEASING: [Self; 2] = [
        Self::Releasing(ReleaseTarget::Expired),
        Self::Releasing(ReleaseTarget::Cancelled),
    ];

    /// `Paid`, `Expired` or `Cancelled`
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Expired | Self::Cancelled)
    }

    /// `Pending` or `AwaitingPayment`
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::AwaitingPayment)
    }

    /// Stable storage / wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::AwaitingPayment => "AWAITING_PAYMENT",
            Self::Settling => "SETTLING",
            Self::Releasing(ReleaseTarget::Expired) => "RELEASING_EXPIRED",
            Self::Releasing(ReleaseTarget::Cancelled) => "RELEASING_CANCELLED",
            Self::Paid => "PAID",
            Self::Expired => "EXPIRED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = BoxOfficeError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "PENDING" => Self::Pending,
            "AWAITING_PAYMENT" => Self::AwaitingPayment,
            "SETTLING" => Self::Settling,
            "RELEASING_EXPIRED" => Self::Releasing(ReleaseTarget::Expired),
            "RELEASING_CANCELLED" => Self::Releasing(ReleaseTarget::Cancelled),
            "PAID" => Self::Paid,
            "EXPIRED" => Self::Expired,
            "CANCELLED" => Self::Cancelled,
            other => return Err(BoxOfficeError::Storage(format!("unknown order status: {other}"))),
        })
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_str().to_owned()
    }
}

impl TryFrom<String> for OrderStatus {
    type Error = BoxOfficeError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

// ============================================================================
// Order
// ============================================================================

/// One seat in an order, priced at the time it was held.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Seat id
    pub seat_id: SeatId,
    /// Seat label
    pub label: SeatLabel,
    /// Price when the seat was added
    pub price_at_sale: Money,
}

impl From<SeatRef> for OrderItem {
    fn from(seat: SeatRef) -> Self {
        Self {
            seat_id: seat.id,
            label: seat.label,
            price_at_sale: seat.price,
        }
    }
}

/// A user's order for seats of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order id
    pub id: OrderId,
    /// Session the seats belong to
    pub session_id: EventSessionId,
    /// Owner
    pub user_id: UserId,
    /// Lifecycle status
    pub status: OrderStatus,
    /// Held seats in selection order
    pub items: Vec<OrderItem>,
    /// Sum of item prices
    pub total: Money,
    /// Creation time
    pub created_at: Timestamp,
    /// Last status or item change
    pub updated_at: Timestamp,
    /// When the seat hold lapses
    pub hold_expires_at: Timestamp,
    /// Gateway reference once payment was initiated
    pub payment_ref: Option<ExternalTransactionRef>,
}

impl Order {
    /// A new `Pending` order over `items`.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Validation`] if the total overflows.
    pub fn pending(
        id: OrderId,
        session_id: EventSessionId,
        user_id: UserId,
        items: Vec<OrderItem>,
        now: Timestamp,
        hold_expires_at: Timestamp,
    ) -> Result<Self> {
        let total = total_of(&items)?;
        Ok(Self {
            id,
            session_id,
            user_id,
            status: OrderStatus::Pending,
            items,
            total,
            created_at: now,
            updated_at: now,
            hold_expires_at,
            payment_ref: None,
        })
    }

    /// Ids of the held seats.
    #[must_use]
    pub fn seat_ids(&self) -> Vec<SeatId> {
        self.items.iter().map(|item| item.seat_id).collect()
    }

    /// Whether the hold has lapsed at `now`.
    #[must_use]
    pub fn hold_elapsed(&self, now: Timestamp) -> bool {
        self.hold_expires_at < now
    }

    /// Whether `seat` is already part of the order.
    #[must_use]
    pub fn contains_seat(&self, seat: SeatId) -> bool {
        self.items.iter().any(|item| item.seat_id == seat)
    }

    /// Applies `update` in place.
    ///
    /// Returns `false`, leaving the order untouched, when an append would
    /// exceed its item limit. Seats already in the order are not appended twice.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Validation`] if the new total overflows.
    pub fn apply(&mut self, update: &OrderUpdate) -> Result<bool> {
        match &update.items {
            ItemsUpdate::Keep => {}
            ItemsUpdate::Append { items, max_items } => {
                let fresh: Vec<OrderItem> = items
                    .iter()
                    .filter(|item| !self.contains_seat(item.seat_id))
                    .cloned()
                    .collect();
                if self.items.len() + fresh.len() > *max_items {
                    return Ok(false);
                }
                let mut combined = self.items.clone();
                combined.extend(fresh);
                self.total = total_of(&combined)?;
                self.items = combined;
            }
            ItemsUpdate::Clear => {
                self.items.clear();
                self.total = Money::ZERO;
            }
        }

        self.status = update.status;
        if let Some(reference) = &update.payment_ref {
            self.payment_ref = Some(reference.clone());
        }
        self.updated_at = update.at;
        Ok(true)
    }
}

fn total_of(items: &[OrderItem]) -> Result<Money> {
    Money::checked_sum(items.iter().map(|item| item.price_at_sale))
        .ok_or_else(|| BoxOfficeError::Validation("order total overflows".into()))
}

// ============================================================================
// Conditional updates
// ============================================================================

/// What happens to the item list in an update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ItemsUpdate {
    /// Leave items as they are
    Keep,
    /// Add seats, refusing the whole update past `max_items`
    Append {
        /// New items
        items: Vec<OrderItem>,
        /// Item limit for the order
        max_items: usize,
    },
    /// Drop every item (seats were released)
    Clear,
}

/// Changes written by a successful compare-and-set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderUpdate {
    /// New status
    pub status: OrderStatus,
    /// Item change
    pub items: ItemsUpdate,
    /// Payment reference to record, if any
    pub payment_ref: Option<ExternalTransactionRef>,
    /// Time of the change
    pub at: Timestamp,
}

impl OrderUpdate {
    /// Status change only
    #[must_use]
    pub const fn status(status: OrderStatus, at: Timestamp) -> Self {
        Self {
            status,
            items: ItemsUpdate::Keep,
            payment_ref: None,
            at,
        }
    }

    /// Sets the item change
    #[must_use]
    pub fn with_items(mut self, items: ItemsUpdate) -> Self {
        self.items = items;
        self
    }

    /// Records a payment reference
    #[must_use]
    pub fn with_payment_ref(mut self, reference: ExternalTransactionRef) -> Self {
        self.payment_ref = Some(reference);
        self
    }
}

/// Result of [`OrderStore::compare_and_set`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum CasOutcome {
    /// The update was written; carries the new order.
    Applied(Order),
    /// The stored status did not match (or an append hit the item limit);
    /// carries the order as currently stored.
    Rejected(Order),
}

/// Storage for orders.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Stores a new order.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Validation`] if the id exists,
    /// [`BoxOfficeError::Storage`] on backend failure.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Storage`] on backend failure.
    async fn get(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads the order a payment reference was recorded on.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Storage`] on backend failure.
    async fn find_by_payment_ref(&self, reference: &ExternalTransactionRef) -> Result<Option<Order>>;

    /// Applies `update` only if the stored status is one of `expected`.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::NotFound`] for an unknown order,
    /// [`BoxOfficeError::Storage`] on backend failure.
    async fn compare_and_set(
        &self,
        order_id: OrderId,
        expected: &[OrderStatus],
        update: OrderUpdate,
    ) -> Result<CasOutcome>;

    /// Active orders whose hold lapsed before `now`.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Storage`] on backend failure.
    async fn due_for_expiry(&self, now: Timestamp) -> Result<Vec<Order>>;

    /// Orders currently in any of `statuses`.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Storage`] on backend failure.
    async fn in_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>>;

    /// Every order of a session.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Storage`] on backend failure.
    async fn list_for_session(&self, session_id: EventSessionId) -> Result<Vec<Order>>;
}
