//! Value objects shared by every box office component.
//!
//! Identifiers are UUID newtypes so that a seat id can never be passed where an
//! order id is expected. Seat ownership lives in [`SeatState`], which makes
//! "reserved without an owner" unrepresentable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Wraps an existing UUID as a `", stringify!($name), "`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_id!(
    /// Identifies one dated performance of an event (the unit seats belong to).
    EventSessionId
);
uuid_id!(
    /// Identifies a physical seat within one event session.
    ///
    /// Ordered so that multi-seat operations can lock in a stable order.
    SeatId
);
uuid_id!(
    /// Identifies an order (a user's cart for one session).
    OrderId
);
uuid_id!(
    /// Identifies an authenticated user.
    UserId
);
uuid_id!(
    /// Identifies a sector of a venue layout.
    SectorId
);
uuid_id!(
    /// Identifies a priced ticket category.
    CategoryId
);

// ============================================================================
// Seat labels
// ============================================================================

/// Human-facing seat label, unique within a session (`"{row}-{number}"`, e.g. `A-12`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeatLabel(String);

impl SeatLabel {
    /// Builds the label for seat `number` in row `row`.
    #[must_use]
    pub fn for_seat(row: &str, number: u32) -> Self {
        Self(format!("{row}-{number}"))
    }

    /// Wraps a client-supplied label. Whitespace around it is dropped.
    #[must_use]
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(label.as_ref().trim().to_owned())
    }

    /// The label text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeatLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SeatLabel {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// An amount in minor currency units (cents).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Sums an iterator of amounts, `None` on overflow.
    pub fn checked_sum<I>(amounts: I) -> Option<Self>
    where
        I: IntoIterator<Item = Self>,
    {
        amounts
            .into_iter()
            .try_fold(Self::ZERO, Self::checked_add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

// ============================================================================
// Seat state
// ============================================================================

/// Authoritative status of one seat.
///
/// The owning order is carried by the variant: a seat is owned by exactly one
/// order whenever it is not available.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "status", content = "order_id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    /// Free to be held
    Available,
    /// Held by an order that has not paid yet
    Reserved(OrderId),
    /// Paid for by the order
    Sold(OrderId),
}

impl SeatState {
    /// The owning order, if any.
    #[must_use]
    pub const fn owner(&self) -> Option<OrderId> {
        match self {
            Self::Available => None,
            Self::Reserved(order_id) | Self::Sold(order_id) => Some(*order_id),
        }
    }

    /// The status without its owner.
    #[must_use]
    pub const fn status(&self) -> SeatStatus {
        match self {
            Self::Available => SeatStatus::Available,
            Self::Reserved(_) => SeatStatus::Reserved,
            Self::Sold(_) => SeatStatus::Sold,
        }
    }

    /// Whether `order_id` may place a hold on a seat in this state.
    #[must_use]
    pub fn holdable_by(&self, order_id: OrderId) -> bool {
        match self {
            Self::Available => true,
            Self::Reserved(owner) => *owner == order_id,
            Self::Sold(_) => false,
        }
    }

    /// Rebuilds a state from its stored parts.
    ///
    /// Returns `None` for a combination that violates the ownership rule.
    #[must_use]
    pub const fn from_parts(status: SeatStatus, owner: Option<OrderId>) -> Option<Self> {
        match (status, owner) {
            (SeatStatus::Available, None) => Some(Self::Available),
            (SeatStatus::Reserved, Some(order_id)) => Some(Self::Reserved(order_id)),
            (SeatStatus::Sold, Some(order_id)) => Some(Self::Sold(order_id)),
            _ => None,
        }
    }
}

/// Seat status as shown to clients (ownership is never exposed).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatStatus {
    /// Free
    Available,
    /// Held by some order
    Reserved,
    /// Sold
    Sold,
}

impl SeatStatus {
    /// Stable storage / wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "AVAILABLE",
            Self::Reserved => "RESERVED",
            Self::Sold => "SOLD",
        }
    }
}

impl FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(Self::Available),
            "RESERVED" => Ok(Self::Reserved),
            "SOLD" => Ok(Self::Sold),
            other => Err(format!("unknown seat status: {other}")),
        }
    }
}

impl fmt::Display for SeatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Seat records
// ============================================================================

/// Static description of one seat, produced at session setup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRecord {
    /// Seat id
    pub id: SeatId,
    /// Session the seat belongs to
    pub session_id: EventSessionId,
    /// `"{row}-{number}"`
    pub label: SeatLabel,
    /// Sector the seat sits in
    pub sector_id: SectorId,
    /// Sector display name
    pub sector: String,
    /// Row label
    pub row: String,
    /// Seat number within the row (1-based)
    pub number: u32,
    /// Price from the sector's ticket category
    pub price: Money,
}

/// A seat as resolved from a client label: identity plus price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatRef {
    /// Seat id
    pub id: SeatId,
    /// Seat label
    pub label: SeatLabel,
    /// Current price
    pub price: Money,
}

impl From<&SeatRecord> for SeatRef {
    fn from(record: &SeatRecord) -> Self {
        Self {
            id: record.id,
            label: record.label.clone(),
            price: record.price,
        }
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Reference returned by the payment gateway for an initiated payment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalTransactionRef(String);

impl ExternalTransactionRef {
    /// Wraps a gateway reference
    #[must_use]
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    /// The reference text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExternalTransactionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Timestamp alias used across the crate.
pub type Timestamp = DateTime<Utc>;

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn seat_label_uses_row_dash_number() {
        assert_eq!(SeatLabel::for_seat("A", 12).as_str(), "A-12");
        assert_eq!(SeatLabel::new("  B-3 "), SeatLabel::for_seat("B", 3));
    }

    #[test]
    fn money_sum_and_display() {
        let total = Money::checked_sum([Money::from_cents(1250), Money::from_cents(99)]).unwrap();
        assert_eq!(total, Money::from_cents(1349));
        assert_eq!(total.to_string(), "13.49");
        assert!(Money::checked_sum([Money::from_cents(u64::MAX), Money::from_cents(1)]).is_none());
    }

    #[test]
    fn seat_state_ownership() {
        let order = OrderId::new();
        let other = OrderId::new();

        assert_eq!(SeatState::Available.owner(), None);
        assert_eq!(SeatState::Reserved(order).owner(), Some(order));
        assert!(SeatState::Available.holdable_by(order));
        assert!(SeatState::Reserved(order).holdable_by(order));
        assert!(!SeatState::Reserved(order).holdable_by(other));
        assert!(!SeatState::Sold(order).holdable_by(order));
    }

    #[test]
    fn seat_state_from_parts_rejects_orphans() {
        let order = OrderId::new();
        assert_eq!(
            SeatState::from_parts(SeatStatus::Sold, Some(order)),
            Some(SeatState::Sold(order))
        );
        assert_eq!(SeatState::from_parts(SeatStatus::Reserved, None), None);
        assert_eq!(SeatState::from_parts(SeatStatus::Available, Some(order)), None);
    }

    #[test]
    fn seat_state_serializes_with_owner() {
        let order = OrderId::new();
        let json = serde_json::to_value(SeatState::Reserved(order)).unwrap();
        assert_eq!(json["status"], "RESERVED");
        assert_eq!(json["order_id"], order.to_string());
    }

    #[test]
    fn ids_parse_from_strings() {
        let id = OrderId::new();
        let parsed: OrderId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<SeatId>().is_err());
    }
}
