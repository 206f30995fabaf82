//! Authoritative per-seat status.
//!
//! A [`SeatStore`] exclusively owns seat status. Every multi-seat mutation is
//! all-or-nothing and linearizable with respect to every other operation on any
//! seat of the set.

mod memory;

pub use memory::InMemorySeatStore;

use crate::catalog::SessionSetup;
use crate::error::Result;
use crate::types::{EventSessionId, OrderId, SeatId, SeatRecord, SeatState};
use async_trait::async_trait;
use std::collections::HashMap;

/// Outcome of [`SeatStore::try_hold`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub enum HoldOutcome {
    /// Every seat is now `Reserved(order)`.
    Held {
        /// Seats this call moved out of `Available`, in lock order. Seats that
        /// were already `Reserved(order)` are not listed.
        newly_held: Vec<SeatId>,
    },
    /// Nothing changed; these seats are held or sold by someone else.
    Conflict(Vec<SeatId>),
}

impl HoldOutcome {
    /// Whether the hold succeeded.
    #[must_use]
    pub const fn is_held(&self) -> bool {
        matches!(self, Self::Held { .. })
    }
}

/// Storage for seat status, keyed by [`SeatId`].
#[async_trait]
pub trait SeatStore: Send + Sync {
    /// Bulk-creates the seats of a new session, all `Available`, and stores the
    /// layout so the catalog can be rebuilt later.
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::Validation`] if the session already exists,
    /// [`crate::BoxOfficeError::Storage`] on backend failure.
    async fn initialize_session(&self, setup: &SessionSetup, seats: &[SeatRecord]) -> Result<()>;

    /// Every stored session with its seat records, for rebuilding the catalog.
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::Storage`] on backend failure.
    async fn load_sessions(&self) -> Result<Vec<(SessionSetup, Vec<SeatRecord>)>>;

    /// Atomically moves every seat from `Available` to `Reserved(order_id)`.
    ///
    /// A seat already `Reserved(order_id)` counts as available to this order
    /// and is left out of the returned `newly_held` list. On conflict nothing is mutated and exactly the unavailable seats are
    /// returned.
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::NotFound`] for an unknown seat id,
    /// [`crate::BoxOfficeError::Storage`] on backend failure.
    async fn try_hold(&self, seats: &[SeatId], order_id: OrderId) -> Result<HoldOutcome>;

    /// Atomically moves every seat from `Reserved(order_id)` to `Sold(order_id)`.
    ///
    /// Seats already `Sold(order_id)` are accepted.
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::InvalidTransition`] if any seat is available or
    /// owned by another order; nothing changes in that case.
    async fn mark_sold(&self, seats: &[SeatId], order_id: OrderId) -> Result<()>;

    /// Moves every seat that is `Reserved(order_id)` back to `Available`.
    ///
    /// Seats in any other state are left untouched. Returns how many seats
    /// were released.
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::Storage`] on backend failure.
    async fn release(&self, seats: &[SeatId], order_id: OrderId) -> Result<usize>;

    /// Status of every seat of a session.
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::NotFound`] for an unknown session.
    async fn snapshot(&self, session_id: EventSessionId) -> Result<HashMap<SeatId, SeatState>>;

    /// Status of specific seats, in the order given.
    ///
    /// # Errors
    ///
    /// [`crate::BoxOfficeError::NotFound`] for an unknown seat id.
    async fn seat_states(&self, seats: &[SeatId]) -> Result<Vec<(SeatId, SeatState)>>;
}

/// Sorted, deduplicated copy of `seats`; every store locks in this order.
#[must_use]
pub fn lock_order(seats: &[SeatId]) -> Vec<SeatId> {
    let mut ids = seats.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}
