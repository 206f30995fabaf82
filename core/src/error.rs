//! Error taxonomy for box office operations.

use crate::types::{OrderId, SeatLabel};
use thiserror::Error;

/// Result alias used by every fallible box office operation.
pub type Result<T> = std::result::Result<T, BoxOfficeError>;

/// Errors returned by the seat catalog, the stores and the order workflow.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BoxOfficeError {
    /// The referenced session, order or seat does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity ("order", "session", ...)
        entity: &'static str,
        /// The id that was looked up
        id: String,
    },

    /// One or more requested seats are held or sold by another order.
    #[error("seats unavailable: {}", join_labels(.seats))]
    SeatsUnavailable {
        /// Labels of the seats that could not be held
        seats: Vec<SeatLabel>,
    },

    /// Labels that do not exist in the session.
    #[error("unknown seats: {}", join_labels(.labels))]
    UnknownSeats {
        /// The labels that could not be resolved
        labels: Vec<SeatLabel>,
    },

    /// The order would exceed its seat limit.
    #[error("seat limit exceeded: requested {requested}, max {max}")]
    LimitExceeded {
        /// Configured per-order limit
        max: usize,
        /// Seat count the order would have had
        requested: usize,
    },

    /// The order (or one of its seats) is not in a state that allows the action.
    #[error("cannot {action} order {order_id} while {from}")]
    InvalidTransition {
        /// Order the action targeted
        order_id: OrderId,
        /// Observed state
        from: String,
        /// Attempted action
        action: &'static str,
    },

    /// A collaborator outside the process (payment gateway) failed.
    #[error("external service failure: {0}")]
    ExternalFailure(String),

    /// Malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The principal may not perform the action.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The backing store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl BoxOfficeError {
    /// Shorthand for [`BoxOfficeError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for [`BoxOfficeError::InvalidTransition`].
    pub fn invalid_transition(order_id: OrderId, from: impl ToString, action: &'static str) -> Self {
        Self::InvalidTransition {
            order_id,
            from: from.to_string(),
            action,
        }
    }

    /// Whether retrying the same call may succeed.
    ///
    /// Only storage failures are transient; every other variant reflects state
    /// or input that a retry will observe again.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

fn join_labels(labels: &[SeatLabel]) -> String {
    labels
        .iter()
        .map(SeatLabel::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}
