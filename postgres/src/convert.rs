//! Column conversions shared by the stores.

use boxoffice_core::error::BoxOfficeError;
use boxoffice_core::types::{Money, OrderId, SeatState, SeatStatus};
use uuid::Uuid;

/// Wraps a sqlx error with what was being attempted.
pub(crate) fn db_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> BoxOfficeError {
    move |e| BoxOfficeError::Storage(format!("{context}: {e}"))
}

pub(crate) fn cents_to_db(money: Money) -> Result<i64, BoxOfficeError> {
    i64::try_from(money.cents())
        .map_err(|_| BoxOfficeError::Validation(format!("amount {money} is too large to store")))
}

pub(crate) fn cents_from_db(cents: i64) -> Result<Money, BoxOfficeError> {
    u64::try_from(cents)
        .map(Money::from_cents)
        .map_err(|_| BoxOfficeError::Storage(format!("negative amount in database: {cents}")))
}

pub(crate) fn index_to_db(index: usize) -> Result<i32, BoxOfficeError> {
    i32::try_from(index).map_err(|_| BoxOfficeError::Validation(format!("position {index} out of range")))
}

/// Rebuilds a seat state from its `status` and `owner_order_id` columns.
pub(crate) fn seat_state(status: &str, owner: Option<Uuid>) -> Result<SeatState, BoxOfficeError> {
    let status: SeatStatus = status.parse().map_err(BoxOfficeError::Storage)?;
    SeatState::from_parts(status, owner.map(OrderId::from_uuid)).ok_or_else(|| {
        BoxOfficeError::Storage(format!("seat status {status} with owner {owner:?} violates ownership"))
    })
}
