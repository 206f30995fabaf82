//! Session endpoints:
//! - `GET /api/sessions/:id/map`: priced seat map (public)
//! - `GET /api/sessions/:id/seats`: per-seat status (public)
//! - `POST /api/sessions/:id/orders`: hold seats in a new order

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use boxoffice_core::catalog::SessionMap;
use boxoffice_core::reservation::SelectionRequest;
use boxoffice_core::{EventSessionId, Order, SeatAvailability, SeatLabel};
use serde::Deserialize;

/// Seat labels to hold, e.g. `["A-1", "A-2"]`.
#[derive(Debug, Deserialize)]
pub struct SelectSeatsRequest {
    /// Labels within the session
    pub labels: Vec<SeatLabel>,
}

/// `GET /api/sessions/:id/map`
///
/// # Errors
///
/// 404 for an unknown session.
pub async fn session_map(
    State(state): State<AppState>,
    Path(session_id): Path<EventSessionId>,
) -> Result<Json<SessionMap>, AppError> {
    Ok(Json(state.office.session_map(session_id).await?))
}

/// `GET /api/sessions/:id/seats`
///
/// # Errors
///
/// 404 for an unknown session.
pub async fn seat_snapshot(
    State(state): State<AppState>,
    Path(session_id): Path<EventSessionId>,
) -> Result<Json<Vec<SeatAvailability>>, AppError> {
    Ok(Json(state.office.seat_snapshot(session_id).await?))
}

/// `POST /api/sessions/:id/orders`
///
/// Holds the requested seats for the caller in a new `PENDING` order.
///
/// # Errors
///
/// 409 when a seat is taken, 422 for unknown labels or a selection above the
/// per-order limit.
pub async fn create_order(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(session_id): Path<EventSessionId>,
    Json(request): Json<SelectSeatsRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state
        .office
        .select_seats(
            &principal,
            SelectionRequest {
                session_id,
                order_id: None,
                labels: request.labels,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(order)))
}
