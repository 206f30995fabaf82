//! Order endpoints. All of them require a bearer token; buyers may only touch
//! their own orders.

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::handlers::sessions::SelectSeatsRequest;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use boxoffice_core::reservation::SelectionRequest;
use boxoffice_core::{Order, OrderId};

/// `GET /api/orders/:id`
///
/// # Errors
///
/// 404 for an unknown order, 403 for another user's order.
pub async fn get_order(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.office.order(&principal, order_id).await?))
}

/// `POST /api/orders/:id/seats`
///
/// Adds seats to a `PENDING` order. The hold deadline is not extended.
///
/// # Errors
///
/// 409 when a seat is taken or the order left `PENDING`, 422 above the
/// per-order limit.
pub async fn add_seats(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<OrderId>,
    Json(request): Json<SelectSeatsRequest>,
) -> Result<Json<Order>, AppError> {
    let current = state.office.order(&principal, order_id).await?;

    let order = state
        .office
        .select_seats(
            &principal,
            SelectionRequest {
                session_id: current.session_id,
                order_id: Some(order_id),
                labels: request.labels,
            },
        )
        .await?;

    Ok(Json(order))
}

/// `POST /api/orders/:id/payment`
///
/// Opens a checkout with the payment gateway and moves the order to
/// `AWAITING_PAYMENT`. Calling it again returns the existing checkout.
///
/// # Errors
///
/// 409 unless the order is live, 502 when the gateway fails.
pub async fn initiate_payment(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.office.initiate_payment(&principal, order_id).await?))
}

/// `POST /api/orders/:id/cancel`
///
/// # Errors
///
/// 409 for paid or expired orders.
pub async fn cancel_order(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(order_id): Path<OrderId>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(state.office.cancel_order(&principal, order_id).await?))
}
