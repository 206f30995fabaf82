//! `POST /api/webhooks/payments`: payment gateway callbacks.
//!
//! The gateway authenticates with the shared secret in `X-Webhook-Secret`.
//! Deliveries may repeat; both outcomes are idempotent. A confirmation for an
//! order that can no longer be paid is flagged for reconciliation and answered
//! with the order's current state.

use crate::error::AppError;
use crate::state::AppState;
use axum::{Json, extract::State, http::HeaderMap};
use boxoffice_core::{BoxOfficeError, ExternalTransactionRef, Order};
use serde::Deserialize;

/// Header carrying the webhook secret.
pub const WEBHOOK_SECRET_HEADER: &str = "X-Webhook-Secret";

/// Outcome reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentOutcome {
    /// The payment went through
    Confirmed,
    /// The payment was rejected or abandoned
    Denied,
}

/// Webhook payload.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    /// Reference returned when the checkout was opened
    pub payment_ref: ExternalTransactionRef,
    /// Outcome
    pub status: PaymentOutcome,
}

/// `POST /api/webhooks/payments`
///
/// # Errors
///
/// 401 without the shared secret, 404 for an unknown reference.
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(webhook): Json<PaymentWebhook>,
) -> Result<Json<Order>, AppError> {
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(presented, &state.webhook_secret) {
        tracing::warn!(payment_ref = %webhook.payment_ref, "Webhook with bad secret rejected");
        return Err(AppError::unauthorized("Invalid webhook secret"));
    }

    let order = match webhook.status {
        PaymentOutcome::Confirmed => match state.office.confirm_payment(&webhook.payment_ref).await {
            Ok(order) => order,
            Err(BoxOfficeError::InvalidTransition { from, .. }) => {
                // already flagged for reconciliation
                tracing::warn!(payment_ref = %webhook.payment_ref, from = %from, "Unpayable confirmation acknowledged");
                state.office.order_for_payment(&webhook.payment_ref).await?
            }
            Err(err) => return Err(err.into()),
        },
        PaymentOutcome::Denied => state.office.deny_payment(&webhook.payment_ref).await?,
    };

    tracing::info!(
        order_id = %order.id,
        payment_ref = %webhook.payment_ref,
        outcome = ?webhook.status,
        status = %order.status,
        "Payment webhook handled"
    );
    Ok(Json(order))
}

/// Compares secrets without short-circuiting on the first differing byte.
pub(crate) fn secrets_match(presented: &str, expected: &str) -> bool {
    let (a, b) = (presented.as_bytes(), expected.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
