//! `POST /api/tasks/expire-orders`: one expiration sweep, for an external
//! scheduler.
//!
//! Accepts either the configured task token in `X-Task-Token` or an admin
//! bearer token.

use crate::auth::bearer_token;
use crate::error::AppError;
use crate::handlers::webhooks::secrets_match;
use crate::state::AppState;
use axum::{Json, extract::State, http::HeaderMap};
use boxoffice_core::sweeper::SweepReport;

/// Header carrying the task token.
pub const TASK_TOKEN_HEADER: &str = "X-Task-Token";

/// `POST /api/tasks/expire-orders`
///
/// # Errors
///
/// 401 without credentials, 403 for a non-admin bearer token.
pub async fn expire_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepReport>, AppError> {
    authorize(&state, &headers)?;
    let report = state.office.sweep_now().await?;
    Ok(Json(report))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    if let Some(presented) = headers.get(TASK_TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        return match &state.task_token {
            Some(expected) if secrets_match(presented, expected) => Ok(()),
            _ => Err(AppError::unauthorized("Invalid task token")),
        };
    }

    let principal = state.tokens.verify(bearer_token(headers)?)?;
    principal.require_admin()?;
    Ok(())
}
