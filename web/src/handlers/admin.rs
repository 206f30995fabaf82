//! Admin endpoints:
//! - `POST /api/admin/sessions`: set up a session's seats
//! - `GET /api/admin/sessions/:id/dashboard`: sales totals
//! - `GET /api/admin/reconciliations`: payments needing follow-up

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use boxoffice_core::catalog::{SectorLayout, SessionSetup, TicketCategory};
use boxoffice_core::collaborators::ReconciliationFlag;
use boxoffice_core::dashboard::SessionDashboard;
use boxoffice_core::types::Timestamp;
use boxoffice_core::{EventSessionId, SessionSummary};
use serde::Deserialize;

/// Request to set up a session.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Session id; generated when omitted
    pub session_id: Option<EventSessionId>,
    /// Event title
    pub event_name: String,
    /// When the performance starts
    pub starts_at: Timestamp,
    /// Sector layouts
    pub sectors: Vec<SectorLayout>,
    /// Ticket categories, one per sector
    pub categories: Vec<TicketCategory>,
}

/// `POST /api/admin/sessions`
///
/// # Errors
///
/// 403 for non-admins, 422 for an invalid layout.
pub async fn create_session(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSummary>), AppError> {
    let setup = SessionSetup {
        session_id: request.session_id.unwrap_or_default(),
        event_name: request.event_name,
        starts_at: request.starts_at,
        sectors: request.sectors,
        categories: request.categories,
    };

    let summary = state.office.setup_session(&principal, setup).await?;

    tracing::info!(
        session_id = %summary.session_id,
        seats = summary.seats,
        admin = %principal.user_id,
        "Session set up"
    );

    Ok((StatusCode::CREATED, Json(summary)))
}

/// `GET /api/admin/sessions/:id/dashboard`
///
/// # Errors
///
/// 403 for non-admins, 404 for an unknown session.
pub async fn session_dashboard(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(session_id): Path<EventSessionId>,
) -> Result<Json<SessionDashboard>, AppError> {
    Ok(Json(state.office.dashboard(&principal, session_id).await?))
}

/// `GET /api/admin/reconciliations`
///
/// # Errors
///
/// 403 for non-admins.
pub async fn open_reconciliations(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
) -> Result<Json<Vec<ReconciliationFlag>>, AppError> {
    Ok(Json(state.office.open_reconciliations(&principal).await?))
}
