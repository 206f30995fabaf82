//! Router for the box office HTTP API.

use crate::handlers::{admin, health, orders, sessions, tasks, webhooks};
use crate::middleware::request_tracking_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// - `/health`: liveness, no authentication
/// - `/api/admin/*`: admin bearer token
/// - `/api/sessions/*`: seat map and snapshot are public, ordering needs a token
/// - `/api/orders/*`: bearer token of the owner (or an admin)
/// - `/api/webhooks/payments`: shared secret
/// - `/api/tasks/expire-orders`: task token or admin bearer token
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Admin
        .route("/admin/sessions", post(admin::create_session))
        .route("/admin/sessions/:id/dashboard", get(admin::session_dashboard))
        .route("/admin/reconciliations", get(admin::open_reconciliations))
        // Sessions
        .route("/sessions/:id/map", get(sessions::session_map))
        .route("/sessions/:id/seats", get(sessions::seat_snapshot))
        .route("/sessions/:id/orders", post(sessions::create_order))
        // Orders
        .route("/orders/:id", get(orders::get_order))
        .route("/orders/:id/seats", post(orders::add_seats))
        .route("/orders/:id/payment", post(orders::initiate_payment))
        .route("/orders/:id/cancel", post(orders::cancel_order))
        // Callbacks and scheduled work
        .route("/webhooks/payments", post(webhooks::payment_webhook))
        .route("/tasks/expire-orders", post(tasks::expire_orders));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .layer(request_tracking_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
