//! Application state for Axum handlers.

use crate::auth::TokenKeys;
use crate::config::AuthConfig;
use boxoffice_core::BoxOffice;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// The assembled box office
    pub office: Arc<BoxOffice>,
    /// Bearer token keys
    pub tokens: TokenKeys,
    /// Shared secret expected in `X-Webhook-Secret`
    pub webhook_secret: Arc<str>,
    /// Token accepted in `X-Task-Token` by the expiration task endpoint
    pub task_token: Option<Arc<str>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(office: Arc<BoxOffice>, auth: &AuthConfig) -> Self {
        Self {
            office,
            tokens: TokenKeys::from_secret(&auth.jwt_secret),
            webhook_secret: Arc::from(auth.webhook_secret.as_str()),
            task_token: auth.task_token.as_deref().map(Arc::from),
        }
    }
}
