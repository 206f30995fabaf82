//! Error types for web handlers.
//!
//! Bridges [`BoxOfficeError`] and HTTP responses. Every error body carries a
//! stable `code` string that clients can branch on.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use boxoffice_core::BoxOfficeError;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler() -> Result<Json<Order>, AppError> {
///     let order = office.order(&principal, id).await?;
///     Ok(Json(order))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Structured payload, e.g. the labels of unavailable seats
    details: Option<Value>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String, code: &'static str) -> Self {
        Self {
            status,
            message,
            code,
            details: None,
            source: None,
        }
    }

    /// Attach a structured payload to the response body.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a new error with a source error.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// HTTP status of the response
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into(), "BAD_REQUEST")
    }

    /// Create a 401 Unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message.into(), "UNAUTHORIZED")
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message.into(), "FORBIDDEN")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 422 Unprocessable Entity error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, message.into(), "VALIDATION_ERROR")
    }

    /// Create a 502 Bad Gateway error.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message.into(), "PAYMENT_GATEWAY_ERROR")
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.into(), "INTERNAL_ERROR")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            if let Some(source) = &self.source {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    error = %source,
                    "Internal server error"
                );
            } else {
                tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Internal server error"
                );
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };

        (self.status, Json(body)).into_response()
    }
}

impl From<BoxOfficeError> for AppError {
    fn from(err: BoxOfficeError) -> Self {
        let message = err.to_string();
        match err {
            BoxOfficeError::NotFound { entity, id } => Self::not_found(entity, id),
            BoxOfficeError::SeatsUnavailable { seats } => {
                Self::new(StatusCode::CONFLICT, message, "SEATS_UNAVAILABLE")
                    .with_details(json!({ "seats": seats }))
            }
            BoxOfficeError::UnknownSeats { labels } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, "UNKNOWN_SEATS")
                    .with_details(json!({ "labels": labels }))
            }
            BoxOfficeError::LimitExceeded { max, requested } => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, message, "LIMIT_EXCEEDED")
                    .with_details(json!({ "max": max, "requested": requested }))
            }
            BoxOfficeError::InvalidTransition { from, .. } => {
                Self::new(StatusCode::CONFLICT, message, "INVALID_TRANSITION")
                    .with_details(json!({ "status": from }))
            }
            BoxOfficeError::ExternalFailure(_) => Self::bad_gateway("Payment provider unavailable")
                .with_source(anyhow::Error::new(err)),
            BoxOfficeError::Validation(reason) => Self::validation(reason),
            BoxOfficeError::Forbidden(reason) => Self::forbidden(reason),
            BoxOfficeError::Storage(_) => {
                Self::internal("An internal error occurred").with_source(anyhow::Error::new(err))
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::{OrderId, SeatLabel};

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "[BAD_REQUEST] Invalid input");
    }

    #[test]
    fn test_not_found_from_domain() {
        let err = AppError::from(BoxOfficeError::not_found("order", "123"));
        assert_eq!(err.to_string(), "[NOT_FOUND] order with id 123 not found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_conflicts_carry_details() {
        let err = AppError::from(BoxOfficeError::SeatsUnavailable {
            seats: vec![SeatLabel::new("A-1")],
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "SEATS_UNAVAILABLE");
        assert_eq!(err.details, Some(json!({ "seats": ["A-1"] })));

        let err = AppError::from(BoxOfficeError::InvalidTransition {
            order_id: OrderId::new(),
            from: "PAID".into(),
            action: "cancel",
        });
        assert_eq!(err.status(), StatusCode::CONFLICT);
        assert_eq!(err.code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_limit_and_validation_are_unprocessable() {
        let err = AppError::from(BoxOfficeError::LimitExceeded { max: 5, requested: 6 });
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code(), "LIMIT_EXCEEDED");

        let err = AppError::from(BoxOfficeError::Validation("empty selection".into()));
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_infrastructure_failures_hide_details() {
        let err = AppError::from(BoxOfficeError::Storage("connection reset".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.message.contains("connection reset"));
        assert!(std::error::Error::source(&err).is_some());

        let err = AppError::from(BoxOfficeError::ExternalFailure("timeout".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
