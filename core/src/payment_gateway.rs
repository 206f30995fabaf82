//! Payment gateway boundary.
//!
//! The box office only builds a [`PaymentRequest`] and hands it to a
//! [`PaymentGateway`]; the gateway answers later through the payment webhook,
//! which resolves the order by the returned [`ExternalTransactionRef`].

use crate::error::BoxOfficeError;
use crate::orders::Order;
use crate::types::{ExternalTransactionRef, Money, OrderId, SeatLabel, Timestamp, UserId};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Payment gateway result
pub type GatewayResult<T> = Result<T, PaymentGatewayError>;

/// Payment gateway error
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PaymentGatewayError {
    /// The gateway refused the request
    #[error("payment request rejected: {reason}")]
    Rejected {
        /// Gateway reason
        reason: String,
    },
    /// No answer in time
    #[error("payment gateway timeout")]
    Timeout,
    /// Transport or gateway outage
    #[error("payment gateway unavailable: {message}")]
    Unavailable {
        /// Error message
        message: String,
    },
}

impl From<PaymentGatewayError> for BoxOfficeError {
    fn from(err: PaymentGatewayError) -> Self {
        Self::ExternalFailure(err.to_string())
    }
}

/// One line of the payment detail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLine {
    /// Seat label
    pub label: SeatLabel,
    /// Seat price
    pub amount: Money,
}

/// Everything the gateway needs to open a checkout for an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// The order being paid
    pub number: OrderId,
    /// Idempotency key for the gateway, unique per initiation attempt
    pub external_transaction_id: String,
    /// Paying user
    pub payer: UserId,
    /// Order total
    pub amount: Money,
    /// ISO currency code
    pub currency: String,
    /// Human readable concept
    pub description: String,
    /// Seat lines
    pub lines: Vec<PaymentLine>,
    /// Payment should be completed by this time
    pub due_date: Timestamp,
    /// The gateway stops accepting payment after this time
    pub last_due_date: Timestamp,
    /// Where the buyer lands after paying
    pub return_url: String,
    /// Where the buyer lands after abandoning checkout
    pub back_url: String,
    /// Webhook the gateway notifies
    pub notification_url: String,
}

/// Static parameters of payment requests.
#[derive(Clone, Debug)]
pub struct PaymentSettings {
    /// ISO currency code
    pub currency: String,
    /// Public base URL of the application
    pub base_url: String,
    /// Offset of the due date from initiation
    pub due_after: Duration,
    /// Offset of the last due date from initiation
    pub last_due_after: Duration,
}

impl Default for PaymentSettings {
    fn default() -> Self {
        Self {
            currency: "ARS".into(),
            base_url: "http://localhost:3000".into(),
            due_after: Duration::minutes(30),
            last_due_after: Duration::minutes(60),
        }
    }
}

impl PaymentSettings {
    /// Builds the gateway request for `order` at `now`.
    #[must_use]
    pub fn build_request(&self, order: &Order, now: Timestamp) -> PaymentRequest {
        let base = self.base_url.trim_end_matches('/');
        PaymentRequest {
            number: order.id,
            external_transaction_id: format!("{}-{}", order.id, now.timestamp_millis()),
            payer: order.user_id,
            amount: order.total,
            currency: self.currency.clone(),
            description: format!("Ticket purchase - order {}", order.id),
            lines: order
                .items
                .iter()
                .map(|item| PaymentLine {
                    label: item.label.clone(),
                    amount: item.price_at_sale,
                })
                .collect(),
            due_date: now + self.due_after,
            last_due_date: now + self.last_due_after,
            return_url: format!("{base}/payment/success"),
            back_url: format!("{base}/payment/cancel"),
            notification_url: format!("{base}/api/webhooks/payments"),
        }
    }
}

/// Payment gateway trait
///
/// Abstraction over the external payment processor. Only initiation is
/// outbound; confirmations and denials arrive through the webhook.
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout and returns the gateway's reference for it.
    ///
    /// # Errors
    ///
    /// Returns error if the gateway rejects the request or cannot be reached.
    fn initiate(
        &self,
        request: PaymentRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<ExternalTransactionRef>> + Send + '_>>;
}

/// Mock payment gateway (always succeeds for development)
///
/// Returns the request's external transaction id as the reference.
#[derive(Clone, Debug, Default)]
pub struct MockPaymentGateway;

impl MockPaymentGateway {
    /// Creates a new mock payment gateway
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Creates an Arc-wrapped instance for sharing
    #[must_use]
    pub fn shared() -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new())
    }
}

impl PaymentGateway for MockPaymentGateway {
    fn initiate(
        &self,
        request: PaymentRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<ExternalTransactionRef>> + Send + '_>> {
        Box::pin(async move {
            tracing::info!(
                order_id = %request.number,
                amount = %request.amount,
                currency = %request.currency,
                "Mock payment initiated"
            );
            Ok(ExternalTransactionRef::new(request.external_transaction_id))
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::orders::OrderItem;
    use crate::types::{EventSessionId, SeatId};
    use chrono::{TimeZone, Utc};

    #[test]
    fn request_carries_due_dates_and_urls() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap();
        let order = Order::pending(
            OrderId::new(),
            EventSessionId::new(),
            UserId::new(),
            vec![OrderItem {
                seat_id: SeatId::new(),
                label: SeatLabel::from("A-1"),
                price_at_sale: Money::from_cents(4500),
            }],
            now,
            now + Duration::minutes(15),
        )
        .unwrap();
        let settings = PaymentSettings {
            base_url: "https://tickets.example/".into(),
            ..PaymentSettings::default()
        };

        let request = settings.build_request(&order, now);

        assert_eq!(request.amount, Money::from_cents(4500));
        assert_eq!(request.currency, "ARS");
        assert_eq!(request.due_date, now + Duration::minutes(30));
        assert_eq!(request.last_due_date, now + Duration::minutes(60));
        assert_eq!(request.notification_url, "https://tickets.example/api/webhooks/payments");
        assert_eq!(request.lines.len(), 1);
        assert!(request.external_transaction_id.starts_with(&order.id.to_string()));
    }

    #[tokio::test]
    async fn mock_gateway_echoes_transaction_id() {
        let now = Utc::now();
        let order = Order::pending(OrderId::new(), EventSessionId::new(), UserId::new(), vec![], now, now).unwrap();
        let request = PaymentSettings::default().build_request(&order, now);
        let expected = request.external_transaction_id.clone();

        let reference = MockPaymentGateway::new().initiate(request).await.unwrap();
        assert_eq!(reference.as_str(), expected);
    }

    #[test]
    fn gateway_errors_become_external_failures() {
        let err: BoxOfficeError = PaymentGatewayError::Timeout.into();
        assert_eq!(err, BoxOfficeError::ExternalFailure("payment gateway timeout".into()));
    }
}
