//! # Box Office Core
//!
//! Seat reservation and order lifecycle for ticket sales.
//!
//! A buyer selects seats on a session's map; the seats are held for a
//! `Pending` order for a limited time. The order moves to
//! `AwaitingPayment` once a payment is initiated with the external gateway
//! and becomes `Paid` when the gateway confirms it. Holds that lapse are
//! reclaimed by the [`sweeper::ExpirationSweeper`]; cancellations and
//! denied payments release seats the same way.
//!
//! ## Guarantees
//!
//! - A seat belongs to at most one order at a time. Holds are all-or-nothing.
//! - Every order status change goes through a compare-and-set on the order
//!   store, so the webhook, the buyer and the sweeper never both win.
//! - Seats are never released while the order could still become `Paid`,
//!   and a `Paid` order always owns its seats as `Sold`.
//! - Payments that arrive too late are never dropped silently: they are
//!   flagged on the [`collaborators::ReconciliationSink`].
//!
//! ## Example
//!
//! ```
//! use boxoffice_core::{BoxOffice, Principal, UserId};
//! use boxoffice_core::catalog::{RowLayout, SectorLayout, SessionSetup, TicketCategory};
//! use boxoffice_core::reservation::SelectionRequest;
//! use boxoffice_core::types::{CategoryId, EventSessionId, Money, SeatLabel, SectorId};
//!
//! # tokio_test_block(async {
//! let office = BoxOffice::builder().build();
//! let admin = Principal::admin(UserId::new());
//! let sector = SectorId::new();
//! let setup = SessionSetup {
//!     session_id: EventSessionId::new(),
//!     event_name: "Concierto".to_string(),
//!     starts_at: chrono::Utc::now(),
//!     sectors: vec![SectorLayout {
//!         id: sector,
//!         name: "Platea".to_string(),
//!         rows: vec![RowLayout { label: "A".to_string(), seats: 10 }],
//!     }],
//!     categories: vec![TicketCategory {
//!         id: CategoryId::new(),
//!         sector_id: sector,
//!         title: "General".to_string(),
//!         price: Money::from_cents(1500),
//!     }],
//! };
//! let session = office.setup_session(&admin, setup).await.unwrap();
//!
//! let buyer = Principal::buyer(UserId::new());
//! let order = office
//!     .select_seats(&buyer, SelectionRequest {
//!         session_id: session.session_id,
//!         order_id: None,
//!         labels: vec![SeatLabel::from("A-1"), SeatLabel::from("A-2")],
//!     })
//!     .await
//!     .unwrap();
//! assert_eq!(order.total, Money::from_cents(3000));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

pub mod app;
pub mod auth;
pub mod catalog;
pub mod collaborators;
pub mod dashboard;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod orders;
pub mod payment_gateway;
pub mod reservation;
pub mod retry;
pub mod seats;
pub mod sweeper;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

pub use app::{BoxOffice, BoxOfficeBuilder, BoxOfficeSettings, SeatAvailability, SessionSummary};
pub use auth::{Principal, Role};
pub use error::{BoxOfficeError, Result};
pub use orders::{Order, OrderItem, OrderStatus};
pub use types::{EventSessionId, ExternalTransactionRef, Money, OrderId, SeatId, SeatLabel, SeatState, UserId};
