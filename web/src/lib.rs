//! HTTP surface of the box office.
//!
//! Handlers are thin: they authenticate the caller, turn the request into a
//! [`boxoffice_core::BoxOffice`] call and map the result (or the
//! [`BoxOfficeError`](boxoffice_core::BoxOfficeError)) to a response.
//!
//! ```text
//! request ──► RequestTracking ──► AuthUser (JWT) ──► handler ──► BoxOffice
//!                                                       │
//! response ◄── AppError / Json ◄─────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use boxoffice_core::BoxOffice;
//! use boxoffice_web::{AppState, Config, build_router};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::from_env()?;
//! let office = Arc::new(BoxOffice::builder().settings(config.settings()).build());
//! let app = build_router(AppState::new(office, &config.auth));
//!
//! let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

pub use auth::{AuthUser, Claims, TokenKeys};
pub use config::{Config, ConfigError, StoreBackend};
pub use error::AppError;
pub use middleware::{REQUEST_ID_HEADER, RequestId, request_tracking_layer};
pub use routes::build_router;
pub use state::AppState;
