//! `PostgreSQL` storage for the box office.
//!
//! Implements the [`SeatStore`](boxoffice_core::seats::SeatStore) and
//! [`OrderStore`](boxoffice_core::orders::OrderStore) traits from
//! `boxoffice-core` on top of sqlx:
//!
//! - Seat holds lock the requested rows with `SELECT ... FOR UPDATE` in id
//!   order, check them and update them inside one transaction
//! - Order compare-and-set locks the order row, applies the update and
//!   rewrites the item list in the same transaction
//! - Session layouts are stored as JSONB so the seat catalog can be rebuilt
//!   at startup
//!
//! # Example
//!
//! ```no_run
//! use boxoffice_postgres::{PostgresOrderStore, PostgresSeatStore, connect, migrate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = connect("postgres://localhost/boxoffice", 10).await?;
//! migrate(&pool).await?;
//!
//! let seats = PostgresSeatStore::new(pool.clone());
//! let orders = PostgresOrderStore::new(pool);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod convert;
mod orders;
mod seats;

pub use orders::PostgresOrderStore;
pub use seats::PostgresSeatStore;

use boxoffice_core::error::{BoxOfficeError, Result};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

/// Opens a connection pool.
///
/// # Errors
///
/// Returns [`BoxOfficeError::Storage`] if the database cannot be reached.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| BoxOfficeError::Storage(format!("Failed to connect: {e}")))?;
    tracing::info!(max_connections, "Connected to PostgreSQL");
    Ok(pool)
}

/// Creates or upgrades the box office tables.
///
/// # Errors
///
/// Returns [`BoxOfficeError::Storage`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| BoxOfficeError::Storage(format!("Migration failed: {e}")))?;
    Ok(())
}
