//! `PostgreSQL` seat store.

use crate::convert::{cents_from_db, cents_to_db, db_error, index_to_db, seat_state};
use async_trait::async_trait;
use boxoffice_core::catalog::SessionSetup;
use boxoffice_core::error::{BoxOfficeError, Result};
use boxoffice_core::seats::{HoldOutcome, SeatStore, lock_order};
use boxoffice_core::types::{
    EventSessionId, OrderId, SeatId, SeatLabel, SeatRecord, SeatState, SectorId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

/// Seat store backed by the `seats` and `event_sessions` tables.
///
/// Every multi-seat mutation runs in one transaction that locks the seat rows
/// in id order before checking them, so overlapping holds serialize and never
/// deadlock.
#[derive(Clone)]
pub struct PostgresSeatStore {
    pool: PgPool,
}

impl PostgresSeatStore {
    /// Creates a store on an existing pool
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn uuids(ids: &[SeatId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

/// Locks `ids` for the rest of the transaction and returns their states.
///
/// Fails with `NotFound` if any id has no row.
async fn lock_seats(conn: &mut PgConnection, ids: &[SeatId]) -> Result<Vec<(SeatId, SeatState)>> {
    let rows = sqlx::query(
        r"
        SELECT id, status, owner_order_id
        FROM seats
        WHERE id = ANY($1)
        ORDER BY id
        FOR UPDATE
        ",
    )
    .bind(uuids(ids))
    .fetch_all(conn)
    .await
    .map_err(db_error("Failed to lock seats"))?;

    let states = rows.iter().map(state_row).collect::<Result<Vec<_>>>()?;
    if states.len() != ids.len() {
        let found: Vec<SeatId> = states.iter().map(|(id, _)| *id).collect();
        let missing = ids.iter().find(|id| !found.contains(id)).copied();
        return Err(BoxOfficeError::not_found(
            "seat",
            missing.map_or_else(String::new, |id| id.to_string()),
        ));
    }
    Ok(states)
}

fn state_row(row: &PgRow) -> Result<(SeatId, SeatState)> {
    let id: Uuid = row.try_get("id").map_err(db_error("Failed to read seat id"))?;
    let status: String = row.try_get("status").map_err(db_error("Failed to read seat status"))?;
    let owner: Option<Uuid> = row
        .try_get("owner_order_id")
        .map_err(db_error("Failed to read seat owner"))?;
    Ok((SeatId::from_uuid(id), seat_state(&status, owner)?))
}

fn record_row(row: &PgRow) -> Result<SeatRecord> {
    let number: i32 = row.try_get("number").map_err(db_error("Failed to read seat number"))?;
    Ok(SeatRecord {
        id: SeatId::from_uuid(row.try_get("id").map_err(db_error("Failed to read seat id"))?),
        session_id: EventSessionId::from_uuid(
            row.try_get("session_id").map_err(db_error("Failed to read seat session"))?,
        ),
        label: SeatLabel::new(
            row.try_get::<String, _>("label")
                .map_err(db_error("Failed to read seat label"))?,
        ),
        sector_id: SectorId::from_uuid(
            row.try_get("sector_id").map_err(db_error("Failed to read seat sector"))?,
        ),
        sector: row.try_get("sector").map_err(db_error("Failed to read seat sector"))?,
        row: row.try_get("row_label").map_err(db_error("Failed to read seat row"))?,
        number: u32::try_from(number)
            .map_err(|_| BoxOfficeError::Storage(format!("invalid seat number {number}")))?,
        price: cents_from_db(row.try_get("price_cents").map_err(db_error("Failed to read seat price"))?)?,
    })
}

#[async_trait]
impl SeatStore for PostgresSeatStore {
    async fn initialize_session(&self, setup: &SessionSetup, seats: &[SeatRecord]) -> Result<()> {
        let layout = serde_json::to_value(setup)
            .map_err(|e| BoxOfficeError::Validation(format!("Failed to encode session layout: {e}")))?;

        let mut tx = self.pool.begin().await.map_err(db_error("Failed to start transaction"))?;

        let inserted = sqlx::query(
            r"
            INSERT INTO event_sessions (id, event_name, starts_at, setup)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(setup.session_id.as_uuid())
        .bind(&setup.event_name)
        .bind(setup.starts_at)
        .bind(layout)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert session"))?;

        if inserted.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(BoxOfficeError::Validation(format!(
                "session {} already exists",
                setup.session_id
            )));
        }

        let mut ids = Vec::with_capacity(seats.len());
        let mut labels = Vec::with_capacity(seats.len());
        let mut sector_ids = Vec::with_capacity(seats.len());
        let mut sectors = Vec::with_capacity(seats.len());
        let mut rows = Vec::with_capacity(seats.len());
        let mut numbers = Vec::with_capacity(seats.len());
        let mut prices = Vec::with_capacity(seats.len());
        let mut positions = Vec::with_capacity(seats.len());
        for (position, seat) in seats.iter().enumerate() {
            ids.push(*seat.id.as_uuid());
            labels.push(seat.label.as_str().to_owned());
            sector_ids.push(*seat.sector_id.as_uuid());
            sectors.push(seat.sector.clone());
            rows.push(seat.row.clone());
            numbers.push(
                i32::try_from(seat.number)
                    .map_err(|_| BoxOfficeError::Validation(format!("seat number {} out of range", seat.number)))?,
            );
            prices.push(cents_to_db(seat.price)?);
            positions.push(index_to_db(position)?);
        }

        sqlx::query(
            r"
            INSERT INTO seats (id, session_id, label, sector_id, sector, row_label, number, price_cents, position)
            SELECT seat.id, $1, seat.label, seat.sector_id, seat.sector, seat.row_label, seat.number, seat.price_cents, seat.position
            FROM UNNEST($2::uuid[], $3::text[], $4::uuid[], $5::text[], $6::text[], $7::int4[], $8::int8[], $9::int4[])
                AS seat(id, label, sector_id, sector, row_label, number, price_cents, position)
            ",
        )
        .bind(setup.session_id.as_uuid())
        .bind(ids)
        .bind(labels)
        .bind(sector_ids)
        .bind(sectors)
        .bind(rows)
        .bind(numbers)
        .bind(prices)
        .bind(positions)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert seats"))?;

        tx.commit().await.map_err(db_error("Failed to commit session"))?;

        tracing::info!(session_id = %setup.session_id, seats = seats.len(), "Session seats stored");
        Ok(())
    }

    async fn load_sessions(&self) -> Result<Vec<(SessionSetup, Vec<SeatRecord>)>> {
        let sessions = sqlx::query("SELECT id, setup FROM event_sessions ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to load sessions"))?;

        let seat_rows = sqlx::query(
            r"
            SELECT id, session_id, label, sector_id, sector, row_label, number, price_cents
            FROM seats
            ORDER BY session_id, position
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("Failed to load seats"))?;

        let mut by_session: HashMap<EventSessionId, Vec<SeatRecord>> = HashMap::new();
        for row in &seat_rows {
            let record = record_row(row)?;
            by_session.entry(record.session_id).or_default().push(record);
        }

        sessions
            .iter()
            .map(|row| -> Result<(SessionSetup, Vec<SeatRecord>)> {
                let layout: serde_json::Value = row.try_get("setup").map_err(db_error("Failed to read layout"))?;
                let setup: SessionSetup = serde_json::from_value(layout)
                    .map_err(|e| BoxOfficeError::Storage(format!("Corrupt session layout: {e}")))?;
                let seats = by_session.remove(&setup.session_id).unwrap_or_default();
                Ok((setup, seats))
            })
            .collect()
    }

    async fn try_hold(&self, seats: &[SeatId], order_id: OrderId) -> Result<HoldOutcome> {
        let ids = lock_order(seats);
        let mut tx = self.pool.begin().await.map_err(db_error("Failed to start transaction"))?;

        let states = lock_seats(&mut *tx, &ids).await?;
        let conflicts: Vec<SeatId> = states
            .iter()
            .filter(|(_, state)| !state.holdable_by(order_id))
            .map(|(id, _)| *id)
            .collect();
        if !conflicts.is_empty() {
            let _ = tx.rollback().await;
            return Ok(HoldOutcome::Conflict(conflicts));
        }

        sqlx::query("UPDATE seats SET status = 'RESERVED', owner_order_id = $2 WHERE id = ANY($1)")
            .bind(uuids(&ids))
            .bind(order_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to hold seats"))?;

        tx.commit().await.map_err(db_error("Failed to commit hold"))?;
        let newly_held = states
            .into_iter()
            .filter(|(_, state)| *state == SeatState::Available)
            .map(|(id, _)| id)
            .collect();
        Ok(HoldOutcome::Held { newly_held })
    }

    async fn mark_sold(&self, seats: &[SeatId], order_id: OrderId) -> Result<()> {
        let ids = lock_order(seats);
        let mut tx = self.pool.begin().await.map_err(db_error("Failed to start transaction"))?;

        let states = lock_seats(&mut *tx, &ids).await?;
        if let Some((id, state)) = states.iter().find(|(_, state)| {
            !matches!(state, SeatState::Reserved(owner) | SeatState::Sold(owner) if *owner == order_id)
        }) {
            let _ = tx.rollback().await;
            return Err(BoxOfficeError::invalid_transition(
                order_id,
                format!("seat {id} is {}", state.status()),
                "sell seats of",
            ));
        }

        sqlx::query("UPDATE seats SET status = 'SOLD' WHERE id = ANY($1)")
            .bind(uuids(&ids))
            .execute(&mut *tx)
            .await
            .map_err(db_error("Failed to mark seats sold"))?;

        tx.commit().await.map_err(db_error("Failed to commit sale"))?;
        Ok(())
    }

    async fn release(&self, seats: &[SeatId], order_id: OrderId) -> Result<usize> {
        let result = sqlx::query(
            r"
            UPDATE seats
            SET status = 'AVAILABLE', owner_order_id = NULL
            WHERE id = ANY($1) AND status = 'RESERVED' AND owner_order_id = $2
            ",
        )
        .bind(uuids(seats))
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error("Failed to release seats"))?;

        usize::try_from(result.rows_affected())
            .map_err(|_| BoxOfficeError::Storage("released row count out of range".into()))
    }

    async fn snapshot(&self, session_id: EventSessionId) -> Result<HashMap<SeatId, SeatState>> {
        let exists = sqlx::query("SELECT 1 FROM event_sessions WHERE id = $1")
            .bind(session_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("Failed to load session"))?;
        if exists.is_none() {
            return Err(BoxOfficeError::not_found("session", session_id));
        }

        let rows = sqlx::query("SELECT id, status, owner_order_id FROM seats WHERE session_id = $1")
            .bind(session_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to load seat states"))?;
        rows.iter().map(state_row).collect()
    }

    async fn seat_states(&self, seats: &[SeatId]) -> Result<Vec<(SeatId, SeatState)>> {
        let rows = sqlx::query("SELECT id, status, owner_order_id FROM seats WHERE id = ANY($1)")
            .bind(uuids(seats))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("Failed to load seat states"))?;
        let states: HashMap<SeatId, SeatState> = rows.iter().map(state_row).collect::<Result<_>>()?;

        seats
            .iter()
            .map(|id| {
                states
                    .get(id)
                    .map(|state| (*id, *state))
                    .ok_or_else(|| BoxOfficeError::not_found("seat", id))
            })
            .collect()
    }
}
