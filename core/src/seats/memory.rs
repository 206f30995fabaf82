//! In-process seat store.
//!
//! Each seat has its own mutex. Multi-seat operations lock the seats in sorted
//! id order, check every seat, then write, so two overlapping holds can never
//! both succeed and can never deadlock.

use super::{HoldOutcome, SeatStore, lock_order};
use crate::catalog::SessionSetup;
use crate::error::{BoxOfficeError, Result};
use crate::types::{EventSessionId, OrderId, SeatId, SeatRecord, SeatState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

type SeatCell = Arc<Mutex<SeatState>>;

#[derive(Debug)]
struct StoredSession {
    setup: SessionSetup,
    seats: Vec<SeatRecord>,
}

/// Seat store backed by per-seat mutexes.
#[derive(Debug, Default)]
pub struct InMemorySeatStore {
    cells: RwLock<HashMap<SeatId, SeatCell>>,
    sessions: RwLock<HashMap<EventSessionId, StoredSession>>,
}

impl InMemorySeatStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cells for `ids`, in the same order.
    fn cells(&self, ids: &[SeatId]) -> Result<Vec<SeatCell>> {
        let cells = self.cells.read().map_err(|_| poisoned("seat index"))?;
        ids.iter()
            .map(|id| {
                cells
                    .get(id)
                    .cloned()
                    .ok_or_else(|| BoxOfficeError::not_found("seat", id))
            })
            .collect()
    }
}

fn poisoned(what: &str) -> BoxOfficeError {
    BoxOfficeError::Storage(format!("{what} lock poisoned"))
}

fn lock_all(cells: &[SeatCell]) -> Result<Vec<MutexGuard<'_, SeatState>>> {
    cells
        .iter()
        .map(|cell| cell.lock().map_err(|_| poisoned("seat")))
        .collect()
}

#[async_trait]
impl SeatStore for InMemorySeatStore {
    async fn initialize_session(&self, setup: &SessionSetup, seats: &[SeatRecord]) -> Result<()> {
        let mut sessions = self.sessions.write().map_err(|_| poisoned("session index"))?;
        if sessions.contains_key(&setup.session_id) {
            return Err(BoxOfficeError::Validation(format!(
                "session {} already exists",
                setup.session_id
            )));
        }

        let mut cells = self.cells.write().map_err(|_| poisoned("seat index"))?;
        for seat in seats {
            cells.insert(seat.id, Arc::new(Mutex::new(SeatState::Available)));
        }
        sessions.insert(
            setup.session_id,
            StoredSession {
                setup: setup.clone(),
                seats: seats.to_vec(),
            },
        );

        tracing::info!(session_id = %setup.session_id, seats = seats.len(), "Session seats initialized");
        Ok(())
    }

    async fn load_sessions(&self) -> Result<Vec<(SessionSetup, Vec<SeatRecord>)>> {
        let sessions = self.sessions.read().map_err(|_| poisoned("session index"))?;
        Ok(sessions
            .values()
            .map(|stored| (stored.setup.clone(), stored.seats.clone()))
            .collect())
    }

    async fn try_hold(&self, seats: &[SeatId], order_id: OrderId) -> Result<HoldOutcome> {
        let ids = lock_order(seats);
        let cells = self.cells(&ids)?;
        let mut guards = lock_all(&cells)?;

        let conflicts: Vec<SeatId> = ids
            .iter()
            .zip(&guards)
            .filter(|(_, state)| !state.holdable_by(order_id))
            .map(|(id, _)| *id)
            .collect();
        if !conflicts.is_empty() {
            return Ok(HoldOutcome::Conflict(conflicts));
        }

        let mut newly_held = Vec::new();
        for (id, state) in ids.iter().zip(&mut guards) {
            if **state == SeatState::Available {
                newly_held.push(*id);
            }
            **state = SeatState::Reserved(order_id);
        }
        Ok(HoldOutcome::Held { newly_held })
    }

    async fn mark_sold(&self, seats: &[SeatId], order_id: OrderId) -> Result<()> {
        let ids = lock_order(seats);
        let cells = self.cells(&ids)?;
        let mut guards = lock_all(&cells)?;

        if let Some((id, state)) = ids.iter().zip(&guards).find(|(_, state)| {
            !matches!(***state, SeatState::Reserved(owner) | SeatState::Sold(owner) if owner == order_id)
        }) {
            return Err(BoxOfficeError::invalid_transition(
                order_id,
                format!("seat {id} is {}", state.status()),
                "sell seats of",
            ));
        }

        for state in &mut guards {
            **state = SeatState::Sold(order_id);
        }
        Ok(())
    }

    async fn release(&self, seats: &[SeatId], order_id: OrderId) -> Result<usize> {
        let ids = lock_order(seats);
        let cells = {
            let index = self.cells.read().map_err(|_| poisoned("seat index"))?;
            ids.iter().filter_map(|id| index.get(id).cloned()).collect::<Vec<_>>()
        };
        let mut guards = lock_all(&cells)?;

        let mut released = 0;
        for state in &mut guards {
            if **state == SeatState::Reserved(order_id) {
                **state = SeatState::Available;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn snapshot(&self, session_id: EventSessionId) -> Result<HashMap<SeatId, SeatState>> {
        let ids: Vec<SeatId> = {
            let sessions = self.sessions.read().map_err(|_| poisoned("session index"))?;
            sessions
                .get(&session_id)
                .ok_or_else(|| BoxOfficeError::not_found("session", session_id))?
                .seats
                .iter()
                .map(|seat| seat.id)
                .collect()
        };

        let cells = self.cells(&ids)?;
        let mut snapshot = HashMap::with_capacity(ids.len());
        for (id, cell) in ids.into_iter().zip(&cells) {
            let state = *cell.lock().map_err(|_| poisoned("seat"))?;
            snapshot.insert(id, state);
        }
        Ok(snapshot)
    }

    async fn seat_states(&self, seats: &[SeatId]) -> Result<Vec<(SeatId, SeatState)>> {
        let cells = self.cells(seats)?;
        seats
            .iter()
            .zip(&cells)
            .map(|(id, cell)| {
                let state = *cell.lock().map_err(|_| poisoned("seat"))?;
                Ok::<_, BoxOfficeError>((*id, state))
            })
            .collect()
    }
}
