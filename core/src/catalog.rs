//! Seat catalog: the static geometry of each session and its prices.
//!
//! The catalog never changes seat status. It validates session layouts,
//! produces the bulk seat records at setup, resolves client labels to seat
//! ids, and merges geometry with a status snapshot for rendering.

use crate::error::{BoxOfficeError, Result};
use crate::types::{
    CategoryId, EventSessionId, Money, SeatId, SeatLabel, SeatRecord, SeatRef, SeatState, SeatStatus,
    SectorId, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

// ============================================================================
// Layout types
// ============================================================================

/// One row of seats, numbered `1..=seats`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowLayout {
    /// Row label, unique within the session
    pub label: String,
    /// Number of seats in the row
    pub seats: u32,
}

/// A sector of the venue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorLayout {
    /// Sector id
    pub id: SectorId,
    /// Display name ("Platea A", "Pullman", ...)
    pub name: String,
    /// Rows front to back
    pub rows: Vec<RowLayout>,
}

/// Price for the seats of one sector.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCategory {
    /// Category id
    pub id: CategoryId,
    /// The sector this category prices
    pub sector_id: SectorId,
    /// Display title
    pub title: String,
    /// Price per seat
    pub price: Money,
}

/// Everything needed to open a session for sale.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSetup {
    /// Session id
    pub session_id: EventSessionId,
    /// Event name
    pub event_name: String,
    /// Start of the performance
    pub starts_at: Timestamp,
    /// Venue sectors
    pub sectors: Vec<SectorLayout>,
    /// One category per sector
    pub categories: Vec<TicketCategory>,
}

impl SessionSetup {
    /// Total seats described by the layout.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.sectors
            .iter()
            .flat_map(|sector| &sector.rows)
            .map(|row| u64::from(row.seats))
            .sum()
    }

    fn category_for(&self, sector_id: SectorId) -> Option<&TicketCategory> {
        self.categories.iter().find(|category| category.sector_id == sector_id)
    }
}

// ============================================================================
// Resolved map
// ============================================================================

/// Seat counts by status.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatTotals {
    /// Available seats
    pub available: usize,
    /// Reserved seats
    pub reserved: usize,
    /// Sold seats
    pub sold: usize,
}

impl SeatTotals {
    /// Counts one seat
    pub const fn add(&mut self, status: SeatStatus) {
        match status {
            SeatStatus::Available => self.available += 1,
            SeatStatus::Reserved => self.reserved += 1,
            SeatStatus::Sold => self.sold += 1,
        }
    }

    /// All seats counted
    #[must_use]
    pub const fn total(&self) -> usize {
        self.available + self.reserved + self.sold
    }
}

/// One seat on the rendered map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatView {
    /// Seat id
    pub id: SeatId,
    /// Seat label
    pub label: SeatLabel,
    /// Seat number in the row
    pub number: u32,
    /// Current status
    pub status: SeatStatus,
}

/// One row on the rendered map.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowView {
    /// Row label
    pub label: String,
    /// Seats in number order
    pub seats: Vec<SeatView>,
}

/// One sector on the rendered map, with its category price.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorView {
    /// Sector id
    pub id: SectorId,
    /// Sector name
    pub name: String,
    /// Category title
    pub category: String,
    /// Price per seat
    pub price: Money,
    /// Rows
    pub rows: Vec<RowView>,
}

/// Geometry merged with prices and live status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMap {
    /// Session id
    pub session_id: EventSessionId,
    /// Event name
    pub event_name: String,
    /// Start time
    pub starts_at: Timestamp,
    /// Sectors in layout order
    pub sectors: Vec<SectorView>,
    /// Counts by status
    pub totals: SeatTotals,
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug)]
struct SessionEntry {
    setup: SessionSetup,
    seats: Vec<SeatRecord>,
    by_label: HashMap<SeatLabel, usize>,
}

/// Registry of session layouts.
#[derive(Debug)]
pub struct SeatCatalog {
    sessions: RwLock<HashMap<EventSessionId, Arc<SessionEntry>>>,
    max_seats_per_session: u64,
}

impl SeatCatalog {
    /// Creates an empty catalog that accepts sessions of up to
    /// `max_seats_per_session` seats.
    #[must_use]
    pub fn new(max_seats_per_session: u64) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_seats_per_session,
        }
    }

    /// Validates a layout and produces its seat records.
    ///
    /// Nothing is registered; call [`SeatCatalog::register`] once the seats
    /// have been stored.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Validation`] for an invalid layout or an id that is
    /// already registered.
    pub fn plan_session(&self, setup: &SessionSetup) -> Result<Vec<SeatRecord>> {
        if self.read()?.contains_key(&setup.session_id) {
            return Err(BoxOfficeError::Validation(format!(
                "session {} already exists",
                setup.session_id
            )));
        }
        validate_layout(setup, self.max_seats_per_session)?;

        let mut records = Vec::new();
        for sector in &setup.sectors {
            let category = setup.category_for(sector.id).ok_or_else(|| {
                BoxOfficeError::Validation(format!("sector {} has no ticket category", sector.name))
            })?;
            for row in &sector.rows {
                for number in 1..=row.seats {
                    records.push(SeatRecord {
                        id: SeatId::new(),
                        session_id: setup.session_id,
                        label: SeatLabel::for_seat(&row.label, number),
                        sector_id: sector.id,
                        sector: sector.name.clone(),
                        row: row.label.clone(),
                        number,
                        price: category.price,
                    });
                }
            }
        }
        Ok(records)
    }

    /// Registers a session with its (already stored) seat records.
    ///
    /// Also used at startup to rebuild the catalog from the seat store.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::Storage`] if the registry lock is poisoned.
    pub fn register(&self, setup: SessionSetup, seats: Vec<SeatRecord>) -> Result<()> {
        let by_label = seats
            .iter()
            .enumerate()
            .map(|(index, seat)| (seat.label.clone(), index))
            .collect();
        let entry = SessionEntry {
            setup,
            seats,
            by_label,
        };
        self.sessions
            .write()
            .map_err(|_| poisoned())?
            .insert(entry.setup.session_id, Arc::new(entry));
        Ok(())
    }

    /// Resolves client labels to seat identities and prices.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::NotFound`] for an unknown session,
    /// [`BoxOfficeError::UnknownSeats`] listing every label that does not exist.
    pub fn resolve_labels(&self, session_id: EventSessionId, labels: &[SeatLabel]) -> Result<Vec<SeatRef>> {
        let entry = self.entry(session_id)?;
        let mut resolved = Vec::with_capacity(labels.len());
        let mut unknown = Vec::new();

        for label in labels {
            match entry.by_label.get(label) {
                Some(&index) => resolved.push(SeatRef::from(&entry.seats[index])),
                None => unknown.push(label.clone()),
            }
        }

        if unknown.is_empty() {
            Ok(resolved)
        } else {
            Err(BoxOfficeError::UnknownSeats { labels: unknown })
        }
    }

    /// Merges geometry and prices with a status snapshot.
    ///
    /// A seat missing from the snapshot is rendered as reserved so that it is
    /// never offered before its status is known.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::NotFound`] for an unknown session.
    pub fn resolve_map(&self, session_id: EventSessionId, snapshot: &HashMap<SeatId, SeatState>) -> Result<SessionMap> {
        let entry = self.entry(session_id)?;
        let mut totals = SeatTotals::default();

        let sectors = entry
            .setup
            .sectors
            .iter()
            .map(|sector| {
                let (category, price) = entry
                    .setup
                    .category_for(sector.id)
                    .map(|c| (c.title.clone(), c.price))
                    .unwrap_or_default();

                let rows = sector
                    .rows
                    .iter()
                    .map(|row| {
                        let seats = entry
                            .seats
                            .iter()
                            .filter(|seat| seat.sector_id == sector.id && seat.row == row.label)
                            .map(|seat| {
                                let status = snapshot
                                    .get(&seat.id)
                                    .map_or(SeatStatus::Reserved, SeatState::status);
                                totals.add(status);
                                SeatView {
                                    id: seat.id,
                                    label: seat.label.clone(),
                                    number: seat.number,
                                    status,
                                }
                            })
                            .collect();
                        RowView {
                            label: row.label.clone(),
                            seats,
                        }
                    })
                    .collect();

                SectorView {
                    id: sector.id,
                    name: sector.name.clone(),
                    category,
                    price,
                    rows,
                }
            })
            .collect();

        Ok(SessionMap {
            session_id,
            event_name: entry.setup.event_name.clone(),
            starts_at: entry.setup.starts_at,
            sectors,
            totals,
        })
    }

    /// All seat records of a session, in layout order.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::NotFound`] for an unknown session.
    pub fn seats(&self, session_id: EventSessionId) -> Result<Vec<SeatRecord>> {
        Ok(self.entry(session_id)?.seats.clone())
    }

    /// The layout a session was created from.
    ///
    /// # Errors
    ///
    /// [`BoxOfficeError::NotFound`] for an unknown session.
    pub fn setup(&self, session_id: EventSessionId) -> Result<SessionSetup> {
        Ok(self.entry(session_id)?.setup.clone())
    }

    /// Whether the session is registered.
    #[must_use]
    pub fn contains(&self, session_id: EventSessionId) -> bool {
        self.read().is_ok_and(|sessions| sessions.contains_key(&session_id))
    }

    fn entry(&self, session_id: EventSessionId) -> Result<Arc<SessionEntry>> {
        self.read()?
            .get(&session_id)
            .cloned()
            .ok_or_else(|| BoxOfficeError::not_found("session", session_id))
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<EventSessionId, Arc<SessionEntry>>>> {
        self.sessions.read().map_err(|_| poisoned())
    }
}

fn poisoned() -> BoxOfficeError {
    BoxOfficeError::Storage("catalog lock poisoned".into())
}

fn validate_layout(setup: &SessionSetup, max_seats: u64) -> Result<()> {
    let invalid = |message: String| Err(BoxOfficeError::Validation(message));

    if setup.event_name.trim().is_empty() {
        return invalid("event name is required".into());
    }
    if setup.sectors.is_empty() {
        return invalid("at least one sector is required".into());
    }

    let sector_ids: HashSet<SectorId> = setup.sectors.iter().map(|s| s.id).collect();
    if sector_ids.len() != setup.sectors.len() {
        return invalid("sector ids must be unique".into());
    }

    let mut priced = HashSet::new();
    for category in &setup.categories {
        if !sector_ids.contains(&category.sector_id) {
            return invalid(format!("category {} references an unknown sector", category.title));
        }
        if category.price.is_zero() {
            return invalid(format!("category {} must have a price", category.title));
        }
        if !priced.insert(category.sector_id) {
            return invalid(format!("sector {} has more than one category", category.sector_id));
        }
    }

    let mut row_labels = HashSet::new();
    for sector in &setup.sectors {
        if !priced.contains(&sector.id) {
            return invalid(format!("sector {} has no ticket category", sector.name));
        }
        for row in &sector.rows {
            let label = row.label.trim();
            if label.is_empty() || label != row.label {
                return invalid(format!("invalid row label {:?}", row.label));
            }
            if row.seats == 0 {
                return invalid(format!("row {label} has no seats"));
            }
            if !row_labels.insert(label.to_owned()) {
                return invalid(format!("row {label} appears more than once"));
            }
        }
    }

    let capacity = setup.capacity();
    if capacity == 0 {
        return invalid("layout has no seats".into());
    }
    if capacity > max_seats {
        return invalid(format!("capacity {capacity} exceeds the limit of {max_seats} seats"));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use chrono::Utc;

    /// Two sectors: "Platea A" rows A(3) and B(2) at 10.00, "Pullman" row P(2) at 25.00.
    pub(crate) fn small_setup() -> SessionSetup {
        let platea = SectorId::new();
        let pullman = SectorId::new();
        SessionSetup {
            session_id: EventSessionId::new(),
            event_name: "Hamlet".into(),
            starts_at: Utc::now(),
            sectors: vec![
                SectorLayout {
                    id: platea,
                    name: "Platea A".into(),
                    rows: vec![
                        RowLayout { label: "A".into(), seats: 3 },
                        RowLayout { label: "B".into(), seats: 2 },
                    ],
                },
                SectorLayout {
                    id: pullman,
                    name: "Pullman".into(),
                    rows: vec![RowLayout { label: "P".into(), seats: 2 }],
                },
            ],
            categories: vec![
                TicketCategory {
                    id: CategoryId::new(),
                    sector_id: platea,
                    title: "Platea A".into(),
                    price: Money::from_cents(1000),
                },
                TicketCategory {
                    id: CategoryId::new(),
                    sector_id: pullman,
                    title: "Pullman".into(),
                    price: Money::from_cents(2500),
                },
            ],
        }
    }

    fn registered() -> (SeatCatalog, SessionSetup, Vec<SeatRecord>) {
        let catalog = SeatCatalog::new(150);
        let setup = small_setup();
        let seats = catalog.plan_session(&setup).unwrap();
        catalog.register(setup.clone(), seats.clone()).unwrap();
        (catalog, setup, seats)
    }

    #[test]
    fn plan_produces_labelled_priced_seats() {
        let catalog = SeatCatalog::new(150);
        let seats = catalog.plan_session(&small_setup()).unwrap();

        assert_eq!(seats.len(), 7);
        let labels: Vec<_> = seats.iter().map(|s| s.label.as_str().to_owned()).collect();
        assert_eq!(labels, ["A-1", "A-2", "A-3", "B-1", "B-2", "P-1", "P-2"]);
        assert_eq!(seats[0].price, Money::from_cents(1000));
        assert_eq!(seats[6].price, Money::from_cents(2500));
    }

    #[test]
    fn rejects_unpriced_sector() {
        let mut setup = small_setup();
        setup.categories.pop();
        let err = SeatCatalog::new(150).plan_session(&setup).unwrap_err();
        assert!(matches!(err, BoxOfficeError::Validation(msg) if msg.contains("Pullman")));
    }

    #[test]
    fn rejects_duplicate_rows_and_oversized_layouts() {
        let mut setup = small_setup();
        setup.sectors[1].rows[0].label = "A".into();
        assert!(SeatCatalog::new(150).plan_session(&setup).is_err());

        let setup = small_setup();
        assert!(SeatCatalog::new(6).plan_session(&setup).is_err());
    }

    #[test]
    fn rejects_already_registered_session() {
        let (catalog, setup, _) = registered();
        assert!(matches!(
            catalog.plan_session(&setup),
            Err(BoxOfficeError::Validation(_))
        ));
    }

    #[test]
    fn resolve_labels_reports_every_unknown_label() {
        let (catalog, setup, seats) = registered();

        let refs = catalog
            .resolve_labels(setup.session_id, &[SeatLabel::from("B-2"), SeatLabel::from("A-1")])
            .unwrap();
        assert_eq!(refs[0].id, seats[4].id);
        assert_eq!(refs[1].id, seats[0].id);

        let err = catalog
            .resolve_labels(
                setup.session_id,
                &[SeatLabel::from("A-1"), SeatLabel::from("Z-9"), SeatLabel::from("A-4")],
            )
            .unwrap_err();
        assert_eq!(
            err,
            BoxOfficeError::UnknownSeats {
                labels: vec![SeatLabel::from("Z-9"), SeatLabel::from("A-4")]
            }
        );
    }

    #[test]
    fn resolve_map_merges_status() {
        let (catalog, setup, seats) = registered();
        let order = crate::types::OrderId::new();
        let mut snapshot: HashMap<_, _> = seats.iter().map(|s| (s.id, SeatState::Available)).collect();
        snapshot.insert(seats[0].id, SeatState::Reserved(order));
        snapshot.insert(seats[5].id, SeatState::Sold(order));
        snapshot.remove(&seats[6].id);

        let map = catalog.resolve_map(setup.session_id, &snapshot).unwrap();

        assert_eq!(map.sectors.len(), 2);
        assert_eq!(map.sectors[1].price, Money::from_cents(2500));
        assert_eq!(map.sectors[0].rows[0].seats[0].status, SeatStatus::Reserved);
        assert_eq!(map.sectors[1].rows[0].seats[0].status, SeatStatus::Sold);
        // missing from the snapshot
        assert_eq!(map.sectors[1].rows[0].seats[1].status, SeatStatus::Reserved);
        assert_eq!(
            map.totals,
            SeatTotals {
                available: 4,
                reserved: 2,
                sold: 1
            }
        );
    }

    #[test]
    fn unknown_session_is_not_found() {
        let catalog = SeatCatalog::new(150);
        let err = catalog
            .resolve_map(EventSessionId::new(), &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, BoxOfficeError::NotFound { entity: "session", .. }));
    }
}
