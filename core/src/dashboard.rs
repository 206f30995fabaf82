//! Per-session admin summary.

use crate::catalog::{SeatCatalog, SeatTotals};
use crate::collaborators::ReconciliationSink;
use crate::error::{BoxOfficeError, Result};
use crate::orders::{OrderStatus, OrderStore};
use crate::seats::SeatStore;
use crate::types::{EventSessionId, Money};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Read-only sales summary of one session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDashboard {
    /// Session id
    pub session_id: EventSessionId,
    /// Event name
    pub event_name: String,
    /// Seats by status
    pub seats: SeatTotals,
    /// Orders by status name
    pub orders: BTreeMap<String, usize>,
    /// Sum of paid order totals
    pub revenue: Money,
    /// Seats in paid orders
    pub tickets_sold: usize,
    /// Payments of this session awaiting refund or follow-up
    pub open_reconciliations: usize,
}

/// Builds the dashboard from live seat and order state.
///
/// # Errors
///
/// [`BoxOfficeError::NotFound`] for an unknown session,
/// [`BoxOfficeError::Storage`] on store failure.
pub async fn session_dashboard(
    catalog: &SeatCatalog,
    seats: &dyn SeatStore,
    orders: &dyn OrderStore,
    reconciliation: &dyn ReconciliationSink,
    session_id: EventSessionId,
) -> Result<SessionDashboard> {
    let setup = catalog.setup(session_id)?;

    let mut seat_totals = SeatTotals::default();
    for state in seats.snapshot(session_id).await?.values() {
        seat_totals.add(state.status());
    }

    let session_orders = orders.list_for_session(session_id).await?;
    let mut by_status = BTreeMap::new();
    let mut revenue = Money::ZERO;
    let mut tickets_sold = 0;
    for order in &session_orders {
        *by_status.entry(order.status.as_str().to_owned()).or_insert(0) += 1;
        if order.status == OrderStatus::Paid {
            revenue = revenue
                .checked_add(order.total)
                .ok_or_else(|| BoxOfficeError::Validation("revenue overflows".into()))?;
            tickets_sold += order.items.len();
        }
    }

    let order_ids: HashSet<_> = session_orders.iter().map(|order| order.id).collect();
    let open_reconciliations = reconciliation
        .open_flags()
        .await?
        .iter()
        .filter(|flag| order_ids.contains(&flag.order_id))
        .count();

    Ok(SessionDashboard {
        session_id,
        event_name: setup.event_name,
        seats: seat_totals,
        orders: by_status,
        revenue,
        tickets_sold,
        open_reconciliations,
    })
}
