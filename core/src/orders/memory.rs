//! In-process order store.

use super::{CasOutcome, Order, OrderStatus, OrderStore, OrderUpdate};
use crate::error::{BoxOfficeError, Result};
use crate::types::{EventSessionId, ExternalTransactionRef, OrderId, Timestamp};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    orders: HashMap<OrderId, Order>,
    by_payment_ref: HashMap<ExternalTransactionRef, OrderId>,
}

/// Order store holding every order in memory behind one lock.
#[derive(Debug, Default)]
pub struct InMemoryOrderStore {
    tables: RwLock<Tables>,
}

impl InMemoryOrderStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn filtered(&self, predicate: impl Fn(&Order) -> bool + Send) -> Vec<Order> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| predicate(order))
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.created_at);
        orders
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.orders.contains_key(&order.id) {
            return Err(BoxOfficeError::Validation(format!("order {} already exists", order.id)));
        }
        if let Some(reference) = &order.payment_ref {
            tables.by_payment_ref.insert(reference.clone(), order.id);
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn find_by_payment_ref(&self, reference: &ExternalTransactionRef) -> Result<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_payment_ref
            .get(reference)
            .and_then(|id| tables.orders.get(id))
            .cloned())
    }

    async fn compare_and_set(
        &self,
        order_id: OrderId,
        expected: &[OrderStatus],
        update: OrderUpdate,
    ) -> Result<CasOutcome> {
        let mut guard = self.tables.write().await;
        let tables = &mut *guard;

        if let Some(reference) = &update.payment_ref {
            if tables.by_payment_ref.get(reference).is_some_and(|owner| *owner != order_id) {
                return Err(BoxOfficeError::Validation(format!(
                    "payment reference {reference} belongs to another order"
                )));
            }
        }

        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| BoxOfficeError::not_found("order", order_id))?;

        if !expected.contains(&order.status) {
            return Ok(CasOutcome::Rejected(order.clone()));
        }

        let mut next = order.clone();
        if !next.apply(&update)? {
            return Ok(CasOutcome::Rejected(order.clone()));
        }
        *order = next.clone();

        if let Some(reference) = &update.payment_ref {
            tables.by_payment_ref.insert(reference.clone(), order_id);
        }
        Ok(CasOutcome::Applied(next))
    }

    async fn due_for_expiry(&self, now: Timestamp) -> Result<Vec<Order>> {
        Ok(self
            .filtered(|order| order.status.is_active() && order.hold_elapsed(now))
            .await)
    }

    async fn in_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
        Ok(self.filtered(|order| statuses.contains(&order.status)).await)
    }

    async fn list_for_session(&self, session_id: EventSessionId) -> Result<Vec<Order>> {
        Ok(self.filtered(|order| order.session_id == session_id).await)
    }
}
