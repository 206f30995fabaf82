//! `PostgreSQL` order store.

use crate::convert::{cents_from_db, cents_to_db, db_error, index_to_db};
use async_trait::async_trait;
use boxoffice_core::error::{BoxOfficeError, Result};
use boxoffice_core::orders::{CasOutcome, ItemsUpdate, Order, OrderItem, OrderStatus, OrderStore, OrderUpdate};
use boxoffice_core::types::{
    EventSessionId, ExternalTransactionRef, OrderId, SeatId, SeatLabel, Timestamp, UserId,
};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::collections::HashMap;
use uuid::Uuid;

const ORDER_COLUMNS: &str =
    "id, session_id, user_id, status, total_cents, hold_expires_at, payment_ref, created_at, updated_at";

/// Order store backed by the `orders` and `order_items` tables.
///
/// [`OrderStore::compare_and_set`] locks the order row with
/// `SELECT ... FOR UPDATE`, so concurrent transitions on one order serialize
/// and exactly one of them observes the expected status.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
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

    /// Runs an order query on a pooled connection and attaches the items.
    async fn fetch_orders(&self, query: OrderQuery<'_>) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await.map_err(db_error("Failed to acquire connection"))?;
        let rows = query
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error("Failed to load orders"))?;
        with_items(&mut *conn, &rows).await
    }
}

type OrderQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

fn status_names(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(|status| status.as_str().to_owned()).collect()
}

/// Builds orders from `rows`, loading every item list in one query.
async fn with_items(conn: &mut PgConnection, rows: &[PgRow]) -> Result<Vec<Order>> {
    let ids = rows
        .iter()
        .map(|row| row.try_get::<Uuid, _>("id"))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(db_error("Failed to read order id"))?;

    let item_rows = sqlx::query(
        r"
        SELECT order_id, seat_id, label, price_cents
        FROM order_items
        WHERE order_id = ANY($1)
        ORDER BY order_id, position
        ",
    )
    .bind(&ids)
    .fetch_all(conn)
    .await
    .map_err(db_error("Failed to load order items"))?;

    let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in &item_rows {
        let order_id: Uuid = row.try_get("order_id").map_err(db_error("Failed to read item order"))?;
        items.entry(order_id).or_default().push(item_row(row)?);
    }

    rows.iter()
        .map(|row| -> Result<Order> {
            let id: Uuid = row.try_get("id").map_err(db_error("Failed to read order id"))?;
            order_row(row, items.remove(&id).unwrap_or_default())
        })
        .collect()
}

fn item_row(row: &PgRow) -> Result<OrderItem> {
    Ok(OrderItem {
        seat_id: SeatId::from_uuid(row.try_get("seat_id").map_err(db_error("Failed to read item seat"))?),
        label: SeatLabel::new(
            row.try_get::<String, _>("label")
                .map_err(db_error("Failed to read item label"))?,
        ),
        price_at_sale: cents_from_db(row.try_get("price_cents").map_err(db_error("Failed to read item price"))?)?,
    })
}

fn order_row(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let status: String = row.try_get("status").map_err(db_error("Failed to read order status"))?;
    let payment_ref: Option<String> = row
        .try_get("payment_ref")
        .map_err(db_error("Failed to read payment reference"))?;
    let created_at: Timestamp = row.try_get("created_at").map_err(db_error("Failed to read order"))?;
    let updated_at: Timestamp = row.try_get("updated_at").map_err(db_error("Failed to read order"))?;
    let hold_expires_at: Timestamp = row
        .try_get("hold_expires_at")
        .map_err(db_error("Failed to read hold deadline"))?;

    Ok(Order {
        id: OrderId::from_uuid(row.try_get("id").map_err(db_error("Failed to read order id"))?),
        session_id: EventSessionId::from_uuid(
            row.try_get("session_id").map_err(db_error("Failed to read order session"))?,
        ),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(db_error("Failed to read order owner"))?),
        status: status.parse()?,
        items,
        total: cents_from_db(row.try_get("total_cents").map_err(db_error("Failed to read order total"))?)?,
        created_at,
        updated_at,
        hold_expires_at,
        payment_ref: payment_ref.map(ExternalTransactionRef::new),
    })
}

async fn insert_items(conn: &mut PgConnection, order_id: OrderId, items: &[OrderItem]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    let mut seat_ids = Vec::with_capacity(items.len());
    let mut labels = Vec::with_capacity(items.len());
    let mut prices = Vec::with_capacity(items.len());
    let mut positions = Vec::with_capacity(items.len());
    for (position, item) in items.iter().enumerate() {
        seat_ids.push(*item.seat_id.as_uuid());
        labels.push(item.label.as_str().to_owned());
        prices.push(cents_to_db(item.price_at_sale)?);
        positions.push(index_to_db(position)?);
    }

    sqlx::query(
        r"
        INSERT INTO order_items (order_id, seat_id, label, price_cents, position)
        SELECT $1, item.seat_id, item.label, item.price_cents, item.position
        FROM UNNEST($2::uuid[], $3::text[], $4::int8[], $5::int4[])
            AS item(seat_id, label, price_cents, position)
        ",
    )
    .bind(order_id.as_uuid())
    .bind(seat_ids)
    .bind(labels)
    .bind(prices)
    .bind(positions)
    .execute(conn)
    .await
    .map_err(db_error("Failed to insert order items"))?;
    Ok(())
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error("Failed to start transaction"))?;

        let inserted = sqlx::query(
            r"
            INSERT INTO orders (
                id, session_id, user_id, status, total_cents,
                hold_expires_at, payment_ref, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            ",
        )
        .bind(order.id.as_uuid())
        .bind(order.session_id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.status.as_str())
        .bind(cents_to_db(order.total)?)
        .bind(order.hold_expires_at)
        .bind(order.payment_ref.as_ref().map(ExternalTransactionRef::as_str))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to insert order"))?;

        if inserted.rows_affected() == 0 {
            let _ = tx.rollback().await;
            return Err(BoxOfficeError::Validation(format!("order {} already exists", order.id)));
        }

        insert_items(&mut *tx, order.id, &order.items).await?;
        tx.commit().await.map_err(db_error("Failed to commit order"))?;
        Ok(())
    }

    async fn get(&self, order_id: OrderId) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let orders = self.fetch_orders(sqlx::query(&sql).bind(*order_id.as_uuid())).await?;
        Ok(orders.into_iter().next())
    }

    async fn find_by_payment_ref(&self, reference: &ExternalTransactionRef) -> Result<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_ref = $1");
        let orders = self
            .fetch_orders(sqlx::query(&sql).bind(reference.as_str().to_owned()))
            .await?;
        Ok(orders.into_iter().next())
    }

    async fn compare_and_set(
        &self,
        order_id: OrderId,
        expected: &[OrderStatus],
        update: OrderUpdate,
    ) -> Result<CasOutcome> {
        let mut tx = self.pool.begin().await.map_err(db_error("Failed to start transaction"))?;

        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
            .bind(order_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("Failed to lock order"))?;
        let Some(row) = row else {
            let _ = tx.rollback().await;
            return Err(BoxOfficeError::not_found("order", order_id));
        };
        let current = with_items(&mut *tx, std::slice::from_ref(&row))
            .await?
            .pop()
            .ok_or_else(|| BoxOfficeError::not_found("order", order_id))?;

        if let Some(reference) = &update.payment_ref {
            let owner = sqlx::query("SELECT id FROM orders WHERE payment_ref = $1 AND id <> $2")
                .bind(reference.as_str())
                .bind(order_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_error("Failed to check payment reference"))?;
            if owner.is_some() {
                let _ = tx.rollback().await;
                return Err(BoxOfficeError::Validation(format!(
                    "payment reference {reference} belongs to another order"
                )));
            }
        }

        let mut next = current.clone();
        if !expected.contains(&current.status) || !next.apply(&update)? {
            let _ = tx.rollback().await;
            metrics::counter!("boxoffice_order_cas_total", "outcome" => "rejected").increment(1);
            return Ok(CasOutcome::Rejected(current));
        }

        sqlx::query(
            r"
            UPDATE orders
            SET status = $2, total_cents = $3, payment_ref = $4, updated_at = $5
            WHERE id = $1
            ",
        )
        .bind(order_id.as_uuid())
        .bind(next.status.as_str())
        .bind(cents_to_db(next.total)?)
        .bind(next.payment_ref.as_ref().map(ExternalTransactionRef::as_str))
        .bind(next.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(db_error("Failed to update order"))?;

        if update.items != ItemsUpdate::Keep {
            sqlx::query("DELETE FROM order_items WHERE order_id = $1")
                .bind(order_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(db_error("Failed to clear order items"))?;
            insert_items(&mut *tx, order_id, &next.items).await?;
        }

        tx.commit().await.map_err(db_error("Failed to commit order update"))?;
        metrics::counter!("boxoffice_order_cas_total", "outcome" => "applied").increment(1);
        Ok(CasOutcome::Applied(next))
    }

    async fn due_for_expiry(&self, now: Timestamp) -> Result<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = ANY($1) AND hold_expires_at < $2 ORDER BY created_at"
        );
        self.fetch_orders(sqlx::query(&sql).bind(status_names(&OrderStatus::ACTIVE)).bind(now))
            .await
    }

    async fn in_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE status = ANY($1) ORDER BY created_at");
        self.fetch_orders(sqlx::query(&sql).bind(status_names(statuses))).await
    }

    async fn list_for_session(&self, session_id: EventSessionId) -> Result<Vec<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE session_id = $1 ORDER BY created_at");
        self.fetch_orders(sqlx::query(&sql).bind(*session_id.as_uuid())).await
    }
}
