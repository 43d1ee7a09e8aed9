use async_trait::async_trait;
use common::{CustomerId, OrderId};
use sqlx::{PgPool, Row, postgres::PgRow, types::Json};
use uuid::Uuid;

use crate::error::{OrderError, Result};
use crate::order::{Order, OrderItem, OrderPatch, StatusChange};
use crate::status::OrderStatus;
use crate::store::OrderStore;

const ORDER_COLUMNS: &str = "id, customer_id, status, items, payment_link, created_at";

/// PostgreSQL-backed order store. Order lines are kept as a JSONB array.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let items: Json<Vec<OrderItem>> = row.try_get("items")?;
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::new(row.try_get::<String, _>("customer_id")?),
            status: OrderStatus::parse(&status)
                .ok_or_else(|| OrderError::InvalidData(format!("order status '{status}'")))?,
            items: items.0,
            payment_link: row.try_get("payment_link")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, items, payment_link, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_str())
        .bind(order.status.as_str())
        .bind(Json(&order.items))
        .bind(order.payment_link.as_deref())
        .bind(order.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Order> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => Err(OrderError::NotFound(id)),
        }
    }

    #[tracing::instrument(skip(self, patch), fields(order_id = %id))]
    async fn update(&self, id: OrderId, patch: &OrderPatch) -> Result<StatusChange> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let mut order = match row {
            Some(row) => Self::row_to_order(row)?,
            None => return Err(OrderError::NotFound(id)),
        };

        let previous = order.status;
        order.apply(patch)?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_link = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_link.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(StatusChange { previous, order })
    }

    async fn get_by_status(&self, status: OrderStatus) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = $1 ORDER BY created_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}
