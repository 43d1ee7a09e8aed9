use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ItemId, OrderId};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StockError};
use crate::item::{Item, ItemQuantity, Reservation, ReservationId, ReservationStatus};
use crate::store::{StockStore, in_request_order, validate_quantities};

/// PostgreSQL-backed stock store.
///
/// Each operation runs in one transaction, and each counter change is a single
/// `UPDATE ... WHERE <guard>` statement. Zero affected rows means the guard failed.
#[derive(Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
}

impl PostgresStockStore {
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

    fn row_to_item(row: PgRow) -> Result<Item> {
        Ok(Item {
            id: ItemId::new(row.try_get::<String, _>("id")?),
            name: row.try_get("name")?,
            price_id: row.try_get("price_id")?,
            quantity: row.try_get("quantity")?,
            reserved_quantity: row.try_get("reserved_quantity")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        let status: String = row.try_get("status")?;
        Ok(Reservation {
            reservation_id: ReservationId::from_uuid(row.try_get::<Uuid, _>("reservation_id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            item_id: ItemId::new(row.try_get::<String, _>("item_id")?),
            quantity: row.try_get("quantity")?,
            status: ReservationStatus::parse(&status)
                .ok_or_else(|| StockError::InvalidData(format!("reservation status '{status}'")))?,
            expires_at: row.try_get("expires_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn item_exists(tx: &mut Transaction<'_, Postgres>, id: &ItemId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM items WHERE id = $1)")
            .bind(id.as_str())
            .fetch_one(&mut **tx)
            .await?;
        Ok(exists)
    }

    /// Locks and returns the order's `reserved` rows as `(item_id, quantity)`.
    async fn active_rows(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
    ) -> Result<Vec<(String, i32)>> {
        let rows: Vec<(String, i32)> = sqlx::query_as(
            r#"
            SELECT item_id, quantity
            FROM reservations
            WHERE order_id = $1 AND status = 'reserved'
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut **tx)
        .await?;
        Ok(rows)
    }

    async fn mark_active_rows(
        tx: &mut Transaction<'_, Postgres>,
        order_id: OrderId,
        status: ReservationStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE reservations
            SET status = $2, updated_at = NOW()
            WHERE order_id = $1 AND status = 'reserved'
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(status.as_str())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn get_item(&self, id: &ItemId) -> Result<Item> {
        let row = sqlx::query(
            "SELECT id, name, price_id, quantity, reserved_quantity FROM items WHERE id = $1",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_item(row),
            None => Err(StockError::ItemNotFound(id.clone())),
        }
    }

    async fn get_items(&self, ids: &[ItemId]) -> Result<Vec<Item>> {
        if ids.is_empty() {
            let rows = sqlx::query(
                "SELECT id, name, price_id, quantity, reserved_quantity FROM items ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?;
            return rows.into_iter().map(Self::row_to_item).collect();
        }

        let keys: Vec<String> = ids.iter().map(|id| id.as_str().to_string()).collect();
        let rows = sqlx::query(
            "SELECT id, name, price_id, quantity, reserved_quantity FROM items WHERE id = ANY($1)",
        )
        .bind(&keys)
        .fetch_all(&self.pool)
        .await?;

        let found = rows
            .into_iter()
            .map(Self::row_to_item)
            .collect::<Result<Vec<_>>>()?;
        Ok(in_request_order(ids, found))
    }

    async fn get_available_quantity(&self, id: &ItemId) -> Result<i32> {
        let available: Option<i32> =
            sqlx::query_scalar("SELECT quantity - reserved_quantity FROM items WHERE id = $1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;
        available.ok_or_else(|| StockError::ItemNotFound(id.clone()))
    }

    async fn decrement_quantity(&self, id: &ItemId, amount: i32) -> Result<()> {
        validate_quantities(&[ItemQuantity::new(id.clone(), amount)])?;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE items
            SET quantity = quantity - $1, updated_at = NOW()
            WHERE id = $2 AND (quantity - reserved_quantity) >= $1
            "#,
        )
        .bind(amount)
        .bind(id.as_str())
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            if !Self::item_exists(&mut tx, id).await? {
                return Err(StockError::ItemNotFound(id.clone()));
            }
            return Err(StockError::InsufficientStock {
                item_id: id.clone(),
                requested: amount,
            });
        }

        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self, items), fields(order_id = %order_id, items = items.len()))]
    async fn reserve_stock(
        &self,
        order_id: OrderId,
        items: &[ItemQuantity],
        expires_at: DateTime<Utc>,
    ) -> Result<ReservationId> {
        validate_quantities(items)?;
        let reservation_id = ReservationId::new();
        let mut tx = self.pool.begin().await?;

        for item in items {
            let result = sqlx::query(
                r#"
                UPDATE items
                SET reserved_quantity = reserved_quantity + $1, updated_at = NOW()
                WHERE id = $2 AND (quantity - reserved_quantity) >= $1
                "#,
            )
            .bind(item.quantity)
            .bind(item.id.as_str())
            .execute(&mut *tx)
            .await?;

            // Returning drops the transaction, which rolls back earlier items.
            if result.rows_affected() == 0 {
                if !Self::item_exists(&mut tx, &item.id).await? {
                    return Err(StockError::ItemNotFound(item.id.clone()));
                }
                return Err(StockError::InsufficientStock {
                    item_id: item.id.clone(),
                    requested: item.quantity,
                });
            }

            sqlx::query(
                r#"
                INSERT INTO reservations (reservation_id, order_id, item_id, quantity, status, expires_at)
                VALUES ($1, $2, $3, $4, 'reserved', $5)
                "#,
            )
            .bind(reservation_id.as_uuid())
            .bind(order_id.as_uuid())
            .bind(item.id.as_str())
            .bind(item.quantity)
            .bind(expires_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(reservation_id)
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    async fn confirm_reservation(&self, order_id: OrderId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let rows = Self::active_rows(&mut tx, order_id).await?;
        if rows.is_empty() {
            return Err(StockError::NoActiveReservation(order_id));
        }

        for (item_id, quantity) in rows {
            let result = sqlx::query(
                r#"
                UPDATE items
                SET quantity = quantity - $1,
                    reserved_quantity = reserved_quantity - $1,
                    updated_at = NOW()
                WHERE id = $2 AND reserved_quantity >= $1 AND quantity >= $1
                "#,
            )
            .bind(quantity)
            .bind(&item_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StockError::ReservationMismatch {
                    order_id,
                    item_id: ItemId::new(item_id),
                });
            }
        }

        Self::mark_active_rows(&mut tx, order_id, ReservationStatus::Confirmed).await?;
        tx.commit().await?;
        Ok(())
    }

    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    async fn release_reservation(&self, order_id: OrderId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let rows = Self::active_rows(&mut tx, order_id).await?;
        if rows.is_empty() {
            return Ok(());
        }

        for (item_id, quantity) in rows {
            let result = sqlx::query(
                r#"
                UPDATE items
                SET reserved_quantity = reserved_quantity - $1, updated_at = NOW()
                WHERE id = $2 AND reserved_quantity >= $1
                "#,
            )
            .bind(quantity)
            .bind(&item_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(StockError::ReservationMismatch {
                    order_id,
                    item_id: ItemId::new(item_id),
                });
            }
        }

        Self::mark_active_rows(&mut tx, order_id, ReservationStatus::Released).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cleanup_expired_reservations(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let expired: Vec<(i64, String, i32)> = sqlx::query_as(
            r#"
            SELECT id, item_id, quantity
            FROM reservations
            WHERE status = 'reserved' AND expires_at < $1
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;

        if expired.is_empty() {
            return Ok(0);
        }

        for (_, item_id, quantity) in &expired {
            sqlx::query(
                r#"
                UPDATE items
                SET reserved_quantity = reserved_quantity - $1, updated_at = NOW()
                WHERE id = $2 AND reserved_quantity >= $1
                "#,
            )
            .bind(quantity)
            .bind(item_id)
            .execute(&mut *tx)
            .await?;
        }

        let ids: Vec<i64> = expired.iter().map(|(id, _, _)| *id).collect();
        let result = sqlx::query(
            "UPDATE reservations SET status = 'expired', updated_at = NOW() WHERE id = ANY($1)",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    async fn reservations_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT reservation_id, order_id, item_id, quantity, status, expires_at, created_at, updated_at
            FROM reservations
            WHERE order_id = $1
            ORDER BY id
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }
}
