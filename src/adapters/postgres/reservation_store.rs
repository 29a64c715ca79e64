//! PostgreSQL implementation of ReservationStore.
//!
//! The candidate scan uses `FOR UPDATE SKIP LOCKED` so two overlapping
//! reconciler runs partition the work instead of queueing on each
//! other. `expire_order` re-checks candidacy under its own row lock, so
//! a buyer who paid between scan and expiry is never clobbered.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, OrderId};
use crate::ports::{ExpireOutcome, ReservationStore};

/// Order status while payment is still outstanding. Only orders in this
/// state hold reserved stock.
const AWAITING_PAYMENT: &str = "awaiting_payment";
const EXPIRED: &str = "expired";

/// PostgreSQL implementation of the ReservationStore port.
pub struct PostgresReservationStore {
    pool: PgPool,
}

impl PostgresReservationStore {
    /// Creates a new PostgresReservationStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_error(e: sqlx::Error) -> DomainError {
    DomainError::database(e.to_string())
}

#[async_trait]
impl ReservationStore for PostgresReservationStore {
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<OrderId>, DomainError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM orders
            WHERE status = $1
              AND reserved_until < $2
            ORDER BY reserved_until
            LIMIT $3
            "#,
        )
        .bind(AWAITING_PAYMENT)
        .bind(now)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(|(id,)| OrderId::from_uuid(id)).collect())
    }

    async fn expire_order(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<ExpireOutcome, DomainError> {
        let mut db = self.pool.begin().await.map_err(db_error)?;

        // Lock the order; SKIP LOCKED lets a concurrent run claim it
        // without us blocking on their commit.
        let row: Option<(String, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT status, reserved_until
            FROM orders
            WHERE id = $1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *db)
        .await
        .map_err(db_error)?;

        let (status, reserved_until) = match row {
            Some(row) => row,
            // Either the order vanished or another run holds its lock
            None => {
                let exists: Option<(Uuid,)> =
                    sqlx::query_as("SELECT id FROM orders WHERE id = $1")
                        .bind(order_id.as_uuid())
                        .fetch_optional(&mut *db)
                        .await
                        .map_err(db_error)?;
                return match exists {
                    Some(_) => Ok(ExpireOutcome::AlreadyHandled),
                    None => Err(DomainError::new(
                        ErrorCode::OrderNotFound,
                        format!("Order {} not found", order_id),
                    )),
                };
            }
        };

        // Re-check under the lock: payment may have landed since the scan
        if status != AWAITING_PAYMENT || reserved_until >= now {
            return Ok(ExpireOutcome::AlreadyHandled);
        }

        // Return every held unit to its listing
        let released = sqlx::query(
            r#"
            UPDATE listings AS l
            SET quantity_available = l.quantity_available + oi.quantity
            FROM order_items AS oi
            WHERE oi.order_id = $1
              AND oi.listing_id = l.id
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&mut *db)
        .await
        .map_err(db_error)?;

        let (quantity_released,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(quantity), 0)
            FROM order_items
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_one(&mut *db)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, updated_at = $3
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(EXPIRED)
        .bind(now)
        .execute(&mut *db)
        .await
        .map_err(db_error)?;

        db.commit().await.map_err(db_error)?;

        tracing::debug!(
            order_id = %order_id,
            listings_updated = released.rows_affected(),
            quantity_released,
            "order reservation expired"
        );
        Ok(ExpireOutcome::Released { quantity_released })
    }
}
