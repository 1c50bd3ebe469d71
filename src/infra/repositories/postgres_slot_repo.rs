use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::models::slot::Slot;
use crate::domain::ports::SlotRepository;
use crate::error::{map_tx_error, AppError};

pub struct PostgresSlotRepo {
    pool: PgPool,
}

impl PostgresSlotRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SlotRepository for PostgresSlotRepo {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Slot>, AppError> {
        sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_available(
        &self,
        venue_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, AppError> {
        sqlx::query_as::<_, Slot>(
            "SELECT * FROM slots WHERE venue_id = $1 AND date = $2 AND status = 'AVAILABLE' \
             AND remaining_capacity > 0 AND start_time > $3 ORDER BY start_time ASC",
        )
        .bind(venue_id)
        .bind(date)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)
    }

    async fn block(
        &self,
        slot_id: Uuid,
        blocked_by: Uuid,
        reason: Option<&str>,
    ) -> Result<Slot, AppError> {
        let mut tx = self.pool.begin().await.map_err(map_tx_error)?;

        let slot = sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = $1 FOR UPDATE")
            .bind(slot_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_tx_error)?;
        let mut slot = slot.ok_or(AppError::SlotNotFound)?;

        if !slot.block(blocked_by, reason, Utc::now()) {
            // Already blocked; nothing to write.
            tx.commit().await.map_err(map_tx_error)?;
            return Ok(slot);
        }

        sqlx::query("UPDATE slots SET status = $1, metadata = $2, updated_at = $3 WHERE id = $4")
            .bind(slot.status.as_str())
            .bind(&slot.metadata)
            .bind(slot.updated_at)
            .bind(slot.id)
            .execute(&mut *tx)
            .await
            .map_err(map_tx_error)?;

        tx.commit().await.map_err(map_tx_error)?;
        Ok(slot)
    }

    async fn unblock(&self, slot_id: Uuid) -> Result<Slot, AppError> {
        let mut tx = self.pool.begin().await.map_err(map_tx_error)?;

        let slot = sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = $1 FOR UPDATE")
            .bind(slot_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_tx_error)?;
        let mut slot = slot.ok_or(AppError::SlotNotFound)?;

        slot.unblock(Utc::now());

        sqlx::query("UPDATE slots SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(slot.status.as_str())
            .bind(slot.updated_at)
            .bind(slot.id)
            .execute(&mut *tx)
            .await
            .map_err(map_tx_error)?;

        tx.commit().await.map_err(map_tx_error)?;
        Ok(slot)
    }

    async fn reclaim_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Slot>, AppError> {
        // Remaining capacity is recomputed from confirmed bookings, so the
        // conservation invariant holds no matter how much the hold reserved.
        sqlx::query_as::<_, Slot>(
            "UPDATE slots SET status = 'AVAILABLE', held_until = NULL, updated_at = $2, \
             remaining_capacity = capacity - COALESCE((SELECT SUM(b.guest_count)::int FROM bookings b \
             WHERE b.slot_id = slots.id AND b.status = 'CONFIRMED'), 0) \
             WHERE status = 'HELD' AND held_until IS NOT NULL AND held_until < $1 \
             RETURNING *",
        )
        .bind(now)
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)
    }
}
