use async_trait::async_trait;
use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::models::booking::{Booking, NewBookingParams};
use crate::domain::models::slot::Slot;
use crate::domain::models::user::User;
use crate::domain::ports::{BookingOutcome, BookingRepository, CreateBookingParams};
use crate::domain::services::policy::{self, BookingLimits};
use crate::error::{map_tx_error, AppError};

pub struct PostgresBookingRepo {
    pool: PgPool,
}

impl PostgresBookingRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

async fn insert_booking(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    booking: &Booking,
) -> Result<Booking, AppError> {
    sqlx::query_as::<_, Booking>(
        "INSERT INTO bookings (id, user_id, slot_id, venue_id, confirmation_code, status, guest_count, notes, booking_date, confirmed_at, total_price, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) RETURNING *",
    )
    .bind(booking.id)
    .bind(booking.user_id)
    .bind(booking.slot_id)
    .bind(booking.venue_id)
    .bind(&booking.confirmation_code)
    .bind(booking.status.as_str())
    .bind(booking.guest_count)
    .bind(&booking.notes)
    .bind(booking.booking_date)
    .bind(booking.confirmed_at)
    .bind(booking.total_price)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .fetch_one(&mut **tx)
    .await
    .map_err(map_tx_error)
}

async fn persist_slot_state(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    slot: &Slot,
) -> Result<(), AppError> {
    sqlx::query(
        "UPDATE slots SET remaining_capacity = $1, status = $2, updated_at = $3 WHERE id = $4",
    )
    .bind(slot.remaining_capacity)
    .bind(slot.status.as_str())
    .bind(slot.updated_at)
    .bind(slot.id)
    .execute(&mut **tx)
    .await
    .map_err(map_tx_error)?;
    Ok(())
}

#[async_trait]
impl BookingRepository for PostgresBookingRepo {
    async fn create_confirmed(
        &self,
        params: &CreateBookingParams,
        limits: &BookingLimits,
    ) -> Result<BookingOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(map_tx_error)?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_tx_error)?;

        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(params.user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_tx_error)?;
        match user {
            Some(user) if user.is_active => {}
            _ => return Err(AppError::UserNotFound),
        }

        let confirmed_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE user_id = $1 AND status = 'CONFIRMED'",
        )
        .bind(params.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_tx_error)?;
        if confirmed_count >= limits.max_concurrent_bookings_per_user {
            return Err(AppError::MaxBookingsReached);
        }

        let slot = sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = $1 FOR UPDATE")
            .bind(params.slot_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_tx_error)?;
        let mut slot = match slot {
            Some(slot) if slot.venue_id == params.venue_id => slot,
            _ => return Err(AppError::SlotNotFound),
        };

        let now = Utc::now();
        policy::validate_slot_for_booking(
            &slot,
            params.guest_count,
            now,
            limits.max_booking_advance_days,
        )?;

        let duplicates: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookings WHERE user_id = $1 AND slot_id = $2 AND status = 'CONFIRMED'",
        )
        .bind(params.user_id)
        .bind(params.slot_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_tx_error)?;
        if duplicates > 0 {
            return Err(AppError::DuplicateBooking);
        }

        let booking = Booking::confirmed(
            NewBookingParams {
                user_id: params.user_id,
                guest_count: params.guest_count,
                notes: params.notes.clone(),
            },
            &slot,
            now,
        );
        let booking = insert_booking(&mut tx, &booking).await?;

        slot.debit(params.guest_count, now);
        persist_slot_state(&mut tx, &slot).await?;

        tx.commit().await.map_err(map_tx_error)?;

        Ok(BookingOutcome { booking, slot })
    }

    async fn cancel(
        &self,
        booking_id: Uuid,
        reason: Option<&str>,
    ) -> Result<BookingOutcome, AppError> {
        let mut tx = self.pool.begin().await.map_err(map_tx_error)?;

        let booking =
            sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1 FOR UPDATE")
                .bind(booking_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_tx_error)?;
        let mut booking = booking.ok_or(AppError::BookingNotFound)?;

        // Re-guard under the row lock; the window check already happened.
        if booking.status.is_terminal() {
            return Err(AppError::CancellationNotAllowed);
        }

        let slot = sqlx::query_as::<_, Slot>("SELECT * FROM slots WHERE id = $1 FOR UPDATE")
            .bind(booking.slot_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_tx_error)?;
        let mut slot = slot.ok_or_else(|| {
            AppError::Internal(format!(
                "booking {} references missing slot {}",
                booking.id, booking.slot_id
            ))
        })?;

        let now = Utc::now();
        booking.cancel(reason, now);

        sqlx::query(
            "UPDATE bookings SET status = $1, cancelled_at = $2, cancellation_reason = $3, updated_at = $4 WHERE id = $5",
        )
        .bind(booking.status.as_str())
        .bind(booking.cancelled_at)
        .bind(&booking.cancellation_reason)
        .bind(booking.updated_at)
        .bind(booking.id)
        .execute(&mut *tx)
        .await
        .map_err(map_tx_error)?;

        slot.credit(booking.guest_count, now);
        persist_slot_state(&mut tx, &slot).await?;

        tx.commit().await.map_err(map_tx_error)?;

        Ok(BookingOutcome { booking, slot })
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, AppError> {
        sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Booking>, AppError> {
        sqlx::query_as::<_, Booking>(
            "SELECT * FROM bookings WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(AppError::Database)
    }
}
