use crate::domain::models::{
    booking::Booking,
    job::Job,
    slot::{Slot, SlotSnapshot},
    user::User,
};
use crate::domain::services::policy::BookingLimits;
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::time::Duration;
use uuid::Uuid;

/// Process-external mutual exclusion with TTL-bounded leases.
///
/// `acquire` is a single atomic test-and-set; it never blocks waiting for a
/// holder. An unreachable backing store also yields `None` — refusing to
/// proceed is always safe, proceeding without the lease is not.
#[async_trait]
pub trait LockManager: Send + Sync {
    async fn acquire(&self, key: &str, ttl: Duration) -> Option<String>;

    /// Releases the lease iff the stored token still matches. A `false`
    /// return means the lease expired or was taken over; the caller must not
    /// assume any post-lease state is intact.
    async fn release(&self, key: &str, lease_token: &str) -> bool;
}

/// Short-TTL read-through cache of per-(venue, date) availability listings.
/// Cache failures degrade to misses / no-ops; they never fail the caller.
#[async_trait]
pub trait AvailabilityCache: Send + Sync {
    async fn get(&self, venue_id: Uuid, date: NaiveDate) -> Option<Vec<SlotSnapshot>>;
    async fn put(&self, venue_id: Uuid, date: NaiveDate, snapshots: &[SlotSnapshot], ttl: Duration);
    async fn invalidate(&self, venue_id: Uuid, date: NaiveDate);
}

pub struct CreateBookingParams {
    pub user_id: Uuid,
    pub slot_id: Uuid,
    pub venue_id: Uuid,
    pub guest_count: i32,
    pub notes: Option<String>,
}

/// Committed result of a booking mutation, carrying the post-commit slot
/// state for cache invalidation and event fan-out.
pub struct BookingOutcome {
    pub booking: Booking,
    pub slot: Slot,
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Runs the whole create-booking transaction: user check, per-user cap,
    /// slot row lock, precondition gauntlet, booking insert, capacity debit.
    /// Serialization conflicts surface as `AppError::Serialization`.
    async fn create_confirmed(
        &self,
        params: &CreateBookingParams,
        limits: &BookingLimits,
    ) -> Result<BookingOutcome, AppError>;

    /// Cancels a non-terminal booking and credits the slot in one
    /// transaction. The cancellation-window check happens before this call;
    /// the terminal-state guard is re-applied under the row lock.
    async fn cancel(
        &self,
        booking_id: Uuid,
        reason: Option<&str>,
    ) -> Result<BookingOutcome, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, AppError>;
    async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Booking>, AppError>;
}

#[async_trait]
pub trait SlotRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Slot>, AppError>;

    /// AVAILABLE slots with room that start after `now`, ordered by
    /// `start_time` ascending.
    async fn list_available(
        &self,
        venue_id: Uuid,
        date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Vec<Slot>, AppError>;

    async fn block(
        &self,
        slot_id: Uuid,
        blocked_by: Uuid,
        reason: Option<&str>,
    ) -> Result<Slot, AppError>;

    async fn unblock(&self, slot_id: Uuid) -> Result<Slot, AppError>;

    /// Reverts every HELD slot whose lease lapsed back to AVAILABLE,
    /// restoring capacity to `capacity − Σ confirmed guest counts`. Returns
    /// the reclaimed slots.
    async fn reclaim_expired_holds(&self, now: DateTime<Utc>) -> Result<Vec<Slot>, AppError>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;
}

#[derive(Debug, Clone, Copy, Default, sqlx::FromRow)]
pub struct QueueCounts {
    pub waiting: i64,
    pub delayed: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn enqueue(&self, job: &Job) -> Result<Job, AppError>;

    /// Claims up to `limit` due jobs of `name`, marking them PROCESSING and
    /// bumping `attempts`, so concurrent workers never double-claim.
    async fn claim_due(
        &self,
        name: &str,
        limit: i64,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, AppError>;

    async fn complete(&self, id: Uuid) -> Result<(), AppError>;
    async fn fail(&self, id: Uuid, error: &str) -> Result<(), AppError>;

    /// Reinjects a failed attempt at the tail: back to PENDING with a new
    /// `execute_at`.
    async fn retry(&self, id: Uuid, error: &str, execute_at: DateTime<Utc>)
        -> Result<(), AppError>;

    async fn counts(&self, now: DateTime<Utc>) -> Result<QueueCounts, AppError>;

    /// Deletes finished jobs beyond the newest `keep_completed` completed and
    /// `keep_failed` failed ones.
    async fn purge_finished(&self, keep_completed: i64, keep_failed: i64)
        -> Result<u64, AppError>;
}
