use chrono::{NaiveDate, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::background::{EnqueueOptions, JobQueue, BOOKING_CANCELLED, BOOKING_CONFIRMED};
use crate::bus::{BookingUpdate, EventBus, SlotUpdate};
use crate::domain::models::booking::Booking;
use crate::domain::models::slot::{Slot, SlotSnapshot};
use crate::domain::models::user::Identity;
use crate::domain::ports::{
    AvailabilityCache, BookingOutcome, BookingRepository, CreateBookingParams, LockManager,
    SlotRepository,
};
use crate::domain::services::policy::{self, BookingLimits};
use crate::error::AppError;

pub struct CreateBookingInput {
    pub user_id: Uuid,
    pub slot_id: Uuid,
    pub venue_id: Uuid,
    pub guest_count: i32,
    pub notes: Option<String>,
}

pub struct CancelBookingInput {
    pub booking_id: Uuid,
    pub caller: Identity,
    pub reason: Option<String>,
}

/// The transactional state-transition engine.
///
/// Serialization happens in two layers: the distributed slot lock gives
/// contending requests an immediate `SLOT_LOCKED` instead of queueing, and
/// the storage transaction stays authoritative even if a lease is lost to
/// TTL expiry. Post-commit side effects (cache invalidation, job enqueue,
/// event publish) are logged but never fail the caller — the booking is
/// durable once committed.
pub struct BookingCoordinator {
    bookings: Arc<dyn BookingRepository>,
    slots: Arc<dyn SlotRepository>,
    locks: Arc<dyn LockManager>,
    cache: Arc<dyn AvailabilityCache>,
    queue: Arc<JobQueue>,
    bus: Arc<EventBus>,
    limits: BookingLimits,
    lock_ttl: Duration,
    cache_ttl: Duration,
}

impl BookingCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        slots: Arc<dyn SlotRepository>,
        locks: Arc<dyn LockManager>,
        cache: Arc<dyn AvailabilityCache>,
        queue: Arc<JobQueue>,
        bus: Arc<EventBus>,
        limits: BookingLimits,
        lock_ttl: Duration,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            bookings,
            slots,
            locks,
            cache,
            queue,
            bus,
            limits,
            lock_ttl,
            cache_ttl,
        }
    }

    pub async fn create_booking(&self, input: CreateBookingInput) -> Result<Booking, AppError> {
        if input.guest_count < 1 {
            return Err(AppError::Validation(
                "guest_count must be at least 1".to_string(),
            ));
        }

        let key = slot_lock_key(input.slot_id);
        let Some(lease) = self.locks.acquire(&key, self.lock_ttl).await else {
            return Err(AppError::SlotLocked);
        };

        let result = self.create_within_lease(&input).await;

        if let Ok(outcome) = &result {
            self.after_create_commit(outcome).await;
        }

        if !self.locks.release(&key, &lease).await {
            // The lease lapsed mid-flight; the storage transaction was the
            // authority, so the outcome stands.
            warn!(slot_id = %input.slot_id, "slot lease was lost before release");
        }

        let outcome = result?;
        info!(
            booking_id = %outcome.booking.id,
            slot_id = %outcome.slot.id,
            confirmation_code = %outcome.booking.confirmation_code,
            "booking confirmed"
        );
        Ok(outcome.booking)
    }

    async fn create_within_lease(
        &self,
        input: &CreateBookingInput,
    ) -> Result<BookingOutcome, AppError> {
        let params = CreateBookingParams {
            user_id: input.user_id,
            slot_id: input.slot_id,
            venue_id: input.venue_id,
            guest_count: input.guest_count,
            notes: input.notes.clone(),
        };

        match self.bookings.create_confirmed(&params, &self.limits).await {
            Err(AppError::Serialization) => {
                debug!(slot_id = %input.slot_id, "serialization conflict, retrying once");
                match self.bookings.create_confirmed(&params, &self.limits).await {
                    Err(AppError::Serialization) => Err(AppError::SlotLocked),
                    other => other,
                }
            }
            other => other,
        }
    }

    async fn after_create_commit(&self, outcome: &BookingOutcome) {
        let booking = &outcome.booking;
        let slot = &outcome.slot;

        self.cache.invalidate(slot.venue_id, slot.date).await;

        let enqueued = self
            .queue
            .enqueue(
                BOOKING_CONFIRMED,
                json!({
                    "bookingId": booking.id,
                    "userId": booking.user_id,
                    "confirmationCode": booking.confirmation_code,
                }),
                EnqueueOptions::default(),
            )
            .await;
        if let Err(e) = enqueued {
            warn!(booking_id = %booking.id, error = %e, "failed to enqueue confirmation job");
        }

        self.bus.publish_slot(SlotUpdate::from(slot)).await;
        self.bus.publish_booking(BookingUpdate::from(booking)).await;
    }

    pub async fn cancel_booking(&self, input: CancelBookingInput) -> Result<Booking, AppError> {
        let booking = self
            .bookings
            .find_by_id(input.booking_id)
            .await?
            .ok_or(AppError::BookingNotFound)?;

        if booking.user_id != input.caller.user_id && !input.caller.is_admin() {
            return Err(AppError::Unauthorized);
        }

        let slot = self
            .slots
            .find_by_id(booking.slot_id)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "booking {} references missing slot {}",
                    booking.id, booking.slot_id
                ))
            })?;

        policy::check_cancellable(
            booking.status,
            slot.start_time,
            Utc::now(),
            self.limits.cancellation_window_hours,
        )?;

        let outcome = self
            .bookings
            .cancel(booking.id, input.reason.as_deref())
            .await?;

        self.after_cancel_commit(&outcome).await;

        info!(
            booking_id = %outcome.booking.id,
            slot_id = %outcome.slot.id,
            "booking cancelled"
        );
        Ok(outcome.booking)
    }

    async fn after_cancel_commit(&self, outcome: &BookingOutcome) {
        let booking = &outcome.booking;
        let slot = &outcome.slot;

        self.cache.invalidate(slot.venue_id, slot.date).await;

        let enqueued = self
            .queue
            .enqueue(
                BOOKING_CANCELLED,
                json!({
                    "bookingId": booking.id,
                    "userId": booking.user_id,
                    "confirmationCode": booking.confirmation_code,
                }),
                EnqueueOptions::default(),
            )
            .await;
        if let Err(e) = enqueued {
            warn!(booking_id = %booking.id, error = %e, "failed to enqueue cancellation job");
        }

        self.bus.publish_slot(SlotUpdate::from(slot)).await;
        self.bus.publish_booking(BookingUpdate::from(booking)).await;
    }

    pub async fn block_slot(
        &self,
        slot_id: Uuid,
        caller: Identity,
        reason: Option<String>,
    ) -> Result<Slot, AppError> {
        if !caller.is_admin() {
            return Err(AppError::Unauthorized);
        }

        let slot = self
            .slots
            .block(slot_id, caller.user_id, reason.as_deref())
            .await?;

        self.cache.invalidate(slot.venue_id, slot.date).await;
        self.bus.publish_slot(SlotUpdate::from(&slot)).await;

        info!(slot_id = %slot.id, "slot blocked");
        Ok(slot)
    }

    pub async fn unblock_slot(&self, slot_id: Uuid, caller: Identity) -> Result<Slot, AppError> {
        if !caller.is_admin() {
            return Err(AppError::Unauthorized);
        }

        let slot = self.slots.unblock(slot_id).await?;

        self.cache.invalidate(slot.venue_id, slot.date).await;
        self.bus.publish_slot(SlotUpdate::from(&slot)).await;

        info!(slot_id = %slot.id, "slot unblocked");
        Ok(slot)
    }

    /// Read-through availability: cache hit wins, misses fall through to
    /// storage and refill the cache for `cache_ttl`.
    pub async fn get_available_slots(
        &self,
        venue_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<SlotSnapshot>, AppError> {
        if let Some(snapshots) = self.cache.get(venue_id, date).await {
            return Ok(snapshots);
        }

        let slots = self
            .slots
            .list_available(venue_id, date, Utc::now())
            .await?;
        let snapshots: Vec<SlotSnapshot> = slots.iter().map(SlotSnapshot::from).collect();

        self.cache
            .put(venue_id, date, &snapshots, self.cache_ttl)
            .await;
        Ok(snapshots)
    }

    /// Fetches one booking, visible to its owner and to admins.
    pub async fn get_booking(
        &self,
        booking_id: Uuid,
        caller: Identity,
    ) -> Result<Booking, AppError> {
        let booking = self
            .bookings
            .find_by_id(booking_id)
            .await?
            .ok_or(AppError::BookingNotFound)?;

        if booking.user_id != caller.user_id && !caller.is_admin() {
            return Err(AppError::Unauthorized);
        }
        Ok(booking)
    }

    pub async fn list_user_bookings(&self, user_id: Uuid) -> Result<Vec<Booking>, AppError> {
        self.bookings.list_by_user(user_id).await
    }
}

pub fn slot_lock_key(slot_id: Uuid) -> String {
    format!("booking:slot:{}", slot_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_namespaced_by_slot() {
        let id = Uuid::new_v4();
        assert_eq!(slot_lock_key(id), format!("booking:slot:{}", id));
    }
}
