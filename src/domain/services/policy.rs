use chrono::{DateTime, Duration, Utc};

use crate::domain::models::booking::BookingStatus;
use crate::domain::models::slot::{Slot, SlotStatus};
use crate::error::AppError;

/// Tunable booking limits, sourced from `Config`.
#[derive(Debug, Clone, Copy)]
pub struct BookingLimits {
    pub max_concurrent_bookings_per_user: i64,
    pub max_booking_advance_days: i64,
    pub cancellation_window_hours: i64,
}

impl Default for BookingLimits {
    fn default() -> Self {
        Self {
            max_concurrent_bookings_per_user: 5,
            max_booking_advance_days: 90,
            cancellation_window_hours: 24,
        }
    }
}

/// The booking precondition gauntlet, evaluated under the slot row lock.
/// Checks run in a fixed order and the first failure wins; the duplicate
/// check requires a query and happens after this in the same transaction.
pub fn validate_slot_for_booking(
    slot: &Slot,
    guest_count: i32,
    now: DateTime<Utc>,
    max_advance_days: i64,
) -> Result<(), AppError> {
    if slot.status == SlotStatus::Blocked {
        return Err(AppError::SlotBlocked);
    }
    if slot.remaining_capacity < guest_count {
        return Err(AppError::InsufficientCapacity);
    }
    if slot.end_time <= now {
        return Err(AppError::SlotInPast);
    }
    if slot.start_time > now + Duration::days(max_advance_days) {
        return Err(AppError::AdvanceLimitExceeded);
    }
    Ok(())
}

/// Cancellation gate: the booking must be non-terminal and the slot must not
/// start within the cancellation window.
pub fn check_cancellable(
    status: BookingStatus,
    slot_start: DateTime<Utc>,
    now: DateTime<Utc>,
    window_hours: i64,
) -> Result<(), AppError> {
    if status.is_terminal() {
        return Err(AppError::CancellationNotAllowed);
    }
    if now + Duration::hours(window_hours) >= slot_start {
        return Err(AppError::CancellationNotAllowed);
    }
    Ok(())
}

/// Backoff for a failed job attempt: 2s base, doubling per attempt.
pub fn retry_backoff(attempt: i32) -> Duration {
    let exponent = attempt.saturating_sub(1).clamp(0, 16) as u32;
    Duration::seconds(2i64 << exponent)
}
