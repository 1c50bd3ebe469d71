use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::models::slot::Slot;
use crate::domain::models::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::NoShow => "NO_SHOW",
        }
    }

    /// Terminal states never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingStatus::Cancelled | BookingStatus::Completed | BookingStatus::NoShow
        )
    }

    /// The status DAG: PENDING→CONFIRMED→{COMPLETED, NO_SHOW}, any
    /// non-terminal state →CANCELLED.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        match (self, next) {
            (BookingStatus::Pending, BookingStatus::Confirmed) => true,
            (BookingStatus::Confirmed, BookingStatus::Completed) => true,
            (BookingStatus::Confirmed, BookingStatus::NoShow) => true,
            (from, BookingStatus::Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "NO_SHOW" => Ok(BookingStatus::NoShow),
            other => Err(ParseEnumError(format!("unknown booking status: {}", other))),
        }
    }
}

impl TryFrom<String> for BookingStatus {
    type Error = ParseEnumError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A user's claim on `guest_count` units of a slot's capacity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub slot_id: Uuid,
    pub venue_id: Uuid,
    pub confirmation_code: String,
    #[sqlx(try_from = "String")]
    pub status: BookingStatus,
    pub guest_count: i32,
    pub notes: Option<String>,
    pub booking_date: NaiveDate,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub total_price: Option<Decimal>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub struct NewBookingParams {
    pub user_id: Uuid,
    pub guest_count: i32,
    pub notes: Option<String>,
}

impl Booking {
    /// Mints a confirmed booking against `slot`, generating the id and
    /// confirmation code and pricing from the slot's unit price.
    pub fn confirmed(params: NewBookingParams, slot: &Slot, now: DateTime<Utc>) -> Self {
        let total_price = slot
            .price
            .map(|unit| unit * Decimal::from(params.guest_count));

        Self {
            id: Uuid::new_v4(),
            user_id: params.user_id,
            slot_id: slot.id,
            venue_id: slot.venue_id,
            confirmation_code: generate_confirmation_code(),
            status: BookingStatus::Confirmed,
            guest_count: params.guest_count,
            notes: params.notes,
            booking_date: slot.date,
            cancelled_at: None,
            cancellation_reason: None,
            confirmed_at: Some(now),
            completed_at: None,
            total_price,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn cancel(&mut self, reason: Option<&str>, now: DateTime<Utc>) {
        self.status = BookingStatus::Cancelled;
        self.cancelled_at = Some(now);
        self.cancellation_reason = reason.map(str::to_string);
        self.updated_at = now;
    }
}

/// `RSV-` followed by the first 8 hex digits of a fresh UUID, uppercased.
/// Global uniqueness is enforced by the unique index on the column.
pub fn generate_confirmation_code() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("RSV-{}", hex[..8].to_uppercase())
}
