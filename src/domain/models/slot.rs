use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::models::ParseEnumError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Held,
    Booked,
    Blocked,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "AVAILABLE",
            SlotStatus::Held => "HELD",
            SlotStatus::Booked => "BOOKED",
            SlotStatus::Blocked => "BLOCKED",
        }
    }
}

impl std::fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SlotStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVAILABLE" => Ok(SlotStatus::Available),
            "HELD" => Ok(SlotStatus::Held),
            "BOOKED" => Ok(SlotStatus::Booked),
            "BLOCKED" => Ok(SlotStatus::Blocked),
            other => Err(ParseEnumError(format!("unknown slot status: {}", other))),
        }
    }
}

impl TryFrom<String> for SlotStatus {
    type Error = ParseEnumError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// A bookable time window at a venue with finite capacity.
///
/// Mutated only through the transition methods below; callers validate
/// preconditions first (see `domain::services::policy`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Slot {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub capacity: i32,
    pub remaining_capacity: i32,
    #[sqlx(try_from = "String")]
    pub status: SlotStatus,
    pub duration_minutes: i32,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
    pub held_until: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    /// Debits `guest_count` units. Reaching zero flips the slot to BOOKED.
    pub fn debit(&mut self, guest_count: i32, now: DateTime<Utc>) {
        self.remaining_capacity -= guest_count;
        if self.remaining_capacity == 0 {
            self.status = SlotStatus::Booked;
        }
        self.updated_at = now;
    }

    /// Credits `guest_count` units back. A BOOKED slot with room again
    /// becomes AVAILABLE; a BLOCKED slot keeps its status.
    pub fn credit(&mut self, guest_count: i32, now: DateTime<Utc>) {
        self.remaining_capacity = (self.remaining_capacity + guest_count).min(self.capacity);
        if self.status == SlotStatus::Booked && self.remaining_capacity > 0 {
            self.status = SlotStatus::Available;
        }
        self.updated_at = now;
    }

    /// Admin block. No-op when already blocked; otherwise preserves
    /// `remaining_capacity` and records who blocked it and why.
    pub fn block(&mut self, blocked_by: Uuid, reason: Option<&str>, now: DateTime<Utc>) -> bool {
        if self.status == SlotStatus::Blocked {
            return false;
        }
        self.status = SlotStatus::Blocked;
        let mut meta = match self.metadata.take() {
            Some(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        meta.insert("blockedBy".to_string(), json!(blocked_by));
        meta.insert("blockReason".to_string(), json!(reason));
        self.metadata = Some(serde_json::Value::Object(meta));
        self.updated_at = now;
        true
    }

    /// Admin unblock, idempotent. Restores BOOKED when no capacity remains,
    /// AVAILABLE otherwise.
    pub fn unblock(&mut self, now: DateTime<Utc>) {
        if self.status != SlotStatus::Blocked {
            return;
        }
        self.status = if self.remaining_capacity == 0 {
            SlotStatus::Booked
        } else {
            SlotStatus::Available
        };
        self.updated_at = now;
    }

    /// True when the hold lease has lapsed and the reclaimer should revert
    /// the slot to AVAILABLE.
    pub fn hold_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Held && self.held_until.is_some_and(|until| until < now)
    }

    pub fn matches_availability_filter(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Available && self.remaining_capacity > 0 && self.start_time > now
    }
}

/// Read-model projection of a slot, cached per `(venue, date)` and returned
/// by availability queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotSnapshot {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub date: NaiveDate,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub remaining_capacity: i32,
    pub status: SlotStatus,
    pub price: Option<Decimal>,
    pub currency: Option<String>,
}

impl From<&Slot> for SlotSnapshot {
    fn from(slot: &Slot) -> Self {
        Self {
            id: slot.id,
            venue_id: slot.venue_id,
            date: slot.date,
            start_time: slot.start_time,
            end_time: slot.end_time,
            remaining_capacity: slot.remaining_capacity,
            status: slot.status,
            price: slot.price,
            currency: slot.currency.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn slot(capacity: i32, remaining: i32, status: SlotStatus) -> Slot {
        let now = Utc::now();
        Slot {
            id: Uuid::new_v4(),
            venue_id: Uuid::new_v4(),
            date: now.date_naive(),
            start_time: now + Duration::hours(2),
            end_time: now + Duration::hours(3),
            capacity,
            remaining_capacity: remaining,
            status,
            duration_minutes: 60,
            price: None,
            currency: None,
            held_until: None,
            metadata: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn debit_flips_to_booked_at_zero() {
        let mut s = slot(4, 2, SlotStatus::Available);
        s.debit(1, Utc::now());
        assert_eq!(s.status, SlotStatus::Available);
        assert_eq!(s.remaining_capacity, 1);
        s.debit(1, Utc::now());
        assert_eq!(s.status, SlotStatus::Booked);
        assert_eq!(s.remaining_capacity, 0);
    }

    #[test]
    fn credit_reopens_booked_slot() {
        let mut s = slot(4, 0, SlotStatus::Booked);
        s.credit(2, Utc::now());
        assert_eq!(s.status, SlotStatus::Available);
        assert_eq!(s.remaining_capacity, 2);
    }

    #[test]
    fn credit_preserves_blocked_status() {
        let mut s = slot(4, 0, SlotStatus::Blocked);
        s.credit(1, Utc::now());
        assert_eq!(s.status, SlotStatus::Blocked);
        assert_eq!(s.remaining_capacity, 1);
    }

    #[test]
    fn block_is_noop_when_already_blocked() {
        let mut s = slot(4, 3, SlotStatus::Available);
        assert!(s.block(Uuid::new_v4(), Some("maintenance"), Utc::now()));
        assert!(!s.block(Uuid::new_v4(), None, Utc::now()));
        assert_eq!(s.remaining_capacity, 3);
    }

    #[test]
    fn unblock_restores_status_by_capacity() {
        let mut full = slot(4, 0, SlotStatus::Blocked);
        full.unblock(Utc::now());
        assert_eq!(full.status, SlotStatus::Booked);

        let mut open = slot(4, 2, SlotStatus::Blocked);
        open.unblock(Utc::now());
        assert_eq!(open.status, SlotStatus::Available);
    }

    #[test]
    fn hold_expiry_requires_held_status_and_lapsed_lease() {
        let now = Utc::now();
        let mut s = slot(4, 4, SlotStatus::Held);
        s.held_until = Some(now - Duration::minutes(1));
        assert!(s.hold_expired(now));

        s.held_until = Some(now + Duration::minutes(5));
        assert!(!s.hold_expired(now));

        s.status = SlotStatus::Available;
        s.held_until = Some(now - Duration::minutes(1));
        assert!(!s.hold_expired(now));
    }
}
