use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tracing::debug;
use uuid::Uuid;

use crate::domain::models::booking::{Booking, BookingStatus};
use crate::domain::models::slot::{Slot, SlotStatus};

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// `SLOT_UPDATED` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotUpdate {
    pub slot_id: Uuid,
    pub venue_id: Uuid,
    pub status: SlotStatus,
    pub remaining_capacity: i32,
}

impl From<&Slot> for SlotUpdate {
    fn from(slot: &Slot) -> Self {
        Self {
            slot_id: slot.id,
            venue_id: slot.venue_id,
            status: slot.status,
            remaining_capacity: slot.remaining_capacity,
        }
    }
}

/// `BOOKING_UPDATED` payload, delivered only to the owning user's
/// subscriptions.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingUpdate {
    pub booking_id: Uuid,
    pub status: BookingStatus,
    pub confirmation_code: String,
    pub user_id: Uuid,
}

impl From<&Booking> for BookingUpdate {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            status: booking.status,
            confirmation_code: booking.confirmation_code.clone(),
            user_id: booking.user_id,
        }
    }
}

struct SlotSubscriber {
    venue_id: Option<Uuid>,
    tx: mpsc::Sender<SlotUpdate>,
}

struct BookingSubscriber {
    user_id: Uuid,
    tx: mpsc::Sender<BookingUpdate>,
}

/// In-process publish/subscribe for slot and booking state changes.
///
/// Delivery is at-most-once: each subscriber owns a bounded buffer, publish
/// never blocks, and a subscriber that falls behind (or went away) is dropped
/// from the registry, which closes its stream. Durable truth stays in
/// storage, so lost events are refetchable.
pub struct EventBus {
    buffer: usize,
    slot_subs: RwLock<Vec<SlotSubscriber>>,
    booking_subs: RwLock<Vec<BookingSubscriber>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            buffer,
            slot_subs: RwLock::new(Vec::new()),
            booking_subs: RwLock::new(Vec::new()),
        }
    }

    /// Subscribes to `SLOT_UPDATED`, optionally filtered to one venue.
    pub async fn subscribe_slots(&self, venue_id: Option<Uuid>) -> ReceiverStream<SlotUpdate> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.slot_subs
            .write()
            .await
            .push(SlotSubscriber { venue_id, tx });
        ReceiverStream::new(rx)
    }

    /// Subscribes to `BOOKING_UPDATED` for a single user.
    pub async fn subscribe_bookings(&self, user_id: Uuid) -> ReceiverStream<BookingUpdate> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.booking_subs
            .write()
            .await
            .push(BookingSubscriber { user_id, tx });
        ReceiverStream::new(rx)
    }

    pub async fn publish_slot(&self, update: SlotUpdate) {
        let mut subs = self.slot_subs.write().await;
        let before = subs.len();
        subs.retain(|sub| {
            if sub.venue_id.is_some_and(|v| v != update.venue_id) {
                return true;
            }
            sub.tx.try_send(update.clone()).is_ok()
        });
        let dropped = before - subs.len();
        if dropped > 0 {
            debug!(dropped, "dropped slow or closed slot subscribers");
        }
    }

    pub async fn publish_booking(&self, update: BookingUpdate) {
        let mut subs = self.booking_subs.write().await;
        let before = subs.len();
        subs.retain(|sub| {
            if sub.user_id != update.user_id {
                return true;
            }
            sub.tx.try_send(update.clone()).is_ok()
        });
        let dropped = before - subs.len();
        if dropped > 0 {
            debug!(dropped, "dropped slow or closed booking subscribers");
        }
    }

    pub async fn slot_subscriber_count(&self) -> usize {
        self.slot_subs.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    fn update(venue_id: Uuid, remaining: i32) -> SlotUpdate {
        SlotUpdate {
            slot_id: Uuid::new_v4(),
            venue_id,
            status: SlotStatus::Available,
            remaining_capacity: remaining,
        }
    }

    #[tokio::test]
    async fn fan_out_reaches_all_matching_subscribers() {
        let bus = EventBus::new();
        let venue = Uuid::new_v4();

        let mut a = bus.subscribe_slots(Some(venue)).await;
        let mut b = bus.subscribe_slots(None).await;

        bus.publish_slot(update(venue, 3)).await;

        assert_eq!(a.next().await.unwrap().remaining_capacity, 3);
        assert_eq!(b.next().await.unwrap().remaining_capacity, 3);
    }

    #[tokio::test]
    async fn venue_filter_suppresses_other_venues() {
        let bus = EventBus::new();
        let venue = Uuid::new_v4();
        let other = Uuid::new_v4();

        let mut sub = bus.subscribe_slots(Some(venue)).await;

        bus.publish_slot(update(other, 1)).await;
        bus.publish_slot(update(venue, 2)).await;

        // Only the matching event arrives.
        assert_eq!(sub.next().await.unwrap().remaining_capacity, 2);
    }

    #[tokio::test]
    async fn booking_updates_are_scoped_to_the_user() {
        let bus = EventBus::new();
        let user = Uuid::new_v4();

        let mut own = bus.subscribe_bookings(user).await;
        let mut other = bus.subscribe_bookings(Uuid::new_v4()).await;

        bus.publish_booking(BookingUpdate {
            booking_id: Uuid::new_v4(),
            status: BookingStatus::Confirmed,
            confirmation_code: "RSV-DEADBEEF".to_string(),
            user_id: user,
        })
        .await;

        assert_eq!(own.next().await.unwrap().user_id, user);

        // The other user's stream stays empty; dropping the bus closes it.
        drop(bus);
        assert!(other.next().await.is_none());
    }

    #[tokio::test]
    async fn overflowing_subscriber_is_dropped_and_stream_closes() {
        let bus = EventBus::with_buffer(2);
        let venue = Uuid::new_v4();
        let mut sub = bus.subscribe_slots(Some(venue)).await;

        for i in 0..3 {
            bus.publish_slot(update(venue, i)).await;
        }

        assert_eq!(bus.slot_subscriber_count().await, 0);

        // Buffered events drain, then the stream ends.
        assert_eq!(sub.next().await.unwrap().remaining_capacity, 0);
        assert_eq!(sub.next().await.unwrap().remaining_capacity, 1);
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_subscriber_is_pruned_on_next_publish() {
        let bus = EventBus::new();
        let venue = Uuid::new_v4();

        let sub = bus.subscribe_slots(Some(venue)).await;
        drop(sub);

        bus.publish_slot(update(venue, 1)).await;
        assert_eq!(bus.slot_subscriber_count().await, 0);
    }
}
