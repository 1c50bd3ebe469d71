use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Deserialize)]
pub struct CreateBookingRequest {
    pub slot_id: Uuid,
    pub venue_id: Uuid,
    pub guest_count: i32,
    pub notes: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct BlockSlotRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize)]
pub struct AvailabilityQuery {
    pub venue_id: Uuid,
    pub date: NaiveDate,
}

#[derive(Deserialize)]
pub struct SlotEventsQuery {
    pub venue_id: Option<Uuid>,
}
