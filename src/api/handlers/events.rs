use axum::{
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;

use crate::api::dtos::requests::SlotEventsQuery;
use crate::api::extractors::auth::AuthUser;
use crate::state::AppState;

/// Streams `SLOT_UPDATED` events, optionally filtered to one venue.
/// Dropping the connection cancels the subscription and frees its buffer.
pub async fn slot_events(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotEventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = state.bus.subscribe_slots(query.venue_id).await;

    let stream = updates.map(|update| {
        Ok(Event::default()
            .event("slot_updated")
            .json_data(&update)
            .unwrap_or_default())
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Streams `BOOKING_UPDATED` events scoped to the calling user.
pub async fn booking_events(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = state.bus.subscribe_bookings(caller.user_id).await;

    let stream = updates.map(|update| {
        Ok(Event::default()
            .event("booking_updated")
            .json_data(&update)
            .unwrap_or_default())
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
