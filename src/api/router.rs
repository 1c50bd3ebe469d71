use axum::{
    body::Body,
    extract::Request,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{classify::ServerErrorsFailureClass, trace::TraceLayer};
use tracing::{error, info, info_span, Span};
use uuid::Uuid;

use crate::api::handlers::{booking, events, health, queue, slot};
use crate::state::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))

        // Availability & slots
        .route("/api/v1/slots", get(slot::get_available_slots))
        .route("/api/v1/slots/{slot_id}", get(slot::get_slot))
        .route("/api/v1/slots/{slot_id}/block", post(slot::block_slot))
        .route("/api/v1/slots/{slot_id}/unblock", post(slot::unblock_slot))

        // Bookings
        .route(
            "/api/v1/bookings",
            post(booking::create_booking).get(booking::list_my_bookings),
        )
        .route("/api/v1/bookings/{booking_id}", get(booking::get_booking))
        .route(
            "/api/v1/bookings/{booking_id}/cancel",
            post(booking::cancel_booking),
        )

        // Real-time fan-out
        .route("/api/v1/events/slots", get(events::slot_events))
        .route("/api/v1/events/bookings", get(events::booking_events))

        // Operations
        .route("/api/v1/queue/stats", get(queue::queue_stats))

        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = Uuid::new_v4().to_string();
                    info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = ?request.method(),
                        uri = ?request.uri(),
                    )
                })
                .on_response(
                    |response: &axum::http::Response<Body>, latency: Duration, _span: &Span| {
                        info!(
                            status = response.status().as_u16(),
                            latency_ms = latency.as_millis(),
                            "finished processing request"
                        );
                    },
                )
                .on_failure(
                    |failure: ServerErrorsFailureClass, _latency: Duration, _span: &Span| {
                        error!("request failed: {:?}", failure);
                    },
                ),
        )
        .with_state(state)
}
