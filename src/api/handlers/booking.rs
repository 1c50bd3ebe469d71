use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dtos::requests::{CancelBookingRequest, CreateBookingRequest};
use crate::api::extractors::auth::AuthUser;
use crate::domain::services::coordinator::{CancelBookingInput, CreateBookingInput};
use crate::error::AppError;
use crate::state::AppState;

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Json(payload): Json<CreateBookingRequest>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state
        .coordinator
        .create_booking(CreateBookingInput {
            user_id: caller.user_id,
            slot_id: payload.slot_id,
            venue_id: payload.venue_id,
            guest_count: payload.guest_count,
            notes: payload.notes,
        })
        .await?;

    Ok(Json(booking))
}

pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(booking_id): Path<Uuid>,
    payload: Option<Json<CancelBookingRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let reason = payload.and_then(|Json(p)| p.reason);

    let booking = state
        .coordinator
        .cancel_booking(CancelBookingInput {
            booking_id,
            caller,
            reason,
        })
        .await?;

    Ok(Json(booking))
}

pub async fn get_booking(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(booking_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let booking = state.coordinator.get_booking(booking_id, caller).await?;
    Ok(Json(booking))
}

pub async fn list_my_bookings(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let bookings = state.coordinator.list_user_bookings(caller.user_id).await?;
    Ok(Json(bookings))
}
