use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dtos::requests::{AvailabilityQuery, BlockSlotRequest};
use crate::api::extractors::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

pub async fn get_available_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<impl IntoResponse, AppError> {
    let snapshots = state
        .coordinator
        .get_available_slots(query.venue_id, query.date)
        .await?;
    Ok(Json(snapshots))
}

pub async fn get_slot(
    State(state): State<Arc<AppState>>,
    Path(slot_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let slot = state
        .slot_repo
        .find_by_id(slot_id)
        .await?
        .ok_or(AppError::SlotNotFound)?;
    Ok(Json(slot))
}

pub async fn block_slot(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(slot_id): Path<Uuid>,
    payload: Option<Json<BlockSlotRequest>>,
) -> Result<impl IntoResponse, AppError> {
    let reason = payload.and_then(|Json(p)| p.reason);
    let slot = state.coordinator.block_slot(slot_id, caller, reason).await?;
    Ok(Json(slot))
}

pub async fn unblock_slot(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(slot_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let slot = state.coordinator.unblock_slot(slot_id, caller).await?;
    Ok(Json(slot))
}
