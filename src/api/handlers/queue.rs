use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::api::extractors::auth::AuthUser;
use crate::error::AppError;
use crate::state::AppState;

pub async fn queue_stats(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    if !caller.is_admin() {
        return Err(AppError::Unauthorized);
    }

    let counts = state.queue.stats().await?;
    Ok(Json(json!({
        "waiting": counts.waiting,
        "active": counts.active,
        "completed": counts.completed,
        "failed": counts.failed,
        "delayed": counts.delayed,
    })))
}
