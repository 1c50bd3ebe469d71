use axum::{extract::FromRequestParts, http::request::Parts};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::user::Identity;
use crate::error::AppError;
use crate::state::AppState;

/// Caller identity. The upstream gateway verifies the token and forwards the
/// subject as `X-User-Id`; the role comes from storage, not from the caller.
pub struct AuthUser(pub Identity);

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or(AppError::Unauthorized)?;

        match state.user_repo.find_by_id(user_id).await? {
            Some(user) if user.is_active => Ok(AuthUser(Identity {
                user_id,
                role: user.role,
            })),
            _ => Err(AppError::UserNotFound),
        }
    }
}
