//! Account lifecycle endpoints

use axum::{
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
    response::Json,
};

use super::ApiJson;
use super::dto::{DeleteUserRequest, SuccessResponse, UserCreatedHook};
use crate::AppState;
use crate::auth::{CurrentUser, verify_shared_secret};
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::{AccountService, SignupOutcome};

fn account_service(state: &AppState) -> AccountService {
    AccountService::new(
        state.db.clone(),
        state.storage.clone(),
        state.config.storage.clone(),
        state.auth.clone(),
    )
}

/// POST /functions/v1/on-user-created
///
/// Called by the auth provider's signup hook. When `auth.hook_secret` is
/// set the `Authorization` header must carry it, bare or as a bearer token.
pub async fn on_user_created(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(hook): ApiJson<UserCreatedHook>,
) -> Result<&'static str, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/functions/v1/on-user-created"])
        .start_timer();

    if let Some(secret) = state
        .config
        .auth
        .hook_secret
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        let presented = headers
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.strip_prefix("Bearer ").unwrap_or(h))
            .unwrap_or_default();
        if !verify_shared_secret(presented, secret) {
            tracing::warn!("Signup hook called without a valid secret");
            return Err(AppError::Unauthorized);
        }
    }

    match account_service(&state)
        .on_user_created(&hook.record.id)
        .await?
    {
        SignupOutcome::Created => Ok("OK"),
        SignupOutcome::AlreadyExists => Ok("Profile already exists"),
    }
}

/// POST /functions/v1/delete_user
///
/// Users may only delete themselves.
pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<DeleteUserRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/functions/v1/delete_user"])
        .start_timer();

    let user_id = req
        .user_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::Validation("user_id is required".to_string()))?;
    if user_id.trim() != user.id {
        return Err(AppError::Forbidden);
    }

    account_service(&state).delete_user(&user.id).await?;
    Ok(Json(SuccessResponse::ok()))
}
