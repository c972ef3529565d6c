//! Avatar endpoints

use axum::{extract::State, response::Json};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};

use super::ApiJson;
use super::dto::{
    FinalizeAvatarRequest, GenerateAvatarRequest, GenerateAvatarResponse, SuccessResponse,
};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::{AvatarRequest, AvatarService, AvatarSource};

fn avatar_service(state: &AppState) -> AvatarService {
    AvatarService::new(
        state.db.clone(),
        state.openai.clone(),
        state.http_client.clone(),
    )
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Pick the photo source; a URL takes precedence over inline bytes.
fn avatar_source(req: &GenerateAvatarRequest) -> Result<AvatarSource, AppError> {
    if let Some(url) = non_blank(req.image_url.clone()).or_else(|| non_blank(req.text.clone())) {
        return Ok(AvatarSource::Url(url));
    }

    let encoded = non_blank(req.user_photo_b64.clone()).ok_or_else(|| {
        AppError::Validation("image_url or user_photo_b64 is required".to_string())
    })?;
    // Accept data URLs as produced by the image picker
    let payload = match encoded.split_once(";base64,") {
        Some((_, data)) => data,
        None => encoded.as_str(),
    };
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|_| AppError::Validation("user_photo_b64 is not valid base64".to_string()))?;

    Ok(AvatarSource::Photo(bytes))
}

/// POST /functions/v1/generate_avatar
pub async fn generate_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<GenerateAvatarRequest>,
) -> Result<Json<GenerateAvatarResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/functions/v1/generate_avatar"])
        .start_timer();

    let request = AvatarRequest {
        source: avatar_source(&req)?,
        prompt: req.prompt,
        style: req.style,
    };
    let b64_json = avatar_service(&state).generate_avatar(&request).await?;
    tracing::info!(user_id = %user.id, "Avatar generated");

    Ok(Json(GenerateAvatarResponse {
        b64_json,
        status: "success",
    }))
}

/// POST /functions/v1/finalize-avatar
///
/// `userId` is optional; when present it must name the caller.
pub async fn finalize_avatar(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<FinalizeAvatarRequest>,
) -> Result<Json<SuccessResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/functions/v1/finalize-avatar"])
        .start_timer();

    if let Some(claimed) = req.user_id.as_deref().filter(|id| !id.is_empty()) {
        if claimed != user.id {
            return Err(AppError::Forbidden);
        }
    }

    avatar_service(&state)
        .finalize_avatar(&user.id, &req.style_name, &req.avatar_path)
        .await?;

    Ok(Json(SuccessResponse::ok()))
}
