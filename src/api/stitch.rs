//! Panel stitching endpoint
//!
//! Signed-in callers send panel URLs they already hold; each download is
//! capped at `generation.max_panel_bytes`.

use axum::{
    extract::{FromRequestParts, Query, Request, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::{Value, json};

use super::dto::StitchQuery;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::comic::{GridLayout, stitch};
use crate::data::EntityId;
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;

/// ANY /functions/v1/stitch_panels
///
/// `?test=1` is a public health check for any method. Otherwise only an
/// authenticated POST with `{"urls": [...]}` (4 to 6 entries) is accepted;
/// the stitched PNG is stored and its public URL returned.
pub async fn stitch_panels(
    State(state): State<AppState>,
    Query(query): Query<StitchQuery>,
    request: Request,
) -> Result<Response, AppError> {
    if matches!(query.test.as_deref(), Some("1" | "true")) {
        return Ok(Json(json!({"message": "stitch_panels healthy"})).into_response());
    }

    let (mut parts, body) = request.into_parts();
    if parts.method != Method::POST {
        return Ok((
            StatusCode::METHOD_NOT_ALLOWED,
            Json(json!({"error": "Method not allowed"})),
        )
            .into_response());
    }
    let CurrentUser(user) = CurrentUser::from_request_parts(&mut parts, &state).await?;

    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/functions/v1/stitch_panels"])
        .start_timer();

    let body = axum::body::to_bytes(body, state.config.server.max_body_bytes)
        .await
        .map_err(|e| AppError::Validation(format!("Invalid JSON body: {e}")))?;
    let value: Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid JSON body: {e}")))?;
    let urls = panel_urls(&value).unwrap_or_default();
    GridLayout::for_panels(urls.len())?;

    let max_bytes = state.config.generation.max_panel_bytes;
    let panels = futures::future::try_join_all(
        urls.iter()
            .enumerate()
            .map(|(idx, url)| fetch_panel(&state.http_client, idx, url, max_bytes)),
    )
    .await?;

    let strip = tokio::task::spawn_blocking(move || stitch(&panels))
        .await
        .map_err(|e| AppError::Internal(e.into()))??;

    let key = format!("stitched/{}.png", EntityId::new().0);
    let url = state
        .storage
        .upload(&state.config.storage.comics_bucket, &key, strip, "image/png")
        .await?;

    tracing::info!(user_id = %user.id, panels = urls.len(), %key, "Panels stitched");
    Ok(Json(json!({"url": url})).into_response())
}

/// `urls` as a list of strings, `None` for any other shape
fn panel_urls(body: &Value) -> Option<Vec<&str>> {
    body.get("urls")?
        .as_array()?
        .iter()
        .map(Value::as_str)
        .collect()
}

async fn fetch_panel(
    http: &reqwest::Client,
    idx: usize,
    raw: &str,
    max_bytes: usize,
) -> Result<Vec<u8>, AppError> {
    let url = url::Url::parse(raw.trim()).map_err(|e| {
        AppError::Validation(format!("panel {} has an invalid url: {e}", idx + 1))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Validation(format!(
            "panel {} url must be http or https",
            idx + 1
        )));
    }

    let mut response = http.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AppError::Upstream(format!(
            "panel {} could not be fetched (status {})",
            idx + 1,
            status.as_u16()
        )));
    }

    let too_large =
        || AppError::Validation(format!("panel {} is larger than {max_bytes} bytes", idx + 1));
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if response.content_length().is_some_and(|len| len > limit) {
        return Err(too_large());
    }

    // Content-Length may be absent or wrong; count what actually arrives
    let mut bytes = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if bytes.len() + chunk.len() > max_bytes {
            return Err(too_large());
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
