//! Blob reads for the local storage backend
//!
//! With R2 the bucket is served by the CDN; locally this route stands in so
//! the URLs returned by uploads resolve.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};

use crate::AppState;
use crate::error::AppError;

/// GET /files/:bucket/*key
pub async fn serve_file(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, AppError> {
    let storage = &state.config.storage;
    if bucket != storage.comics_bucket && bucket != storage.avatars_bucket {
        return Err(AppError::NotFound);
    }

    let bytes = state.storage.download(&bucket, &key).await?;
    Ok(([(header::CONTENT_TYPE, content_type_for(&key))], bytes).into_response())
}

fn content_type_for(key: &str) -> &'static str {
    match key.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()) {
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "webp" => "image/webp",
        Some(ext) if ext == "m4a" => "audio/mp4",
        _ => "application/octet-stream",
    }
}
