//! Dream and comic endpoints

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    response::Json,
};

use super::ApiJson;
use super::dto::{
    ComicJobAccepted, ComicListResponse, ComicResponse, ComicStatusRequest, ComicStatusResponse,
    GenerateComicRequest, ListComicsQuery,
};
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::{AudioUpload, ComicJobRequest, DreamOutcome, DreamService};

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

fn dream_service(state: &AppState) -> DreamService {
    DreamService::new(
        state.config.clone(),
        state.db.clone(),
        state.storage.clone(),
        state.openai.clone(),
    )
}

/// POST /functions/v1/process_dream
///
/// Multipart form with a `text` field, an `audio` file, or both (text wins).
pub async fn process_dream(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut multipart: Multipart,
) -> Result<Json<DreamOutcome>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/functions/v1/process_dream"])
        .start_timer();

    let mut text: Option<String> = None;
    let mut audio: Option<AudioUpload> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Failed to parse multipart: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "text" => {
                text = Some(field.text().await.map_err(|e| {
                    AppError::Validation(format!("Failed to read text: {}", e))
                })?);
            }
            "audio" => {
                let filename = field.file_name().unwrap_or("audio.m4a").to_string();
                let content_type = field.content_type().map(|c| c.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read audio: {}", e)))?;
                audio = Some(AudioUpload {
                    bytes: bytes.to_vec(),
                    filename,
                    content_type,
                });
            }
            _ => {}
        }
    }

    let outcome = dream_service(&state)
        .process_dream(&user, text, audio)
        .await?;

    Ok(Json(outcome))
}

/// POST /functions/v1/generate_comic
pub async fn generate_comic(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<GenerateComicRequest>,
) -> Result<(StatusCode, Json<ComicJobAccepted>), AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/functions/v1/generate_comic"])
        .start_timer();

    let comic_id = dream_service(&state)
        .start_comic_job(
            &user,
            ComicJobRequest {
                story: req.story,
                num_panels: req.num_panels,
                style_name: req.style_name,
                character_reference_path: req.character_reference_path,
            },
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ComicJobAccepted {
            comic_id,
            status: "pending",
        }),
    ))
}

/// POST /functions/v1/comics/status
pub async fn comic_statuses(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ApiJson(req): ApiJson<ComicStatusRequest>,
) -> Result<Json<ComicStatusResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/functions/v1/comics/status"])
        .start_timer();

    let jobs = dream_service(&state)
        .job_statuses(&user.id, &req.ids)
        .await?;

    Ok(Json(ComicStatusResponse { jobs }))
}

/// GET /functions/v1/comics
pub async fn list_comics(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListComicsQuery>,
) -> Result<Json<ComicListResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/functions/v1/comics"])
        .start_timer();

    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let service = dream_service(&state);
    let comics = service.list_comics(&user.id, limit).await?;

    Ok(Json(ComicListResponse {
        comics: comics
            .iter()
            .map(|comic| ComicResponse::from_comic(comic, service.public_image_urls(comic)))
            .collect(),
    }))
}

/// GET /functions/v1/comics/:id
pub async fn get_comic(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<Json<ComicResponse>, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["GET", "/functions/v1/comics/:id"])
        .start_timer();

    let service = dream_service(&state);
    let comic = service.get_comic(&user.id, &id).await?;

    Ok(Json(ComicResponse::from_comic(
        &comic,
        service.public_image_urls(&comic),
    )))
}
