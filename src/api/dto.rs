//! Request and response bodies
//!
//! Field names follow what the mobile app already sends and reads, which is
//! why some bodies are camelCase and others snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::Comic;
use crate::service::JobStatus;

/// POST /generate_comic
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateComicRequest {
    pub story: String,
    pub num_panels: Option<usize>,
    pub style_name: String,
    pub character_reference_path: Option<String>,
}

/// 202 answer for a queued comic
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComicJobAccepted {
    pub comic_id: String,
    pub status: &'static str,
}

/// POST /comics/status
#[derive(Debug, Clone, Deserialize)]
pub struct ComicStatusRequest {
    #[serde(default)]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComicStatusResponse {
    pub jobs: Vec<JobStatus>,
}

/// GET /comics query
#[derive(Debug, Clone, Deserialize)]
pub struct ListComicsQuery {
    pub limit: Option<usize>,
}

/// Comic as the app sees it
#[derive(Debug, Clone, Serialize)]
pub struct ComicResponse {
    pub id: String,
    pub title: Option<String>,
    pub transcript: Option<String>,
    pub status: String,
    pub panel_count: i64,
    pub image_urls: Vec<String>,
    pub storyboard: Option<serde_json::Value>,
    pub cost_cents: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ComicResponse {
    pub fn from_comic(comic: &Comic, image_urls: Vec<String>) -> Self {
        Self {
            id: comic.id.clone(),
            title: comic.title.clone(),
            transcript: comic.transcript.clone(),
            status: comic.status.clone(),
            panel_count: comic.panel_count,
            image_urls,
            storyboard: comic.storyboard_json(),
            cost_cents: comic.cost_cents,
            error_message: comic.error_message.clone(),
            created_at: comic.created_at,
            updated_at: comic.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComicListResponse {
    pub comics: Vec<ComicResponse>,
}

/// Query string of /stitch_panels
#[derive(Debug, Clone, Deserialize)]
pub struct StitchQuery {
    pub test: Option<String>,
}

/// POST /generate_avatar
///
/// `text` is the older name for `image_url`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenerateAvatarRequest {
    pub image_url: Option<String>,
    pub text: Option<String>,
    pub user_photo_b64: Option<String>,
    pub prompt: Option<String>,
    pub style: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateAvatarResponse {
    pub b64_json: String,
    pub status: &'static str,
}

/// POST /finalize-avatar
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeAvatarRequest {
    #[serde(default)]
    pub style_name: String,
    #[serde(default)]
    pub avatar_path: String,
    pub user_id: Option<String>,
}

/// POST /on-user-created
#[derive(Debug, Clone, Deserialize)]
pub struct UserCreatedHook {
    pub record: UserRecord,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: String,
}

/// POST /delete_user
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeleteUserRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// POST /subscription
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionWebhook {
    pub event: crate::service::SubscriptionEvent,
}
