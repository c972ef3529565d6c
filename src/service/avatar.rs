//! Avatar service
//!
//! Restyles a user photo through the image edit endpoint and records the
//! avatar the user finally keeps.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::Utc;

use crate::data::{Avatar, Database, EntityId};
use crate::error::AppError;
use crate::openai::OpenAiClient;
use crate::storage::is_owned_key;

const AVATAR_SIZE: &str = "1024x1024";
const IMAGE_EXTENSIONS: [&str; 6] = [".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp"];

const GHIBLI_PROMPT: &str = "a vibrant, whimsical, and heartwarming portrait in the Studio Ghibli art style, with soft, painterly textures and a touch of fantasy.";
const SIMPSONS_PROMPT: &str =
    "Simpsons animation — yellow tones, thick black outlines, cartoon exaggeration.";
const AMERICAN_PROMPT: &str = "A character portrait in the modern action animation style of 'Avatar: The Last Airbender' and the 'DC Animated Universe'. The art should be cel-shaded with clean, bold outlines and dynamic, expressive features.";

/// Prompt for a named style, case-insensitive
pub fn style_prompt(style: &str) -> Option<&'static str> {
    match style.trim().to_ascii_lowercase().as_str() {
        "simpsons" => Some(SIMPSONS_PROMPT),
        "american" => Some(AMERICAN_PROMPT),
        "ghibli" => Some(GHIBLI_PROMPT),
        _ => None,
    }
}

/// Where the photo comes from
#[derive(Debug, Clone)]
pub enum AvatarSource {
    Url(String),
    Photo(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct AvatarRequest {
    pub source: AvatarSource,
    pub prompt: Option<String>,
    pub style: Option<String>,
}

impl AvatarRequest {
    /// Explicit prompt, then the style library, then the default style
    pub fn resolved_prompt(&self) -> String {
        if let Some(prompt) = self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            return prompt.to_string();
        }
        self.style
            .as_deref()
            .and_then(style_prompt)
            .unwrap_or(GHIBLI_PROMPT)
            .to_string()
    }
}

/// URL whose path names an image file
pub fn is_image_url(value: &str) -> bool {
    let lower = value.trim().to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Avatar service
pub struct AvatarService {
    db: Arc<Database>,
    openai: OpenAiClient,
    http: reqwest::Client,
}

impl AvatarService {
    pub fn new(db: Arc<Database>, openai: OpenAiClient, http: reqwest::Client) -> Self {
        Self { db, openai, http }
    }

    /// Restyle the source photo; returns the new image as base64.
    ///
    /// # Errors
    /// - `Validation` for a URL that does not name an image, or a photo that
    ///   is not base64
    /// - `Upstream` if the photo cannot be fetched or the edit fails
    pub async fn generate_avatar(&self, request: &AvatarRequest) -> Result<String, AppError> {
        let (photo, filename) = match &request.source {
            AvatarSource::Url(raw) => {
                let bytes = self.fetch_photo(raw).await?;
                let filename = filename_for(&bytes);
                (bytes, filename)
            }
            AvatarSource::Photo(bytes) => {
                if bytes.is_empty() {
                    return Err(AppError::Validation("user_photo_b64 is empty".to_string()));
                }
                (bytes.clone(), filename_for(bytes))
            }
        };

        let prompt = request.resolved_prompt();
        tracing::info!(
            style = ?request.style,
            photo_bytes = photo.len(),
            "Generating avatar"
        );

        let image = self
            .openai
            .edit_image(photo, filename, &prompt, AVATAR_SIZE)
            .await?;

        Ok(BASE64_STANDARD.encode(image))
    }

    async fn fetch_photo(&self, raw: &str) -> Result<Vec<u8>, AppError> {
        let raw = raw.trim();
        if !is_image_url(raw) {
            return Err(AppError::Validation("Invalid string".to_string()));
        }
        let url = url::Url::parse(raw)
            .map_err(|e| AppError::Validation(format!("invalid image url: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(AppError::Validation(
                "image url must be http or https".to_string(),
            ));
        }

        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "failed to fetch image Status: {}",
                status.as_u16()
            )));
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Record the avatar the user kept, unlock its style and show it on the
    /// profile.
    ///
    /// # Errors
    /// `Validation` if the style or path is blank, or the path is not under
    /// `{user_id}/`
    pub async fn finalize_avatar(
        &self,
        user_id: &str,
        style: &str,
        avatar_path: &str,
    ) -> Result<(), AppError> {
        let (style, avatar_path) = (style.trim(), avatar_path.trim());
        if user_id.trim().is_empty() || style.is_empty() || avatar_path.is_empty() {
            return Err(AppError::Validation(
                "Missing required parameters.".to_string(),
            ));
        }
        if !is_owned_key(user_id, avatar_path) {
            return Err(AppError::Validation(
                "avatarPath must be inside the caller's folder".to_string(),
            ));
        }

        let now = Utc::now();
        self.db
            .insert_avatar(&Avatar {
                id: EntityId::new().0,
                user_id: user_id.to_string(),
                style: style.to_string(),
                avatar_path: avatar_path.to_string(),
                original_photo_path: "server_generated".to_string(),
                created_at: now,
            })
            .await?;
        self.db.unlock_style(user_id, style).await?;

        if !self
            .db
            .set_display_avatar(user_id, avatar_path, style, now)
            .await?
        {
            tracing::warn!(user_id, "Avatar finalized for user without a profile");
        }

        tracing::info!(user_id, style, avatar_path, "Avatar finalized");
        Ok(())
    }
}

/// Upload name whose extension matches the decoded format
fn filename_for(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "photo.png",
        Ok(image::ImageFormat::WebP) => "photo.webp",
        _ => "photo.jpg",
    }
}
