//! HTTP client for the OpenAI REST API
//!
//! Only the handful of endpoints the comic pipeline needs. Every call is
//! timed and counted in the `ai_*` metrics.

use std::time::Instant;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use reqwest::{RequestBuilder, Response, multipart};

use super::types::*;
use crate::config::OpenAiConfig;
use crate::error::AppError;
use crate::metrics::observe_ai_call;

/// Longest upstream error body echoed into our own error message
const MAX_ERROR_BODY_CHARS: usize = 300;

/// OpenAI API client
#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(http: reqwest::Client, config: OpenAiConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.bearer_auth(&self.config.api_key);
        match &self.config.project_id {
            Some(project) if !project.is_empty() => builder.header("OpenAI-Project", project),
            _ => builder,
        }
    }

    /// Send a request and hand back the successful response, recording metrics.
    async fn send(&self, operation: &'static str, request: RequestBuilder) -> Result<Response, AppError> {
        let started = Instant::now();

        let response = match self.authorized(request).send().await {
            Ok(response) => response,
            Err(error) => {
                observe_ai_call(operation, "error", started.elapsed());
                return Err(error.into());
            }
        };

        let status = response.status();
        if !status.is_success() {
            observe_ai_call(operation, "error", started.elapsed());
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
            tracing::warn!(operation, %status, body = %snippet, "OpenAI request failed");
            return Err(AppError::Upstream(format!(
                "{operation} failed with status {status}"
            )));
        }

        observe_ai_call(operation, "success", started.elapsed());
        Ok(response)
    }

    /// Chat completion constrained to a JSON object reply.
    ///
    /// # Errors
    /// `Upstream` when the reply has no content or the content is not JSON
    pub async fn chat_json(&self, messages: &[ChatMessage]) -> Result<serde_json::Value, AppError> {
        let body = ChatCompletionRequest {
            model: &self.config.chat_model,
            messages,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        };

        let response: ChatCompletionResponse = self
            .send(
                "chat",
                self.http.post(self.endpoint("chat/completions")).json(&body),
            )
            .await?
            .json()
            .await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| AppError::Upstream("chat completion returned no content".to_string()))?;

        serde_json::from_str(&content).map_err(|e| {
            AppError::Upstream(format!("chat completion returned invalid JSON: {e}"))
        })
    }

    /// Speech to text.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        mime: &str,
    ) -> Result<String, AppError> {
        let file = multipart::Part::bytes(audio)
            .file_name(filename.to_string())
            .mime_str(mime)?;
        let form = multipart::Form::new()
            .text("model", self.config.transcription_model.clone())
            .part("file", file);

        let response: TranscriptionResponse = self
            .send(
                "transcribe",
                self.http
                    .post(self.endpoint("audio/transcriptions"))
                    .multipart(form),
            )
            .await?
            .json()
            .await?;

        Ok(response.text)
    }

    /// Text to image; returns the encoded image bytes.
    pub async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, AppError> {
        let body = ImageGenerationRequest {
            model: &self.config.image_model,
            prompt,
            n: 1,
            quality: &self.config.image_quality,
            size: &self.config.image_size,
        };

        let response: ImageResponse = self
            .send(
                "generate_image",
                self.http.post(self.endpoint("images/generations")).json(&body),
            )
            .await?
            .json()
            .await?;

        self.image_bytes(response).await
    }

    /// Image to image (used for avatars and reference-guided panels).
    pub async fn edit_image(
        &self,
        image: Vec<u8>,
        filename: &str,
        prompt: &str,
        size: &str,
    ) -> Result<Vec<u8>, AppError> {
        let mime = mime_for_filename(filename);
        let image_part = multipart::Part::bytes(image)
            .file_name(filename.to_string())
            .mime_str(mime)?;
        let form = multipart::Form::new()
            .text("model", self.config.avatar_model.clone())
            .text("prompt", prompt.to_string())
            .text("n", "1")
            .text("size", size.to_string())
            .part("image", image_part);

        let response: ImageResponse = self
            .send(
                "edit_image",
                self.http.post(self.endpoint("images/edits")).multipart(form),
            )
            .await?
            .json()
            .await?;

        self.image_bytes(response).await
    }

    /// Per-category moderation scores for `text`.
    pub async fn moderate(&self, text: &str) -> Result<ModerationScores, AppError> {
        let body = ModerationRequest {
            model: &self.config.moderation_model,
            input: text,
        };

        let response: ModerationResponse = self
            .send(
                "moderate",
                self.http.post(self.endpoint("moderations")).json(&body),
            )
            .await?
            .json()
            .await?;

        response
            .results
            .into_iter()
            .next()
            .map(|result| result.category_scores)
            .ok_or_else(|| AppError::Upstream("moderation returned no results".to_string()))
    }

    /// Resolve `data[0]` to bytes, decoding base64 or downloading the URL.
    async fn image_bytes(&self, response: ImageResponse) -> Result<Vec<u8>, AppError> {
        let data = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Upstream("image response had no data".to_string()))?;

        if let Some(b64) = data.b64_json {
            return BASE64_STANDARD
                .decode(b64.trim())
                .map_err(|e| AppError::Upstream(format!("image payload is not base64: {e}")));
        }

        let url = data
            .url
            .ok_or_else(|| AppError::Upstream("image response had neither b64_json nor url".to_string()))?;
        let bytes = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

fn mime_for_filename(filename: &str) -> &'static str {
    let lower = filename.to_ascii_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".webp") {
        "image/webp"
    } else {
        "image/jpeg"
    }
}
