//! Dream service
//!
//! Turns a dream (typed or spoken) into a stored comic. Two flows exist:
//! - `process_dream`: synchronous, one panel after another, answers with URLs
//! - `start_comic_job`: moderated, answers at once with a pending id while a
//!   background task renders reference-guided panels in parallel

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::auth::AuthUser;
use crate::comic::prompt::{
    editor_system_prompt, panel_prompt, reference_panel_prompt, shared_style_block,
    storyboard_messages,
};
use crate::comic::{ModerationPolicy, Storyboard};
use crate::config::AppConfig;
use crate::data::{Comic, ComicStatus, Database, EntityId};
use crate::error::AppError;
use crate::metrics::{COMIC_JOBS_TOTAL, PANELS_GENERATED_TOTAL};
use crate::openai::{ChatMessage, OpenAiClient};
use crate::storage::{MediaStorage, is_owned_key};

/// Most ids accepted by one status poll
pub const MAX_STATUS_IDS: usize = 50;

const AUDIO_CONTENT_TYPE: &str = "audio/m4a";

/// Recorded audio attached to a dream
#[derive(Debug, Clone)]
pub struct AudioUpload {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: Option<String>,
}

/// Finished synchronous comic
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DreamOutcome {
    pub comic_id: String,
    pub urls: Vec<String>,
}

/// Background comic request
#[derive(Debug, Clone)]
pub struct ComicJobRequest {
    pub story: String,
    pub num_panels: Option<usize>,
    pub style_name: String,
    /// Key in the avatars bucket
    pub character_reference_path: Option<String>,
}

/// One entry of a status poll
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub id: String,
    /// pending, complete, error or missing
    pub status: String,
    pub title: Option<String>,
    pub image_urls: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    fn missing(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: "missing".to_string(),
            title: None,
            image_urls: Vec::new(),
            error: None,
        }
    }
}

struct ComicJob {
    comic_id: String,
    user_id: String,
    story: String,
    panel_cap: usize,
    style_name: String,
    reference_path: Option<String>,
}

/// Dream service
#[derive(Clone)]
pub struct DreamService {
    config: Arc<AppConfig>,
    db: Arc<Database>,
    storage: Arc<MediaStorage>,
    openai: OpenAiClient,
    moderation: Arc<ModerationPolicy>,
}

impl DreamService {
    pub fn new(
        config: Arc<AppConfig>,
        db: Arc<Database>,
        storage: Arc<MediaStorage>,
        openai: OpenAiClient,
    ) -> Self {
        Self {
            config,
            db,
            storage,
            openai,
            moderation: Arc::new(ModerationPolicy::default()),
        }
    }

    fn comics_bucket(&self) -> &str {
        &self.config.storage.comics_bucket
    }

    /// Synchronous dream to comic.
    ///
    /// Blobs stored for a dream that fails are removed again.
    ///
    /// # Errors
    /// - `Validation` when neither text nor audio is given
    /// - `Upstream` for an empty transcript or an unusable storyboard
    /// - `PolicyViolation` if the model refuses the dream
    /// - `Storage` if a panel cannot be stored
    pub async fn process_dream(
        &self,
        user: &AuthUser,
        text: Option<String>,
        audio: Option<AudioUpload>,
    ) -> Result<DreamOutcome, AppError> {
        let comic_id = EntityId::new().0;
        let result = self.create_dream_comic(user, &comic_id, text, audio).await;
        if result.is_err() {
            self.discard_comic_blobs(&user.id, &comic_id, self.config.generation.max_panels)
                .await;
        }
        result
    }

    async fn create_dream_comic(
        &self,
        user: &AuthUser,
        comic_id: &str,
        text: Option<String>,
        audio: Option<AudioUpload>,
    ) -> Result<DreamOutcome, AppError> {
        let generation = &self.config.generation;
        let character_design = self
            .db
            .get_profile(&user.id)
            .await?
            .and_then(|p| p.character_design)
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| generation.default_character_design.clone());

        let transcript = self.transcript(&user.id, comic_id, text, audio).await?;
        if generation.debug {
            tracing::debug!(%comic_id, %transcript, "Dream transcript");
        }

        let reply = self.openai.chat_json(&storyboard_messages(&transcript)).await?;
        let storyboard = Storyboard::from_value(reply, generation.max_panels)?;
        tracing::info!(
            %comic_id,
            title = %storyboard.title,
            panels = storyboard.panels.len(),
            "Storyboard ready"
        );

        let shared = shared_style_block(&storyboard.style, &character_design);
        let total = storyboard.panels.len();
        let mut urls = Vec::with_capacity(total);

        for (idx, panel) in storyboard.panels.iter().enumerate() {
            let prompt = panel_prompt(panel, idx, &shared, total);
            let image = match self.openai.generate_image(&prompt).await {
                Ok(image) => image,
                Err(error) => {
                    PANELS_GENERATED_TOTAL.with_label_values(&["failed"]).inc();
                    tracing::warn!(%comic_id, panel = idx + 1, %error, "Panel generation failed; skipping");
                    continue;
                }
            };
            PANELS_GENERATED_TOTAL.with_label_values(&["success"]).inc();

            let url = self
                .storage
                .upload(
                    self.comics_bucket(),
                    &panel_key(&user.id, comic_id, idx),
                    image,
                    "image/png",
                )
                .await?;
            urls.push(url);
        }

        if urls.is_empty() {
            COMIC_JOBS_TOTAL.with_label_values(&["sync", "error"]).inc();
            return Err(AppError::Upstream(
                "No comic panels could be generated".to_string(),
            ));
        }

        let panel_count = total as i64;
        let mut comic = Comic::pending(comic_id, &user.id, &transcript);
        comic.status = ComicStatus::Complete.as_str().to_string();
        comic.title = Some(storyboard.title.clone());
        comic.storyboard = Some(storyboard.to_value().to_string());
        comic.image_urls = serde_json::to_string(&urls).map_err(|e| AppError::Internal(e.into()))?;
        comic.panel_count = panel_count;
        comic.cost_cents = generation.cost_cents_per_panel * panel_count;
        self.db.insert_comic(&comic).await?;

        COMIC_JOBS_TOTAL.with_label_values(&["sync", "complete"]).inc();
        tracing::info!(%comic_id, panels = urls.len(), "Comic created");

        Ok(DreamOutcome {
            comic_id: comic_id.to_string(),
            urls,
        })
    }

    async fn transcript(
        &self,
        user_id: &str,
        comic_id: &str,
        text: Option<String>,
        audio: Option<AudioUpload>,
    ) -> Result<String, AppError> {
        if let Some(text) = text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty()) {
            return Ok(text);
        }

        let Some(audio) = audio.filter(|a| !a.bytes.is_empty()) else {
            return Err(AppError::Validation(
                "Either text or audio must be provided".to_string(),
            ));
        };

        self.storage
            .upload(
                self.comics_bucket(),
                &audio_key(user_id, comic_id),
                audio.bytes.clone(),
                AUDIO_CONTENT_TYPE,
            )
            .await?;

        let mime = audio
            .content_type
            .as_deref()
            .filter(|c| c.starts_with("audio/"))
            .unwrap_or(AUDIO_CONTENT_TYPE);
        let transcript = self
            .openai
            .transcribe(audio.bytes, &audio.filename, mime)
            .await?;

        let transcript = transcript.trim().to_string();
        if transcript.is_empty() {
            return Err(AppError::Upstream(
                "Transcription returned no text".to_string(),
            ));
        }
        Ok(transcript)
    }

    /// Moderate the story, create a pending comic and render it in the
    /// background.
    ///
    /// # Returns
    /// Id of the pending comic
    ///
    /// # Errors
    /// - `Validation` for a blank story or style
    /// - `PolicyViolation` if moderation flags the story
    pub async fn start_comic_job(
        &self,
        user: &AuthUser,
        request: ComicJobRequest,
    ) -> Result<String, AppError> {
        let story = request.story.trim().to_string();
        if story.is_empty() {
            return Err(AppError::Validation("story is required".to_string()));
        }
        let style_name = request.style_name.trim().to_string();
        if style_name.is_empty() {
            return Err(AppError::Validation("style_name is required".to_string()));
        }

        let scores = self.openai.moderate(&story).await?;
        if let Err(flagged) = self.moderation.evaluate(&scores) {
            tracing::info!(user_id = %user.id, category = %flagged.category, "Story rejected by moderation");
            COMIC_JOBS_TOTAL.with_label_values(&["background", "rejected"]).inc();
            return Err(AppError::PolicyViolation(flagged.to_string()));
        }

        let reference_path = match request
            .character_reference_path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
        {
            Some(path) if is_owned_key(&user.id, &path) => Some(path),
            Some(_) => {
                return Err(AppError::Validation(
                    "character_reference_path must be inside the caller's folder".to_string(),
                ));
            }
            None => self
                .db
                .get_profile(&user.id)
                .await?
                .and_then(|p| p.display_avatar_path)
                .filter(|path| is_owned_key(&user.id, path)),
        };

        let generation = &self.config.generation;
        let panel_cap = request
            .num_panels
            .unwrap_or(generation.max_panels)
            .clamp(generation.min_panels, generation.max_panels);

        let comic_id = EntityId::new().0;
        self.db
            .insert_comic(&Comic::pending(&comic_id, &user.id, &story))
            .await?;

        let job = ComicJob {
            comic_id: comic_id.clone(),
            user_id: user.id.clone(),
            story,
            panel_cap,
            style_name,
            reference_path,
        };
        let service = self.clone();
        tokio::spawn(async move {
            service.run_comic_job(job).await;
        });

        tracing::info!(%comic_id, user_id = %user.id, panel_cap, "Comic job queued");
        Ok(comic_id)
    }

    async fn run_comic_job(&self, job: ComicJob) {
        match self.render_comic(&job).await {
            Ok(panels) => {
                COMIC_JOBS_TOTAL.with_label_values(&["background", "complete"]).inc();
                tracing::info!(comic_id = %job.comic_id, panels, "Comic job finished");
            }
            Err(error) => {
                COMIC_JOBS_TOTAL.with_label_values(&["background", "error"]).inc();
                tracing::error!(comic_id = %job.comic_id, %error, "Comic job failed");
                self.discard_comic_blobs(&job.user_id, &job.comic_id, job.panel_cap)
                    .await;
                if let Err(db_error) = self.db.fail_comic(&job.comic_id, &error.to_string()).await {
                    tracing::error!(comic_id = %job.comic_id, error = %db_error, "Failed to mark comic as failed");
                }
            }
        }
    }

    async fn render_comic(&self, job: &ComicJob) -> Result<usize, AppError> {
        let messages = vec![
            ChatMessage::system(editor_system_prompt(job.panel_cap)),
            ChatMessage::user(job.story.clone()),
        ];
        let reply = self.openai.chat_json(&messages).await?;
        let storyboard = Storyboard::from_value(reply, job.panel_cap)?;
        if self.config.generation.debug {
            tracing::debug!(comic_id = %job.comic_id, storyboard = %storyboard.to_value(), "Editor storyboard");
        }
        self.db.set_comic_title(&job.comic_id, &storyboard.title).await?;

        let reference = match &job.reference_path {
            Some(path) => {
                let bytes = self
                    .storage
                    .download(&self.config.storage.avatars_bucket, path)
                    .await?;
                Some(Arc::new((bytes, reference_filename(path))))
            }
            None => None,
        };

        tracing::info!(
            comic_id = %job.comic_id,
            style = %job.style_name,
            panels = storyboard.panels.len(),
            reference = reference.is_some(),
            "Rendering panels"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.generation.panel_concurrency));
        let character_sheet = Arc::new(storyboard.character_sheet.clone());
        let mut tasks = Vec::with_capacity(storyboard.panels.len());

        for (idx, panel) in storyboard.panels.iter().cloned().enumerate() {
            let service = self.clone();
            let semaphore = semaphore.clone();
            let reference = reference.clone();
            let character_sheet = character_sheet.clone();
            let key = panel_key(&job.user_id, &job.comic_id, idx);

            tasks.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Internal(e.into()))?;

                let prompt = reference_panel_prompt(&panel, &character_sheet);
                let result = match reference.as_deref() {
                    Some((bytes, filename)) => {
                        service
                            .openai
                            .edit_image(
                                bytes.clone(),
                                filename,
                                &prompt,
                                &service.openai.config().image_size,
                            )
                            .await
                    }
                    None => service.openai.generate_image(&prompt).await,
                };
                let outcome = if result.is_ok() { "success" } else { "failed" };
                PANELS_GENERATED_TOTAL.with_label_values(&[outcome]).inc();

                service
                    .storage
                    .upload(service.comics_bucket(), &key, result?, "image/png")
                    .await?;
                Ok::<_, AppError>((idx, key))
            }));
        }

        let mut rendered = Vec::with_capacity(tasks.len());
        for joined in futures::future::join_all(tasks).await {
            rendered.push(joined.map_err(|e| AppError::Internal(e.into()))??);
        }
        rendered.sort_by_key(|(idx, _)| *idx);
        let paths: Vec<String> = rendered.into_iter().map(|(_, key)| key).collect();

        let panel_count = storyboard.panels.len() as i64;
        self.db
            .complete_comic(
                &job.comic_id,
                &paths,
                panel_count,
                &storyboard.to_value(),
                self.config.generation.cost_cents_per_panel * panel_count,
            )
            .await?;

        Ok(paths.len())
    }

    /// Best-effort removal of the recording and the first `panel_cap`
    /// panels a failed comic may have stored
    async fn discard_comic_blobs(&self, user_id: &str, comic_id: &str, panel_cap: usize) {
        let keys = std::iter::once(audio_key(user_id, comic_id))
            .chain((0..panel_cap).map(|idx| panel_key(user_id, comic_id, idx)));
        for key in keys {
            if let Err(error) = self.storage.delete(self.comics_bucket(), &key).await {
                tracing::warn!(%comic_id, %key, %error, "Failed to discard blob");
            }
        }
    }

    /// Status of each requested comic, in request order.
    ///
    /// Ids are deduplicated (first occurrence wins) and capped at
    /// [`MAX_STATUS_IDS`]. Ids that do not exist or belong to someone else
    /// come back as `missing`.
    pub async fn job_statuses(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<Vec<JobStatus>, AppError> {
        let ids = dedupe_ids(ids);
        let comics = self.db.get_comics_by_ids(user_id, &ids).await?;
        let by_id: HashMap<&str, &Comic> = comics.iter().map(|c| (c.id.as_str(), c)).collect();

        Ok(ids
            .iter()
            .map(|id| match by_id.get(id.as_str()) {
                Some(comic) => JobStatus {
                    id: id.clone(),
                    status: comic.status.clone(),
                    title: comic.title.clone(),
                    image_urls: self.public_image_urls(comic),
                    error: comic.error_message.clone(),
                },
                None => JobStatus::missing(id),
            })
            .collect())
    }

    /// Newest comics of a user
    pub async fn list_comics(&self, user_id: &str, limit: usize) -> Result<Vec<Comic>, AppError> {
        self.db.list_comics_for_user(user_id, limit).await
    }

    /// A comic owned by `user_id`
    ///
    /// # Errors
    /// `NotFound` if it does not exist or belongs to someone else
    pub async fn get_comic(&self, user_id: &str, comic_id: &str) -> Result<Comic, AppError> {
        self.db
            .get_comic(comic_id)
            .await?
            .filter(|c| c.user_id == user_id)
            .ok_or(AppError::NotFound)
    }

    /// Stored image entries as public URLs.
    ///
    /// The synchronous flow stores URLs, the background flow storage keys.
    pub fn public_image_urls(&self, comic: &Comic) -> Vec<String> {
        comic
            .image_urls()
            .into_iter()
            .map(|entry| {
                if entry.starts_with("http://") || entry.starts_with("https://") {
                    entry
                } else {
                    self.storage.public_url(self.comics_bucket(), &entry)
                }
            })
            .collect()
    }
}

fn audio_key(user_id: &str, comic_id: &str) -> String {
    format!("{user_id}/{comic_id}/audio.m4a")
}

/// `{user}/{comic}/{n}.png`, panels numbered from 1
fn panel_key(user_id: &str, comic_id: &str, idx: usize) -> String {
    format!("{user_id}/{comic_id}/{}.png", idx + 1)
}

fn reference_filename(path: &str) -> String {
    path.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("reference.png")
        .to_string()
}

fn dedupe_ids(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .take(MAX_STATUS_IDS)
        .map(str::to_string)
        .collect()
}
