//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub openai: OpenAiConfig,
    pub auth: AuthConfig,
    pub generation: GenerationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "api.dreamtoon.app")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
    /// Largest accepted request body (audio uploads included)
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://api.dreamtoon.app"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Blob storage backend selector
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    /// Cloudflare R2 through the S3 API
    R2,
    /// Plain directory on local disk
    #[default]
    Local,
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,
    /// Bucket holding panels, audio and stitched strips
    pub comics_bucket: String,
    /// Bucket holding generated avatars
    pub avatars_bucket: String,
    /// Public URL base; objects resolve to `{public_url}/{bucket}/{key}`
    pub public_url: String,
    /// Root directory for the local backend
    pub local_root: PathBuf,
    #[serde(default)]
    pub r2: R2Config,
}

/// Cloudflare R2 credentials
#[derive(Debug, Clone, Deserialize, Default)]
pub struct R2Config {
    pub account_id: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// OpenAI configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// API root, e.g. "https://api.openai.com"
    pub base_url: String,
    /// Sent as `OpenAI-Project` when present
    pub project_id: Option<String>,
    pub chat_model: String,
    pub image_model: String,
    pub avatar_model: String,
    pub transcription_model: String,
    pub moderation_model: String,
    /// e.g. "1024x1024"
    pub image_size: String,
    /// e.g. "standard"
    pub image_quality: String,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Auth provider root, e.g. "https://<ref>.supabase.co"
    pub provider_url: String,
    /// Public key sent as `apikey` on user lookups
    pub anon_key: String,
    /// Privileged key used for admin calls (user deletion)
    pub service_role_key: String,
    /// Shared secret expected verbatim in the subscription webhook `Authorization` header
    pub webhook_secret: String,
    /// Optional shared secret for the signup hook
    pub hook_secret: Option<String>,
}

/// Comic generation limits and defaults
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    pub min_panels: usize,
    pub max_panels: usize,
    /// Panels rendered at once by the background worker
    pub panel_concurrency: usize,
    pub cost_cents_per_panel: i64,
    /// Largest panel image `stitch_panels` will download
    pub max_panel_bytes: usize,
    pub default_character_design: String,
    /// Log transcripts and storyboards
    pub debug: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (DREAMTOON__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.protocol", "http")?
            .set_default("server.domain", "localhost")?
            .set_default("server.max_body_bytes", 25 * 1024 * 1024)?
            .set_default("database.path", "data/dreamtoon.db")?
            .set_default("storage.backend", "local")?
            .set_default("storage.comics_bucket", "comics")?
            .set_default("storage.avatars_bucket", "avatars")?
            .set_default("storage.public_url", "http://localhost:8080/files")?
            .set_default("storage.local_root", "data/blobs")?
            .set_default("openai.base_url", "https://api.openai.com")?
            .set_default("openai.chat_model", "gpt-4o")?
            .set_default("openai.image_model", "dall-e-3")?
            .set_default("openai.avatar_model", "gpt-image-1")?
            .set_default("openai.transcription_model", "whisper-1")?
            .set_default("openai.moderation_model", "omni-moderation-latest")?
            .set_default("openai.image_size", "1024x1024")?
            .set_default("openai.image_quality", "standard")?
            .set_default("generation.min_panels", 1)?
            .set_default("generation.max_panels", 6)?
            .set_default("generation.panel_concurrency", 2)?
            .set_default("generation.cost_cents_per_panel", 5)?
            .set_default("generation.max_panel_bytes", 10 * 1024 * 1024)?
            .set_default(
                "generation.default_character_design",
                DEFAULT_CHARACTER_DESIGN,
            )?
            .set_default("generation.debug", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (DREAMTOON__*)
            .add_source(
                Environment::with_prefix("DREAMTOON")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    pub(crate) fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        let generation = &self.generation;
        if generation.min_panels == 0 || generation.min_panels > generation.max_panels {
            return Err(AppError::Config(format!(
                "generation.min_panels ({}) must be between 1 and generation.max_panels ({})",
                generation.min_panels, generation.max_panels
            )));
        }

        if generation.panel_concurrency == 0 {
            return Err(AppError::Config(
                "generation.panel_concurrency must be greater than 0".to_string(),
            ));
        }

        if generation.max_panel_bytes == 0 {
            return Err(AppError::Config(
                "generation.max_panel_bytes must be greater than 0".to_string(),
            ));
        }

        if self.auth.webhook_secret.trim().is_empty() {
            return Err(AppError::Config(
                "auth.webhook_secret must not be empty".to_string(),
            ));
        }

        if self.storage.backend == StorageBackendKind::R2 && self.storage.r2.account_id.is_empty() {
            return Err(AppError::Config(
                "storage.r2.account_id is required when storage.backend=r2".to_string(),
            ));
        }

        if !is_local_server_domain(&self.server.domain)
            && !self.server.protocol.eq_ignore_ascii_case("https")
        {
            return Err(AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

/// Character design used when a profile has none.
pub const DEFAULT_CHARACTER_DESIGN: &str =
    "A friendly character with expressive features, drawn in a modern cartoon style.";

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
