//! Common test utilities for E2E tests

#![allow(dead_code)]

pub mod upstream;

use std::time::Duration;

use dreamtoon::data::Profile;
use dreamtoon::{AppState, config};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

use upstream::{ANON_KEY, FakeUpstream, SERVICE_ROLE_KEY};

pub const WEBHOOK_SECRET: &str = "rc-webhook-secret";

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub upstream: FakeUpstream,
    pub _temp_dir: TempDir,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server, letting the caller adjust the configuration
    pub async fn with_config(adjust: impl FnOnce(&mut config::AppConfig)) -> Self {
        let upstream = FakeUpstream::start().await;

        // Create temporary directory for database and blobs
        let temp_dir = TempDir::new().unwrap();

        // Bind first so the public URL is known
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let upstream_root = format!("http://{}", upstream.addr);
        let mut config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
                max_body_bytes: 25 * 1024 * 1024,
            },
            database: config::DatabaseConfig {
                path: temp_dir.path().join("test.db"),
            },
            storage: config::StorageConfig {
                backend: config::StorageBackendKind::Local,
                comics_bucket: "comics".to_string(),
                avatars_bucket: "avatars".to_string(),
                public_url: format!("{addr_str}/files"),
                local_root: temp_dir.path().join("blobs"),
                r2: config::R2Config::default(),
            },
            openai: config::OpenAiConfig {
                api_key: "sk-test".to_string(),
                base_url: upstream_root.clone(),
                project_id: Some("proj_test".to_string()),
                chat_model: "gpt-4o".to_string(),
                image_model: "dall-e-3".to_string(),
                avatar_model: "gpt-image-1".to_string(),
                transcription_model: "whisper-1".to_string(),
                moderation_model: "omni-moderation-latest".to_string(),
                image_size: "1024x1024".to_string(),
                image_quality: "standard".to_string(),
            },
            auth: config::AuthConfig {
                provider_url: upstream_root,
                anon_key: ANON_KEY.to_string(),
                service_role_key: SERVICE_ROLE_KEY.to_string(),
                webhook_secret: WEBHOOK_SECRET.to_string(),
                hook_secret: None,
            },
            generation: config::GenerationConfig {
                min_panels: 1,
                max_panels: 6,
                panel_concurrency: 2,
                cost_cents_per_panel: 5,
                max_panel_bytes: 10 * 1024 * 1024,
                default_character_design: config::DEFAULT_CHARACTER_DESIGN.to_string(),
                debug: true,
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };
        adjust(&mut config);

        // Initialize app state
        let state = AppState::new(config).await.unwrap();

        // Create HTTP client
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        let app = dreamtoon::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait a bit for server to start
        tokio::time::sleep(Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            upstream,
            _temp_dir: temp_dir,
            client,
        }
    }

    /// Get base URL for API requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// Functions endpoint URL
    pub fn fn_url(&self, name: &str) -> String {
        self.url(&format!("/functions/v1/{name}"))
    }

    /// Register `user_id` with the fake auth provider and return its token
    pub fn login(&self, user_id: &str) -> String {
        let token = format!("token-{user_id}");
        self.upstream.add_user(&token, user_id);
        token
    }

    /// Insert a signup profile for `user_id`
    pub async fn create_profile(&self, user_id: &str) -> Profile {
        let profile = Profile::new_signup(user_id);
        self.state.db.insert_profile_if_absent(&profile).await.unwrap();
        profile
    }

    /// Poll `/comics/status` until the comic leaves `pending`
    pub async fn wait_for_comic(&self, token: &str, comic_id: &str) -> Value {
        for _ in 0..100 {
            let body: Value = self
                .client
                .post(self.fn_url("comics/status"))
                .bearer_auth(token)
                .json(&serde_json::json!({"ids": [comic_id]}))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();

            let job = body["jobs"][0].clone();
            if job["status"] != "pending" {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("comic {comic_id} still pending");
    }
}
