//! In-process stand-in for the AI provider, the auth provider and remote
//! image hosts.
//!
//! Behaviour is steered through [`UpstreamState`]; every call is recorded so
//! tests can assert on what the server sent.

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64_STANDARD};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::{Value, json};
use tokio::net::TcpListener;

pub const SERVICE_ROLE_KEY: &str = "service-role-key";
pub const ANON_KEY: &str = "anon-key";

/// Knobs and recordings shared with the fake handlers
pub struct UpstreamState {
    /// bearer token → (user id, email)
    pub users: Mutex<HashMap<String, (String, String)>>,
    /// JSON object returned as the chat completion content
    pub chat_reply: Mutex<Value>,
    /// Request bodies of every chat completion
    pub chat_requests: Mutex<Vec<Value>>,
    /// Image prompts containing this text fail with 500
    pub fail_prompt_containing: Mutex<Option<String>>,
    /// Prompts of every image generation
    pub image_prompts: Mutex<Vec<String>>,
    pub image_edits: AtomicUsize,
    pub transcriptions: AtomicUsize,
    pub transcript: Mutex<String>,
    pub moderation_scores: Mutex<Value>,
    pub deleted_users: Mutex<Vec<String>>,
    /// When set, admin deletion fails with this message
    pub delete_user_error: Mutex<Option<String>>,
}

impl Default for UpstreamState {
    fn default() -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            chat_reply: Mutex::new(storyboard_reply(4)),
            chat_requests: Mutex::new(Vec::new()),
            fail_prompt_containing: Mutex::new(None),
            image_prompts: Mutex::new(Vec::new()),
            image_edits: AtomicUsize::new(0),
            transcriptions: AtomicUsize::new(0),
            transcript: Mutex::new("I was flying over a city made of candy".to_string()),
            moderation_scores: Mutex::new(json!({"violence": 0.01, "hate": 0.0})),
            deleted_users: Mutex::new(Vec::new()),
            delete_user_error: Mutex::new(None),
        }
    }
}

/// Storyboard reply with `panels` numbered scenes
pub fn storyboard_reply(panels: usize) -> Value {
    let panels: Vec<Value> = (0..panels)
        .map(|i| {
            json!({
                "description": format!("Scene {} of the dream", i + 1),
                "speech": if i == 0 { "Where am I?" } else { "" },
                "reference_guidance": "In the distinct style of the provided main character reference image",
                "composition": "Wide shot",
                "action_and_emotion": format!("Action beat {}", i + 1),
                "setting_and_lighting": "Candy city at dusk",
                "negative_prompt": "crying"
            })
        })
        .collect();

    json!({
        "status": "success",
        "title": "Candy Flight",
        "style": "Bright watercolour comic",
        "character_sheet": "Short curly hair, yellow raincoat",
        "panels": panels
    })
}

/// Solid-colour PNG
pub fn png(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Running fake upstream
pub struct FakeUpstream {
    pub addr: SocketAddr,
    pub state: Arc<UpstreamState>,
}

impl FakeUpstream {
    pub async fn start() -> Self {
        let state = Arc::new(UpstreamState::default());

        let app = Router::new()
            .route("/auth/v1/user", get(auth_user))
            .route("/auth/v1/admin/users/:id", delete(admin_delete_user))
            .route("/v1/chat/completions", post(chat_completions))
            .route("/v1/images/generations", post(image_generations))
            .route("/v1/images/edits", post(image_edits))
            .route("/v1/audio/transcriptions", post(transcriptions))
            .route("/v1/moderations", post(moderations))
            .route("/images/:name", get(remote_image))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Register a bearer token for `user_id`
    pub fn add_user(&self, token: &str, user_id: &str) {
        self.state.users.lock().unwrap().insert(
            token.to_string(),
            (user_id.to_string(), format!("{user_id}@example.com")),
        );
    }

    pub fn set_chat_reply(&self, reply: Value) {
        *self.state.chat_reply.lock().unwrap() = reply;
    }

    pub fn fail_prompts_containing(&self, needle: &str) {
        *self.state.fail_prompt_containing.lock().unwrap() = Some(needle.to_string());
    }

    pub fn set_moderation_scores(&self, scores: Value) {
        *self.state.moderation_scores.lock().unwrap() = scores;
    }

    pub fn image_prompts(&self) -> Vec<String> {
        self.state.image_prompts.lock().unwrap().clone()
    }

    pub fn chat_requests(&self) -> Vec<Value> {
        self.state.chat_requests.lock().unwrap().clone()
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn generated_image() -> Value {
    json!({"data": [{"b64_json": BASE64_STANDARD.encode(png(16, 16, [200, 120, 40, 255]))}]})
}

async fn drain(mut multipart: Multipart) {
    while let Ok(Some(field)) = multipart.next_field().await {
        let _ = field.bytes().await;
    }
}

async fn auth_user(State(state): State<Arc<UpstreamState>>, headers: HeaderMap) -> Response {
    if headers.get("apikey").is_none() {
        return (StatusCode::BAD_REQUEST, Json(json!({"msg": "apikey missing"}))).into_response();
    }
    let users = state.users.lock().unwrap();
    match bearer(&headers).and_then(|token| users.get(token)) {
        Some((id, email)) => Json(json!({"id": id, "email": email, "aud": "authenticated"})).into_response(),
        None => (StatusCode::UNAUTHORIZED, Json(json!({"msg": "invalid JWT"}))).into_response(),
    }
}

async fn admin_delete_user(
    State(state): State<Arc<UpstreamState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if bearer(&headers) != Some(SERVICE_ROLE_KEY) {
        return (StatusCode::FORBIDDEN, Json(json!({"msg": "not admin"}))).into_response();
    }
    if let Some(message) = state.delete_user_error.lock().unwrap().clone() {
        return (StatusCode::NOT_FOUND, Json(json!({"msg": message}))).into_response();
    }
    state.deleted_users.lock().unwrap().push(id);
    Json(json!({})).into_response()
}

async fn chat_completions(
    State(state): State<Arc<UpstreamState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state.chat_requests.lock().unwrap().push(body);
    let content = state.chat_reply.lock().unwrap().to_string();
    Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]}))
}

async fn image_generations(
    State(state): State<Arc<UpstreamState>>,
    Json(body): Json<Value>,
) -> Response {
    let prompt = body["prompt"].as_str().unwrap_or_default().to_string();
    state.image_prompts.lock().unwrap().push(prompt.clone());

    let failing = state.fail_prompt_containing.lock().unwrap().clone();
    if failing.is_some_and(|needle| prompt.contains(&needle)) {
        return (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "boom"}))).into_response();
    }
    Json(generated_image()).into_response()
}

async fn image_edits(State(state): State<Arc<UpstreamState>>, multipart: Multipart) -> Json<Value> {
    drain(multipart).await;
    state.image_edits.fetch_add(1, Ordering::SeqCst);
    Json(generated_image())
}

async fn transcriptions(
    State(state): State<Arc<UpstreamState>>,
    multipart: Multipart,
) -> Json<Value> {
    drain(multipart).await;
    state.transcriptions.fetch_add(1, Ordering::SeqCst);
    let text = state.transcript.lock().unwrap().clone();
    Json(json!({"text": text}))
}

async fn moderations(State(state): State<Arc<UpstreamState>>) -> Json<Value> {
    let scores = state.moderation_scores.lock().unwrap().clone();
    Json(json!({"results": [{"flagged": false, "category_scores": scores}]}))
}

async fn remote_image(Path(name): Path<String>) -> Response {
    if name.starts_with("missing") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let shade = name.bytes().fold(0u8, |acc, b| acc.wrapping_add(b));
    (
        [("content-type", "image/png")],
        png(32, 24, [shade, 80, 160, 255]),
    )
        .into_response()
}
