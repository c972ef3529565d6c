//! API layer
//!
//! HTTP handlers for:
//! - Dream and comic endpoints (under `/functions/v1`)
//! - Avatar generation
//! - Auth-provider and store webhooks
//! - Metrics (Prometheus)

mod accounts;
mod avatars;
mod dreams;
mod dto;
mod files;
pub mod metrics;
mod stitch;
mod subscription;

pub use dto::*;
pub use metrics::metrics_router;

use axum::{
    Router,
    extract::FromRequest,
    routing::{any, get, post},
};

use crate::AppState;
use crate::error::AppError;

/// `Json` whose rejections answer in the usual `{"error": ...}` shape
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

/// Create the functions router
///
/// Mounted under `/functions/v1`. Every route except the two webhooks and the
/// `stitch_panels?test=1` health check requires a bearer token.
pub fn functions_router() -> Router<AppState> {
    Router::new()
        .route("/process_dream", post(dreams::process_dream))
        .route("/generate_comic", post(dreams::generate_comic))
        .route("/comics", get(dreams::list_comics))
        .route("/comics/status", post(dreams::comic_statuses))
        .route("/comics/:id", get(dreams::get_comic))
        .route("/stitch_panels", any(stitch::stitch_panels))
        .route("/generate_avatar", post(avatars::generate_avatar))
        .route("/finalize-avatar", post(avatars::finalize_avatar))
        .route("/on-user-created", post(accounts::on_user_created))
        .route("/delete_user", post(accounts::delete_user))
        .route("/subscription", post(subscription::subscription_webhook))
}

/// Serves blobs from the local storage backend at `/files/:bucket/*key`
pub fn files_router() -> Router<AppState> {
    Router::new().route("/files/:bucket/*key", get(files::serve_file))
}
