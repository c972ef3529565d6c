//! Subscription webhook endpoint

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, header::AUTHORIZATION},
};

use super::dto::SubscriptionWebhook;
use crate::AppState;
use crate::auth::verify_shared_secret;
use crate::error::AppError;
use crate::metrics::HTTP_REQUEST_DURATION_SECONDS;
use crate::service::{SubscriptionOutcome, SubscriptionService};

/// POST /functions/v1/subscription
///
/// The store sends the shared secret verbatim as the `Authorization` header.
/// The body is only parsed after the secret checks out.
pub async fn subscription_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/functions/v1/subscription"])
        .start_timer();

    let presented = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();
    if !verify_shared_secret(presented, &state.config.auth.webhook_secret) {
        tracing::warn!("Unauthorized webhook attempt");
        return Err(AppError::Unauthorized);
    }

    let payload: SubscriptionWebhook = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid webhook body: {e}")))?;

    let service = SubscriptionService::new(state.db.clone());
    match service.handle_event(&payload.event).await? {
        SubscriptionOutcome::Unhandled => Ok("OK: Unhandled event type"),
        SubscriptionOutcome::Updated | SubscriptionOutcome::ProfileMissing => Ok("OK"),
    }
}
