//! Subscription webhook handling
//!
//! Maps store lifecycle events onto the profile's subscription columns.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::data::{Database, SubscriptionUpdate};
use crate::error::AppError;
use crate::metrics::WEBHOOK_EVENTS_TOTAL;

/// `customer_info` block of a webhook event
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerInfo {
    pub original_app_user_id: Option<String>,
}

/// The `event` object of a subscription webhook
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    pub app_user_id: Option<String>,
    pub original_app_user_id: Option<String>,
    /// `TRIAL`, `NORMAL`, `INTRO`, ...
    pub period_type: Option<String>,
    pub expiration_at_ms: Option<i64>,
    pub customer_info: Option<CustomerInfo>,
}

/// What the webhook did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionOutcome {
    Updated,
    /// Event was valid but no profile has that id
    ProfileMissing,
    Unhandled,
}

impl SubscriptionEvent {
    /// Profile update for this event, `None` for event types we ignore.
    ///
    /// # Errors
    /// `Validation` if a purchase-type event carries no `period_type`
    pub fn to_update(&self) -> Result<Option<SubscriptionUpdate>, AppError> {
        let update = match self.event_type.as_str() {
            "INITIAL_PURCHASE" | "RENEWAL" | "UNCANCELLATION" => {
                let period_type = self
                    .period_type
                    .as_deref()
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| {
                        AppError::Validation("period_type is required".to_string())
                    })?;

                SubscriptionUpdate {
                    subscription_status: period_type.to_lowercase(),
                    write_trial_ends_at: true,
                    trial_ends_at: self.expiration_at_ms.and_then(DateTime::<Utc>::from_timestamp_millis),
                    revenuecat_customer_id: self.customer_id(),
                }
            }
            "CANCELLATION" => SubscriptionUpdate {
                subscription_status: "cancelled".to_string(),
                ..Default::default()
            },
            "EXPIRATION" => SubscriptionUpdate {
                subscription_status: "free".to_string(),
                ..Default::default()
            },
            _ => return Ok(None),
        };

        Ok(Some(update))
    }

    fn customer_id(&self) -> Option<String> {
        self.customer_info
            .as_ref()
            .and_then(|info| info.original_app_user_id.clone())
            .or_else(|| self.original_app_user_id.clone())
            .or_else(|| self.app_user_id.clone())
    }

    fn metric_label(&self) -> &'static str {
        match self.event_type.as_str() {
            "INITIAL_PURCHASE" => "initial_purchase",
            "RENEWAL" => "renewal",
            "UNCANCELLATION" => "uncancellation",
            "CANCELLATION" => "cancellation",
            "EXPIRATION" => "expiration",
            _ => "unhandled",
        }
    }
}

/// Subscription service
pub struct SubscriptionService {
    db: Arc<Database>,
}

impl SubscriptionService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Apply one webhook event.
    ///
    /// # Errors
    /// `Validation` when `app_user_id` is missing
    pub async fn handle_event(
        &self,
        event: &SubscriptionEvent,
    ) -> Result<SubscriptionOutcome, AppError> {
        let user_id = event
            .app_user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AppError::Validation("No app_user_id provided in webhook.".to_string())
            })?;

        WEBHOOK_EVENTS_TOTAL
            .with_label_values(&[event.metric_label()])
            .inc();

        let Some(update) = event.to_update()? else {
            tracing::info!(event_type = %event.event_type, "Received unhandled event type");
            return Ok(SubscriptionOutcome::Unhandled);
        };

        if self.db.apply_subscription_update(user_id, &update).await? {
            tracing::info!(
                user_id,
                event_type = %event.event_type,
                status = %update.subscription_status,
                "Subscription updated"
            );
            Ok(SubscriptionOutcome::Updated)
        } else {
            tracing::warn!(
                user_id,
                event_type = %event.event_type,
                "Subscription event for unknown profile"
            );
            Ok(SubscriptionOutcome::ProfileMissing)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> SubscriptionEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn purchase_sets_period_trial_end_and_customer() {
        let update = event(json!({
            "type": "INITIAL_PURCHASE",
            "app_user_id": "user-1",
            "period_type": "TRIAL",
            "expiration_at_ms": 1_767_225_600_000_i64,
            "customer_info": {"original_app_user_id": "$RCAnonymousID:abc"}
        }))
        .to_update()
        .unwrap()
        .unwrap();

        assert_eq!(update.subscription_status, "trial");
        assert!(update.write_trial_ends_at);
        assert_eq!(
            update.trial_ends_at.unwrap().to_rfc3339(),
            "2026-01-01T00:00:00+00:00"
        );
        assert_eq!(
            update.revenuecat_customer_id.as_deref(),
            Some("$RCAnonymousID:abc")
        );
    }

    #[test]
    fn renewal_without_expiration_clears_trial_end() {
        let update = event(json!({
            "type": "RENEWAL",
            "app_user_id": "user-1",
            "original_app_user_id": "rc-original",
            "period_type": "NORMAL"
        }))
        .to_update()
        .unwrap()
        .unwrap();

        assert_eq!(update.subscription_status, "normal");
        assert!(update.write_trial_ends_at);
        assert_eq!(update.trial_ends_at, None);
        assert_eq!(update.revenuecat_customer_id.as_deref(), Some("rc-original"));
    }

    #[test]
    fn customer_id_falls_back_to_app_user_id() {
        let update = event(json!({
            "type": "UNCANCELLATION",
            "app_user_id": "user-1",
            "period_type": "normal"
        }))
        .to_update()
        .unwrap()
        .unwrap();

        assert_eq!(update.revenuecat_customer_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn cancellation_and_expiration_only_touch_status() {
        let cancelled = event(json!({"type": "CANCELLATION", "app_user_id": "u"}))
            .to_update()
            .unwrap()
            .unwrap();
        assert_eq!(cancelled.subscription_status, "cancelled");
        assert!(!cancelled.write_trial_ends_at);
        assert_eq!(cancelled.revenuecat_customer_id, None);

        let expired = event(json!({"type": "EXPIRATION", "app_user_id": "u"}))
            .to_update()
            .unwrap()
            .unwrap();
        assert_eq!(expired.subscription_status, "free");
    }

    #[test]
    fn unknown_type_is_unhandled() {
        let update = event(json!({"type": "BILLING_ISSUE", "app_user_id": "u"}))
            .to_update()
            .unwrap();
        assert!(update.is_none());
    }

    #[test]
    fn purchase_without_period_type_is_rejected() {
        let result = event(json!({"type": "RENEWAL", "app_user_id": "u"})).to_update();
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
