//! Data models
//!
//! Rust structs representing database rows.
//! Comic and avatar IDs are ULIDs; user IDs are opaque strings issued by
//! the auth provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// ID Types
// =============================================================================

/// Entity ID wrapper (ULID format, 26 characters)
///
/// Example: "01ARZ3NDEKTSV4RRFFQ69G5FAV"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Generate a new ULID
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Profile
// =============================================================================

/// One row per registered user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Profile {
    /// Auth provider user id
    pub id: String,
    pub name: String,
    /// Free-text description fed into every panel prompt
    pub character_design: Option<String>,
    /// free, trial, normal, cancelled
    pub subscription_status: String,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub revenuecat_customer_id: Option<String>,
    /// Key in the avatars bucket
    pub display_avatar_path: Option<String>,
    pub avatar_style: Option<String>,
    pub last_avatar_created_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// Profile created by the signup hook
    pub fn new_signup(id: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            name: "New User".to_string(),
            character_design: Some("Default character design".to_string()),
            subscription_status: "free".to_string(),
            trial_ends_at: None,
            revenuecat_customer_id: None,
            display_avatar_path: None,
            avatar_style: None,
            last_avatar_created_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields written by the subscription webhook
///
/// `None` leaves the column untouched, except `trial_ends_at`, which is
/// written whenever `write_trial_ends_at` is set (so it can be cleared).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub subscription_status: String,
    pub write_trial_ends_at: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub revenuecat_customer_id: Option<String>,
}

// =============================================================================
// Comic
// =============================================================================

/// Lifecycle of a comic row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComicStatus {
    Pending,
    Complete,
    Error,
}

impl ComicStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "complete" => Some(Self::Complete),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// A generated (or in-progress) comic
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comic {
    pub id: String,
    pub user_id: String,
    pub title: Option<String>,
    pub transcript: Option<String>,
    /// pending, complete, error
    pub status: String,
    pub panel_count: i64,
    /// Storyboard JSON as returned by the model
    pub storyboard: Option<String>,
    /// JSON array of panel URLs or storage keys
    pub image_urls: String,
    pub cost_cents: i64,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comic {
    /// Fresh row in the pending state
    pub fn pending(id: &str, user_id: &str, transcript: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            user_id: user_id.to_string(),
            title: None,
            transcript: Some(transcript.to_string()),
            status: ComicStatus::Pending.as_str().to_string(),
            panel_count: 0,
            storyboard: None,
            image_urls: "[]".to_string(),
            cost_cents: 0,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> Option<ComicStatus> {
        ComicStatus::parse(&self.status)
    }

    /// Decode the stored image list; malformed JSON yields an empty list
    pub fn image_urls(&self) -> Vec<String> {
        serde_json::from_str(&self.image_urls).unwrap_or_default()
    }

    pub fn storyboard_json(&self) -> Option<serde_json::Value> {
        self.storyboard
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

// =============================================================================
// Avatar
// =============================================================================

/// A stylised portrait owned by a user
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Avatar {
    pub id: String,
    pub user_id: String,
    pub style: String,
    /// Key in the avatars bucket
    pub avatar_path: String,
    pub original_photo_path: String,
    pub created_at: DateTime<Utc>,
}

/// Style a user has unlocked by finalizing an avatar in it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UnlockedStyle {
    pub user_id: String,
    pub style: String,
    pub unlocked_at: DateTime<Utc>,
}
