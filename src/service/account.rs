//! Account service
//!
//! Profile creation on signup and full account deletion.

use std::sync::Arc;

use crate::auth::AuthProvider;
use crate::config::StorageConfig;
use crate::data::{Database, Profile};
use crate::error::AppError;
use crate::storage::{MediaStorage, is_owned_key};

/// Result of the signup hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupOutcome {
    Created,
    AlreadyExists,
}

/// Account service
pub struct AccountService {
    db: Arc<Database>,
    storage: Arc<MediaStorage>,
    buckets: StorageConfig,
    auth: Arc<AuthProvider>,
}

impl AccountService {
    /// Create new account service
    pub fn new(
        db: Arc<Database>,
        storage: Arc<MediaStorage>,
        buckets: StorageConfig,
        auth: Arc<AuthProvider>,
    ) -> Self {
        Self {
            db,
            storage,
            buckets,
            auth,
        }
    }

    /// Create the starter profile for a newly registered user.
    ///
    /// # Errors
    /// `Validation` if the user id is blank
    pub async fn on_user_created(&self, user_id: &str) -> Result<SignupOutcome, AppError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::Validation("record.id is required".to_string()));
        }

        if self.db.insert_profile_if_absent(&Profile::new_signup(user_id)).await? {
            tracing::info!(user_id, "Profile created");
            Ok(SignupOutcome::Created)
        } else {
            tracing::info!(user_id, "Profile already exists");
            Ok(SignupOutcome::AlreadyExists)
        }
    }

    /// Delete every blob and row owned by the user, then the auth user itself.
    ///
    /// Blob removal is best effort; rows are always deleted.
    ///
    /// # Errors
    /// `Validation` carrying the provider message if the auth user cannot be
    /// deleted
    pub async fn delete_user(&self, user_id: &str) -> Result<(), AppError> {
        let user_id = user_id.trim();
        if user_id.is_empty() {
            return Err(AppError::Validation("user_id is required".to_string()));
        }

        let blobs = self.delete_blobs(user_id).await?;
        let comics = self.db.delete_comics_for_user(user_id).await?;
        let avatars = self.db.delete_avatars_for_user(user_id).await?;
        let styles = self.db.delete_unlocked_styles_for_user(user_id).await?;
        let profile = self.db.delete_profile(user_id).await?;

        tracing::info!(
            user_id,
            blobs,
            comics,
            avatars,
            styles,
            profile,
            "User data deleted"
        );

        self.auth.delete_user(user_id).await.map_err(|e| match e {
            AppError::Upstream(message) => AppError::Validation(message),
            other => other,
        })?;

        tracing::info!(user_id, "Auth user deleted");
        Ok(())
    }

    async fn delete_blobs(&self, user_id: &str) -> Result<usize, AppError> {
        let comics_bucket = self.buckets.comics_bucket.as_str();
        let avatars_bucket = self.buckets.avatars_bucket.as_str();
        let mut targets: Vec<(&str, String)> = Vec::new();

        for comic in self.db.list_comics_for_user(user_id, usize::MAX).await? {
            targets.push((comics_bucket, format!("{user_id}/{}/audio.m4a", comic.id)));
            targets.extend(
                comic
                    .image_urls()
                    .iter()
                    .filter_map(|entry| self.storage.key_for(comics_bucket, entry))
                    .map(|key| (comics_bucket, key)),
            );
        }
        for avatar in self.db.list_avatars_for_user(user_id).await? {
            if is_owned_key(user_id, &avatar.avatar_path) {
                targets.push((avatars_bucket, avatar.avatar_path));
            } else {
                tracing::warn!(user_id, path = %avatar.avatar_path, "Skipping avatar outside the user's folder");
            }
        }

        let mut deleted = 0;
        for (bucket, key) in targets {
            match self.storage.delete(bucket, &key).await {
                Ok(()) => deleted += 1,
                Err(error) => tracing::warn!(user_id, bucket, %key, %error, "Failed to delete blob"),
            }
        }
        Ok(deleted)
    }
}
