//! SQLite database operations
//!
//! All database access goes through this module.

use chrono::{DateTime, Utc};
use sqlx::{Pool, QueryBuilder, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    // =========================================================================
    // Profiles
    // =========================================================================

    /// Insert a profile unless one already exists for the same user.
    ///
    /// # Returns
    /// `true` if inserted, `false` if the profile already existed.
    pub async fn insert_profile_if_absent(&self, profile: &Profile) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            INSERT INTO profiles (
                id, name, character_design, subscription_status, trial_ends_at,
                revenuecat_customer_id, display_avatar_path, avatar_style,
                last_avatar_created_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&profile.id)
        .bind(&profile.name)
        .bind(&profile.character_design)
        .bind(&profile.subscription_status)
        .bind(profile.trial_ends_at)
        .bind(&profile.revenuecat_customer_id)
        .bind(&profile.display_avatar_path)
        .bind(&profile.avatar_style)
        .bind(profile.last_avatar_created_at)
        .bind(profile.created_at)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_profile(&self, id: &str) -> Result<Option<Profile>, AppError> {
        let profile = sqlx::query_as::<_, Profile>("SELECT * FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(profile)
    }

    /// Apply a subscription webhook update.
    ///
    /// # Returns
    /// `true` if a profile row was updated.
    pub async fn apply_subscription_update(
        &self,
        id: &str,
        update: &SubscriptionUpdate,
    ) -> Result<bool, AppError> {
        let mut query = QueryBuilder::<Sqlite>::new("UPDATE profiles SET subscription_status = ");
        query.push_bind(&update.subscription_status);

        if update.write_trial_ends_at {
            query.push(", trial_ends_at = ");
            query.push_bind(update.trial_ends_at);
        }
        if let Some(customer_id) = &update.revenuecat_customer_id {
            query.push(", revenuecat_customer_id = ");
            query.push_bind(customer_id);
        }

        query.push(", updated_at = ");
        query.push_bind(Utc::now());
        query.push(" WHERE id = ");
        query.push_bind(id);

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    /// Point the profile at a freshly finalized avatar.
    pub async fn set_display_avatar(
        &self,
        id: &str,
        avatar_path: &str,
        style: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET display_avatar_path = ?, avatar_style = ?, last_avatar_created_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(avatar_path)
        .bind(style)
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn delete_profile(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Comics
    // =========================================================================

    pub async fn insert_comic(&self, comic: &Comic) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO comics (
                id, user_id, title, transcript, status, panel_count, storyboard,
                image_urls, cost_cents, error_message, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&comic.id)
        .bind(&comic.user_id)
        .bind(&comic.title)
        .bind(&comic.transcript)
        .bind(&comic.status)
        .bind(comic.panel_count)
        .bind(&comic.storyboard)
        .bind(&comic.image_urls)
        .bind(comic.cost_cents)
        .bind(&comic.error_message)
        .bind(comic.created_at)
        .bind(comic.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_comic(&self, id: &str) -> Result<Option<Comic>, AppError> {
        let comic = sqlx::query_as::<_, Comic>("SELECT * FROM comics WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(comic)
    }

    /// Newest first
    pub async fn list_comics_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<Comic>, AppError> {
        let comics = sqlx::query_as::<_, Comic>(
            "SELECT * FROM comics WHERE user_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(user_id)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(comics)
    }

    /// Fetch the subset of `ids` that belong to `user_id`.
    pub async fn get_comics_by_ids(
        &self,
        user_id: &str,
        ids: &[String],
    ) -> Result<Vec<Comic>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM comics WHERE user_id = ");
        query.push_bind(user_id);
        query.push(" AND id IN (");
        let mut separated = query.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");

        let comics = query
            .build_query_as::<Comic>()
            .fetch_all(&self.pool)
            .await?;

        Ok(comics)
    }

    pub async fn set_comic_title(&self, id: &str, title: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE comics SET title = ?, updated_at = ? WHERE id = ?")
            .bind(title)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Move a pending comic to `complete`.
    pub async fn complete_comic(
        &self,
        id: &str,
        image_paths: &[String],
        panel_count: i64,
        storyboard: &serde_json::Value,
        cost_cents: i64,
    ) -> Result<(), AppError> {
        let image_urls =
            serde_json::to_string(image_paths).map_err(|e| AppError::Internal(e.into()))?;

        sqlx::query(
            r#"
            UPDATE comics
            SET status = 'complete', image_urls = ?, panel_count = ?, storyboard = ?,
                cost_cents = ?, error_message = NULL, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(image_urls)
        .bind(panel_count)
        .bind(storyboard.to_string())
        .bind(cost_cents)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn fail_comic(&self, id: &str, message: &str) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE comics SET status = 'error', error_message = ?, updated_at = ? WHERE id = ?",
        )
        .bind(message)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_comics_for_user(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM comics WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Avatars & unlocked styles
    // =========================================================================

    pub async fn insert_avatar(&self, avatar: &Avatar) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO avatars (id, user_id, style, avatar_path, original_photo_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&avatar.id)
        .bind(&avatar.user_id)
        .bind(&avatar.style)
        .bind(&avatar.avatar_path)
        .bind(&avatar.original_photo_path)
        .bind(avatar.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_avatars_for_user(&self, user_id: &str) -> Result<Vec<Avatar>, AppError> {
        let avatars = sqlx::query_as::<_, Avatar>(
            "SELECT * FROM avatars WHERE user_id = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(avatars)
    }

    pub async fn delete_avatars_for_user(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM avatars WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Idempotent; the first unlock time is kept.
    pub async fn unlock_style(&self, user_id: &str, style: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO unlocked_styles (user_id, style, unlocked_at)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id, style) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(style)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn list_unlocked_styles(&self, user_id: &str) -> Result<Vec<UnlockedStyle>, AppError> {
        let styles = sqlx::query_as::<_, UnlockedStyle>(
            "SELECT * FROM unlocked_styles WHERE user_id = ? ORDER BY style",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(styles)
    }

    pub async fn delete_unlocked_styles_for_user(&self, user_id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM unlocked_styles WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
