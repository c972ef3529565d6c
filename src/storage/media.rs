//! Blob storage for comic panels, audio and avatars
//!
//! Objects are addressed by `(bucket, key)`. Production uses Cloudflare R2
//! through the S3 API; development and tests use a plain directory.

use std::path::{Component, Path, PathBuf};

use aws_sdk_s3::Client as S3Client;

use crate::config::{StorageBackendKind, StorageConfig};
use crate::error::AppError;
use crate::metrics::{STORAGE_BYTES_UPLOADED, STORAGE_UPLOADS_TOTAL};

enum Backend {
    R2(S3Client),
    Local(PathBuf),
}

/// Media storage service
///
/// Uploads blobs and returns their public URLs.
pub struct MediaStorage {
    backend: Backend,
    /// Public URL base, e.g. "https://media.dreamtoon.app"
    public_url: String,
}

impl MediaStorage {
    /// Create the storage client selected by `storage.backend`
    ///
    /// # Errors
    /// Returns error if the local root cannot be created
    pub async fn new(config: &StorageConfig) -> Result<Self, AppError> {
        let backend = match config.backend {
            StorageBackendKind::R2 => Backend::R2(build_r2_client(config)),
            StorageBackendKind::Local => {
                tokio::fs::create_dir_all(&config.local_root)
                    .await
                    .map_err(|e| {
                        AppError::Storage(format!(
                            "failed to create storage root {}: {}",
                            config.local_root.display(),
                            e
                        ))
                    })?;
                Backend::Local(config.local_root.clone())
            }
        };

        Ok(Self {
            backend,
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }

    /// Upload a blob
    ///
    /// # Returns
    /// Public URL for the uploaded object
    ///
    /// # Example
    /// ```ignore
    /// let url = storage.upload("comics", "user/comic/1.png", png, "image/png").await?;
    /// // Returns: https://media.dreamtoon.app/comics/user/comic/1.png
    /// ```
    pub async fn upload(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<String, AppError> {
        validate_key(key)?;
        let size = data.len();

        match &self.backend {
            Backend::R2(client) => {
                use aws_sdk_s3::primitives::ByteStream;

                client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(ByteStream::from(data))
                    .content_type(content_type)
                    .cache_control("public, max-age=31536000")
                    .send()
                    .await
                    .map_err(|e| AppError::Storage(format!("R2 upload failed: {}", e)))?;
            }
            Backend::Local(root) => {
                let path = local_path(root, bucket, key);
                if let Some(parent) = path.parent() {
                    tokio::fs::create_dir_all(parent).await.map_err(|e| {
                        AppError::Storage(format!("local upload failed: {}", e))
                    })?;
                }
                tokio::fs::write(&path, data)
                    .await
                    .map_err(|e| AppError::Storage(format!("local upload failed: {}", e)))?;
            }
        }

        STORAGE_UPLOADS_TOTAL.with_label_values(&[bucket]).inc();
        STORAGE_BYTES_UPLOADED.inc_by(size as f64);
        tracing::debug!(bucket, key, size, content_type, "Object uploaded");

        Ok(self.public_url(bucket, key))
    }

    /// Read a blob back
    ///
    /// # Errors
    /// `NotFound` if the object does not exist
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Vec<u8>, AppError> {
        validate_key(key)?;

        match &self.backend {
            Backend::R2(client) => {
                let object = client
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| {
                        let not_found = e
                            .as_service_error()
                            .map(|service| service.is_no_such_key())
                            .unwrap_or(false);
                        if not_found {
                            AppError::NotFound
                        } else {
                            AppError::Storage(format!("R2 download failed: {}", e))
                        }
                    })?;

                let bytes = object
                    .body
                    .collect()
                    .await
                    .map_err(|e| AppError::Storage(format!("R2 download failed: {}", e)))?;
                Ok(bytes.into_bytes().to_vec())
            }
            Backend::Local(root) => match tokio::fs::read(local_path(root, bucket, key)).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AppError::NotFound),
                Err(e) => Err(AppError::Storage(format!("local download failed: {}", e))),
            },
        }
    }

    /// Delete a blob; deleting a missing object is not an error
    pub async fn delete(&self, bucket: &str, key: &str) -> Result<(), AppError> {
        validate_key(key)?;

        match &self.backend {
            Backend::R2(client) => {
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(|e| AppError::Storage(format!("R2 delete failed: {}", e)))?;
            }
            Backend::Local(root) => match tokio::fs::remove_file(local_path(root, bucket, key)).await
            {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(AppError::Storage(format!("local delete failed: {}", e))),
            },
        }

        Ok(())
    }

    /// Public URL for an object
    pub fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, bucket, key)
    }

    /// Inverse of [`Self::public_url`]; plain keys are passed through.
    ///
    /// # Returns
    /// `None` for URLs that point somewhere else
    pub fn key_for(&self, bucket: &str, url_or_key: &str) -> Option<String> {
        if !url_or_key.contains("://") {
            return Some(url_or_key.to_string());
        }
        url_or_key
            .strip_prefix(&format!("{}/{}/", self.public_url, bucket))
            .filter(|key| !key.is_empty())
            .map(str::to_string)
    }
}

fn build_r2_client(config: &StorageConfig) -> S3Client {
    use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

    // R2 endpoint: https://{account_id}.r2.cloudflarestorage.com
    let endpoint = format!("https://{}.r2.cloudflarestorage.com", config.r2.account_id);

    let credentials = Credentials::new(
        &config.r2.access_key_id,
        &config.r2.secret_access_key,
        None,
        None,
        "dreamtoon-r2",
    );

    let s3_config = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .http_client(super::build_r2_http_client())
        .region(Region::new("auto"))
        .endpoint_url(&endpoint)
        .credentials_provider(credentials)
        .build();

    S3Client::from_conf(s3_config)
}

/// Keys are opaque, but must stay inside their bucket.
fn validate_key(key: &str) -> Result<(), AppError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || Path::new(key)
            .components()
            .any(|component| !matches!(component, Component::Normal(_)));

    if invalid {
        return Err(AppError::Validation(format!("invalid object key: {key}")));
    }
    Ok(())
}

/// Whether `key` lives under the `{owner}/` prefix and stays there.
pub fn is_owned_key(owner: &str, key: &str) -> bool {
    let owner = owner.trim();
    !owner.is_empty()
        && key
            .strip_prefix(owner)
            .and_then(|rest| rest.strip_prefix('/'))
            .is_some_and(|rest| !rest.is_empty())
        && validate_key(key).is_ok()
}

fn local_path(root: &Path, bucket: &str, key: &str) -> PathBuf {
    root.join(bucket).join(key)
}
