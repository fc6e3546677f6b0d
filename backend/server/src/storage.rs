//! # Blob storage
//!
//! Avatars and gallery photos live in S3 with public read access. The
//! profile store only keeps the public URL, so deleting a blob means mapping
//! the URL back to its key.
//!
//! ## Keys
//! - `avatars/{user}/{tag}-{file}`
//! - `gallery/{user}/{tag}-{file}`
//!
//! The tag is unique per upload (see [`crate::utils::upload_tag`]), so
//! objects are written once and can be cached as immutable. File names are
//! sanitized before they become part of a key.
use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use aws_sdk_s3::{Client, error::DisplayErrorContext, primitives::ByteStream};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::utils::sanitize_file_name;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to write object {key}: {reason}")]
    Put { key: String, reason: String },

    #[error("Failed to delete object {key}: {reason}")]
    Delete { key: String, reason: String },
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores the bytes and returns their public URL.
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str)
    -> Result<String, StorageError>;

    async fn delete(&self, url: &str) -> Result<(), StorageError>;
}

pub fn avatar_key(user_id: Uuid, tag: &str, file_name: &str) -> String {
    format!("avatars/{user_id}/{tag}-{}", sanitize_file_name(file_name))
}

pub fn gallery_key(user_id: Uuid, tag: &str, file_name: &str) -> String {
    format!("gallery/{user_id}/{tag}-{}", sanitize_file_name(file_name))
}

/// Joins a public base URL and a key.
pub fn public_url(base: &str, key: &str) -> String {
    format!("{}/{key}", base.trim_end_matches('/'))
}

/// Inverse of [`public_url`]; `None` for URLs outside the base.
pub fn key_from_url<'a>(base: &str, url: &'a str) -> Option<&'a str> {
    url.strip_prefix(base.trim_end_matches('/'))?
        .strip_prefix('/')
        .filter(|key| !key.is_empty())
}

pub struct S3BlobStore {
    client: Client,
    bucket: String,
    public_base: String,
}

impl S3BlobStore {
    pub async fn new(bucket: &str, public_base: &str) -> Self {
        let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        info!("Using bucket {bucket}");

        Self {
            client: Client::new(&aws_config),
            bucket: bucket.to_string(),
            public_base: public_base.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .cache_control("public, max-age=31536000, immutable")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|error| StorageError::Put {
                key: key.to_string(),
                reason: DisplayErrorContext(&error).to_string(),
            })?;

        Ok(public_url(&self.public_base, key))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let Some(key) = key_from_url(&self.public_base, url) else {
            warn!("Not deleting {url}, it is outside {}", self.public_base);
            return Ok(());
        };

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map(|_| ())
            .map_err(|error| StorageError::Delete {
                key: key.to_string(),
                reason: DisplayErrorContext(&error).to_string(),
            })
    }
}

/// Keeps blobs in a map; used by tests and memory-backed local runs.
pub struct MemoryBlobStore {
    public_base: String,
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
}

impl MemoryBlobStore {
    pub fn new(public_base: &str) -> Self {
        Self {
            public_base: public_base.to_string(),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn content_type(&self, key: &str) -> Option<String> {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.get(key).map(|(_, content_type)| content_type.clone())
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(key.to_string(), (body, content_type.to_string()));

        Ok(public_url(&self.public_base, key))
    }

    async fn delete(&self, url: &str) -> Result<(), StorageError> {
        let Some(key) = key_from_url(&self.public_base, url) else {
            return Ok(());
        };

        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.remove(key);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://media.cal.date";

    #[test]
    fn test_keys() {
        let user_id = Uuid::nil();
        assert_eq!(
            avatar_key(user_id, "1700000000000-0a1b2c3d", "Me at the beach!.JPG"),
            "avatars/00000000-0000-0000-0000-000000000000/1700000000000-0a1b2c3d-Me-at-the-beach.JPG"
        );
        assert_eq!(
            gallery_key(user_id, "1700000000000-0a1b2c3d", "a.png"),
            "gallery/00000000-0000-0000-0000-000000000000/1700000000000-0a1b2c3d-a.png"
        );
    }

    #[test]
    fn test_url_round_trip() {
        let url = public_url("https://media.cal.date/", "avatars/u/a.png");
        assert_eq!(url, "https://media.cal.date/avatars/u/a.png");
        assert_eq!(key_from_url(BASE, &url), Some("avatars/u/a.png"));
    }

    #[test]
    fn test_foreign_urls() {
        assert_eq!(key_from_url(BASE, "https://elsewhere.com/a.png"), None);
        assert_eq!(key_from_url(BASE, "https://media.cal.date.evil.com/a"), None);
        assert_eq!(key_from_url(BASE, "https://media.cal.date/"), None);
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlobStore::new(BASE);
        let url = store
            .put("gallery/u/1-a.png", vec![1, 2, 3], "image/png")
            .await
            .unwrap();

        assert_eq!(store.keys(), vec!["gallery/u/1-a.png"]);
        assert_eq!(
            store.content_type("gallery/u/1-a.png").as_deref(),
            Some("image/png")
        );

        store.delete(&url).await.unwrap();
        assert!(store.keys().is_empty());
    }
}
