//! # Profile store
//!
//! One record per user plus an ordered gallery and a list of posts.
//!
//! ## Requirements
//!
//! - Lookups by external identity (every authenticated request)
//! - Lookups by handle (every public page and preview image)
//! - Handles are unique, claimed atomically
//! - At most [`MAX_GALLERY_PHOTOS`](caldate_payloads::uploads::MAX_GALLERY_PHOTOS)
//!   photos per user, checked atomically with the insert
//!
//! ## Implementations
//!
//! - [`RedisStore`]: production store, see its module docs for the layout
//! - [`MemoryStore`]: tests and local runs
use async_trait::async_trait;
use caldate_payloads::{
    Photo, ProfileView, ThemeId, ValidProfile,
    onboarding::{Draft, completeness},
    posts::{NewPost, PostView},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod redis_store;

pub use self::{memory::MemoryStore, redis_store::RedisStore};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Username already taken")]
    HandleTaken,

    #[error("Gallery is full")]
    GalleryFull,

    #[error("User not found")]
    UserNotFound,

    #[error("User record kept changing during an update")]
    Contention,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: Uuid,
    pub external_id: String,
    pub email: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub booking_url: Option<String>,
    pub theme: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub url: String,
    pub order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a cascading delete removed, so blobs can be cleaned up after.
#[derive(Debug, Clone)]
pub struct DeletedUser {
    pub user: UserRecord,
    pub photos: Vec<PhotoRecord>,
}

impl UserRecord {
    pub fn new(external_id: &str, email: &str) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            email: email.to_string(),
            username: None,
            display_name: None,
            bio: None,
            avatar_url: None,
            booking_url: None,
            theme: Some(ThemeId::default().to_string()),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn theme(&self) -> ThemeId {
        ThemeId::resolve(self.theme.as_deref())
    }

    pub fn apply(&mut self, profile: &ValidProfile) {
        self.username = Some(profile.username.clone());
        self.display_name = profile.display_name.clone();
        self.bio = profile.bio.clone();
        self.booking_url = profile.booking_url.clone();
        self.theme = Some(profile.theme.to_string());
        self.updated_at = Utc::now();
    }

    pub fn completeness(&self, photo_count: usize) -> u8 {
        completeness(&Draft {
            username: self.username.as_deref(),
            display_name: self.display_name.as_deref(),
            avatar_url: self.avatar_url.as_deref(),
            bio: self.bio.as_deref(),
            booking_url: self.booking_url.as_deref(),
            photo_count,
        })
    }

    /// Public view; photos must already be in gallery order.
    pub fn view(&self, photos: &[PhotoRecord]) -> ProfileView {
        ProfileView {
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            bio: self.bio.clone(),
            avatar_url: self.avatar_url.clone(),
            booking_url: self.booking_url.clone(),
            theme: self.theme(),
            photos: photos.iter().map(PhotoRecord::photo).collect(),
            completeness: None,
        }
    }
}

impl PhotoRecord {
    pub fn photo(&self) -> Photo {
        Photo {
            id: self.id,
            url: self.url.clone(),
        }
    }
}

impl PostRecord {
    pub fn new(user_id: Uuid, post: &NewPost) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4(),
            user_id,
            title: post.title.clone(),
            content: post.content.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn view(&self) -> PostView {
        PostView {
            id: self.id,
            title: self.title.clone(),
            content: self.content.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub fn sort_photos(photos: &mut [PhotoRecord]) {
    photos.sort_by(|a, b| {
        a.order
            .cmp(&b.order)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_identity(&self, external_id: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_handle(&self, handle: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// Returns the existing user when the identity is already known.
    async fn create_user(&self, external_id: &str, email: &str) -> Result<UserRecord, StoreError>;

    async fn update_profile(
        &self,
        user_id: Uuid,
        profile: &ValidProfile,
    ) -> Result<UserRecord, StoreError>;

    async fn set_avatar(&self, user_id: Uuid, url: Option<&str>) -> Result<(), StoreError>;

    /// Gallery order, ascending.
    async fn photos(&self, user_id: Uuid) -> Result<Vec<PhotoRecord>, StoreError>;

    async fn add_photo(
        &self,
        user_id: Uuid,
        url: &str,
        max: usize,
    ) -> Result<PhotoRecord, StoreError>;

    async fn find_photo(
        &self,
        user_id: Uuid,
        photo_id: Uuid,
    ) -> Result<Option<PhotoRecord>, StoreError>;

    async fn remove_photo(&self, user_id: Uuid, photo_id: Uuid) -> Result<bool, StoreError>;

    async fn posts(&self, user_id: Uuid) -> Result<Vec<PostRecord>, StoreError>;

    async fn add_post(&self, user_id: Uuid, post: &NewPost) -> Result<PostRecord, StoreError>;

    async fn delete_by_identity(
        &self,
        external_id: &str,
    ) -> Result<Option<DeletedUser>, StoreError>;
}
