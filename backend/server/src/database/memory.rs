use std::collections::HashMap;

use async_trait::async_trait;
use caldate_payloads::{ValidProfile, posts::NewPost};
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    DeletedUser, PhotoRecord, PostRecord, ProfileStore, StoreError, UserRecord, sort_photos,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, UserRecord>,
    identities: HashMap<String, Uuid>,
    handles: HashMap<String, Uuid>,
    photos: HashMap<Uuid, Vec<PhotoRecord>>,
    photo_order: HashMap<Uuid, i64>,
    posts: HashMap<Uuid, Vec<PostRecord>>,
}

/// Single-lock store; every operation is atomic with respect to the others.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn find_by_identity(&self, external_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read().await;

        Ok(tables
            .identities
            .get(external_id)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<UserRecord>, StoreError> {
        let tables = self.tables.read().await;

        Ok(tables
            .handles
            .get(handle)
            .and_then(|id| tables.users.get(id))
            .cloned())
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.tables.read().await.users.get(&user_id).cloned())
    }

    async fn create_user(&self, external_id: &str, email: &str) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .identities
            .get(external_id)
            .and_then(|id| tables.users.get(id))
        {
            return Ok(existing.clone());
        }

        let user = UserRecord::new(external_id, email);
        tables.identities.insert(external_id.to_string(), user.id);
        tables.users.insert(user.id, user.clone());

        Ok(user)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        profile: &ValidProfile,
    ) -> Result<UserRecord, StoreError> {
        let mut tables = self.tables.write().await;

        if tables
            .handles
            .get(&profile.username)
            .is_some_and(|owner| *owner != user_id)
        {
            return Err(StoreError::HandleTaken);
        }

        let mut user = tables
            .users
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::UserNotFound)?;

        if let Some(old) = user.username.as_ref().filter(|old| **old != profile.username) {
            tables.handles.remove(old);
        }
        tables.handles.insert(profile.username.clone(), user_id);

        user.apply(profile);
        tables.users.insert(user_id, user.clone());

        Ok(user)
    }

    async fn set_avatar(&self, user_id: Uuid, url: Option<&str>) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(StoreError::UserNotFound)?;

        user.avatar_url = url.map(str::to_string);
        user.updated_at = Utc::now();

        Ok(())
    }

    async fn photos(&self, user_id: Uuid) -> Result<Vec<PhotoRecord>, StoreError> {
        let mut photos = self
            .tables
            .read()
            .await
            .photos
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        sort_photos(&mut photos);

        Ok(photos)
    }

    async fn add_photo(
        &self,
        user_id: Uuid,
        url: &str,
        max: usize,
    ) -> Result<PhotoRecord, StoreError> {
        let mut tables = self.tables.write().await;

        if tables.photos.get(&user_id).map_or(0, Vec::len) >= max {
            return Err(StoreError::GalleryFull);
        }

        let counter = tables.photo_order.entry(user_id).or_insert(0);
        let order = *counter;
        *counter += 1;

        let photo = PhotoRecord {
            id: Uuid::new_v4(),
            user_id,
            url: url.to_string(),
            order,
            created_at: Utc::now(),
        };
        tables
            .photos
            .entry(user_id)
            .or_default()
            .push(photo.clone());

        Ok(photo)
    }

    async fn find_photo(
        &self,
        user_id: Uuid,
        photo_id: Uuid,
    ) -> Result<Option<PhotoRecord>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .photos
            .get(&user_id)
            .and_then(|photos| photos.iter().find(|p| p.id == photo_id))
            .cloned())
    }

    async fn remove_photo(&self, user_id: Uuid, photo_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(photos) = tables.photos.get_mut(&user_id) else {
            return Ok(false);
        };

        let before = photos.len();
        photos.retain(|p| p.id != photo_id);

        Ok(photos.len() != before)
    }

    async fn posts(&self, user_id: Uuid) -> Result<Vec<PostRecord>, StoreError> {
        let mut posts = self
            .tables
            .read()
            .await
            .posts
            .get(&user_id)
            .cloned()
            .unwrap_or_default();
        posts.sort_by_key(|p| p.created_at);

        Ok(posts)
    }

    async fn add_post(&self, user_id: Uuid, post: &NewPost) -> Result<PostRecord, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::UserNotFound);
        }

        let record = PostRecord::new(user_id, post);
        tables
            .posts
            .entry(user_id)
            .or_default()
            .push(record.clone());

        Ok(record)
    }

    async fn delete_by_identity(
        &self,
        external_id: &str,
    ) -> Result<Option<DeletedUser>, StoreError> {
        let mut tables = self.tables.write().await;

        let Some(user_id) = tables.identities.remove(external_id) else {
            return Ok(None);
        };
        let Some(user) = tables.users.remove(&user_id) else {
            return Ok(None);
        };

        if let Some(handle) = &user.username {
            tables.handles.remove(handle);
        }
        let mut photos = tables.photos.remove(&user_id).unwrap_or_default();
        sort_photos(&mut photos);
        tables.photo_order.remove(&user_id);
        tables.posts.remove(&user_id);

        Ok(Some(DeletedUser { user, photos }))
    }
}
