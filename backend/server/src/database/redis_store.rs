//! # Redis
//!
//! Primary profile store.
//!
//! ## Layout
//!
//! - `users`: hash, user id -> JSON [`UserRecord`]
//! - `identities`: hash, external identity id -> user id
//! - `handles`: hash, handle -> user id, claimed with HSETNX so two users
//!   can never hold the same handle
//! - `photos:{user}`: hash, photo id -> JSON [`PhotoRecord`]
//! - `photo_order:{user}`: counter handing out gallery positions
//! - `posts:{user}`: hash, post id -> JSON [`PostRecord`]
//!
//! Every write that touches more than one key, or that depends on what it
//! read, runs as a Lua script:
//!
//! - user creation writes the record and the identity index together
//! - profile and avatar updates swap the record only if it is unchanged
//!   since it was read, retrying otherwise; handle claims and releases
//!   happen in the same script
//! - gallery inserts check capacity and insert in one step
//!
//! ## Estimated memory usage
//!
//! ~1 KB per user record, ~250 bytes per photo, so (1 KB + 6 × 250 B) × 50,000
//! users is roughly 125 MB.
use async_trait::async_trait;
use caldate_payloads::{ValidProfile, posts::NewPost};
use chrono::{SecondsFormat, Utc};
use redis::{
    AsyncCommands, Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    DeletedUser, PhotoRecord, PostRecord, ProfileStore, StoreError, UserRecord, sort_photos,
};

pub const USERS: &str = "users";
pub const IDENTITIES: &str = "identities";
pub const HANDLES: &str = "handles";

pub fn photos_key(user_id: Uuid) -> String {
    format!("photos:{user_id}")
}

pub fn photo_order_key(user_id: Uuid) -> String {
    format!("photo_order:{user_id}")
}

pub fn posts_key(user_id: Uuid) -> String {
    format!("posts:{user_id}")
}

// KEYS: photos hash, order counter
// ARGV: max, photo id, user id, url, created at
const ADD_PHOTO: &str = r#"
if redis.call('HLEN', KEYS[1]) >= tonumber(ARGV[1]) then
    return -1
end
local order = redis.call('INCR', KEYS[2]) - 1
local record = cjson.encode({
    id = ARGV[2],
    userId = ARGV[3],
    url = ARGV[4],
    order = order,
    createdAt = ARGV[5],
})
redis.call('HSET', KEYS[1], ARGV[2], record)
return order
"#;

// KEYS: identities hash, users hash
// ARGV: external id, new user id, new record
// Returns the stored record; a dangling identity entry is overwritten.
const CREATE_USER: &str = r#"
local existing = redis.call('HGET', KEYS[1], ARGV[1])
if existing then
    local record = redis.call('HGET', KEYS[2], existing)
    if record then
        return record
    end
end
redis.call('HSET', KEYS[2], ARGV[2], ARGV[3])
redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
return ARGV[3]
"#;

// KEYS: users hash, handles hash
// ARGV: user id, record as read, new record, handle to claim, handle to release
// Returns 1 when swapped, 0 when the record changed, -1 when the handle is taken.
const SWAP_USER: &str = r#"
if redis.call('HGET', KEYS[1], ARGV[1]) ~= ARGV[2] then
    return 0
end
if ARGV[4] ~= '' then
    local holder = redis.call('HGET', KEYS[2], ARGV[4])
    if holder and holder ~= ARGV[1] then
        return -1
    end
    redis.call('HSET', KEYS[2], ARGV[4], ARGV[1])
end
if ARGV[5] ~= '' and ARGV[5] ~= ARGV[4] and redis.call('HGET', KEYS[2], ARGV[5]) == ARGV[1] then
    redis.call('HDEL', KEYS[2], ARGV[5])
end
redis.call('HSET', KEYS[1], ARGV[1], ARGV[3])
return 1
"#;

const MAX_SWAP_ATTEMPTS: usize = 8;

pub async fn init_redis(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let config = ConnectionManagerConfig::new().set_number_of_retries(1);

    let client = Client::open(redis_url)?;
    let connection_manager = client.get_connection_manager_with_config(config).await?;

    info!("Connected to Redis");
    Ok(connection_manager)
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    create_user_script: Script,
    swap_user_script: Script,
    add_photo_script: Script,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            create_user_script: Script::new(CREATE_USER),
            swap_user_script: Script::new(SWAP_USER),
            add_photo_script: Script::new(ADD_PHOTO),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<T>, StoreError> {
        let mut connection = self.connection.clone();
        let raw: Option<String> = connection.hget(key, field).await?;

        Ok(raw.map(|raw| serde_json::from_str(&raw)).transpose()?)
    }

    async fn put_json<T: Serialize>(
        &self,
        key: &str,
        field: &str,
        value: &T,
    ) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let _: () = connection
            .hset(key, field, serde_json::to_string(value)?)
            .await?;

        Ok(())
    }

    async fn all_json<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        let mut connection = self.connection.clone();
        let raw: Vec<String> = connection.hvals(key).await?;

        raw.iter()
            .map(|raw| serde_json::from_str(raw).map_err(StoreError::from))
            .collect()
    }

    async fn resolve(&self, index: &str, field: &str) -> Result<Option<UserRecord>, StoreError> {
        let mut connection = self.connection.clone();
        let user_id: Option<String> = connection.hget(index, field).await?;

        match user_id {
            Some(user_id) => self.get_json(USERS, &user_id).await,
            None => Ok(None),
        }
    }

    /// Read, change, compare-and-swap. `claim` is a handle the new record
    /// takes; the record's previous handle is released in the same step.
    async fn swap_user<F>(
        &self,
        user_id: Uuid,
        claim: Option<&str>,
        change: F,
    ) -> Result<UserRecord, StoreError>
    where
        F: Fn(&mut UserRecord) + Send + Sync,
    {
        let mut connection = self.connection.clone();
        let id = user_id.to_string();

        for _ in 0..MAX_SWAP_ATTEMPTS {
            let raw: Option<String> = connection.hget(USERS, &id).await?;
            let raw = raw.ok_or(StoreError::UserNotFound)?;

            let mut user: UserRecord = serde_json::from_str(&raw)?;
            let release = claim.and_then(|handle| {
                user.username.clone().filter(|old| old.as_str() != handle)
            });
            change(&mut user);

            let swapped: i64 = self
                .swap_user_script
                .key(USERS)
                .key(HANDLES)
                .arg(&id)
                .arg(&raw)
                .arg(serde_json::to_string(&user)?)
                .arg(claim.unwrap_or_default())
                .arg(release.unwrap_or_default())
                .invoke_async(&mut connection)
                .await?;

            match swapped {
                1 => return Ok(user),
                -1 => return Err(StoreError::HandleTaken),
                _ => debug!("User {id} changed during update, retrying"),
            }
        }

        warn!("Giving up on updating user {id}");
        Err(StoreError::Contention)
    }
}

#[async_trait]
impl ProfileStore for RedisStore {
    async fn find_by_identity(&self, external_id: &str) -> Result<Option<UserRecord>, StoreError> {
        self.resolve(IDENTITIES, external_id).await
    }

    async fn find_by_handle(&self, handle: &str) -> Result<Option<UserRecord>, StoreError> {
        self.resolve(HANDLES, handle).await
    }

    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        self.get_json(USERS, &user_id.to_string()).await
    }

    async fn create_user(&self, external_id: &str, email: &str) -> Result<UserRecord, StoreError> {
        let mut connection = self.connection.clone();
        let user = UserRecord::new(external_id, email);

        let stored: String = self
            .create_user_script
            .key(IDENTITIES)
            .key(USERS)
            .arg(external_id)
            .arg(user.id.to_string())
            .arg(serde_json::to_string(&user)?)
            .invoke_async(&mut connection)
            .await?;

        Ok(serde_json::from_str(&stored)?)
    }

    async fn update_profile(
        &self,
        user_id: Uuid,
        profile: &ValidProfile,
    ) -> Result<UserRecord, StoreError> {
        self.swap_user(user_id, Some(&profile.username), |user| user.apply(profile))
            .await
    }

    async fn set_avatar(&self, user_id: Uuid, url: Option<&str>) -> Result<(), StoreError> {
        self.swap_user(user_id, None, |user| {
            user.avatar_url = url.map(str::to_string);
            user.updated_at = Utc::now();
        })
        .await?;

        Ok(())
    }

    async fn photos(&self, user_id: Uuid) -> Result<Vec<PhotoRecord>, StoreError> {
        let mut photos: Vec<PhotoRecord> = self.all_json(&photos_key(user_id)).await?;
        sort_photos(&mut photos);

        Ok(photos)
    }

    async fn add_photo(
        &self,
        user_id: Uuid,
        url: &str,
        max: usize,
    ) -> Result<PhotoRecord, StoreError> {
        let mut connection = self.connection.clone();
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        let order: i64 = self
            .add_photo_script
            .key(photos_key(user_id))
            .key(photo_order_key(user_id))
            .arg(max)
            .arg(id.to_string())
            .arg(user_id.to_string())
            .arg(url)
            .arg(created_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .invoke_async(&mut connection)
            .await?;

        if order < 0 {
            return Err(StoreError::GalleryFull);
        }

        Ok(PhotoRecord {
            id,
            user_id,
            url: url.to_string(),
            order,
            created_at,
        })
    }

    async fn find_photo(
        &self,
        user_id: Uuid,
        photo_id: Uuid,
    ) -> Result<Option<PhotoRecord>, StoreError> {
        self.get_json(&photos_key(user_id), &photo_id.to_string())
            .await
    }

    async fn remove_photo(&self, user_id: Uuid, photo_id: Uuid) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        let removed: i64 = connection
            .hdel(photos_key(user_id), photo_id.to_string())
            .await?;

        Ok(removed > 0)
    }

    async fn posts(&self, user_id: Uuid) -> Result<Vec<PostRecord>, StoreError> {
        let mut posts: Vec<PostRecord> = self.all_json(&posts_key(user_id)).await?;
        posts.sort_by_key(|p| p.created_at);

        Ok(posts)
    }

    async fn add_post(&self, user_id: Uuid, post: &NewPost) -> Result<PostRecord, StoreError> {
        let record = PostRecord::new(user_id, post);
        self.put_json(&posts_key(user_id), &record.id.to_string(), &record)
            .await?;

        Ok(record)
    }

    async fn delete_by_identity(
        &self,
        external_id: &str,
    ) -> Result<Option<DeletedUser>, StoreError> {
        let Some(user) = self.find_by_identity(external_id).await? else {
            return Ok(None);
        };
        let photos = self.photos(user.id).await?;

        let mut pipe = redis::pipe();
        pipe.atomic()
            .hdel(IDENTITIES, external_id)
            .hdel(USERS, user.id.to_string())
            .del(photos_key(user.id))
            .del(photo_order_key(user.id))
            .del(posts_key(user.id));
        if let Some(handle) = &user.username {
            pipe.hdel(HANDLES, handle);
        }

        let mut connection = self.connection.clone();
        let _: () = pipe.query_async(&mut connection).await?;

        Ok(Some(DeletedUser { user, photos }))
    }
}
