use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, Query, State as AxumState, rejection::JsonRejection},
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION},
    },
    response::{Html, IntoResponse, Response},
};
use caldate_payloads::{
    Success, UpdateProfile,
    handle::{from_path_segment, is_valid_handle},
    onboarding::{HOME_PATH, ONBOARD_PATH, Page, SETTINGS_PATH, Stage, redirect_for},
    posts::{NewPost, PostView},
    uploads::{FILE_FIELD, MAX_GALLERY_PHOTOS},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{CurrentIdentity, Identity, MaybeIdentity, ensure_user, require_user},
    database::{StoreError, UserRecord},
    error::{AppError, GALLERY_FULL},
    images::sniff_image,
    og::{FALLBACK_IMAGE, PreviewCard, encode_png, fetch_avatar, render},
    pages::{not_found_page, profile_page, shell_page},
    state::State,
    storage::{avatar_key, gallery_key},
    utils::upload_tag,
};

const NO_FILE: &str = "No file provided";
const PHOTO_ID_REQUIRED: &str = "Photo ID required";
const PHOTO_NOT_FOUND: &str = "Photo not found";
const PREVIEW_CACHE: &str = "public, max-age=3600";

fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}

pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// Profile API

pub async fn get_profile_handler(
    AxumState(state): AxumState<Arc<State>>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<impl IntoResponse, AppError> {
    let user = ensure_user(&state, &identity).await?;
    let photos = state.store.photos(user.id).await?;

    let mut view = user.view(&photos);
    view.completeness = Some(user.completeness(photos.len()));

    Ok(Json(view))
}

pub async fn update_profile_handler(
    AxumState(state): AxumState<Arc<State>>,
    CurrentIdentity(identity): CurrentIdentity,
    payload: Result<Json<UpdateProfile>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(update) = payload?;
    let profile = update.validate().map_err(AppError::InvalidData)?;

    let user = ensure_user(&state, &identity).await?;
    state.store.update_profile(user.id, &profile).await?;
    info!("Updated profile of {} as @{}", user.id, profile.username);

    Ok(Json(Success::OK))
}

pub async fn public_profile_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let user = state
        .store
        .find_by_handle(&username)
        .await?
        .ok_or(AppError::NotFound("User not found"))?;
    let photos = state.store.photos(user.id).await?;

    Ok(Json(user.view(&photos)))
}

// Posts

pub async fn list_posts_handler(
    AxumState(state): AxumState<Arc<State>>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &identity).await?;
    let posts: Vec<PostView> = state
        .store
        .posts(user.id)
        .await?
        .iter()
        .map(|post| post.view())
        .collect();

    Ok(Json(posts))
}

pub async fn create_post_handler(
    AxumState(state): AxumState<Arc<State>>,
    CurrentIdentity(identity): CurrentIdentity,
    payload: Result<Json<NewPost>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &identity).await?;

    let Json(post) = payload?;
    let post = post.validate().map_err(AppError::InvalidData)?;

    let record = state.store.add_post(user.id, &post).await?;

    Ok(Json(record.view()))
}

// Uploads

struct UploadedFile {
    name: String,
    bytes: Bytes,
}

/// First non-empty `file` field of the form.
async fn read_file(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<UploadedFile, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let name = field.file_name().unwrap_or("upload").to_string();
        let bytes = field.bytes().await?;

        if bytes.is_empty() {
            break;
        }
        if bytes.len() > max_bytes {
            return Err(AppError::PayloadTooLarge);
        }

        return Ok(UploadedFile { name, bytes });
    }

    Err(AppError::bad_request(NO_FILE))
}

pub async fn upload_avatar_handler(
    AxumState(state): AxumState<Arc<State>>,
    CurrentIdentity(identity): CurrentIdentity,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let file = read_file(&mut multipart, state.config.max_upload_bytes).await?;
    let image_type = sniff_image(&file.bytes)?;
    let user = require_user(&state, &identity).await?;

    let url = state
        .blobs
        .put(
            &avatar_key(user.id, &upload_tag(), &file.name),
            file.bytes.to_vec(),
            image_type.mime(),
        )
        .await?;

    state.store.set_avatar(user.id, Some(&url)).await?;
    info!("Avatar of {} is now {url}", user.id);

    if let Some(previous) = user.avatar_url.as_deref() {
        if let Err(e) = state.blobs.delete(previous).await {
            warn!("Failed to delete previous avatar of {}: {e}", user.id);
        }
    }

    Ok(Json(json!({ "url": url })))
}

pub async fn delete_avatar_handler(
    AxumState(state): AxumState<Arc<State>>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &identity).await?;

    if let Some(url) = &user.avatar_url {
        state.blobs.delete(url).await?;
        state.store.set_avatar(user.id, None).await?;
        info!("Removed avatar of {}", user.id);
    }

    Ok(Json(Success::OK))
}

pub async fn list_gallery_handler(
    AxumState(state): AxumState<Arc<State>>,
    CurrentIdentity(identity): CurrentIdentity,
) -> Result<impl IntoResponse, AppError> {
    let user = require_user(&state, &identity).await?;
    let mut photos = state.store.photos(user.id).await?;
    // Newest first here; profile views keep gallery order.
    photos.reverse();

    Ok(Json(json!({ "photos": photos })))
}

pub async fn upload_gallery_handler(
    AxumState(state): AxumState<Arc<State>>,
    CurrentIdentity(identity): CurrentIdentity,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let file = read_file(&mut multipart, state.config.max_upload_bytes).await?;
    let image_type = sniff_image(&file.bytes)?;
    let user = require_user(&state, &identity).await?;

    if state.store.photos(user.id).await?.len() >= MAX_GALLERY_PHOTOS {
        return Err(AppError::bad_request(GALLERY_FULL));
    }

    let url = state
        .blobs
        .put(
            &gallery_key(user.id, &upload_tag(), &file.name),
            file.bytes.to_vec(),
            image_type.mime(),
        )
        .await?;

    let photo = match state
        .store
        .add_photo(user.id, &url, MAX_GALLERY_PHOTOS)
        .await
    {
        Ok(photo) => photo,
        Err(e) => {
            // Lost the race for the last slot, or the store failed.
            if let Err(delete_error) = state.blobs.delete(&url).await {
                warn!("Failed to delete orphaned upload {url}: {delete_error}");
            }
            return Err(e.into());
        }
    };
    info!("Added photo {} to gallery of {}", photo.id, user.id);

    Ok(Json(json!({ "photo": photo })))
}

#[derive(Debug, Deserialize)]
pub struct PhotoQuery {
    id: Option<String>,
}

pub async fn delete_gallery_handler(
    AxumState(state): AxumState<Arc<State>>,
    CurrentIdentity(identity): CurrentIdentity,
    Query(query): Query<PhotoQuery>,
) -> Result<impl IntoResponse, AppError> {
    let raw_id = query
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request(PHOTO_ID_REQUIRED))?;

    let user = require_user(&state, &identity).await?;

    let photo_id = Uuid::parse_str(&raw_id).map_err(|_| AppError::NotFound(PHOTO_NOT_FOUND))?;
    let photo = state
        .store
        .find_photo(user.id, photo_id)
        .await?
        .ok_or(AppError::NotFound(PHOTO_NOT_FOUND))?;

    if let Err(e) = state.blobs.delete(&photo.url).await {
        warn!("Failed to delete blob of photo {photo_id}: {e}");
    }
    state.store.remove_photo(user.id, photo_id).await?;
    info!("Removed photo {photo_id} from gallery of {}", user.id);

    Ok(Json(Success::OK))
}

// Pages

async fn stage_for(state: &State, identity: Option<&Identity>) -> Result<Stage, StoreError> {
    let Some(identity) = identity else {
        return Ok(Stage::SignedOut);
    };

    let user = state.store.find_by_identity(&identity.external_id).await?;
    Ok(Stage::for_handle(
        user.as_ref().and_then(|user| user.username.as_deref()),
    ))
}

async fn gate(
    state: &State,
    identity: Option<&Identity>,
    path: &str,
) -> Result<Option<Response>, AppError> {
    let stage = stage_for(state, identity).await?;

    Ok(redirect_for(&stage, Page::from_path(path)).map(|location| found(&location)))
}

async fn shell(
    state: &State,
    identity: Option<&Identity>,
    path: &str,
) -> Result<Response, AppError> {
    if let Some(redirect) = gate(state, identity, path).await? {
        return Ok(redirect);
    }

    Ok(Html(shell_page(path)).into_response())
}

pub async fn home_handler(
    AxumState(state): AxumState<Arc<State>>,
    MaybeIdentity(identity): MaybeIdentity,
) -> Result<Response, AppError> {
    shell(&state, identity.as_ref(), HOME_PATH).await
}

pub async fn onboard_handler(
    AxumState(state): AxumState<Arc<State>>,
    MaybeIdentity(identity): MaybeIdentity,
) -> Result<Response, AppError> {
    shell(&state, identity.as_ref(), ONBOARD_PATH).await
}

pub async fn settings_handler(
    AxumState(state): AxumState<Arc<State>>,
    MaybeIdentity(identity): MaybeIdentity,
) -> Result<Response, AppError> {
    shell(&state, identity.as_ref(), SETTINGS_PATH).await
}

async fn find_profile(state: &State, segment: &str) -> Result<Option<UserRecord>, AppError> {
    let handle = from_path_segment(segment);
    if !is_valid_handle(handle) {
        return Ok(None);
    }

    Ok(state.store.find_by_handle(handle).await?)
}

/// Serves both `/jane` and `/@jane`.
pub async fn profile_page_handler(
    AxumState(state): AxumState<Arc<State>>,
    MaybeIdentity(identity): MaybeIdentity,
    Path(segment): Path<String>,
) -> Result<Response, AppError> {
    if let Some(redirect) = gate(&state, identity.as_ref(), &format!("/{segment}")).await? {
        return Ok(redirect);
    }

    let Some(user) = find_profile(&state, &segment).await? else {
        return Ok((StatusCode::NOT_FOUND, Html(not_found_page())).into_response());
    };

    let photos = state.store.photos(user.id).await?;
    let is_owner = identity.is_some_and(|identity| identity.external_id == user.external_id);
    let handle = user
        .username
        .clone()
        .unwrap_or_else(|| from_path_segment(&segment).to_string());

    Ok(Html(profile_page(
        &user.view(&photos),
        &handle,
        is_owner,
        &state.config.site_url,
    ))
    .into_response())
}

async fn png_response(state: &State, card: PreviewCard) -> Result<Response, AppError> {
    let avatar = match &card.avatar_url {
        Some(url) => fetch_avatar(&state.http, url).await,
        None => None,
    };
    let font = state.font.clone();

    let png = tokio::task::spawn_blocking(move || {
        encode_png(&render(&card, avatar.as_ref(), font.as_ref()))
    })
    .await
    .map_err(AppError::internal)?
    .map_err(AppError::internal)?;

    Ok((
        [(CONTENT_TYPE, "image/png"), (CACHE_CONTROL, PREVIEW_CACHE)],
        png,
    )
        .into_response())
}

pub async fn preview_handler(
    AxumState(state): AxumState<Arc<State>>,
    Path(segment): Path<String>,
) -> Result<Response, AppError> {
    match find_profile(&state, &segment).await? {
        Some(user) => png_response(&state, PreviewCard::from_user(&user)).await,
        None => Ok(found(FALLBACK_IMAGE)),
    }
}

pub async fn site_preview_handler(
    AxumState(state): AxumState<Arc<State>>,
) -> Result<Response, AppError> {
    png_response(&state, PreviewCard::site()).await
}
