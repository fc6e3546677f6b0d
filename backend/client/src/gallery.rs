//! # Gallery widget state
//!
//! Three lists make up what the grid shows:
//!
//! - confirmed photos from the server
//! - pending uploads, shown from their local preview with a status badge
//! - ids being removed, hidden until the server confirms or refuses
//!
//! The grid is `max` cells: shown photos, then one "add" cell while there
//! is room, then empty placeholders.
use std::collections::HashSet;

use caldate_payloads::{Photo, uploads::MAX_GALLERY_PHOTOS};
use tracing::warn;
use uuid::Uuid;

use crate::{ApiClient, ClientError, UploadFile, compress::compress_gallery_image};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingStatus {
    Uploading,
    Success(Photo),
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPhoto {
    pub temp_id: String,
    pub preview_url: String,
    pub status: PendingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile<'a> {
    Confirmed(&'a Photo),
    Pending(&'a PendingPhoto),
}

#[derive(Debug, Clone)]
pub struct GalleryManager {
    photos: Vec<Photo>,
    pending: Vec<PendingPhoto>,
    removing: HashSet<Uuid>,
    max: usize,
    next_temp: u64,
}

impl Default for GalleryManager {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl GalleryManager {
    pub fn new(photos: Vec<Photo>) -> Self {
        Self::with_max(photos, MAX_GALLERY_PHOTOS)
    }

    pub fn with_max(photos: Vec<Photo>, max: usize) -> Self {
        Self {
            photos,
            pending: Vec::new(),
            removing: HashSet::new(),
            max,
            next_temp: 0,
        }
    }

    pub fn photos(&self) -> &[Photo] {
        &self.photos
    }

    pub fn all_photos(&self) -> Vec<Tile<'_>> {
        self.photos
            .iter()
            .filter(|photo| !self.removing.contains(&photo.id))
            .map(Tile::Confirmed)
            .chain(self.pending.iter().map(Tile::Pending))
            .collect()
    }

    fn shown(&self) -> usize {
        self.photos
            .iter()
            .filter(|photo| !self.removing.contains(&photo.id))
            .count()
            + self.pending.len()
    }

    pub fn can_add_more(&self) -> bool {
        self.shown() < self.max
    }

    pub fn placeholder_count(&self) -> usize {
        self.max
            .saturating_sub(self.shown() + usize::from(self.can_add_more()))
    }

    pub fn is_removing(&self, id: Uuid) -> bool {
        self.removing.contains(&id)
    }

    /// Adds a pending entry and returns its temporary id; `None` at capacity.
    pub fn begin_upload(&mut self, preview_url: String) -> Option<String> {
        if !self.can_add_more() {
            return None;
        }

        let temp_id = format!("temp-{}", self.next_temp);
        self.next_temp += 1;
        self.pending.push(PendingPhoto {
            temp_id: temp_id.clone(),
            preview_url,
            status: PendingStatus::Uploading,
        });

        Some(temp_id)
    }

    fn set_status(&mut self, temp_id: &str, status: PendingStatus) {
        if let Some(entry) = self.pending.iter_mut().find(|p| p.temp_id == temp_id) {
            entry.status = status;
        }
    }

    pub fn upload_succeeded(&mut self, temp_id: &str, photo: Photo) {
        self.set_status(temp_id, PendingStatus::Success(photo));
    }

    pub fn upload_failed(&mut self, temp_id: &str) {
        self.set_status(temp_id, PendingStatus::Error);
    }

    /// Moves finished uploads into the confirmed list and drops failed ones.
    pub fn settle(&mut self) {
        let mut still_pending = Vec::with_capacity(self.pending.len());

        for entry in self.pending.drain(..) {
            match entry.status {
                PendingStatus::Success(photo) => self.photos.push(photo),
                PendingStatus::Error => {}
                PendingStatus::Uploading => still_pending.push(entry),
            }
        }

        self.pending = still_pending;
    }

    /// Hides a confirmed photo; `false` if it is unknown or already going.
    pub fn begin_remove(&mut self, id: Uuid) -> bool {
        self.photos.iter().any(|photo| photo.id == id) && self.removing.insert(id)
    }

    pub fn remove_succeeded(&mut self, id: Uuid) {
        self.photos.retain(|photo| photo.id != id);
        self.removing.remove(&id);
    }

    pub fn remove_failed(&mut self, id: Uuid) {
        self.removing.remove(&id);
    }
}

/// Compress, upload, mark the entry; call [`GalleryManager::settle`] after
/// the success badge has been shown.
pub async fn upload_photo(
    api: &ApiClient,
    gallery: &mut GalleryManager,
    file: UploadFile,
    preview_url: String,
) -> Result<Photo, ClientError> {
    let temp_id = gallery
        .begin_upload(preview_url)
        .ok_or(ClientError::GalleryFull)?;

    let result = match compress_gallery_image(file) {
        Ok(file) => api.upload_photo(file).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(photo) => {
            gallery.upload_succeeded(&temp_id, photo.clone());
            Ok(photo)
        }
        Err(e) => {
            warn!("Gallery upload failed: {e}");
            gallery.upload_failed(&temp_id);
            Err(e)
        }
    }
}

pub async fn remove_photo(
    api: &ApiClient,
    gallery: &mut GalleryManager,
    id: Uuid,
) -> Result<(), ClientError> {
    if !gallery.begin_remove(id) {
        return Ok(());
    }

    match api.remove_photo(id).await {
        Ok(()) => {
            gallery.remove_succeeded(id);
            Ok(())
        }
        Err(e) => {
            warn!("Removing photo {id} failed: {e}");
            gallery.remove_failed(id);
            Err(e)
        }
    }
}
