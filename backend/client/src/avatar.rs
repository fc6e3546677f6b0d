//! # Avatar widget state
//!
//! The picked image shows immediately as an optimistic preview while the
//! upload runs; the widget falls back to the confirmed URL when it fails.
//!
//! ```text
//!          begin_upload            upload_succeeded
//!   Idle ───────────────▶ Uploading ───────────────▶ Success ──┐
//!    ▲                        │                                │
//!    │                        │ upload_failed                  │ settle
//!    │                        ▼                                │
//!    └──────────────────── Error ◀─────────────────────────────┘
//!              settle
//! ```
//!
//! Removal is optimistic too: the URL disappears at once and comes back if
//! the server refuses.
use tracing::warn;

use crate::{ApiClient, ClientError, UploadFile, compress::compress_avatar};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UploadStatus {
    #[default]
    Idle,
    Uploading,
    Success,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvatarUpload {
    current_url: Option<String>,
    optimistic_url: Option<String>,
    status: UploadStatus,
}

impl AvatarUpload {
    pub fn new(current_url: Option<String>) -> Self {
        Self {
            current_url,
            ..Self::default()
        }
    }

    pub fn current_url(&self) -> Option<&str> {
        self.current_url.as_deref()
    }

    pub fn status(&self) -> UploadStatus {
        self.status
    }

    /// Preview first, then the confirmed avatar.
    pub fn display_url(&self) -> Option<&str> {
        self.optimistic_url.as_deref().or(self.current_url.as_deref())
    }

    pub fn is_uploading(&self) -> bool {
        self.status == UploadStatus::Uploading
    }

    pub fn can_remove(&self) -> bool {
        self.current_url.is_some() && !self.is_uploading()
    }

    /// Refused while another upload is running.
    pub fn begin_upload(&mut self, preview_url: String) -> bool {
        if self.is_uploading() {
            return false;
        }

        self.optimistic_url = Some(preview_url);
        self.status = UploadStatus::Uploading;
        true
    }

    pub fn upload_succeeded(&mut self, url: String) {
        self.current_url = Some(url);
        self.optimistic_url = None;
        self.status = UploadStatus::Success;
    }

    pub fn upload_failed(&mut self) {
        self.optimistic_url = None;
        self.status = UploadStatus::Error;
    }

    /// Ends the success or error flash.
    pub fn settle(&mut self) {
        if !self.is_uploading() {
            self.status = UploadStatus::Idle;
        }
    }

    /// Clears the avatar and returns what to restore on failure.
    pub fn begin_remove(&mut self) -> Option<String> {
        self.current_url.take()
    }

    pub fn remove_failed(&mut self, previous: Option<String>) {
        if self.current_url.is_none() {
            self.current_url = previous;
        }
    }
}

/// Compress, upload, then commit or roll back.
pub async fn upload_avatar(
    api: &ApiClient,
    widget: &mut AvatarUpload,
    file: UploadFile,
    preview_url: String,
) -> Result<String, ClientError> {
    if !widget.begin_upload(preview_url) {
        return Err(ClientError::Busy);
    }

    let result = match compress_avatar(file) {
        Ok(file) => api.upload_avatar(file).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(url) => {
            widget.upload_succeeded(url.clone());
            Ok(url)
        }
        Err(e) => {
            warn!("Avatar upload failed: {e}");
            widget.upload_failed();
            Err(e)
        }
    }
}

pub async fn remove_avatar(api: &ApiClient, widget: &mut AvatarUpload) -> Result<(), ClientError> {
    let previous = widget.begin_remove();

    if let Err(e) = api.remove_avatar().await {
        warn!("Avatar removal failed: {e}");
        widget.remove_failed(previous);
        return Err(e);
    }

    Ok(())
}
