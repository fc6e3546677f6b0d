//! Client side of the upload pipeline.
//!
//! - [`compress`]: shrink images before they leave the device
//! - [`api`]: typed access to the cal.date HTTP API
//! - [`avatar`], [`gallery`]: optimistic widget state with rollback, plus
//!   the async drivers that run compress, upload and commit in order
use std::{io, path::Path};

use caldate_payloads::uploads::ImageType;

pub mod api;
pub mod avatar;
pub mod compress;
pub mod gallery;

pub use api::{ApiClient, ClientError};
pub use avatar::AvatarUpload;
pub use gallery::GalleryManager;

const OCTET_STREAM: &str = "application/octet-stream";

/// A file picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Content type is guessed from the extension.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("upload")
            .to_string();
        let content_type = path
            .extension()
            .and_then(|extension| extension.to_str())
            .and_then(ImageType::from_extension)
            .map_or(OCTET_STREAM, ImageType::mime);

        Ok(Self::new(name, content_type, bytes))
    }

    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}
