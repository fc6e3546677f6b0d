//! Upload limits shared by the upload widgets and the server.

pub const MAX_GALLERY_PHOTOS: usize = 6;

/// Multipart field carrying the image.
pub const FILE_FIELD: &str = "file";

/// Target size for client-side compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressTarget {
    pub max_bytes: usize,
    pub max_dimension: u32,
}

const MEGABYTE: usize = 1024 * 1024;

pub const AVATAR_TARGET: CompressTarget = CompressTarget {
    max_bytes: MEGABYTE / 2,
    max_dimension: 512,
};

pub const GALLERY_TARGET: CompressTarget = CompressTarget {
    max_bytes: MEGABYTE,
    max_dimension: 1920,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Png,
    Jpeg,
    Webp,
}

impl ImageType {
    pub fn mime(self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
            ImageType::Webp => "image/webp",
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(ImageType::Png),
            "image/jpeg" | "image/jpg" => Some(ImageType::Jpeg),
            "image/webp" => Some(ImageType::Webp),
            _ => None,
        }
    }

    /// Extensions the upload widgets accept.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(ImageType::Png),
            "jpg" | "jpeg" => Some(ImageType::Jpeg),
            "webp" => Some(ImageType::Webp),
            _ => None,
        }
    }
}
