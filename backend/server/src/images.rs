use caldate_payloads::uploads::ImageType;
use image::ImageFormat;

use crate::error::AppError;

pub const UNSUPPORTED: &str = "Unsupported image type";

/// Content type by sniffing the bytes; the client's declared type is not trusted.
pub fn sniff_image(bytes: &[u8]) -> Result<ImageType, AppError> {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Png) => Ok(ImageType::Png),
        Ok(ImageFormat::Jpeg) => Ok(ImageType::Jpeg),
        Ok(ImageFormat::WebP) => Ok(ImageType::Webp),
        _ => Err(AppError::bad_request(UNSUPPORTED)),
    }
}
