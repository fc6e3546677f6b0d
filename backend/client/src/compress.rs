//! # Image compression
//!
//! Uploads are shrunk on the device so a phone photo does not cost a 10 MB
//! request. The image is first scaled so its longer side fits the target
//! dimension, then re-encoded until it fits the byte budget:
//!
//! - JPEG: quality 90, 80, ... down to 40
//! - PNG and WebP (lossless): 15% smaller per round
//!
//! When the budget runs out the last, smallest encoding is used anyway; the
//! server enforces the hard limit.
use std::io::Cursor;

use caldate_payloads::uploads::{AVATAR_TARGET, CompressTarget, GALLERY_TARGET, ImageType};
use image::{
    DynamicImage, GenericImageView, ImageError, ImageFormat, codecs::jpeg::JpegEncoder,
    imageops::FilterType,
};
use thiserror::Error;
use tracing::debug;

use crate::UploadFile;

const JPEG_QUALITIES: [u8; 6] = [90, 80, 70, 60, 50, 40];
const SHRINK_FACTOR: f32 = 0.85;
const MAX_SHRINK_ROUNDS: usize = 10;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Failed to decode {name}: {source}")]
    Decode { name: String, source: ImageError },

    #[error("Failed to encode {name}: {source}")]
    Encode { name: String, source: ImageError },
}

pub fn compress_avatar(file: UploadFile) -> Result<UploadFile, CompressError> {
    compress_image(file, AVATAR_TARGET)
}

pub fn compress_gallery_image(file: UploadFile) -> Result<UploadFile, CompressError> {
    compress_image(file, GALLERY_TARGET)
}

/// Name and content type are kept; non-images and unknown image types pass through.
pub fn compress_image(
    file: UploadFile,
    target: CompressTarget,
) -> Result<UploadFile, CompressError> {
    let Some(image_type) = ImageType::from_mime(&file.content_type) else {
        return Ok(file);
    };

    let image = image::load_from_memory(&file.bytes).map_err(|source| CompressError::Decode {
        name: file.name.clone(),
        source,
    })?;

    let (width, height) = image.dimensions();
    let fits_dimension = width.max(height) <= target.max_dimension;
    if fits_dimension && file.bytes.len() <= target.max_bytes {
        return Ok(file);
    }

    let image = if fits_dimension {
        image
    } else {
        image.resize(target.max_dimension, target.max_dimension, FilterType::Lanczos3)
    };

    let encoded = match image_type {
        ImageType::Jpeg => encode_jpeg(&image, target.max_bytes),
        ImageType::Png => encode_shrinking(image, ImageFormat::Png, target.max_bytes),
        ImageType::Webp => encode_shrinking(image, ImageFormat::WebP, target.max_bytes),
    }
    .map_err(|source| CompressError::Encode {
        name: file.name.clone(),
        source,
    })?;

    debug!(
        "Compressed {} from {} to {} bytes",
        file.name,
        file.bytes.len(),
        encoded.len()
    );

    Ok(UploadFile {
        bytes: encoded,
        ..file
    })
}

fn encode_jpeg(image: &DynamicImage, max_bytes: usize) -> Result<Vec<u8>, ImageError> {
    let rgb = image.to_rgb8();
    let mut smallest = Vec::new();

    for quality in JPEG_QUALITIES {
        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&rgb)?;

        smallest = bytes;
        if smallest.len() <= max_bytes {
            break;
        }
    }

    Ok(smallest)
}

fn encode(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, ImageError> {
    let mut bytes = Cursor::new(Vec::new());
    // WebP encoding only takes 8-bit RGB(A).
    DynamicImage::ImageRgba8(image.to_rgba8()).write_to(&mut bytes, format)?;

    Ok(bytes.into_inner())
}

fn encode_shrinking(
    mut image: DynamicImage,
    format: ImageFormat,
    max_bytes: usize,
) -> Result<Vec<u8>, ImageError> {
    let mut bytes = encode(&image, format)?;

    for _ in 0..MAX_SHRINK_ROUNDS {
        if bytes.len() <= max_bytes {
            break;
        }

        let (width, height) = image.dimensions();
        let width = ((width as f32 * SHRINK_FACTOR) as u32).max(1);
        let height = ((height as f32 * SHRINK_FACTOR) as u32).max(1);

        image = image.resize_exact(width, height, FilterType::Triangle);
        bytes = encode(&image, format)?;
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use image::{ImageBuffer, Rgb, Rgba};

    use super::*;

    fn noisy(width: u32, height: u32) -> DynamicImage {
        let mut state: u32 = 0x1234_5678;
        let buffer = ImageBuffer::from_fn(width, height, |_, _| {
            // xorshift
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            Rgba([r, g, b, 255])
        });
        DynamicImage::ImageRgba8(buffer)
    }

    fn file(image: &DynamicImage, format: ImageFormat, name: &str) -> UploadFile {
        let mime = match format {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            _ => "image/webp",
        };
        let mut bytes = Cursor::new(Vec::new());
        match format {
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
                .write_to(&mut bytes, format)
                .unwrap(),
            _ => image.write_to(&mut bytes, format).unwrap(),
        }
        UploadFile::new(name, mime, bytes.into_inner())
    }

    #[test]
    fn test_non_images_pass_through() {
        let text = UploadFile::new("notes.txt", "text/plain", b"hello".to_vec());
        assert_eq!(compress_avatar(text.clone()).unwrap(), text);

        let gif = UploadFile::new("a.gif", "image/gif", b"GIF89a".to_vec());
        assert_eq!(compress_avatar(gif.clone()).unwrap(), gif);
    }

    #[test]
    fn test_small_images_are_untouched() {
        let small = file(
            &DynamicImage::ImageRgb8(ImageBuffer::from_pixel(64, 64, Rgb([1, 2, 3]))),
            ImageFormat::Png,
            "small.png",
        );
        assert_eq!(compress_gallery_image(small.clone()).unwrap(), small);
    }

    #[test]
    fn test_jpeg_is_downscaled() {
        let original = file(&noisy(2000, 1000), ImageFormat::Jpeg, "wide.jpg");
        let compressed = compress_gallery_image(original).unwrap();

        assert_eq!(compressed.name, "wide.jpg");
        assert_eq!(compressed.content_type, "image/jpeg");

        let decoded = image::load_from_memory(&compressed.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (1920, 960));
    }

    #[test]
    fn test_png_shrinks_to_budget() {
        let original = file(&noisy(1024, 1024), ImageFormat::Png, "noise.png");
        assert!(original.bytes.len() > AVATAR_TARGET.max_bytes);

        let compressed = compress_avatar(original).unwrap();
        assert!(compressed.bytes.len() <= AVATAR_TARGET.max_bytes);
        assert_eq!(compressed.content_type, "image/png");

        let decoded = image::load_from_memory(&compressed.bytes).unwrap();
        assert!(decoded.width() <= AVATAR_TARGET.max_dimension);
        assert!(decoded.height() <= AVATAR_TARGET.max_dimension);
    }

    #[test]
    fn test_corrupt_image() {
        let broken = UploadFile::new("broken.png", "image/png", b"not a png".to_vec());
        assert!(matches!(
            compress_avatar(broken),
            Err(CompressError::Decode { .. })
        ));
    }
}
