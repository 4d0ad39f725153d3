//! Image files around the codec's pixel buffers.
//!
//! Anything the `image` crate can decode (PNG, JPEG, BMP, PNM) is read and
//! normalized to 8-bit RGB. Writing is restricted to lossless formats: a
//! lossy encoder rewrites low bits and wipes both planes. Marked images
//! are stored as PNG.

use hm_stego::{Image, ImageDecodeError};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use thiserror::Error;

/// Format of marked image artifacts
pub const MARKED_IMAGE_FORMAT: ImageFormat = ImageFormat::Png;

/// Content type for served marked images
pub const PNG_CONTENT_TYPE: &str = "image/png";

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("image codec: {0}")]
    Codec(#[from] image::ImageError),

    #[error("{0:?} is lossy; hidden bits would not survive")]
    LossyFormat(ImageFormat),

    #[error(transparent)]
    Image(#[from] ImageDecodeError),
}

/// Formats whose pixel bytes survive a write unchanged.
pub fn is_lossless(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png | ImageFormat::Bmp | ImageFormat::Pnm
    )
}

/// Decode an image file held in memory, normalized to RGB.
pub fn read_image(bytes: &[u8]) -> Result<Image, ContainerError> {
    let rgb = Image::from(image::load_from_memory(bytes)?.to_rgb8());
    if rgb.is_empty() {
        return Err(ImageDecodeError::Empty {
            width: rgb.width(),
            height: rgb.height(),
        }
        .into());
    }
    Ok(rgb)
}

/// Encode as `format`, which must be lossless.
pub fn write_image(image: &Image, format: ImageFormat) -> Result<Vec<u8>, ContainerError> {
    if !is_lossless(format) {
        return Err(ContainerError::LossyFormat(format));
    }
    let mut out = Cursor::new(Vec::new());
    DynamicImage::from(image.to_rgb()).write_to(&mut out, format)?;
    Ok(out.into_inner())
}

pub fn write_png(image: &Image) -> Result<Vec<u8>, ContainerError> {
    write_image(image, MARKED_IMAGE_FORMAT)
}

/// Output format implied by a file extension.
pub fn format_for_path(path: &Path) -> Result<ImageFormat, ContainerError> {
    Ok(ImageFormat::from_path(path)?)
}
