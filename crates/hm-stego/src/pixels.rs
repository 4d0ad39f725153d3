//! In-memory pixel buffer over `image::DynamicImage`.

use image::{DynamicImage, GrayAlphaImage, GrayImage, Rgb, RgbImage, RgbaImage};

use crate::error::ImageDecodeError;

/// Interleaved 8-bit pixel buffer, row-major, 1 to 4 channels per pixel.
///
/// Channel layouts: 1 = gray, 2 = gray + alpha, 3 = RGB, 4 = RGBA. Wider
/// sample types coming in through [`From<DynamicImage>`] are narrowed to
/// 8-bit RGB.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    inner: DynamicImage,
}

impl Image {
    /// Wrap a raw buffer, checking it matches the declared geometry.
    pub fn from_raw(
        width: u32,
        height: u32,
        channels: u8,
        data: Vec<u8>,
    ) -> Result<Self, ImageDecodeError> {
        if !(1..=4).contains(&channels) {
            return Err(ImageDecodeError::UnsupportedChannels(channels));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(channels as usize))
            .ok_or(ImageDecodeError::DimensionOverflow {
                width,
                height,
                channels,
            })?;
        let actual = data.len();
        if actual != expected {
            return Err(ImageDecodeError::LengthMismatch { expected, actual });
        }
        let inner = match channels {
            1 => GrayImage::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            2 => GrayAlphaImage::from_raw(width, height, data).map(DynamicImage::ImageLumaA8),
            3 => RgbImage::from_raw(width, height, data).map(DynamicImage::ImageRgb8),
            _ => RgbaImage::from_raw(width, height, data).map(DynamicImage::ImageRgba8),
        };
        inner
            .map(|inner| Self { inner })
            .ok_or(ImageDecodeError::LengthMismatch { expected, actual })
    }

    /// A solid RGB image.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        RgbImage::from_pixel(width, height, Rgb(rgb)).into()
    }

    pub fn width(&self) -> u32 {
        self.inner.width()
    }

    pub fn height(&self) -> u32 {
        self.inner.height()
    }

    pub fn channels(&self) -> u8 {
        self.inner.color().channel_count()
    }

    /// Number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.pixel_count() == 0
    }

    /// Raw interleaved bytes.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.inner.into_bytes()
    }

    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.inner
    }

    /// Channel bytes of the pixel at (`x`, `y`), or None if out of bounds.
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let c = self.channels() as usize;
        let start = (y as usize * self.width() as usize + x as usize) * c;
        self.as_bytes().get(start..start + c)
    }

    /// Normalize to 3-channel RGB.
    ///
    /// Gray is replicated into R, G and B; alpha is dropped.
    pub fn to_rgb(&self) -> Image {
        self.to_rgb8().into()
    }

    pub(crate) fn to_rgb8(&self) -> RgbImage {
        self.inner.to_rgb8()
    }
}

impl From<RgbImage> for Image {
    fn from(rgb: RgbImage) -> Self {
        Self {
            inner: DynamicImage::ImageRgb8(rgb),
        }
    }
}

impl From<DynamicImage> for Image {
    fn from(image: DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_) => Self { inner: image },
            other => other.to_rgb8().into(),
        }
    }
}

impl From<Image> for DynamicImage {
    fn from(image: Image) -> Self {
        image.inner
    }
}
