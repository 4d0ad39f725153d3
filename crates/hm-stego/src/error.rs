//! Error types for the bit-plane codec.

use thiserror::Error;

/// Pixel data that cannot be read as an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImageDecodeError {
    #[error("image has no pixels ({width}x{height})")]
    Empty { width: u32, height: u32 },

    #[error("unsupported channel count: {0} (expected 1 to 4)")]
    UnsupportedChannels(u8),

    #[error("pixel buffer length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("image dimensions overflow: {width}x{height}x{channels}")]
    DimensionOverflow { width: u32, height: u32, channels: u8 },
}

/// A bit position outside the supported planes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unsupported bit index {0} (supported: 0, 3)")]
pub struct BitIndexError(pub u8);
