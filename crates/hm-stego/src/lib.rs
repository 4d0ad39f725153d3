//! Bit-plane text steganography.
//!
//! A message is stored one bit per channel byte at a fixed bit position
//! ([`BitIndex`]). Pixels are scanned row-major and channels cycle R, G, B
//! within each pixel. Each byte of the message is written most significant
//! bit first and the message is followed by a single `0x00` terminator.
//!
//! Capacity is `width * height * 3` bits. Encoding past capacity is silently
//! truncated. Nothing here is secret: the technique and layout are public.
//!
//! ```
//! use hm_stego::{decode, encode, BitIndex, Image};
//!
//! let cover = Image::filled(16, 16, [173, 216, 230]);
//! let marked = encode(&cover, "hello", BitIndex::Standard);
//! assert_eq!(decode(&marked, BitIndex::Standard).unwrap(), "hello");
//! ```

mod error;
mod pixels;

pub use error::{BitIndexError, ImageDecodeError};
pub use pixels::Image;

/// Bits per channel byte that the codec may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitIndex {
    /// Bit 0, the plane used for ordinary user-facing encode/decode.
    Standard,
    /// Bit 3, reserved for marked crash images.
    Alternate,
}

impl BitIndex {
    /// Bit position within the channel byte.
    pub fn position(self) -> u8 {
        match self {
            BitIndex::Standard => 0,
            BitIndex::Alternate => 3,
        }
    }

    fn mask(self) -> u8 {
        1 << self.position()
    }
}

impl TryFrom<u8> for BitIndex {
    type Error = BitIndexError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(BitIndex::Standard),
            3 => Ok(BitIndex::Alternate),
            other => Err(BitIndexError(other)),
        }
    }
}

impl std::fmt::Display for BitIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.position())
    }
}

/// Payload bits available at one plane of `image`.
pub fn capacity_bits(image: &Image) -> usize {
    image.pixel_count() * 3
}

/// Longest message (in bytes) that round-trips, terminator included.
pub fn max_message_len(image: &Image) -> usize {
    (capacity_bits(image) / 8).saturating_sub(1)
}

/// Encode `message` into `image` at `bit`, returning a new RGB image.
///
/// The input is never modified. Non-RGB inputs are normalized first.
pub fn encode(image: &Image, message: &str, bit: BitIndex) -> Image {
    encode_bytes(image, message.as_bytes(), bit)
}

/// Byte-level form of [`encode`].
///
/// A `0x00` inside `payload` is written as-is and ends the message on decode.
pub fn encode_bytes(image: &Image, payload: &[u8], bit: BitIndex) -> Image {
    let mut rgb = image.to_rgb8();

    let mask = bit.mask();
    let shift = bit.position();
    let bits = payload
        .iter()
        .chain(std::iter::once(&0u8))
        .flat_map(|byte| (0..8).rev().map(move |i| (byte >> i) & 1));

    // zip stops at whichever runs out first: that is the silent truncation.
    for (channel, b) in rgb.iter_mut().zip(bits) {
        *channel = (*channel & !mask) | (b << shift);
    }

    Image::from(rgb)
}

/// Decode the text stored at `bit`.
///
/// Reading stops at the first zero byte; without one, every complete byte
/// is returned. Invalid UTF-8 is replaced, never rejected.
pub fn decode(image: &Image, bit: BitIndex) -> Result<String, ImageDecodeError> {
    let bytes = decode_bytes(image, bit)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Byte-level form of [`decode`].
pub fn decode_bytes(image: &Image, bit: BitIndex) -> Result<Vec<u8>, ImageDecodeError> {
    if image.is_empty() {
        return Err(ImageDecodeError::Empty {
            width: image.width(),
            height: image.height(),
        });
    }

    let rgb = image.to_rgb8();
    let shift = bit.position();
    let mut out = Vec::new();

    for chunk in rgb.as_raw().chunks_exact(8) {
        let byte = chunk
            .iter()
            .fold(0u8, |acc, channel| (acc << 1) | ((channel >> shift) & 1));
        if byte == 0 {
            break;
        }
        out.push(byte);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Image {
        let data = (0..width * height * 3).map(|i| (i * 37 % 251) as u8).collect();
        Image::from_raw(width, height, 3, data).unwrap()
    }

    #[test]
    fn test_roundtrip_both_planes() {
        let cover = gradient(20, 10);
        for bit in [BitIndex::Standard, BitIndex::Alternate] {
            let marked = encode(&cover, "[!] Crash logged", bit);
            assert_eq!(decode(&marked, bit).unwrap(), "[!] Crash logged");
        }
    }

    #[test]
    fn test_planes_do_not_interfere() {
        let cover = gradient(20, 10);

        let a = encode(&encode(&cover, "first", BitIndex::Standard), "second", BitIndex::Alternate);
        assert_eq!(decode(&a, BitIndex::Standard).unwrap(), "first");
        assert_eq!(decode(&a, BitIndex::Alternate).unwrap(), "second");

        let b = encode(&encode(&cover, "second", BitIndex::Alternate), "first", BitIndex::Standard);
        assert_eq!(a, b);
    }

    #[test]
    fn test_only_the_target_bit_changes() {
        let cover = gradient(8, 8);
        let marked = encode(&cover, "xyz", BitIndex::Alternate);
        for (before, after) in cover.as_bytes().iter().zip(marked.as_bytes()) {
            assert_eq!(before & !0b1000, after & !0b1000);
        }
    }

    #[test]
    fn test_input_not_mutated() {
        let cover = gradient(4, 4);
        let snapshot = cover.clone();
        let _ = encode(&cover, "abc", BitIndex::Standard);
        assert_eq!(cover, snapshot);
    }

    #[test]
    fn test_msb_first_layout() {
        // 'A' = 0b0100_0001 followed by the terminator.
        let cover = Image::filled(6, 1, [0, 0, 0]);
        let marked = encode(&cover, "A", BitIndex::Standard);
        let bits: Vec<u8> = marked.as_bytes().iter().map(|c| c & 1).collect();
        assert_eq!(&bits[..8], &[0, 1, 0, 0, 0, 0, 0, 1]);
        assert!(bits[8..16].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_empty_message_on_tiny_image() {
        // 2x1 pixels: 6 bits of capacity, less than one terminator byte.
        let cover = Image::filled(2, 1, [0xff, 0xff, 0xff]);
        let marked = encode(&cover, "", BitIndex::Standard);
        assert!(marked.as_bytes().iter().all(|c| *c == 0xfe));
        assert_eq!(decode(&marked, BitIndex::Standard).unwrap(), "");
    }

    #[test]
    fn test_overflow_truncates_silently() {
        let cover = Image::filled(4, 1, [0, 0, 0]);
        assert_eq!(capacity_bits(&cover), 12);
        let marked = encode(&cover, "hello", BitIndex::Standard);
        // Only the first full byte fits.
        assert_eq!(decode(&marked, BitIndex::Standard).unwrap(), "h");
    }

    #[test]
    fn test_missing_terminator_returns_everything() {
        // Every channel carries a set bit: 0xff bytes, never a zero byte.
        let cover = Image::filled(8, 1, [1, 1, 1]);
        let bytes = decode_bytes(&cover, BitIndex::Standard).unwrap();
        assert_eq!(bytes, vec![0xff; 3]);
    }

    #[test]
    fn test_exact_capacity_roundtrip() {
        let cover = gradient(8, 4);
        assert_eq!(max_message_len(&cover), 11);
        let message = "abcdefghijk";
        let marked = encode(&cover, message, BitIndex::Alternate);
        assert_eq!(decode(&marked, BitIndex::Alternate).unwrap(), message);
    }

    #[test]
    fn test_decode_normalizes_channels() {
        let rgba: Vec<u8> = encode(&gradient(6, 6), "rgba", BitIndex::Standard)
            .as_bytes()
            .chunks_exact(3)
            .flat_map(|px| [px[0], px[1], px[2], 0x80])
            .collect();
        let img = Image::from_raw(6, 6, 4, rgba).unwrap();
        assert_eq!(decode(&img, BitIndex::Standard).unwrap(), "rgba");
    }

    #[test]
    fn test_decode_empty_image_fails() {
        let img = Image::from_raw(0, 0, 3, vec![]).unwrap();
        assert_eq!(
            decode(&img, BitIndex::Standard).unwrap_err(),
            ImageDecodeError::Empty { width: 0, height: 0 }
        );
    }

    #[test]
    fn test_utf8_roundtrip() {
        let cover = gradient(32, 32);
        let marked = encode(&cover, "héllo 🎉", BitIndex::Standard);
        assert_eq!(decode(&marked, BitIndex::Standard).unwrap(), "héllo 🎉");
    }

    #[test]
    fn test_bit_index_conversion() {
        assert_eq!(BitIndex::try_from(0), Ok(BitIndex::Standard));
        assert_eq!(BitIndex::try_from(3), Ok(BitIndex::Alternate));
        assert_eq!(BitIndex::try_from(1), Err(BitIndexError(1)));
        assert_eq!(BitIndex::Alternate.to_string(), "3");
    }
}
