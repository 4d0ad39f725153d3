//! Hand-crafted polyglot buffers that satisfy [`classify`](crate::classify).
//!
//! These are not valid images; they exist to exercise the crash flow.

use crate::{JPEG_SOI, PNG_SIGNATURE};

/// Which sample to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// PNG signature and IHDR chunk with a JFIF marker inside.
    PngWithJfif,
    /// JPEG/JFIF header with a PNG signature inside.
    JpegWithPng,
    /// 1x1 PNG skeleton carrying a JFIF marker.
    Minimal,
}

impl std::str::FromStr for SampleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "png" | "png-with-jfif" => Ok(SampleKind::PngWithJfif),
            "jpeg" | "jpeg-with-png" => Ok(SampleKind::JpegWithPng),
            "minimal" => Ok(SampleKind::Minimal),
            other => Err(format!("unknown sample kind: {}", other)),
        }
    }
}

/// Build the requested sample.
pub fn build(kind: SampleKind) -> Vec<u8> {
    match kind {
        SampleKind::PngWithJfif => png_with_jfif(),
        SampleKind::JpegWithPng => jpeg_with_png(),
        SampleKind::Minimal => minimal(),
    }
}

fn png_with_jfif() -> Vec<u8> {
    let mut data = PNG_SIGNATURE.to_vec();
    data.extend_from_slice(b"\x00\x00\x00\rIHDR");
    data.extend_from_slice(&[0u8; 13]);
    data.extend_from_slice(b"JFIF\x00\x01\x01\x01");
    data.extend_from_slice(&[0u8; 200]);
    data
}

fn jpeg_with_png() -> Vec<u8> {
    let mut data = JPEG_SOI.to_vec();
    data.extend_from_slice(b"\xff\xe0\x00\x10JFIF\x00\x01\x01\x01");
    data.extend_from_slice(PNG_SIGNATURE);
    data.extend_from_slice(b"\xff\xd9");
    data.extend_from_slice(&[0u8; 150]);
    data
}

fn minimal() -> Vec<u8> {
    let mut data = PNG_SIGNATURE.to_vec();
    data.extend_from_slice(b"\x00\x00\x00\x0dIHDR");
    data.extend_from_slice(&[0, 0, 0, 1, 0, 0, 0, 1]);
    data.extend_from_slice(&[8, 2, 0, 0, 0]);
    data.extend_from_slice(b"\x90wS\xde");
    data.extend_from_slice(b"JFIF\x00\x01");
    data.extend_from_slice(b"\x00\x00\x00\x00IEND\xaeB`\x82");
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{inspect, AnomalyKind};

    #[test]
    fn test_every_sample_triggers() {
        assert_eq!(
            inspect(&build(SampleKind::PngWithJfif)).kind,
            Some(AnomalyKind::PngWithJpegMarker)
        );
        assert_eq!(
            inspect(&build(SampleKind::JpegWithPng)).kind,
            Some(AnomalyKind::JpegWithPngMarker)
        );
        assert_eq!(
            inspect(&build(SampleKind::Minimal)).kind,
            Some(AnomalyKind::PngWithJpegMarker)
        );
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!("minimal".parse::<SampleKind>(), Ok(SampleKind::Minimal));
        assert_eq!("jpeg".parse::<SampleKind>(), Ok(SampleKind::JpegWithPng));
        assert!("gif".parse::<SampleKind>().is_err());
    }
}
