//! Core data types flowing through the capture pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use image::RgbaImage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CaptureError;

/// Identifier handed back by a [`PersistenceSink`](crate::PersistenceSink)
/// for a stored frame (the `screenshots.id` row id in the SQLite sink).
pub type ReferenceId = i64;

/// A raw captured frame: RGBA pixels plus the moment they were grabbed.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbaImage,
    captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbaImage, captured_at: DateTime<Utc>) -> Self {
        Self { image, captured_at }
    }

    /// Build a frame from a tightly packed RGBA buffer.
    ///
    /// Fails with [`CaptureError::InvalidFrame`] when either dimension is
    /// zero or `data.len() != width * height * 4`.
    pub fn from_rgba(
        width: u32,
        height: u32,
        data: Vec<u8>,
        captured_at: DateTime<Utc>,
    ) -> Result<Self, CaptureError> {
        if width == 0 || height == 0 {
            return Err(CaptureError::invalid_frame(format!(
                "zero-sized frame ({}x{})",
                width, height
            )));
        }
        let len = data.len();
        let image = RgbaImage::from_raw(width, height, data).ok_or_else(|| {
            CaptureError::invalid_frame(format!(
                "buffer of {} bytes does not match {}x{} RGBA",
                len, width, height
            ))
        })?;
        Ok(Self { image, captured_at })
    }

    /// Decode an encoded image (PNG, JPEG) into a frame.
    pub fn decode(bytes: &[u8], captured_at: DateTime<Utc>) -> Result<Self, CaptureError> {
        if bytes.is_empty() {
            return Err(CaptureError::invalid_frame("no image data"));
        }
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| CaptureError::invalid_frame(format!("failed to decode image: {}", e)))?;
        Ok(Self::new(decoded.to_rgba8(), captured_at))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

/// 64-bit perceptual fingerprint.
///
/// Holds the 8 bytes of an 8x8 mean hash, first byte most significant, so
/// the hex form matches the hash's own byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub const BITS: u32 = 64;

    pub fn bits(self) -> u64 {
        self.0
    }

    /// Number of differing bits.
    pub fn hamming_distance(self, other: Fingerprint) -> u32 {
        (self.0 ^ other.0).count_ones()
    }

    pub fn to_hex(self) -> String {
        format!("{:016x}", self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, CaptureError> {
        if s.len() != 16 {
            return Err(CaptureError::invalid_frame(format!(
                "fingerprint hex must be 16 characters, got {}",
                s.len()
            )));
        }
        u64::from_str_radix(s, 16)
            .map(Fingerprint)
            .map_err(|e| CaptureError::invalid_frame(format!("invalid fingerprint hex: {}", e)))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Fingerprint::from_hex(s)
    }
}

impl Serialize for Fingerprint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Fingerprint::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A fingerprint retained by the [`HashStore`](crate::HashStore).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashRecord {
    pub fingerprint: Fingerprint,
    pub timestamp: DateTime<Utc>,
    /// `None` when the accepted frame failed to persist.
    pub reference_id: Option<ReferenceId>,
}

impl HashRecord {
    pub fn new(
        fingerprint: Fingerprint,
        timestamp: DateTime<Utc>,
        reference_id: Option<ReferenceId>,
    ) -> Self {
        Self {
            fingerprint,
            timestamp,
            reference_id,
        }
    }
}

/// Outcome of running one frame through the dedup gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureDecision {
    pub accepted: bool,
    /// Distance to the closest retained fingerprint; `None` means the store
    /// was empty (infinite distance).
    pub nearest_distance: Option<u32>,
    pub matched_reference: Option<ReferenceId>,
    pub fingerprint: Fingerprint,
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_rejects_zero_dimensions() {
        let err = Frame::from_rgba(0, 10, Vec::new(), Utc::now()).unwrap_err();
        assert!(matches!(err, CaptureError::InvalidFrame(_)));
    }

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        let err = Frame::from_rgba(4, 4, vec![0; 10], Utc::now()).unwrap_err();
        assert!(err.to_string().contains("does not match 4x4"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Frame::decode(b"definitely not a png", Utc::now()).is_err());
        assert!(Frame::decode(&[], Utc::now()).is_err());
    }

    #[test]
    fn test_decode_png() {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let frame = Frame::decode(&bytes, Utc::now()).unwrap();
        assert_eq!((frame.width(), frame.height()), (3, 2));
        assert_eq!(frame.image().get_pixel(1, 1).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_hamming_distance_to_self_is_zero() {
        for bits in [0u64, 1, 0xdead_beef_cafe_f00d, u64::MAX] {
            let fp = Fingerprint(bits);
            assert_eq!(fp.hamming_distance(fp), 0);
        }
        assert_eq!(Fingerprint(0).hamming_distance(Fingerprint(u64::MAX)), 64);
        assert_eq!(Fingerprint(0b1111).hamming_distance(Fingerprint(0)), 4);
    }

    #[test]
    fn test_hex_format() {
        let fp = Fingerprint(0x00ff_0000_0000_0001);
        assert_eq!(fp.to_hex(), "00ff000000000001");
        assert_eq!(Fingerprint::from_hex("00ff000000000001").unwrap(), fp);
        assert_eq!("00ff000000000001".parse::<Fingerprint>().unwrap(), fp);
        assert!(Fingerprint::from_hex("abc").is_err());
        assert!(Fingerprint::from_hex("zzzzzzzzzzzzzzzz").is_err());
    }
}
