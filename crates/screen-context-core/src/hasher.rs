//! Perceptual (mean) hashing of frames.
//!
//! Wraps an [`image_hasher`] mean hash at 8x8: the frame is reduced to
//! luminance, resized to 8x8, and each pixel contributes a `1` bit when it
//! is at or above the mean. The result survives JPEG re-encoding and small
//! amounts of noise, while layout or content changes flip many bits at once.

use image_hasher::{HashAlg, Hasher, HasherConfig};

use crate::error::CaptureError;
use crate::models::{Fingerprint, Frame};

pub struct PerceptualHasher {
    inner: Hasher,
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl PerceptualHasher {
    pub fn new() -> Self {
        let inner = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Mean)
            .to_hasher();
        Self { inner }
    }

    pub fn hash(&self, frame: &Frame) -> Result<Fingerprint, CaptureError> {
        let (w, h) = (frame.width(), frame.height());
        if w == 0 || h == 0 {
            return Err(CaptureError::invalid_frame(format!(
                "cannot hash a {}x{} frame",
                w, h
            )));
        }

        let hash = self.inner.hash_image(frame.image());
        let bytes: [u8; 8] = hash.as_bytes().try_into().map_err(|_| {
            CaptureError::invalid_frame(format!(
                "expected a 64-bit hash, got {} bytes",
                hash.as_bytes().len()
            ))
        })?;
        Ok(Fingerprint(u64::from_be_bytes(bytes)))
    }
}
