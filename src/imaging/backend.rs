//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the pipeline needs:
//! a single-frame resize (JPEG/PNG) and an animated resize (GIF). Both take
//! the uploaded bytes and return the encoded output bytes; persistence is
//! the caller's job, so a backend never touches the storage directory.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::{AnimatedParams, StaticParams};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    /// The bytes are not a valid instance of the declared format.
    #[error("Decode failed: {0}")]
    Decode(String),
    /// The resized image could not be encoded.
    #[error("Encode failed: {0}")]
    Encode(String),
    /// The input exceeds a configured decode limit.
    #[error("Input too large: {0}")]
    TooLarge(String),
    /// The requested size cannot be applied to this source.
    #[error("Invalid dimensions: {0}")]
    InvalidDimensions(String),
}

/// Trait for image processing backends.
///
/// Implementations must be `Sync`: one backend instance serves every
/// concurrent request.
pub trait ImageBackend: Sync {
    /// Decode a JPEG or PNG, resample it, and re-encode in the same format.
    fn resize_static(&self, content: &[u8], params: &StaticParams) -> Result<Vec<u8>, BackendError>;

    /// Decode a GIF animation, resample and re-quantize every frame, and
    /// re-encode the sequence.
    fn resize_animated(
        &self,
        content: &[u8],
        params: &AnimatedParams,
    ) -> Result<Vec<u8>, BackendError>;
}
