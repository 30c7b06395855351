//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`pipeline`](crate::pipeline) (which decides what
//! result a request needs) and the [`backend`](super::backend) (which does
//! the pixel work). The separation lets tests swap in a recording mock.
//!
//! ## Types
//!
//! - [`Quality`]: JPEG encoding quality (1–100, default 75). Clamped on construction.
//! - [`RequestedSize`]: Caller-requested dimensions where 0 means "auto".
//! - [`ResourceLimits`]: Ceilings on decoding untrusted input and on the output it produces.
//! - [`StaticParams`] / [`AnimatedParams`]: Full specification of one resize.

use crate::types::DeclaredFormat;

/// Quality setting for lossy (JPEG) encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u8);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100) as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    /// The conventional JPEG encoder default.
    fn default() -> Self {
        Self(75)
    }
}

/// Dimensions as requested by the caller. A zero axis is derived from the
/// source aspect ratio once the source dimensions are known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestedSize {
    pub width: u32,
    pub height: u32,
}

impl RequestedSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Ceilings for untrusted uploads and the images made from them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Largest accepted source (or logical screen) area in pixels.
    pub max_source_pixels: u64,
    /// Largest accepted source width or height.
    pub max_source_dimension: u32,
    /// Largest accepted number of animation frames.
    pub max_frames: usize,
    /// Total pixels one animation may decode, and separately produce,
    /// summed over its frames.
    pub max_animation_pixels: u64,
    /// Largest resolved output width or height, derived axes included.
    pub max_output_dimension: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_source_pixels: 40_000_000,
            max_source_dimension: 16_384,
            max_frames: 500,
            max_animation_pixels: 200_000_000,
            max_output_dimension: 4096,
        }
    }
}

/// Parameters for a single-frame (JPEG/PNG) resize.
#[derive(Debug, Clone, PartialEq)]
pub struct StaticParams {
    pub format: DeclaredFormat,
    pub size: RequestedSize,
    pub quality: Quality,
    pub limits: ResourceLimits,
}

/// Parameters for an animated (GIF) resize.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimatedParams {
    pub size: RequestedSize,
    pub limits: ResourceLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_75() {
        assert_eq!(Quality::default().value(), 75);
    }

    #[test]
    fn default_limits_are_nonzero() {
        let limits = ResourceLimits::default();
        assert!(limits.max_source_pixels > 0);
        assert!(limits.max_source_dimension > 0);
        assert!(limits.max_frames > 0);
        assert!(limits.max_animation_pixels > 0);
        assert!(limits.max_output_dimension <= u32::from(u16::MAX));
    }
}
