//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::RequestedSize;
use thiserror::Error;

/// Why a requested size cannot be turned into concrete dimensions.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeError {
    /// Both axes were 0: nothing to derive the other one from.
    #[error("width and height cannot both be 0")]
    BothAxesAuto,
    /// The source has a zero-length axis.
    #[error("source image has no pixels")]
    EmptySource,
    /// The resolved size (including a derived axis) is over the limit.
    #[error("resolved size {width}x{height} exceeds the maximum dimension of {max}")]
    ExceedsMaximum { width: u32, height: u32, max: u32 },
}

/// Resolve a requested size against the source dimensions.
///
/// A 0 on one axis is derived from the source aspect ratio, rounded to the
/// nearest pixel and never below 1. When both axes are given the result is
/// exactly the request; the aspect ratio is not preserved.
///
/// Either resolved axis above `max_dimension` is an error, so a very thin
/// source cannot turn a modest width into an enormous derived height.
///
/// # Examples
/// ```
/// # use media_resizer::imaging::{RequestedSize, resolve_target};
/// // 400x300 scaled to width 100 → 100x75
/// assert_eq!(resolve_target((400, 300), RequestedSize::new(100, 0), 4096), Ok((100, 75)));
///
/// // Height only: 400x300 to height 150 → 200x150
/// assert_eq!(resolve_target((400, 300), RequestedSize::new(0, 150), 4096), Ok((200, 150)));
/// ```
pub fn resolve_target(
    source: (u32, u32),
    requested: RequestedSize,
    max_dimension: u32,
) -> Result<(u32, u32), SizeError> {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return Err(SizeError::EmptySource);
    }

    let (width, height) = match (requested.width, requested.height) {
        (0, 0) => return Err(SizeError::BothAxesAuto),
        (w, 0) => (w, scale_axis(src_h, w, src_w)),
        (0, h) => (scale_axis(src_w, h, src_h), h),
        (w, h) => (w, h),
    };

    if width > max_dimension || height > max_dimension {
        return Err(SizeError::ExceedsMaximum {
            width,
            height,
            max: max_dimension,
        });
    }
    Ok((width, height))
}

/// `value * numer / denom`, rounded, clamped to at least 1.
fn scale_axis(value: u32, numer: u32, denom: u32) -> u32 {
    let scaled = (value as f64 * numer as f64 / denom as f64).round();
    scaled.clamp(1.0, u32::MAX as f64) as u32
}

/// An axis-aligned pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Clip `rect` to a `(width, height)` screen anchored at the origin.
///
/// Returns `None` when no pixel of `rect` is on screen.
pub fn clip_rect(rect: Rect, screen: (u32, u32)) -> Option<Rect> {
    let (screen_w, screen_h) = screen;
    if rect.x >= screen_w || rect.y >= screen_h || rect.width == 0 || rect.height == 0 {
        return None;
    }
    Some(Rect {
        width: rect.width.min(screen_w - rect.x),
        height: rect.height.min(screen_h - rect.y),
        ..rect
    })
}

/// Map an on-screen rectangle from a `source` screen onto a `target` screen.
///
/// The result covers every target pixel the source rectangle touches and is
/// at least 1×1. It never extends past the target screen.
pub fn scale_rect(rect: Rect, source: (u32, u32), target: (u32, u32)) -> Rect {
    let (x, width) = scale_span(rect.x, rect.width, source.0, target.0);
    let (y, height) = scale_span(rect.y, rect.height, source.1, target.1);
    Rect {
        x,
        y,
        width,
        height,
    }
}

/// Scale `[start, start + len)` from `from` units to `to` units: start
/// rounds down, end rounds up.
fn scale_span(start: u32, len: u32, from: u32, to: u32) -> (u32, u32) {
    let (from, to) = (u64::from(from.max(1)), u64::from(to.max(1)));
    let begin = (u64::from(start) * to / from).min(to - 1);
    let end = ((u64::from(start) + u64::from(len)) * to).div_ceil(from).min(to);
    let end = end.max(begin + 1);
    (begin as u32, (end - begin) as u32)
}
