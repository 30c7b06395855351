//! Image processing in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode JPEG/PNG** | `image` crate, strict per declared format |
//! | **Resize static** | Lanczos3 via `DynamicImage::resize_exact` |
//! | **Decode/encode GIF** | `gif` crate (indexed frames, palettes, delays) |
//! | **Resize frame** | Catmull-Rom via `imageops::resize` |
//! | **Re-quantize frame** | Floyd–Steinberg via `imageops::dither` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Animation / Palette**: the multi-frame GIF path

pub(crate) mod animation;
pub mod backend;
mod calculations;
pub mod palette;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, ImageBackend};
pub use calculations::{Rect, SizeError, resolve_target};
pub use params::{AnimatedParams, Quality, RequestedSize, ResourceLimits, StaticParams};
pub use rust_backend::RustBackend;
