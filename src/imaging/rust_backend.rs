//! Pure Rust image processing backend.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image::ImageReader::with_format` + `image::Limits` |
//! | Format sniffing | `image::guess_format` |
//! | Resize (static) | `DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (configured quality) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless) |
//! | Animated GIF | `gif` crate, see [`animation`](super::animation) |

use super::animation;
use super::backend::{BackendError, ImageBackend};
use super::calculations::resolve_target;
use super::params::{AnimatedParams, ResourceLimits, StaticParams};
use crate::types::DeclaredFormat;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, Limits};
use std::io::Cursor;

/// Average bytes per decoded pixel budgeted by the allocation limit
/// (RGBA8 plus resize scratch space).
const BYTES_PER_PIXEL_BUDGET: u64 = 8;

/// Pure Rust backend using the `image` and `gif` crates.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn image_format(format: DeclaredFormat) -> ImageFormat {
    match format {
        DeclaredFormat::Jpeg => ImageFormat::Jpeg,
        DeclaredFormat::Png => ImageFormat::Png,
        DeclaredFormat::Gif => ImageFormat::Gif,
    }
}

fn decode_limits(limits: &ResourceLimits) -> Limits {
    let mut out = Limits::default();
    out.max_image_width = Some(limits.max_source_dimension);
    out.max_image_height = Some(limits.max_source_dimension);
    out.max_alloc = Some(limits.max_source_pixels.saturating_mul(BYTES_PER_PIXEL_BUDGET));
    out
}

/// Decode `content` strictly as `format`.
///
/// Content whose magic bytes identify a different format fails up front, so a
/// JPEG uploaded as `image/png` is a decode error rather than a silent
/// format switch.
fn load_image(
    content: &[u8],
    format: DeclaredFormat,
    limits: &ResourceLimits,
) -> Result<DynamicImage, BackendError> {
    let expected = image_format(format);
    if let Ok(actual) = image::guess_format(content)
        && actual != expected
    {
        return Err(BackendError::Decode(format!(
            "declared {} but content looks like {:?}",
            format, actual
        )));
    }

    let mut reader = ImageReader::with_format(Cursor::new(content), expected);
    reader.limits(decode_limits(limits));
    reader.decode().map_err(|e| match e {
        ImageError::Limits(l) => BackendError::TooLarge(l.to_string()),
        other => BackendError::Decode(format!("invalid {}: {}", format, other)),
    })
}

/// Encode in the declared format.
fn encode_image(
    img: &DynamicImage,
    format: DeclaredFormat,
    quality: u8,
) -> Result<Vec<u8>, BackendError> {
    let mut out = Vec::new();
    let result = match format {
        DeclaredFormat::Jpeg => {
            // JPEG has no alpha channel and only 8-bit samples
            let flat = match img {
                DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => img.clone(),
                other => DynamicImage::ImageRgb8(other.to_rgb8()),
            };
            flat.write_with_encoder(JpegEncoder::new_with_quality(&mut out, quality))
        }
        DeclaredFormat::Png => img.write_with_encoder(PngEncoder::new(&mut out)),
        DeclaredFormat::Gif => {
            return Err(BackendError::Encode(
                "GIF output goes through the animation encoder".into(),
            ));
        }
    };
    result.map_err(|e| BackendError::Encode(format!("{} encode failed: {}", format, e)))?;
    Ok(out)
}

impl ImageBackend for RustBackend {
    fn resize_static(&self, content: &[u8], params: &StaticParams) -> Result<Vec<u8>, BackendError> {
        if params.format.is_animated() {
            return Err(BackendError::Decode(format!(
                "{} is not a single-frame format",
                params.format
            )));
        }

        let img = load_image(content, params.format, &params.limits)?;
        let (width, height) = resolve_target(
            (img.width(), img.height()),
            params.size,
            params.limits.max_output_dimension,
        )
        .map_err(|e| BackendError::InvalidDimensions(format!("cannot resize image: {e}")))?;

        tracing::debug!(
            format = %params.format,
            from = %format!("{}x{}", img.width(), img.height()),
            to = %format!("{width}x{height}"),
            "resizing image"
        );

        let resized = img.resize_exact(width, height, FilterType::Lanczos3);
        encode_image(&resized, params.format, params.quality.value())
    }

    fn resize_animated(
        &self,
        content: &[u8],
        params: &AnimatedParams,
    ) -> Result<Vec<u8>, BackendError> {
        animation::resize_animated(content, params)
    }
}
