//! Multi-frame (GIF) resizing.
//!
//! The `image` crate hands out composited RGBA frames but drops the color
//! tables, which are needed to re-quantize each frame against its own
//! palette. Decoding therefore goes through the `gif` crate in indexed mode.
//!
//! ## Steps
//!
//! 1. **Decode** frames one at a time: pixels, palette (local, else global),
//!    transparent index, delay, disposal, and the loop count.
//! 2. **Place** each frame on the target screen: its on-screen rectangle is
//!    scaled by the same factors as the logical screen.
//! 3. **Resample** the frame's own pixels into that rectangle (Catmull-Rom).
//! 4. **Quantize** the result against that frame's own palette with
//!    Floyd–Steinberg dithering (see [`palette`](super::palette)).
//! 5. **Encode** one output frame per input frame at its scaled offset, with
//!    its own local palette, transparent index, delay and disposal.
//!
//! Nothing is composited here. A viewer composites the output the same way it
//! composites the source. Frames are rendered on the rayon pool in batches of
//! one per worker, so only the batch in flight holds RGBA pixels. The summed
//! source and output frame areas are capped by
//! [`ResourceLimits::max_animation_pixels`].

use super::backend::BackendError;
use super::calculations::{Rect, clip_rect, resolve_target, scale_rect};
use super::palette::{FramePalette, quantize_frame};
use super::params::{AnimatedParams, ResourceLimits};
use gif::{DisposalMethod, Repeat};
use image::imageops::{self, ColorMap, FilterType};
use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use std::borrow::Cow;
use std::io::Cursor;

/// Resampling filter for animation frames: softer and cheaper than Lanczos3,
/// which matters when every frame is resized.
const FRAME_FILTER: FilterType = FilterType::CatmullRom;

/// One decoded frame, reduced to the part that lies on the logical screen.
#[derive(Debug, Clone)]
pub(crate) struct SourceFrame {
    /// On-screen rectangle; `None` when the frame is entirely off-screen.
    pub rect: Option<Rect>,
    /// `rect`-sized pixels. Transparent and out-of-table indices have alpha 0.
    pub pixels: RgbaImage,
    pub palette: FramePalette,
    /// Display delay in centiseconds.
    pub delay: u16,
    pub dispose: DisposalMethod,
}

impl SourceFrame {
    /// Convert one indexed `gif` frame. `index` only appears in errors.
    pub(crate) fn from_gif(
        frame: &gif::Frame<'_>,
        global_palette: Option<&[u8]>,
        screen: (u32, u32),
        index: usize,
    ) -> Result<Self, BackendError> {
        let table = frame.palette.as_deref().or(global_palette).unwrap_or_default();
        let palette = FramePalette::from_gif(table, frame.transparent);
        if palette.is_empty() {
            return Err(BackendError::Decode(format!(
                "frame {index} has no color table"
            )));
        }

        let placed = Rect {
            x: u32::from(frame.left),
            y: u32::from(frame.top),
            width: u32::from(frame.width),
            height: u32::from(frame.height),
        };
        let rect = clip_rect(placed, screen);
        let stride = usize::from(frame.width);
        // Clipping only trims the right and bottom edges, so patch
        // coordinates are frame coordinates
        let pixels = match rect {
            Some(r) => RgbaImage::from_fn(r.width, r.height, |x, y| {
                frame
                    .buffer
                    .get(y as usize * stride + x as usize)
                    .and_then(|&i| palette.lookup(usize::from(i)))
                    .unwrap_or(Rgba([0, 0, 0, 0]))
            }),
            None => RgbaImage::new(0, 0),
        };

        Ok(Self {
            rect,
            pixels,
            palette,
            delay: frame.delay,
            dispose: frame.dispose,
        })
    }
}

/// Running pixel total for one side (source or output) of an animation.
struct PixelBudget {
    used: u64,
    limit: u64,
    side: &'static str,
}

impl PixelBudget {
    fn new(limit: u64, side: &'static str) -> Self {
        Self {
            used: 0,
            limit,
            side,
        }
    }

    fn charge(&mut self, pixels: u64) -> Result<(), BackendError> {
        self.used = self.used.saturating_add(pixels);
        if self.used > self.limit {
            return Err(BackendError::TooLarge(format!(
                "animation {} frames exceed {} pixels",
                self.side, self.limit
            )));
        }
        Ok(())
    }
}

/// A decoded frame waiting to be rendered, with its output rectangle.
type PendingFrame = (SourceFrame, Option<Rect>);

/// Resize a GIF animation. See the [module docs](self).
pub fn resize_animated(content: &[u8], params: &AnimatedParams) -> Result<Vec<u8>, BackendError> {
    let limits = &params.limits;
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options
        .read_info(Cursor::new(content))
        .map_err(|e| BackendError::Decode(format!("invalid GIF: {e}")))?;

    let screen = (u32::from(decoder.width()), u32::from(decoder.height()));
    check_screen(screen, limits)?;
    let target = resolve_target(screen, params.size, limits.max_output_dimension)
        .map_err(|e| BackendError::InvalidDimensions(format!("cannot resize animation: {e}")))?;
    let (out_w, out_h) = gif_dimensions(target)?;

    tracing::debug!(
        from = %format!("{}x{}", screen.0, screen.1),
        to = %format!("{}x{}", target.0, target.1),
        "resizing animation"
    );

    let global_palette = decoder.global_palette().map(<[u8]>::to_vec);
    let batch_size = rayon::current_num_threads().max(1);
    let mut batch: Vec<PendingFrame> = Vec::with_capacity(batch_size);
    let mut frames: Vec<gif::Frame<'static>> = Vec::new();
    let mut decoded = 0usize;
    let mut source_budget = PixelBudget::new(limits.max_animation_pixels, "source");
    let mut output_budget = PixelBudget::new(limits.max_animation_pixels, "output");

    while let Some(frame) = decoder
        .read_next_frame()
        .map_err(|e| BackendError::Decode(format!("frame {decoded}: {e}")))?
    {
        if decoded >= limits.max_frames {
            return Err(BackendError::TooLarge(format!(
                "more than {} frames",
                limits.max_frames
            )));
        }

        let source = SourceFrame::from_gif(frame, global_palette.as_deref(), screen, decoded)?;
        let out_rect = source.rect.map(|r| scale_rect(r, screen, target));
        source_budget.charge(source.rect.map_or(0, |r| r.area()))?;
        output_budget.charge(out_rect.map_or(1, |r| r.area()))?;

        batch.push((source, out_rect));
        decoded += 1;
        if batch.len() == batch_size {
            render_batch(&mut batch, &mut frames);
        }
    }
    render_batch(&mut batch, &mut frames);

    if frames.is_empty() {
        return Err(BackendError::Decode("GIF contains no frames".into()));
    }

    tracing::debug!(frames = frames.len(), "animation resized");
    encode_animation(out_w, out_h, decoder.repeat(), &frames)
}

/// Render every pending frame in parallel, appending in input order.
fn render_batch(batch: &mut Vec<PendingFrame>, frames: &mut Vec<gif::Frame<'static>>) {
    let rendered: Vec<gif::Frame<'static>> = batch
        .par_iter()
        .map(|(source, out_rect)| render_frame(source, *out_rect))
        .collect();
    frames.extend(rendered);
    batch.clear();
}

/// GIF dimensions are 16-bit.
fn gif_dimensions((width, height): (u32, u32)) -> Result<(u16, u16), BackendError> {
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) => Ok((w, h)),
        _ => Err(BackendError::InvalidDimensions(format!(
            "{width}x{height} exceeds the GIF maximum of {}",
            u16::MAX
        ))),
    }
}

fn check_screen((width, height): (u32, u32), limits: &ResourceLimits) -> Result<(), BackendError> {
    if width == 0 || height == 0 {
        return Err(BackendError::Decode(format!(
            "GIF has an empty logical screen ({width}x{height})"
        )));
    }
    if width > limits.max_source_dimension || height > limits.max_source_dimension {
        return Err(BackendError::TooLarge(format!(
            "{width}x{height} exceeds the {}px source limit",
            limits.max_source_dimension
        )));
    }
    let pixels = u64::from(width) * u64::from(height);
    if pixels > limits.max_source_pixels {
        return Err(BackendError::TooLarge(format!(
            "{width}x{height} exceeds {} pixels",
            limits.max_source_pixels
        )));
    }
    Ok(())
}

/// Resample one frame into its output rectangle and re-quantize it against
/// its own palette.
fn render_frame(source: &SourceFrame, out_rect: Option<Rect>) -> gif::Frame<'static> {
    let Some(rect) = out_rect else {
        return invisible_frame(source);
    };
    let resized = imageops::resize(&source.pixels, rect.width, rect.height, FRAME_FILTER);
    let indices = quantize_frame(resized, &source.palette);

    // Output rectangles lie inside the target screen, which fits in u16
    gif::Frame {
        left: rect.x as u16,
        top: rect.y as u16,
        width: rect.width as u16,
        height: rect.height as u16,
        delay: source.delay,
        dispose: source.dispose,
        transparent: source.palette.transparent_index(),
        palette: Some(source.palette.to_gif()),
        buffer: Cow::Owned(indices),
        ..gif::Frame::default()
    }
}

/// Stand-in for a frame drawn entirely off-screen: one transparent pixel
/// that keeps the frame's delay.
fn invisible_frame(source: &SourceFrame) -> gif::Frame<'static> {
    let key = source.palette.transparent_index().unwrap_or(0);
    gif::Frame {
        width: 1,
        height: 1,
        delay: source.delay,
        dispose: DisposalMethod::Keep,
        transparent: Some(key),
        palette: Some(source.palette.to_gif()),
        buffer: Cow::Owned(vec![key]),
        ..gif::Frame::default()
    }
}

fn encode_animation(
    width: u16,
    height: u16,
    repeat: Repeat,
    frames: &[gif::Frame<'static>],
) -> Result<Vec<u8>, BackendError> {
    let encode_err = |e: gif::EncodingError| BackendError::Encode(format!("GIF encode failed: {e}"));

    let mut out = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut out, width, height, &[]).map_err(encode_err)?;
        // No loop extension in the source means "play once"
        if !matches!(repeat, Repeat::Finite(0)) {
            encoder.set_repeat(repeat).map_err(encode_err)?;
        }
        for frame in frames {
            encoder.write_frame(frame).map_err(encode_err)?;
        }
    }
    Ok(out)
}
