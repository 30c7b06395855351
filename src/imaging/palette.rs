//! Per-frame palette quantization.
//!
//! After a GIF frame is resampled it holds arbitrary RGBA colors. Before it
//! can be written back it has to be reduced to an indexed image again. Each
//! frame is quantized against **its own** original color table (the frame's
//! local palette, or the global one it was drawn with): reusing another
//! frame's table produces visible banding.
//!
//! Quantization uses Floyd–Steinberg error diffusion via
//! [`image::imageops::dither`], driven by [`FramePalette`] as the
//! [`ColorMap`].

use image::imageops::{self, ColorMap};
use image::{Rgba, RgbaImage};

/// Alpha below this is treated as transparent.
const ALPHA_THRESHOLD: u8 = 128;

/// A single frame's color table, usable as an [`image`] color map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePalette {
    colors: Vec<[u8; 3]>,
    transparent: Option<usize>,
}

impl FramePalette {
    /// Build from a GIF color table (packed RGB triples) and the frame's
    /// transparent index. A transparent index outside the table is ignored.
    pub fn from_gif(table: &[u8], transparent: Option<u8>) -> Self {
        let colors: Vec<[u8; 3]> = table
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let transparent = transparent
            .map(usize::from)
            .filter(|&t| t < colors.len());
        Self {
            colors,
            transparent,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// The transparent index, if it names an entry of this table.
    pub fn transparent_index(&self) -> Option<u8> {
        self.transparent.and_then(|t| u8::try_from(t).ok())
    }

    /// Packed RGB triples, as written to a GIF local color table.
    pub fn to_gif(&self) -> Vec<u8> {
        self.colors.iter().flatten().copied().collect()
    }

    /// Closest opaque entry by squared RGB distance.
    fn nearest(&self, [r, g, b]: [u8; 3]) -> usize {
        let mut best = (0, u32::MAX);
        for (i, &[pr, pg, pb]) in self.colors.iter().enumerate() {
            if Some(i) == self.transparent {
                continue;
            }
            let dr = r as i32 - pr as i32;
            let dg = g as i32 - pg as i32;
            let db = b as i32 - pb as i32;
            let dist = (dr * dr + dg * dg + db * db) as u32;
            if dist < best.1 {
                best = (i, dist);
                if dist == 0 {
                    break;
                }
            }
        }
        best.0
    }
}

impl ColorMap for FramePalette {
    type Color = Rgba<u8>;

    fn index_of(&self, color: &Rgba<u8>) -> usize {
        let [r, g, b, a] = color.0;
        match self.transparent {
            Some(t) if a < ALPHA_THRESHOLD => t,
            _ => self.nearest([r, g, b]),
        }
    }

    fn lookup(&self, index: usize) -> Option<Rgba<u8>> {
        let [r, g, b] = *self.colors.get(index)?;
        let a = if Some(index) == self.transparent { 0 } else { 255 };
        Some(Rgba([r, g, b, a]))
    }

    fn has_lookup(&self) -> bool {
        true
    }

    fn map_color(&self, color: &mut Rgba<u8>) {
        let index = self.index_of(color);
        if Some(index) == self.transparent {
            // Keep RGB so no error is diffused out of transparent areas
            color.0[3] = 0;
        } else if let Some(mapped) = self.lookup(index) {
            *color = mapped;
        }
    }
}

/// Dither `frame` onto `palette` and return one palette index per pixel,
/// row-major.
pub fn quantize_frame(mut frame: RgbaImage, palette: &FramePalette) -> Vec<u8> {
    let (width, height) = frame.dimensions();
    // dither() reads the right and lower neighbours unconditionally and
    // panics on a single row or column
    if width >= 2 && height >= 2 {
        imageops::dither(&mut frame, palette);
    }
    imageops::index_colors(&frame, palette).into_raw()
}
