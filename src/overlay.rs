use std::sync::Arc;

use image::{RgbaImage, imageops};

use crate::foundation::{core::Rgba8, error::OverlayError};

/// Padding, in pixels, of the backdrop drawn behind an overlay.
pub const OVERLAY_BACKDROP_PAD: u32 = 5;

/// Corner radius, in pixels, the scaled overlay is clipped to.
pub const OVERLAY_CORNER_RADIUS: u32 = 5;

/// Default overlay edge as a fraction of the symbol edge.
pub const DEFAULT_OVERLAY_FRACTION: f32 = 0.2;

/// Default upper bound for overlay uploads (2 MiB).
pub const DEFAULT_MAX_OVERLAY_BYTES: u64 = 2 * 1024 * 1024;

/// Encoded overlay image bytes (PNG, JPEG, ...), validated at attach time.
///
/// Decoding happens later, during composition, so a corrupt image still surfaces as a
/// non-fatal [`OverlayError`] instead of blocking generation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OverlayImage {
    bytes: Arc<Vec<u8>>,
    format: image::ImageFormat,
}

impl OverlayImage {
    pub fn from_bytes(bytes: Vec<u8>, max_bytes: u64) -> Result<Self, OverlayError> {
        let size = bytes.len() as u64;
        if size > max_bytes {
            return Err(OverlayError::TooLarge {
                size,
                limit: max_bytes,
            });
        }
        let format = image::guess_format(&bytes).map_err(|_| OverlayError::NotAnImage)?;
        Ok(Self {
            bytes: Arc::new(bytes),
            format,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn format(&self) -> image::ImageFormat {
        self.format
    }

    pub fn decode(&self) -> Result<RgbaImage, OverlayError> {
        image::load_from_memory_with_format(&self.bytes, self.format)
            .map(|img| img.to_rgba8())
            .map_err(|e| OverlayError::Decode(e.to_string()))
    }
}

/// Draws an overlay onto a rendered symbol.
pub trait OverlayCompositor {
    /// Return a new raster with `overlay` centered on `base`, scaled to `fraction` of the
    /// symbol edge, over a padded backdrop of `backdrop`.
    fn compose(
        &self,
        base: &RgbaImage,
        overlay: &OverlayImage,
        fraction: f32,
        backdrop: Rgba8,
    ) -> Result<RgbaImage, OverlayError>;
}

/// CPU compositor built on the `image` crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageOverlayCompositor;

impl OverlayCompositor for ImageOverlayCompositor {
    fn compose(
        &self,
        base: &RgbaImage,
        overlay: &OverlayImage,
        fraction: f32,
        backdrop: Rgba8,
    ) -> Result<RgbaImage, OverlayError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(OverlayError::Draw(format!(
                "overlay fraction {fraction} outside (0, 1]"
            )));
        }
        let logo = overlay.decode()?;

        let edge = base.width().min(base.height());
        let logo_edge = ((edge as f32) * fraction).round() as u32;
        if logo_edge == 0 {
            return Err(OverlayError::Draw(format!(
                "symbol of {edge}px is too small for an overlay"
            )));
        }

        let x = (base.width() - logo_edge) / 2;
        let y = (base.height() - logo_edge) / 2;

        let mut out = base.clone();
        fill_rect_clamped(
            &mut out,
            x.saturating_sub(OVERLAY_BACKDROP_PAD),
            y.saturating_sub(OVERLAY_BACKDROP_PAD),
            logo_edge + 2 * OVERLAY_BACKDROP_PAD,
            backdrop,
        );

        let mut scaled = imageops::resize(
            &logo,
            logo_edge,
            logo_edge,
            imageops::FilterType::Triangle,
        );
        round_corners(&mut scaled, OVERLAY_CORNER_RADIUS);
        imageops::overlay(&mut out, &scaled, i64::from(x), i64::from(y));
        Ok(out)
    }
}

fn fill_rect_clamped(img: &mut RgbaImage, x0: u32, y0: u32, edge: u32, color: Rgba8) {
    let x1 = x0.saturating_add(edge).min(img.width());
    let y1 = y0.saturating_add(edge).min(img.height());
    let px = color.to_pixel();
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, px);
        }
    }
}

/// Make pixels whose centre lies outside the rounded corners fully transparent.
fn round_corners(img: &mut RgbaImage, radius: u32) {
    let (w, h) = img.dimensions();
    let r = radius.min(w / 2).min(h / 2);
    if r == 0 {
        return;
    }
    let rf = r as f32;
    for cy in 0..r {
        for cx in 0..r {
            let dx = rf - (cx as f32 + 0.5);
            let dy = rf - (cy as f32 + 0.5);
            if dx * dx + dy * dy <= rf * rf {
                continue;
            }
            for (x, y) in [(cx, cy), (w - 1 - cx, cy), (cx, h - 1 - cy), (w - 1 - cx, h - 1 - cy)] {
                img.get_pixel_mut(x, y).0[3] = 0;
            }
        }
    }
}
