//! Page rasterization sized for the display's pixel density

use image::RgbImage;

use super::engine::{EngineError, PdfPage};
use super::viewport::Viewport;

/// Rasterized page.
///
/// The backing store is `floor(css * dpr)` pixels on each axis while the
/// display footprint stays at the viewport's logical size, so the text
/// overlay can keep using logical coordinates.
#[derive(Clone)]
pub struct RasterSurface {
    /// Raw RGB pixel data (3 bytes per pixel)
    pub pixels: Vec<u8>,
    /// Backing store width in device pixels
    pub width_px: u32,
    /// Backing store height in device pixels
    pub height_px: u32,
    /// Display width in logical pixels
    pub css_width: f32,
    /// Display height in logical pixels
    pub css_height: f32,
    pub device_pixel_ratio: f32,
}

impl std::fmt::Debug for RasterSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSurface")
            .field("width_px", &self.width_px)
            .field("height_px", &self.height_px)
            .field("css_width", &self.css_width)
            .field("css_height", &self.css_height)
            .field("device_pixel_ratio", &self.device_pixel_ratio)
            .finish_non_exhaustive()
    }
}

impl RasterSurface {
    /// Copy the backing store into an `image` buffer
    #[must_use]
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width_px, self.height_px, self.pixels.clone())
    }
}

/// Host-reported device pixel ratio, `1.0` when missing or nonsensical
#[must_use]
pub fn sanitize_dpr(dpr: Option<f32>) -> f32 {
    match dpr {
        Some(d) if d.is_finite() && d > 0.0 => d,
        _ => 1.0,
    }
}

/// Backing store dimensions for a viewport at the given pixel ratio
#[must_use]
pub fn backing_size(viewport: &Viewport, dpr: f32) -> (u32, u32) {
    (
        (viewport.width * dpr).floor().max(0.0) as u32,
        (viewport.height * dpr).floor().max(0.0) as u32,
    )
}

/// Rasterize `page` into a surface matching `viewport` at `dpr`.
///
/// The dpr is folded into the uniform draw transform so the content fills
/// the backing store exactly.
pub fn rasterize(
    page: &dyn PdfPage,
    viewport: &Viewport,
    dpr: f32,
) -> Result<RasterSurface, EngineError> {
    let dpr = sanitize_dpr(Some(dpr));
    let (width_px, height_px) = backing_size(viewport, dpr);
    if width_px == 0 || height_px == 0 {
        return Err(EngineError::render(format!(
            "viewport {}x{} is empty",
            viewport.width, viewport.height
        )));
    }

    let pixels = page.render(viewport.scale * dpr, width_px, height_px)?;
    let expected = width_px as usize * height_px as usize * 3;
    if pixels.len() != expected {
        return Err(EngineError::render(format!(
            "raster buffer size mismatch: got {} bytes, expected {expected}",
            pixels.len()
        )));
    }

    Ok(RasterSurface {
        pixels,
        width_px,
        height_px,
        css_width: viewport.width,
        css_height: viewport.height,
        device_pixel_ratio: dpr,
    })
}
