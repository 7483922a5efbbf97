//! Logical page viewport
//!
//! A viewport is the page rectangle at a given zoom, in logical pixels
//! (before any device pixel ratio is applied). Both the raster and the text
//! overlay are laid out against the same viewport so they register exactly.

use super::engine::PageSize;

/// Errors converting PDF-space points into viewport pixels
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum ViewportError {
    #[error("point ({x}, {y}) is not finite")]
    NonFinite { x: f32, y: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    /// Logical width in pixels
    pub width: f32,
    /// Logical height in pixels
    pub height: f32,
    /// Zoom factor this viewport was built for
    pub scale: f32,
    /// Page height in PDF units, needed to flip the y axis
    page_height: f32,
}

impl Viewport {
    #[must_use]
    pub fn new(page: PageSize, scale: f32) -> Self {
        Self {
            width: page.width * scale,
            height: page.height * scale,
            scale,
            page_height: page.height,
        }
    }

    /// Convert a PDF-space point (origin bottom-left, y up) into viewport
    /// pixels (origin top-left, y down).
    pub fn convert_to_viewport_point(&self, x: f32, y: f32) -> Result<(f32, f32), ViewportError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(ViewportError::NonFinite { x, y });
        }
        Ok((x * self.scale, (self.page_height - y) * self.scale))
    }
}
