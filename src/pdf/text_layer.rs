//! Invisible text overlay synthesis
//!
//! Builds the selectable text layer that sits on top of a page raster. The
//! engine's own builder is tried first; if it produces nothing, the layer is
//! reconstructed by hand from the page's text-content items.

use log::debug;

use super::engine::{EngineError, PdfPage, TextContent, TextItem, TextLayerCall, TextLayerError};
use super::viewport::{Viewport, ViewportError};

/// Smallest font height a reconstructed span gets, in logical pixels
pub const MIN_FONT_PX: f32 = 8.0;

/// Font height for a span whose position could not be computed
pub const FALLBACK_FONT_PX: f32 = 10.0;

/// One selectable text fragment, positioned in overlay pixels
#[derive(Clone, Debug, PartialEq)]
pub struct TextSpan {
    pub text: String,
    /// Left edge
    pub left: f32,
    /// Top edge
    pub top: f32,
    /// Effective font height
    pub font_size: f32,
    /// Advance width, `0.0` when unknown
    pub width: f32,
}

impl TextSpan {
    /// Width used for hit testing: the advance width, or an estimate from
    /// the glyph count when the engine gave none.
    #[must_use]
    pub fn hit_width(&self) -> f32 {
        if self.width > 0.0 {
            self.width
        } else {
            self.text.chars().count() as f32 * self.font_size * 0.5
        }
    }

    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.top + self.font_size
    }

    #[must_use]
    pub fn right(&self) -> f32 {
        self.left + self.hit_width()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Positioning {
    Absolute,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Foreground {
    Transparent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WhiteSpace {
    Pre,
}

/// Presentation shared by every span: present for selection, invisible on
/// screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SpanStyle {
    pub position: Positioning,
    pub color: Foreground,
    pub white_space: WhiteSpace,
}

pub const SPAN_STYLE: SpanStyle = SpanStyle {
    position: Positioning::Absolute,
    color: Foreground::Transparent,
    white_space: WhiteSpace::Pre,
};

/// Which path produced a layer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LayerOrigin {
    Primary,
    Fallback,
}

/// Text overlay for one page render
#[derive(Clone, Debug, PartialEq)]
pub struct TextLayer {
    /// Container width, equal to the viewport's logical width
    pub width: f32,
    /// Container height, equal to the viewport's logical height
    pub height: f32,
    pub spans: Vec<TextSpan>,
    pub origin: LayerOrigin,
}

impl TextLayer {
    #[must_use]
    pub fn style(&self) -> SpanStyle {
        SPAN_STYLE
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }
}

/// Build the text layer for `page` against `viewport`.
///
/// Engine failures (text content unavailable, builder crashed) are returned
/// as errors; a builder that merely produced nothing is not an error and
/// triggers manual reconstruction.
pub fn synthesize(page: &dyn PdfPage, viewport: &Viewport) -> Result<TextLayer, EngineError> {
    let content = page.text_content()?;

    let primary = match build_primary(page, &content, viewport) {
        Ok(spans) => spans,
        Err(TextLayerError::Rejected) => {
            debug!("Engine rejected every text layer call shape");
            Vec::new()
        }
        Err(TextLayerError::Engine(e)) => return Err(e),
    };

    let (spans, origin) = if primary.is_empty() {
        debug!(
            "Primary text layer is empty, reconstructing {} items",
            content.items.len()
        );
        (reconstruct(&content.items, viewport), LayerOrigin::Fallback)
    } else {
        (primary, LayerOrigin::Primary)
    };

    Ok(TextLayer {
        width: viewport.width,
        height: viewport.height,
        spans,
        origin,
    })
}

/// Run the engine's builder, probing the current call shape first and the
/// older one if that is rejected.
pub fn build_primary(
    page: &dyn PdfPage,
    content: &TextContent,
    viewport: &Viewport,
) -> Result<Vec<TextSpan>, TextLayerError> {
    let calls = [
        TextLayerCall::Source { viewport },
        TextLayerCall::Content { content, viewport },
    ];

    let mut last = TextLayerError::Rejected;
    for call in calls {
        let shape = call.shape();
        match page.build_text_layer(call) {
            Ok(spans) => return Ok(spans),
            Err(TextLayerError::Rejected) => {
                debug!("Text layer call shape '{shape}' rejected");
                last = TextLayerError::Rejected;
            }
            Err(e) => return Err(e),
        }
    }
    Err(last)
}

/// Manual reconstruction: one span per text item
#[must_use]
pub fn reconstruct(items: &[TextItem], viewport: &Viewport) -> Vec<TextSpan> {
    items
        .iter()
        .map(|item| {
            reconstruct_item(item, viewport).unwrap_or_else(|e| {
                debug!("Placing '{}' at overlay origin: {e}", item.text);
                TextSpan {
                    text: item.text.clone(),
                    left: 0.0,
                    top: 0.0,
                    font_size: FALLBACK_FONT_PX,
                    width: 0.0,
                }
            })
        })
        .collect()
}

fn reconstruct_item(item: &TextItem, viewport: &Viewport) -> Result<TextSpan, ViewportError> {
    let (x, y) = item.anchor();
    let (left, baseline) = viewport.convert_to_viewport_point(x, y)?;

    let glyph_height = if item.height.is_finite() && item.height > 0.0 {
        item.height
    } else {
        item.transform[0]
    };
    // f32::max drops NaN, so a garbage matrix still lands on the floor
    let font_size = (glyph_height * viewport.scale).max(MIN_FONT_PX);

    let width = if item.width.is_finite() && item.width > 0.0 {
        item.width * viewport.scale
    } else {
        0.0
    };

    Ok(TextSpan {
        text: item.text.clone(),
        left,
        // Baselines are measured from the bottom; lift by the glyph height
        top: baseline - font_size,
        font_size,
        width,
    })
}
