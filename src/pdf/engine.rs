//! Document engine abstraction
//!
//! The session and the render worker only ever talk to these traits, so the
//! concrete engine (MuPDF in production, a scripted fake in tests) can be
//! swapped without touching the render pipeline.

use super::text_layer::TextSpan;
use super::viewport::Viewport;

/// Unrotated page size in PDF points
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }
}

/// One entry of a page's text-content stream.
///
/// Coordinates are in PDF space: the origin is the bottom-left corner of the
/// page and `transform[5]` is the baseline, measured upwards.
#[derive(Clone, Debug, PartialEq)]
pub struct TextItem {
    pub text: String,
    /// Text matrix `[a, b, c, d, e, f]`; `(e, f)` is the anchor point
    pub transform: [f32; 6],
    /// Glyph height in PDF units, `0.0` when the engine does not report one
    pub height: f32,
    /// Advance width in PDF units
    pub width: f32,
}

impl TextItem {
    #[must_use]
    pub fn anchor(&self) -> (f32, f32) {
        (self.transform[4], self.transform[5])
    }
}

/// Text content of a single page, in content-stream order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TextContent {
    pub items: Vec<TextItem>,
}

/// Call shapes accepted by an engine's native text-layer builder.
pub enum TextLayerCall<'a> {
    /// Current shape: the builder pulls the text content from the page itself
    Source { viewport: &'a Viewport },
    /// Older shape: the caller hands over already fetched text content
    Content {
        content: &'a TextContent,
        viewport: &'a Viewport,
    },
}

impl TextLayerCall<'_> {
    #[must_use]
    pub fn shape(&self) -> &'static str {
        match self {
            Self::Source { .. } => "source",
            Self::Content { .. } => "content",
        }
    }
}

/// Errors raised by a document engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("not a valid document: {0}")]
    Decode(String),

    #[error("page {page} is out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[error("{0}")]
    Render(String),

    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),
}

impl EngineError {
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }
}

/// Errors from a native text-layer builder
#[derive(Debug, thiserror::Error)]
pub enum TextLayerError {
    /// The builder does not understand this call shape
    #[error("text layer call shape not supported")]
    Rejected,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Decodes raw bytes into an open document.
///
/// Engines are shared with the render worker thread, so they must be
/// `Send + Sync`; the documents they produce never leave that thread.
pub trait DocumentEngine: Send + Sync {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfDocument>, EngineError>;
}

/// An open, decoded document.
///
/// The handle owns engine resources that are not reclaimed by dropping
/// references elsewhere; `destroy` must be called exactly once when the
/// owner is done with it.
pub trait PdfDocument {
    fn page_count(&self) -> usize;

    /// Load a page by its 1-based number
    fn page(&self, number: usize) -> Result<Box<dyn PdfPage + '_>, EngineError>;

    fn title(&self) -> Option<String> {
        None
    }

    fn destroy(&mut self);
}

/// A loaded page
pub trait PdfPage {
    fn size(&self) -> Result<PageSize, EngineError>;

    /// Draw the page with a uniform `scale` transform into an RGB buffer of
    /// exactly `width_px * height_px * 3` bytes.
    fn render(&self, scale: f32, width_px: u32, height_px: u32) -> Result<Vec<u8>, EngineError>;

    fn text_content(&self) -> Result<TextContent, EngineError>;

    /// Native text-layer construction, positioned against `viewport`
    fn build_text_layer(&self, call: TextLayerCall<'_>) -> Result<Vec<TextSpan>, TextLayerError>;
}

pub(crate) fn check_page_number(number: usize, count: usize) -> Result<(), EngineError> {
    if number == 0 || number > count {
        Err(EngineError::PageOutOfRange {
            page: number,
            count,
        })
    } else {
        Ok(())
    }
}
