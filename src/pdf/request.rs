//! Render request and response types

use std::sync::Arc;

use super::engine::EngineError;
use super::raster::RasterSurface;
use super::text_layer::TextLayer;
use super::viewport::Viewport;

/// Unique identifier for render requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// What a render was asked to draw: page number (1-based) and zoom.
///
/// The scale is stored as millionths so tags hash and compare exactly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderTag {
    pub page: usize,
    pub scale_millionths: u32,
}

impl RenderTag {
    #[must_use]
    pub fn new(page: usize, scale: f32) -> Self {
        Self {
            page,
            scale_millionths: (scale * 1_000_000.0).round() as u32,
        }
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale_millionths as f32 / 1_000_000.0
    }
}

/// Request sent to the render worker
#[derive(Debug)]
pub enum RenderRequest {
    /// Rasterize a page and build its text layer
    Page {
        id: RequestId,
        tag: RenderTag,
        scale: f32,
        device_pixel_ratio: f32,
    },

    /// Release the document and stop the worker
    Shutdown,
}

/// Errors from the render worker
#[derive(Debug, thiserror::Error)]
pub enum WorkerFault {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{detail}")]
    Generic { detail: String },
}

impl WorkerFault {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// A finished page: raster and text overlay laid out against one viewport
#[derive(Debug)]
pub struct PageRender {
    pub tag: RenderTag,
    pub viewport: Viewport,
    pub raster: RasterSurface,
    pub overlay: TextLayer,
}

/// Response from the render worker
#[derive(Debug)]
pub enum RenderResponse {
    /// Document metadata, sent once after a successful open
    DocumentInfo {
        page_count: usize,
        title: Option<String>,
    },

    /// The document could not be opened; the worker has exited
    LoadFailed { error: WorkerFault },

    /// Rendered page
    Page {
        id: RequestId,
        render: Arc<PageRender>,
    },

    /// Error during rendering
    Error { id: RequestId, error: WorkerFault },
}
