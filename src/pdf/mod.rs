//! PDF rendering infrastructure

mod cache;
mod engine;
#[cfg(feature = "pdf")]
mod mupdf_engine;
mod raster;
mod request;
mod session;
mod state;
mod text_layer;
mod viewport;
mod worker;
mod zoom;

/// Rendered pages kept per session
pub const DEFAULT_CACHE_SIZE: usize = 8;

pub use cache::{CacheKey, PageCache};
pub use engine::{
    DocumentEngine, EngineError, PageSize, PdfDocument, PdfPage, TextContent, TextItem,
    TextLayerCall, TextLayerError,
};
#[cfg(feature = "pdf")]
pub use mupdf_engine::MupdfEngine;
pub use raster::{RasterSurface, backing_size, rasterize, sanitize_dpr};
pub use request::{PageRender, RenderRequest, RenderResponse, RenderTag, RequestId, WorkerFault};
pub use session::{DocumentSession, LoadError, SessionOptions};
pub use state::{BusyNavigation, Command, Effect, SessionState};
pub use text_layer::{
    FALLBACK_FONT_PX, LayerOrigin, MIN_FONT_PX, SPAN_STYLE, SpanStyle, TextLayer, TextSpan,
    build_primary, reconstruct, synthesize,
};
pub use viewport::{Viewport, ViewportError};
pub use worker::{render_page, render_worker};
pub use zoom::Zoom;
