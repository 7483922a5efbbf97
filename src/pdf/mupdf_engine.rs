//! MuPDF-backed document engine

use log::debug;
use mupdf::text_page::TextBlockType;
use mupdf::{Colorspace, Device, Document, IRect, Matrix, Page, Pixmap, TextPageFlags};

use super::engine::{
    DocumentEngine, EngineError, PageSize, PdfDocument, PdfPage, TextContent, TextItem,
    TextLayerCall, TextLayerError, check_page_number,
};
use super::text_layer::TextSpan;
use super::viewport::Viewport;

/// Sample value the page is cleared to before drawing
const PAPER: i32 = 0xFF;

#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfEngine;

impl DocumentEngine for MupdfEngine {
    fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfDocument>, EngineError> {
        let doc = Document::from_bytes(bytes, "application/pdf")
            .map_err(|e| EngineError::Decode(e.to_string()))?;
        Ok(Box::new(MupdfDocument { doc: Some(doc) }))
    }
}

pub struct MupdfDocument {
    /// `None` once destroyed
    doc: Option<Document>,
}

impl MupdfDocument {
    fn doc(&self) -> Result<&Document, EngineError> {
        self.doc
            .as_ref()
            .ok_or_else(|| EngineError::render("document already destroyed"))
    }
}

impl PdfDocument for MupdfDocument {
    fn page_count(&self) -> usize {
        self.doc
            .as_ref()
            .and_then(|d| d.page_count().ok())
            .map_or(0, |n| n.max(0) as usize)
    }

    fn page(&self, number: usize) -> Result<Box<dyn PdfPage + '_>, EngineError> {
        check_page_number(number, self.page_count())?;
        let page = self.doc()?.load_page((number - 1) as i32)?;
        Ok(Box::new(MupdfPage { page }))
    }

    fn title(&self) -> Option<String> {
        self.doc
            .as_ref()?
            .metadata(mupdf::MetadataName::Title)
            .ok()
            .filter(|t| !t.is_empty())
    }

    fn destroy(&mut self) {
        if self.doc.take().is_some() {
            debug!("MuPDF document dropped");
        }
    }
}

struct MupdfPage {
    page: Page,
}

/// One text line as MuPDF reports it, in top-left page space
struct LineBox {
    text: String,
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
    baseline: f32,
}

impl MupdfPage {
    fn lines(&self) -> Result<Vec<LineBox>, EngineError> {
        let text_page = self.page.to_text_page(TextPageFlags::empty())?;
        let mut lines = Vec::new();

        for block in text_page.blocks() {
            if block.r#type() != TextBlockType::Text {
                continue;
            }
            for line in block.lines() {
                let bbox = line.bounds();
                let mut baseline = bbox.y1;
                let mut text = String::new();
                for (i, ch) in line.chars().enumerate() {
                    if i == 0 {
                        baseline = ch.origin().y;
                    }
                    if let Some(c) = ch.char() {
                        text.push(c);
                    }
                }
                lines.push(LineBox {
                    text,
                    x0: bbox.x0.min(bbox.x1),
                    y0: bbox.y0.min(bbox.y1),
                    x1: bbox.x0.max(bbox.x1),
                    y1: bbox.y0.max(bbox.y1),
                    baseline,
                });
            }
        }
        Ok(lines)
    }
}

impl PdfPage for MupdfPage {
    fn size(&self) -> Result<PageSize, EngineError> {
        let bounds = self.page.bounds()?;
        Ok(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
    }

    fn render(&self, scale: f32, width_px: u32, height_px: u32) -> Result<Vec<u8>, EngineError> {
        let bounds = self.page.bounds()?;
        // Draw into a pixmap of exactly the backing size; MuPDF's own bbox
        // rounding could otherwise be a pixel off in either direction.
        let rect = IRect::new(0, 0, width_px as i32, height_px as i32);
        let mut pixmap = Pixmap::new_with_rect(&Colorspace::device_rgb(), rect, false)?;
        pixmap.clear_with(PAPER)?;

        let ctm = Matrix::new(
            scale,
            0.0,
            0.0,
            scale,
            -bounds.x0 * scale,
            -bounds.y0 * scale,
        );
        {
            let device = Device::from_pixmap(&pixmap)?;
            self.page.run(&device, &ctm)?;
        }
        pixmap_to_rgb(&pixmap, width_px, height_px)
    }

    fn text_content(&self) -> Result<TextContent, EngineError> {
        let bounds = self.page.bounds()?;
        let page_height = bounds.y1 - bounds.y0;
        let items = self
            .lines()?
            .into_iter()
            .map(|line| {
                let height = line.y1 - line.y0;
                let (x, y) = page_space_origin(&line, bounds.x0, bounds.y0, page_height);
                TextItem {
                    text: line.text,
                    transform: [height, 0.0, 0.0, height, x, y],
                    height,
                    width: line.x1 - line.x0,
                }
            })
            .collect();
        Ok(TextContent { items })
    }

    fn build_text_layer(&self, call: TextLayerCall<'_>) -> Result<Vec<TextSpan>, TextLayerError> {
        // MuPDF lays text out from the page itself; handed-in content is not
        // something it can position.
        let TextLayerCall::Source { viewport } = call else {
            return Err(TextLayerError::Rejected);
        };
        Ok(self.positioned_spans(viewport)?)
    }
}

impl MupdfPage {
    fn positioned_spans(&self, viewport: &Viewport) -> Result<Vec<TextSpan>, EngineError> {
        let bounds = self.page.bounds()?;
        let scale = viewport.scale;
        Ok(self
            .lines()?
            .into_iter()
            .filter(|line| !line.text.trim().is_empty())
            .map(|line| TextSpan {
                text: line.text,
                left: (line.x0 - bounds.x0) * scale,
                top: (line.y0 - bounds.y0) * scale,
                font_size: (line.y1 - line.y0) * scale,
                width: (line.x1 - line.x0) * scale,
            })
            .collect())
    }
}

/// Bottom-left PDF coordinates of a line's baseline start. Both text paths
/// measure from the page bounds origin, so fallback and native spans line up
/// on pages whose media box does not start at zero.
fn page_space_origin(line: &LineBox, origin_x: f32, origin_y: f32, page_height: f32) -> (f32, f32) {
    (line.x0 - origin_x, page_height - (line.baseline - origin_y))
}

/// Copy a pixmap of exactly `width_px * height_px` into a tightly packed
/// RGB buffer, dropping any alpha or extra channels.
fn pixmap_to_rgb(pixmap: &Pixmap, width_px: u32, height_px: u32) -> Result<Vec<u8>, EngineError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(EngineError::render(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }
    let (width, height) = (width_px as usize, height_px as usize);
    let (src_width, src_height) = (pixmap.width() as usize, pixmap.height() as usize);
    if (src_width, src_height) != (width, height) {
        return Err(EngineError::render(format!(
            "Pixmap is {src_width}x{src_height}, expected {width}x{height}"
        )));
    }

    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    if samples.len() < stride.saturating_mul(height) || width * n > stride {
        return Err(EngineError::render("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for y in 0..height {
        let row = &samples[y * stride..y * stride + width * n];
        for px in row.chunks_exact(n) {
            out.extend_from_slice(&px[..3]);
        }
    }
    Ok(out)
}
