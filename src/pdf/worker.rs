//! Render worker - runs in the session's own thread
//!
//! The decoded document lives only here. It is opened when the worker
//! starts and destroyed when the worker stops, so nothing outside this
//! thread can touch it.

use std::sync::{Arc, Mutex};

use flume::{Receiver, Sender};
use log::{debug, info, warn};

use super::cache::{CacheKey, PageCache};
use super::engine::{DocumentEngine, PdfDocument};
use super::raster::rasterize;
use super::request::{
    PageRender, RenderRequest, RenderResponse, RenderTag, RequestId, WorkerFault,
};
use super::text_layer::synthesize;
use super::viewport::Viewport;

/// Worker main loop.
///
/// Sends exactly one of `DocumentInfo` or `LoadFailed` first, then serves
/// page requests until `Shutdown` arrives or the session drops its sender.
pub fn render_worker(
    engine: Arc<dyn DocumentEngine>,
    bytes: Vec<u8>,
    requests: Receiver<RenderRequest>,
    responses: Sender<RenderResponse>,
    cache: Arc<Mutex<PageCache>>,
) {
    let mut doc = match engine.open(&bytes) {
        Ok(d) => d,
        Err(e) => {
            let _ = responses.send(RenderResponse::LoadFailed {
                error: WorkerFault::Engine(e),
            });
            return;
        }
    };
    drop(bytes);

    let page_count = doc.page_count();
    info!("Document opened with {page_count} pages");
    let _ = responses.send(RenderResponse::DocumentInfo {
        page_count,
        title: doc.title(),
    });

    for request in requests.iter() {
        match request {
            RenderRequest::Page {
                id,
                tag,
                scale,
                device_pixel_ratio,
            } => {
                handle_page_request(
                    doc.as_ref(),
                    id,
                    tag,
                    scale,
                    device_pixel_ratio,
                    &cache,
                    &responses,
                );
            }

            RenderRequest::Shutdown => break,
        }
    }

    doc.destroy();
    debug!("Render worker released its document");
}

fn handle_page_request(
    doc: &dyn PdfDocument,
    id: RequestId,
    tag: RenderTag,
    scale: f32,
    device_pixel_ratio: f32,
    cache: &Arc<Mutex<PageCache>>,
    responses: &Sender<RenderResponse>,
) {
    let key = CacheKey::new(tag, device_pixel_ratio);

    let cached = cache
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
        .get(&key);
    if let Some(cached) = cached {
        let _ = responses.send(RenderResponse::Page { id, render: cached });
        return;
    }

    match render_page(doc, tag, scale, device_pixel_ratio) {
        Ok(render) => {
            let render = cache
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(key, render);
            let _ = responses.send(RenderResponse::Page { id, render });
        }
        Err(e) => {
            warn!("Page {} failed to render: {e}", tag.page);
            let _ = responses.send(RenderResponse::Error { id, error: e });
        }
    }
}

/// Rasterize a page and build its text overlay against the same viewport
pub fn render_page(
    doc: &dyn PdfDocument,
    tag: RenderTag,
    scale: f32,
    device_pixel_ratio: f32,
) -> Result<PageRender, WorkerFault> {
    let page = doc.page(tag.page)?;
    let viewport = Viewport::new(page.size()?, scale);

    let raster = rasterize(&*page, &viewport, device_pixel_ratio)?;
    let overlay = synthesize(&*page, &viewport)?;

    if raster.css_width != overlay.width || raster.css_height != overlay.height {
        return Err(WorkerFault::generic(format!(
            "raster {}x{} and overlay {}x{} disagree",
            raster.css_width, raster.css_height, overlay.width, overlay.height
        )));
    }

    Ok(PageRender {
        tag,
        viewport,
        raster,
        overlay,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::text_layer::LayerOrigin;
    use crate::test_utils::fake_engine::{FakeDocumentSpec, FakeEngine};

    #[test]
    fn render_page_registers_raster_and_overlay() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(2));
        let doc = engine.open(b"%PDF").unwrap();

        let render = render_page(doc.as_ref(), RenderTag::new(2, 1.3), 1.3, 2.0).unwrap();
        assert_eq!(render.tag.page, 2);
        assert_eq!(render.raster.css_width, render.overlay.width);
        assert_eq!(render.raster.css_height, render.overlay.height);
        assert_eq!(
            render.raster.width_px,
            (render.viewport.width * 2.0).floor() as u32
        );
        assert_eq!(render.overlay.origin, LayerOrigin::Primary);
    }

    #[test]
    fn out_of_range_page_is_a_fault() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(1));
        let doc = engine.open(b"%PDF").unwrap();
        assert!(render_page(doc.as_ref(), RenderTag::new(5, 1.0), 1.0, 1.0).is_err());
    }

    #[test]
    fn worker_reports_info_then_destroys_on_shutdown() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let destroyed = engine.destroy_count();
        let (req_tx, req_rx) = flume::unbounded();
        let (resp_tx, resp_rx) = flume::unbounded();
        let cache = Arc::new(Mutex::new(PageCache::new(4)));

        let handle = std::thread::spawn(move || {
            render_worker(Arc::new(engine), b"%PDF".to_vec(), req_rx, resp_tx, cache);
        });

        match resp_rx.recv().unwrap() {
            RenderResponse::DocumentInfo { page_count, .. } => assert_eq!(page_count, 3),
            other => panic!("unexpected response: {other:?}"),
        }

        req_tx
            .send(RenderRequest::Page {
                id: RequestId::new(1),
                tag: RenderTag::new(1, 1.0),
                scale: 1.0,
                device_pixel_ratio: 1.0,
            })
            .unwrap();
        match resp_rx.recv().unwrap() {
            RenderResponse::Page { id, render } => {
                assert_eq!(id, RequestId::new(1));
                assert_eq!(render.tag.page, 1);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        req_tx.send(RenderRequest::Shutdown).unwrap();
        handle.join().unwrap();
        assert_eq!(destroyed.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn worker_reports_decode_failure() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(1));
        let (_req_tx, req_rx) = flume::unbounded();
        let (resp_tx, resp_rx) = flume::unbounded();
        let cache = Arc::new(Mutex::new(PageCache::new(4)));

        render_worker(
            Arc::new(engine),
            b"not a pdf".to_vec(),
            req_rx,
            resp_tx,
            cache,
        );

        assert!(matches!(
            resp_rx.recv().unwrap(),
            RenderResponse::LoadFailed { .. }
        ));
    }
}
