//! Document session - owns one open document and its render worker

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use log::{debug, error, info};

use super::cache::PageCache;
use super::engine::{DocumentEngine, EngineError};
use super::raster::sanitize_dpr;
use super::request::{
    PageRender, RenderRequest, RenderResponse, RenderTag, RequestId, WorkerFault,
};
use super::state::{BusyNavigation, Command, Effect, SessionState};
use super::worker::render_worker;
use super::zoom::Zoom;
use super::DEFAULT_CACHE_SIZE;

const WORKER_STOPPED: &str = "render worker stopped";

/// Why a document could not be opened. No session exists afterwards.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("could not read document: {0}")]
    Io(String),

    #[error("{0}")]
    Decode(String),

    #[error("document has no pages")]
    Empty,

    #[error("render worker failed: {0}")]
    Worker(String),
}

impl From<WorkerFault> for LoadError {
    fn from(fault: WorkerFault) -> Self {
        match fault {
            WorkerFault::Engine(EngineError::Decode(msg)) => Self::Decode(msg),
            other => Self::Worker(other.to_string()),
        }
    }
}

/// Knobs a session is created with
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub scale: f32,
    /// Host pixel density; `None` means unknown and renders at 1.0
    pub device_pixel_ratio: Option<f32>,
    pub busy_navigation: BusyNavigation,
    /// Capacity of the per-session render cache
    pub cache_pages: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            scale: Zoom::DEFAULT_SCALE,
            device_pixel_ratio: None,
            busy_navigation: BusyNavigation::default(),
            cache_pages: DEFAULT_CACHE_SIZE,
        }
    }
}

/// The live handle to one open document.
///
/// Rendering happens on the session's own worker thread; results are picked
/// up cooperatively by [`DocumentSession::poll`] on the owning thread.
pub struct DocumentSession {
    state: SessionState,
    request_tx: Sender<RenderRequest>,
    response_rx: Receiver<RenderResponse>,
    worker: Option<JoinHandle<()>>,
    cache: Arc<Mutex<PageCache>>,
    next_request_id: u64,
    pending: Option<RequestId>,
    device_pixel_ratio: f32,
    zoom_step: f32,
    title: Option<String>,
    current: Option<Arc<PageRender>>,
    last_error: Option<String>,
    /// The worker thread is gone; every later render fails at once
    worker_gone: bool,
    torn_down: bool,
}

impl DocumentSession {
    /// Decode `bytes` on a fresh render worker.
    ///
    /// Blocks until the worker has either opened the document or given up.
    /// No page is rendered yet; call [`Self::render_page`] to show one.
    pub fn load(
        engine: Arc<dyn DocumentEngine>,
        bytes: Vec<u8>,
        options: SessionOptions,
    ) -> Result<Self, LoadError> {
        let cache = Arc::new(Mutex::new(PageCache::new(options.cache_pages)));
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();

        let worker_cache = cache.clone();
        let worker = std::thread::Builder::new()
            .name("papermaster-render".to_string())
            .spawn(move || {
                render_worker(engine, bytes, request_rx, response_tx, worker_cache);
            })
            .map_err(|e| LoadError::Worker(e.to_string()))?;

        let (page_count, title) = match response_rx.recv() {
            Ok(RenderResponse::DocumentInfo { page_count, title }) => (page_count, title),
            Ok(RenderResponse::LoadFailed { error }) => {
                let _ = worker.join();
                return Err(error.into());
            }
            Ok(other) => {
                let _ = request_tx.send(RenderRequest::Shutdown);
                let _ = worker.join();
                return Err(LoadError::Worker(format!(
                    "unexpected first response: {other:?}"
                )));
            }
            Err(_) => {
                let _ = worker.join();
                return Err(LoadError::Worker(
                    "worker exited before opening the document".to_string(),
                ));
            }
        };

        let mut session = Self {
            state: SessionState::new(page_count, options.scale, options.busy_navigation),
            request_tx,
            response_rx,
            worker: Some(worker),
            cache,
            next_request_id: 1,
            pending: None,
            device_pixel_ratio: sanitize_dpr(options.device_pixel_ratio),
            zoom_step: Zoom::DEFAULT_STEP,
            title,
            current: None,
            last_error: None,
            worker_gone: false,
            torn_down: false,
        };

        if page_count == 0 {
            session.teardown();
            return Err(LoadError::Empty);
        }

        info!(
            "Session opened: {page_count} pages at scale {:.2}",
            session.state.scale
        );
        Ok(session)
    }

    /// Step used by [`Self::zoom_in`] and [`Self::zoom_out`]
    pub fn set_zoom_step(&mut self, step: f32) {
        if step.is_finite() && step > 0.0 {
            self.zoom_step = step;
        }
    }

    /// Show page `n` (1-based) at the current scale
    pub fn render_page(&mut self, n: usize) {
        self.apply_command(Command::GoToPage(n));
    }

    /// Clamp `scale` into bounds and re-render the current page
    pub fn set_scale(&mut self, scale: f32) {
        self.apply_command(Command::SetScale(scale));
    }

    pub fn zoom_in(&mut self) {
        let mut zoom = Zoom::new(self.state.scale);
        zoom.step_in(self.zoom_step);
        self.set_scale(zoom.factor());
    }

    pub fn zoom_out(&mut self) {
        let mut zoom = Zoom::new(self.state.scale);
        zoom.step_out(self.zoom_step);
        self.set_scale(zoom.factor());
    }

    pub fn next_page(&mut self) {
        self.apply_command(Command::NextPage);
    }

    pub fn prev_page(&mut self) {
        self.apply_command(Command::PrevPage);
    }

    fn apply_command(&mut self, cmd: Command) {
        if self.torn_down {
            return;
        }
        let effects = self.state.apply(cmd);
        self.execute_effects(effects, None);
    }

    fn execute_effects(&mut self, effects: Vec<Effect>, finished: Option<Arc<PageRender>>) {
        for effect in effects {
            match effect {
                Effect::RequestRender(tag) => self.request_render(tag),

                Effect::Apply(tag) => {
                    if let Some(render) = finished.clone() {
                        debug!("Showing page {} at scale {:.2}", tag.page, tag.scale());
                        self.current = Some(render);
                        self.last_error = None;
                    }
                }

                Effect::DiscardStale(tag) => {
                    debug!(
                        "Discarding stale render of page {} at scale {:.2}",
                        tag.page,
                        tag.scale()
                    );
                }

                Effect::ReportFailure(tag) => {
                    // the message was recorded when the error arrived
                    error!(
                        "Page {} could not be rendered: {}",
                        tag.page,
                        self.last_error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
        }
    }

    fn request_render(&mut self, tag: RenderTag) {
        if !self.worker_gone {
            let id = self.next_id();
            let sent = self.request_tx.send(RenderRequest::Page {
                id,
                tag,
                scale: tag.scale(),
                device_pixel_ratio: self.device_pixel_ratio,
            });
            if sent.is_ok() {
                self.pending = Some(id);
                return;
            }
        }
        self.worker_stopped();
    }

    /// Fail whatever is in flight and stop talking to the worker. The
    /// session stays navigable; each later render fails immediately.
    fn worker_stopped(&mut self) {
        if !self.worker_gone {
            self.worker_gone = true;
            error!("Render worker stopped unexpectedly");
        }
        self.pending = None;

        let Some(tag) = self.state.in_flight() else {
            return;
        };
        let effects = self.state.apply(Command::RenderFinished { tag, ok: false });
        if effects.contains(&Effect::ReportFailure(tag)) {
            self.last_error = Some(WORKER_STOPPED.to_string());
        }
        self.execute_effects(effects, None);
    }

    /// Apply any finished renders. Never blocks.
    ///
    /// Returns true when something was received from the worker.
    pub fn poll(&mut self) -> bool {
        let mut received = false;
        while !self.torn_down {
            match self.response_rx.try_recv() {
                Ok(response) => {
                    received = true;
                    self.handle_response(response);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.is_loading() {
                        received = true;
                        self.worker_stopped();
                    }
                    break;
                }
            }
        }
        received
    }

    /// Like [`Self::poll`], but waits up to `timeout` for the first response
    pub fn poll_timeout(&mut self, timeout: Duration) -> bool {
        if self.torn_down {
            return false;
        }
        match self.response_rx.recv_timeout(timeout) {
            Ok(response) => {
                self.handle_response(response);
                self.poll();
                true
            }
            Err(RecvTimeoutError::Disconnected) if self.is_loading() => {
                self.worker_stopped();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    fn handle_response(&mut self, response: RenderResponse) {
        let (id, result) = match response {
            RenderResponse::Page { id, render } => (id, Ok(render)),
            RenderResponse::Error { id, error } => (id, Err(error)),
            RenderResponse::DocumentInfo { .. } | RenderResponse::LoadFailed { .. } => return,
        };

        if self.pending != Some(id) {
            debug!("Ignoring response for untracked request {}", id.0);
            return;
        }
        self.pending = None;

        let Some(tag) = self.state.in_flight() else {
            return;
        };

        match result {
            Ok(render) => {
                let effects = self.state.apply(Command::RenderFinished { tag, ok: true });
                self.execute_effects(effects, Some(render));
            }
            Err(e) => {
                let effects = self.state.apply(Command::RenderFinished { tag, ok: false });
                if effects.contains(&Effect::ReportFailure(tag)) {
                    self.last_error = Some(e.to_string());
                }
                self.execute_effects(effects, None);
            }
        }
    }

    /// Stop the worker and release the decoded document.
    ///
    /// When this returns the document has been destroyed. Safe to call any
    /// number of times.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        let _ = self.request_tx.send(RenderRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Render worker panicked during shutdown");
            }
        }

        self.pending = None;
        self.current = None;
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .invalidate_all();
        info!("Session closed");
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }

    /// Current page (1-based)
    #[must_use]
    pub fn page(&self) -> usize {
        self.state.current_page
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.state.page_count
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.state.scale
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        !self.torn_down && self.state.is_loading()
    }

    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    /// The render currently on screen
    #[must_use]
    pub fn current_render(&self) -> Option<&Arc<PageRender>> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Most recent page render failure, cleared by the next good render
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    #[must_use]
    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }
}

impl Drop for DocumentSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_utils::fake_engine::{FakeDocumentSpec, FakeEngine, settle};

    const WAIT: Duration = Duration::from_secs(5);

    fn open(spec: FakeDocumentSpec) -> (DocumentSession, FakeEngine) {
        let engine = FakeEngine::new(spec);
        let session =
            DocumentSession::load(Arc::new(engine.clone()), b"%PDF-1.7".to_vec(), SessionOptions::default())
                .unwrap();
        (session, engine)
    }

    #[test]
    fn load_reports_page_count_and_defaults() {
        let (session, _) = open(FakeDocumentSpec::with_pages(3));
        assert_eq!(session.page_count(), 3);
        assert_eq!(session.page(), 1);
        assert_eq!(session.scale(), 1.3);
        assert!(!session.is_loading());
        assert!(session.current_render().is_none());
    }

    #[test]
    fn load_rejects_garbage() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let result = DocumentSession::load(
            Arc::new(engine),
            b"garbage".to_vec(),
            SessionOptions::default(),
        );
        assert!(matches!(result, Err(LoadError::Decode(_))));
    }

    #[test]
    fn load_rejects_empty_document_and_releases_it() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(0));
        let destroyed = engine.destroy_count();
        let result = DocumentSession::load(
            Arc::new(engine),
            b"%PDF".to_vec(),
            SessionOptions::default(),
        );
        assert!(matches!(result, Err(LoadError::Empty)));
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn render_page_installs_result() {
        let (mut session, _) = open(FakeDocumentSpec::with_pages(3));
        session.render_page(1);
        assert!(session.is_loading());
        assert!(settle(&mut session, WAIT));

        let render = session.current_render().unwrap();
        assert_eq!(render.tag, RenderTag::new(1, 1.3));
        assert!(!session.is_loading());
    }

    #[test]
    fn render_failure_keeps_previous_page() {
        let (mut session, _) = open(FakeDocumentSpec::with_pages(3).failing_page(2));
        session.render_page(1);
        assert!(settle(&mut session, WAIT));

        session.next_page();
        assert!(settle(&mut session, WAIT));

        assert_eq!(session.page(), 2);
        assert!(!session.is_loading());
        assert_eq!(session.current_render().unwrap().tag.page, 1);
        assert!(session.last_error().is_some());

        session.next_page();
        assert!(settle(&mut session, WAIT));
        assert_eq!(session.current_render().unwrap().tag.page, 3);
        assert!(session.last_error().is_none());
    }

    #[test]
    fn teardown_is_idempotent_and_destroys_once() {
        let (mut session, engine) = open(FakeDocumentSpec::with_pages(2));
        session.render_page(1);
        assert!(settle(&mut session, WAIT));

        session.teardown();
        session.teardown();
        drop(session);

        assert_eq!(engine.destroy_count().load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nothing_applies_after_teardown() {
        let (mut session, _) = open(FakeDocumentSpec::with_pages(2));
        session.render_page(1);
        session.teardown();

        assert!(!session.poll());
        assert!(session.current_render().is_none());
        assert!(!session.is_loading());

        session.next_page();
        assert_eq!(session.page(), 1);
    }

    #[test]
    fn zoom_steps_within_bounds() {
        let (mut session, _) = open(FakeDocumentSpec::with_pages(1));
        for _ in 0..40 {
            session.zoom_in();
            settle(&mut session, WAIT);
        }
        assert_eq!(session.scale(), Zoom::MAX_SCALE);

        for _ in 0..40 {
            session.zoom_out();
            settle(&mut session, WAIT);
        }
        assert_eq!(session.scale(), Zoom::MIN_SCALE);
        assert_eq!(
            session.current_render().unwrap().tag,
            RenderTag::new(1, Zoom::MIN_SCALE)
        );
    }

    #[test]
    fn only_decode_faults_read_as_bad_documents() {
        let err: LoadError = WorkerFault::Engine(EngineError::Decode("bad xref".into())).into();
        assert!(matches!(err, LoadError::Decode(_)));

        let err: LoadError = WorkerFault::generic("out of file handles").into();
        assert!(matches!(err, LoadError::Worker(_)));
        assert_eq!(err.to_string(), "render worker failed: out of file handles");

        let err: LoadError = WorkerFault::Engine(EngineError::render("boom")).into();
        assert!(matches!(err, LoadError::Worker(_)));
    }

    #[test]
    fn dpr_defaults_to_one() {
        let (session, _) = open(FakeDocumentSpec::with_pages(1));
        assert_eq!(session.device_pixel_ratio(), 1.0);
    }
}
