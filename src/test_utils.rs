pub mod test_helpers {
    use crate::event_source::{Event, KeyCode, SimulatedEventSource};
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    /// Builder for creating test scenarios with simulated user input
    pub struct TestScenarioBuilder {
        events: Vec<Event>,
    }

    impl Default for TestScenarioBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestScenarioBuilder {
        pub fn new() -> Self {
            Self { events: Vec::new() }
        }

        /// Add a character key press
        pub fn press_char(mut self, c: char) -> Self {
            self.events.push(SimulatedEventSource::char_key(c));
            self
        }

        pub fn press_key(mut self, code: KeyCode) -> Self {
            self.events.push(SimulatedEventSource::code_key(code));
            self
        }

        pub fn press_enter(self) -> Self {
            self.press_key(KeyCode::Enter)
        }

        pub fn press_esc(self) -> Self {
            self.press_key(KeyCode::Esc)
        }

        /// Navigate down n times (press 'j' n times)
        pub fn navigate_down(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::char_key('j'));
            }
            self
        }

        /// Navigate up n times (press 'k' n times)
        pub fn navigate_up(mut self, times: usize) -> Self {
            for _ in 0..times {
                self.events.push(SimulatedEventSource::char_key('k'));
            }
            self
        }

        /// Next page (press 'l')
        pub fn next_page(self) -> Self {
            self.press_char('l')
        }

        /// Previous page (press 'h')
        pub fn prev_page(self) -> Self {
            self.press_char('h')
        }

        pub fn zoom_in(self) -> Self {
            self.press_char('+')
        }

        pub fn zoom_out(self) -> Self {
            self.press_char('-')
        }

        /// Left-button drag from one cell to another
        pub fn drag(mut self, from: (u16, u16), to: (u16, u16)) -> Self {
            self.events.push(SimulatedEventSource::mouse_down(from.0, from.1));
            self.events.push(SimulatedEventSource::mouse_drag(to.0, to.1));
            self.events.push(SimulatedEventSource::mouse_up(to.0, to.1));
            self
        }

        /// Left-button click on a cell
        pub fn click(mut self, column: u16, row: u16) -> Self {
            self.events.push(SimulatedEventSource::mouse_down(column, row));
            self.events.push(SimulatedEventSource::mouse_up(column, row));
            self
        }

        /// Back out of the reader, or quit from the library (press 'q')
        pub fn quit(mut self) -> Self {
            self.events.push(SimulatedEventSource::char_key('q'));
            self
        }

        /// Build the simulated event source
        pub fn build(self) -> SimulatedEventSource {
            SimulatedEventSource::new(self.events)
        }
    }

    /// Create a test terminal for snapshot testing
    pub fn create_test_terminal(width: u16, height: u16) -> Terminal<TestBackend> {
        let backend = TestBackend::new(width, height);
        Terminal::new(backend).unwrap()
    }

    /// Capture the current terminal buffer as a string
    pub fn capture_terminal_state(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        let mut lines = Vec::new();

        for y in 0..buffer.area.height {
            let mut line = String::new();
            for x in 0..buffer.area.width {
                line.push_str(buffer[(x, y)].symbol());
            }
            lines.push(line.trim_end().to_string());
        }

        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }

        lines.join("\n")
    }
}

/// Scripted in-memory document engine
pub mod fake_engine {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};
    use std::time::{Duration, Instant};

    use flume::{Receiver, Sender};

    use crate::pdf::{
        DocumentEngine, DocumentSession, EngineError, PageSize, PdfDocument, PdfPage,
        TextContent, TextItem, TextLayerCall, TextLayerError, TextSpan,
    };

    /// How long a gated render waits for its release before giving up
    const GATE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Text item anchored at `(x, y)` in PDF space
    pub fn text_item(text: &str, x: f32, y: f32, height: f32) -> TextItem {
        TextItem {
            text: text.to_string(),
            transform: [height, 0.0, 0.0, height, x, y],
            height,
            width: text.chars().count() as f32 * height * 0.5,
        }
    }

    /// Behaviour of the fake's native text-layer builder
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub enum NativeLayer {
        /// Accepts the modern call shape and positions every item
        #[default]
        Positioned,
        /// Rejects the modern shape, accepts the legacy one
        LegacyOnly,
        /// Accepts the modern shape but produces nothing
        Empty,
        /// Rejects both shapes
        RejectAll,
    }

    #[derive(Clone, Debug)]
    pub struct FakePageSpec {
        pub size: PageSize,
        pub items: Vec<TextItem>,
        pub native: NativeLayer,
        pub fail_render: bool,
        /// Kill the render worker instead of returning an error
        pub panic_render: bool,
    }

    impl Default for FakePageSpec {
        fn default() -> Self {
            Self {
                size: PageSize::new(612.0, 792.0),
                items: Vec::new(),
                native: NativeLayer::default(),
                fail_render: false,
                panic_render: false,
            }
        }
    }

    impl FakePageSpec {
        /// A page with a heading and a short paragraph
        pub fn with_text(number: usize) -> Self {
            Self {
                items: vec![
                    text_item(&format!("Section {number}"), 72.0, 720.0, 18.0),
                    text_item("Spaced repetition strengthens memory", 72.0, 680.0, 11.0),
                    text_item("when reviews are spread over time.", 72.0, 664.0, 11.0),
                ],
                ..Self::default()
            }
        }
    }

    #[derive(Clone, Debug, Default)]
    pub struct FakeDocumentSpec {
        pub pages: Vec<FakePageSpec>,
        pub title: Option<String>,
    }

    impl FakeDocumentSpec {
        pub fn with_pages(count: usize) -> Self {
            Self {
                pages: (1..=count).map(FakePageSpec::with_text).collect(),
                title: None,
            }
        }

        /// Make page `number` (1-based) fail to render
        pub fn failing_page(mut self, number: usize) -> Self {
            if let Some(page) = self.pages.get_mut(number - 1) {
                page.fail_render = true;
            }
            self
        }

        /// Make rendering page `number` (1-based) panic on the worker
        pub fn panicking_page(mut self, number: usize) -> Self {
            if let Some(page) = self.pages.get_mut(number - 1) {
                page.panic_render = true;
            }
            self
        }

        pub fn with_native(mut self, native: NativeLayer) -> Self {
            for page in &mut self.pages {
                page.native = native;
            }
            self
        }

        pub fn with_title(mut self, title: &str) -> Self {
            self.title = Some(title.to_string());
            self
        }
    }

    /// Holds renders until the test lets them through
    #[derive(Clone)]
    pub struct FakeGate {
        tx: Sender<()>,
        rx: Receiver<()>,
    }

    impl FakeGate {
        fn new() -> Self {
            let (tx, rx) = flume::unbounded();
            Self { tx, rx }
        }

        /// Let `count` more renders complete
        pub fn release(&self, count: usize) {
            for _ in 0..count {
                let _ = self.tx.send(());
            }
        }

        fn wait(&self) {
            let _ = self.rx.recv_timeout(GATE_TIMEOUT);
        }
    }

    /// Observations shared by an engine and everything it opened
    #[derive(Clone, Default)]
    struct Probe {
        renders: Arc<Mutex<Vec<(usize, f32)>>>,
        text_layer_calls: Arc<Mutex<Vec<&'static str>>>,
        destroyed: Arc<AtomicUsize>,
        opened: Arc<AtomicUsize>,
    }

    #[derive(Clone)]
    pub struct FakeEngine {
        spec: FakeDocumentSpec,
        probe: Probe,
        gate: Option<FakeGate>,
    }

    impl FakeEngine {
        pub fn new(spec: FakeDocumentSpec) -> Self {
            Self {
                spec,
                probe: Probe::default(),
                gate: None,
            }
        }

        /// Engine whose renders block until released through the gate
        pub fn gated(spec: FakeDocumentSpec) -> (Self, FakeGate) {
            let gate = FakeGate::new();
            let mut engine = Self::new(spec);
            engine.gate = Some(gate.clone());
            (engine, gate)
        }

        /// Counter of `destroy` calls across every opened document
        pub fn destroy_count(&self) -> Arc<AtomicUsize> {
            self.probe.destroyed.clone()
        }

        pub fn open_count(&self) -> usize {
            self.probe.opened.load(Ordering::SeqCst)
        }

        /// `(page, scale)` of every completed raster, in order
        pub fn renders(&self) -> Vec<(usize, f32)> {
            self.probe
                .renders
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        pub fn rendered_pages(&self) -> Vec<usize> {
            self.renders().into_iter().map(|(page, _)| page).collect()
        }
    }

    impl DocumentEngine for FakeEngine {
        fn open(&self, bytes: &[u8]) -> Result<Box<dyn PdfDocument>, EngineError> {
            if !bytes.starts_with(b"%PDF") {
                return Err(EngineError::Decode("missing %PDF header".to_string()));
            }
            self.probe.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeDocument {
                spec: self.spec.clone(),
                probe: self.probe.clone(),
                gate: self.gate.clone(),
                destroyed: false,
            }))
        }
    }

    struct FakeDocument {
        spec: FakeDocumentSpec,
        probe: Probe,
        gate: Option<FakeGate>,
        destroyed: bool,
    }

    impl PdfDocument for FakeDocument {
        fn page_count(&self) -> usize {
            self.spec.pages.len()
        }

        fn page(&self, number: usize) -> Result<Box<dyn PdfPage + '_>, EngineError> {
            let count = self.page_count();
            if number == 0 || number > count {
                return Err(EngineError::PageOutOfRange {
                    page: number,
                    count,
                });
            }
            Ok(Box::new(FakePage {
                spec: self.spec.pages[number - 1].clone(),
                number,
                probe: self.probe.clone(),
                gate: self.gate.clone(),
            }))
        }

        fn title(&self) -> Option<String> {
            self.spec.title.clone()
        }

        fn destroy(&mut self) {
            if !self.destroyed {
                self.destroyed = true;
                self.probe.destroyed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub struct FakePage {
        spec: FakePageSpec,
        number: usize,
        probe: Probe,
        gate: Option<FakeGate>,
    }

    impl FakePage {
        /// Standalone page 1, not gated
        pub fn new(spec: FakePageSpec) -> Self {
            Self {
                spec,
                number: 1,
                probe: Probe::default(),
                gate: None,
            }
        }

        /// Scales passed to `render`, in order
        pub fn render_scales(&self) -> Vec<f32> {
            self.probe
                .renders
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .map(|&(_, scale)| scale)
                .collect()
        }

        /// Call shapes the text-layer builder has seen, in order
        pub fn text_layer_calls(&self) -> Vec<&'static str> {
            self.probe
                .text_layer_calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }

        fn positioned(&self, viewport: &crate::pdf::Viewport) -> Vec<TextSpan> {
            self.spec
                .items
                .iter()
                .filter_map(|item| {
                    let (x, y) = item.anchor();
                    let (left, top) = viewport.convert_to_viewport_point(x, y + item.height).ok()?;
                    Some(TextSpan {
                        text: item.text.clone(),
                        left,
                        top,
                        font_size: item.height * viewport.scale,
                        width: item.width * viewport.scale,
                    })
                })
                .collect()
        }
    }

    impl PdfPage for FakePage {
        fn size(&self) -> Result<PageSize, EngineError> {
            Ok(self.spec.size)
        }

        fn render(&self, scale: f32, width_px: u32, height_px: u32) -> Result<Vec<u8>, EngineError> {
            if let Some(gate) = &self.gate {
                gate.wait();
            }
            if self.spec.panic_render {
                panic!("injected panic on page {}", self.number);
            }
            if self.spec.fail_render {
                return Err(EngineError::render(format!(
                    "injected failure on page {}",
                    self.number
                )));
            }
            self.probe
                .renders
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((self.number, scale));
            Ok(vec![0xFF; width_px as usize * height_px as usize * 3])
        }

        fn text_content(&self) -> Result<TextContent, EngineError> {
            Ok(TextContent {
                items: self.spec.items.clone(),
            })
        }

        fn build_text_layer(&self, call: TextLayerCall<'_>) -> Result<Vec<TextSpan>, TextLayerError> {
            self.probe
                .text_layer_calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call.shape());

            match (self.spec.native, call) {
                (NativeLayer::Positioned, TextLayerCall::Source { viewport })
                | (NativeLayer::LegacyOnly, TextLayerCall::Content { viewport, .. }) => {
                    Ok(self.positioned(viewport))
                }
                (NativeLayer::Empty, TextLayerCall::Source { .. }) => Ok(Vec::new()),
                _ => Err(TextLayerError::Rejected),
            }
        }
    }

    /// Poll `session` until no render is in flight. False on timeout.
    pub fn settle(session: &mut DocumentSession, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while session.is_loading() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            session.poll_timeout(deadline - now);
        }
        true
    }
}

/// In-memory paper library
pub mod fake_library {
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    use chrono::{TimeZone, Utc};

    use crate::library::{Library, LibraryError, Paper};

    #[derive(Default)]
    pub struct MemoryLibrary {
        papers: Vec<Paper>,
        files: HashMap<PathBuf, Vec<u8>>,
    }

    impl MemoryLibrary {
        pub fn new() -> Self {
            Self::default()
        }

        /// Add a paper whose file holds `bytes`
        pub fn with_paper(mut self, title: &str, bytes: &[u8]) -> Self {
            let path = PathBuf::from(format!("papers/{title}.pdf"));
            self.files.insert(path.clone(), bytes.to_vec());
            self.push(title, path);
            self
        }

        /// Add a paper whose file cannot be read
        pub fn with_missing_paper(mut self, title: &str) -> Self {
            self.push(title, PathBuf::from(format!("papers/{title}.pdf")));
            self
        }

        fn push(&mut self, title: &str, file_path: PathBuf) {
            let id = self.papers.len() as i64 + 1;
            self.papers.push(Paper {
                id,
                title: title.to_string(),
                authors: None,
                file_path,
                added_at: Utc.timestamp_opt(1_700_000_000 + id, 0).single().unwrap_or_default(),
            });
        }
    }

    impl Library for MemoryLibrary {
        fn list_papers(&self) -> Result<Vec<Paper>, LibraryError> {
            let mut papers = self.papers.clone();
            papers.reverse();
            Ok(papers)
        }

        fn add_paper(&mut self, source: &Path) -> Result<String, LibraryError> {
            let title = source
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let bytes = std::fs::read(source).map_err(|e| LibraryError::io(source, e))?;
            let path = PathBuf::from(format!("papers/{title}.pdf"));
            self.files.insert(path.clone(), bytes);
            self.push(&title, path);
            Ok(format!("Paper added successfully: {title}"))
        }

        fn read_document_bytes(&self, path: &Path) -> Result<Vec<u8>, LibraryError> {
            self.files.get(path).cloned().ok_or_else(|| {
                LibraryError::io(
                    path,
                    std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
                )
            })
        }
    }
}
