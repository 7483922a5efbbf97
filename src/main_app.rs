use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use log::{debug, error, info};
use ratatui::{
    Terminal,
    layout::{Constraint, Direction, Layout},
    style::Style,
    widgets::{Block, ListState},
};

use crate::event_source::{
    Event, EventSource, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent,
};
use crate::library::{Library, Paper};
use crate::notification::NotificationManager;
use crate::pdf::{DocumentEngine, SessionOptions};
use crate::reader::{ReaderAction, ReaderView};
use crate::settings;
use crate::theme::current_theme;
use crate::ui;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    Quit,
}

/// The two mutually exclusive screens
pub enum AppView {
    Library,
    Reader(Box<ReaderView>),
}

pub struct App {
    library: Box<dyn Library>,
    engine: Arc<dyn DocumentEngine>,
    papers: Vec<Paper>,
    pub list_state: ListState,
    view: AppView,
    pub notifications: NotificationManager,
    options: SessionOptions,
    zoom_step: f32,
    reported_render_error: Option<String>,
}

impl App {
    /// App configured from the loaded settings
    pub fn new(library: Box<dyn Library>, engine: Arc<dyn DocumentEngine>) -> Self {
        let current = settings::current();
        Self::with_options(
            library,
            engine,
            current.session_options(),
            settings::get_zoom_step(),
        )
    }

    pub fn with_options(
        library: Box<dyn Library>,
        engine: Arc<dyn DocumentEngine>,
        options: SessionOptions,
        zoom_step: f32,
    ) -> Self {
        let mut app = Self {
            library,
            engine,
            papers: Vec::new(),
            list_state: ListState::default(),
            view: AppView::Library,
            notifications: NotificationManager::new(),
            options,
            zoom_step,
            reported_render_error: None,
        };
        app.refresh_papers();
        app
    }

    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn view(&self) -> &AppView {
        &self.view
    }

    pub fn is_reader(&self) -> bool {
        matches!(self.view, AppView::Reader(_))
    }

    pub fn reader(&self) -> Option<&ReaderView> {
        match &self.view {
            AppView::Reader(reader) => Some(reader),
            AppView::Library => None,
        }
    }

    pub fn reader_mut(&mut self) -> Option<&mut ReaderView> {
        match &mut self.view {
            AppView::Reader(reader) => Some(reader),
            AppView::Library => None,
        }
    }

    /// Message currently shown in the status bar
    pub fn status_message(&self) -> Option<&str> {
        self.notifications.current().map(|n| n.message.as_str())
    }

    /// Reload the paper list, keeping the selection in range
    pub fn refresh_papers(&mut self) {
        match self.library.list_papers() {
            Ok(papers) => self.papers = papers,
            Err(e) => {
                error!("Failed to list papers: {e}");
                self.notifications.error(format!("Failed to list papers: {e}"));
                self.papers.clear();
            }
        }

        let selected = match (self.papers.len(), self.list_state.selected()) {
            (0, _) => None,
            (len, Some(i)) => Some(i.min(len - 1)),
            (_, None) => Some(0),
        };
        self.list_state.select(selected);
    }

    pub fn open_selected(&mut self) {
        if let Some(index) = self.list_state.selected() {
            self.open_paper(index);
        }
    }

    /// Switch to the reader for `papers[index]`. On failure the app stays
    /// in the library and says why.
    pub fn open_paper(&mut self, index: usize) {
        if self.is_reader() {
            return;
        }
        let Some(paper) = self.papers.get(index).cloned() else {
            return;
        };
        let title = paper.title.clone();

        match ReaderView::open(
            self.library.as_ref(),
            self.engine.clone(),
            paper,
            self.options.clone(),
            self.zoom_step,
        ) {
            Ok(reader) => {
                info!("Opened '{title}'");
                self.reported_render_error = None;
                self.view = AppView::Reader(Box::new(reader));
            }
            Err(e) => {
                let message = format!("Failed to load {title}: {e}");
                error!("{message}");
                self.notifications.error(message);
            }
        }
    }

    /// Leave the reader: the session is torn down and its excerpts dropped
    pub fn back_to_library(&mut self) {
        if let AppView::Reader(mut reader) = std::mem::replace(&mut self.view, AppView::Library) {
            reader.close();
        }
        self.refresh_papers();
    }

    pub fn handle_event(&mut self, event: &Event) -> Option<AppAction> {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(*key),
            Event::Mouse(mouse) => {
                self.handle_mouse(*mouse);
                None
            }
            Event::Resize(cols, rows) => {
                debug!("Terminal resized to {cols}x{rows}");
                None
            }
            _ => None,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Option<AppAction> {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return Some(AppAction::Quit);
        }

        if let AppView::Reader(reader) = &mut self.view {
            let action = reader.handle_key(key);
            self.apply_reader_action(action);
            return None;
        }

        match key.code {
            KeyCode::Char('q') => return Some(AppAction::Quit),
            KeyCode::Char('j') | KeyCode::Down => self.move_selection(1),
            KeyCode::Char('k') | KeyCode::Up => self.move_selection(-1),
            KeyCode::Enter => self.open_selected(),
            KeyCode::Char('r') => self.refresh_papers(),
            KeyCode::Esc => {
                self.notifications.dismiss_current();
            }
            _ => {}
        }
        None
    }

    fn handle_mouse(&mut self, mouse: MouseEvent) {
        if let AppView::Reader(reader) = &mut self.view {
            let action = reader.handle_mouse(mouse);
            self.apply_reader_action(action);
        }
    }

    fn apply_reader_action(&mut self, action: Option<ReaderAction>) {
        match action {
            Some(ReaderAction::Back) => self.back_to_library(),
            Some(ReaderAction::Captured { id, page }) => {
                self.notifications
                    .info(format!("Excerpt #{id} captured from page {page}"));
            }
            None => {}
        }
    }

    fn move_selection(&mut self, delta: isize) {
        if self.papers.is_empty() {
            return;
        }
        let last = self.papers.len() - 1;
        let current = self.list_state.selected().unwrap_or(0);
        let next = current.saturating_add_signed(delta).min(last);
        self.list_state.select(Some(next));
    }

    /// Periodic work: apply finished renders and expire notifications.
    /// Returns true when the screen needs a redraw.
    pub fn tick(&mut self) -> bool {
        let expired = self.notifications.update();
        let rendered = match &mut self.view {
            AppView::Reader(reader) => reader.poll(),
            AppView::Library => false,
        };
        let reported = self.report_render_error();
        expired || rendered || reported
    }

    /// Surface a page that failed to render once, as a warning
    fn report_render_error(&mut self) -> bool {
        let AppView::Reader(reader) = &self.view else {
            return false;
        };
        let current = reader.session().last_error().map(str::to_string);
        if current == self.reported_render_error {
            return false;
        }
        if let Some(e) = &current {
            self.notifications.warn(format!("Render failed: {e}"));
        }
        self.reported_render_error = current;
        true
    }

    pub fn draw(&mut self, f: &mut ratatui::Frame) {
        let palette = current_theme();
        let background_block = Block::default().style(Style::default().bg(palette.base_00));
        f.render_widget(background_block, f.area());

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(1), Constraint::Length(1)])
            .split(f.area());

        let status = match &mut self.view {
            AppView::Library => {
                ui::draw_library(f, chunks[0], &self.papers, &mut self.list_state, palette);
                format!(
                    "{} papers  | j/k move  Enter open  r refresh  q quit",
                    self.papers.len()
                )
            }
            AppView::Reader(reader) => {
                reader.draw(f, chunks[0], palette);
                reader.status_line()
            }
        };
        ui::draw_status(f, chunks[1], &status, self.notifications.current(), palette);
    }
}

pub fn run_app_with_event_source<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    event_source: &mut dyn EventSource,
) -> Result<()>
where
    B::Error: Send + Sync + 'static,
{
    let tick_rate = Duration::from_millis(50);
    let mut last_tick = Instant::now();
    let mut needs_redraw = true; // Ensure we always render at least once on startup
    loop {
        if needs_redraw {
            terminal.draw(|f| app.draw(f))?;
            needs_redraw = false;
        }

        let mut events_processed = 0;
        let timeout = tick_rate.saturating_sub(last_tick.elapsed());
        if event_source.poll(timeout)? {
            while events_processed < 50 {
                let event = event_source.read()?;
                events_processed += 1;
                if app.handle_event(&event) == Some(AppAction::Quit) {
                    info!("Quit requested");
                    return Ok(());
                }
                if !event_source.poll(Duration::ZERO)? {
                    break;
                }
            }
        }
        if events_processed > 0 {
            needs_redraw = true;
        }

        if last_tick.elapsed() >= tick_rate {
            if app.tick() {
                needs_redraw = true;
            }
            last_tick = Instant::now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::fake_engine::{FakeDocumentSpec, FakeEngine};
    use crate::test_utils::fake_library::MemoryLibrary;

    fn app_with(library: MemoryLibrary) -> App {
        App::with_options(
            Box::new(library),
            Arc::new(FakeEngine::new(FakeDocumentSpec::with_pages(2))),
            SessionOptions::default(),
            0.1,
        )
    }

    fn press(app: &mut App, c: char) -> Option<AppAction> {
        app.handle_event(&crate::event_source::SimulatedEventSource::char_key(c))
    }

    #[test]
    fn selection_starts_on_newest_paper_and_stays_in_range() {
        let mut app = app_with(
            MemoryLibrary::new()
                .with_paper("first", b"%PDF")
                .with_paper("second", b"%PDF"),
        );
        assert_eq!(app.list_state.selected(), Some(0));
        assert_eq!(app.papers()[0].title, "second");

        press(&mut app, 'j');
        press(&mut app, 'j');
        assert_eq!(app.list_state.selected(), Some(1));
        press(&mut app, 'k');
        press(&mut app, 'k');
        assert_eq!(app.list_state.selected(), Some(0));
    }

    #[test]
    fn empty_library_has_no_selection() {
        let mut app = app_with(MemoryLibrary::new());
        assert_eq!(app.list_state.selected(), None);
        app.open_selected();
        assert!(!app.is_reader());
    }

    #[test]
    fn failed_open_stays_in_library_with_message() {
        let mut app = app_with(MemoryLibrary::new().with_paper("broken", b"garbage"));
        app.open_paper(0);

        assert!(!app.is_reader());
        let message = app.status_message().unwrap();
        assert!(message.starts_with("Failed to load broken: "), "{message}");
    }

    #[test]
    fn q_backs_out_of_reader_then_quits() {
        let mut app = app_with(MemoryLibrary::new().with_paper("paper", b"%PDF"));
        app.open_selected();
        assert!(app.is_reader());

        assert_eq!(press(&mut app, 'q'), None);
        assert!(!app.is_reader());
        assert_eq!(press(&mut app, 'q'), Some(AppAction::Quit));
    }

    #[test]
    fn escape_dismisses_library_notice() {
        let mut app = app_with(MemoryLibrary::new().with_paper("broken", b"garbage"));
        app.open_selected();
        assert!(app.status_message().is_some());

        app.handle_event(&crate::event_source::SimulatedEventSource::code_key(
            KeyCode::Esc,
        ));
        assert_eq!(app.status_message(), None);
    }

    #[test]
    fn render_failure_is_reported_once() {
        use crate::test_utils::fake_engine::settle;
        let mut app = App::with_options(
            Box::new(MemoryLibrary::new().with_paper("paper", b"%PDF")),
            Arc::new(FakeEngine::new(
                FakeDocumentSpec::with_pages(2).failing_page(1),
            )),
            SessionOptions::default(),
            0.1,
        );
        app.open_selected();
        let reader = app.reader_mut().unwrap();
        assert!(settle(reader.session_mut(), Duration::from_secs(5)));

        assert!(app.tick());
        assert_eq!(app.notifications.count(), 1);
        assert!(app.status_message().unwrap().starts_with("Render failed: "));
        app.tick();
        assert_eq!(app.notifications.count(), 1);
    }

    #[test]
    fn ctrl_c_quits_from_reader() {
        let mut app = app_with(MemoryLibrary::new().with_paper("paper", b"%PDF"));
        app.open_selected();
        let event = crate::event_source::SimulatedEventSource::ctrl_char_key('c');
        assert_eq!(app.handle_event(&event), Some(AppAction::Quit));
    }
}
