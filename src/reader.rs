//! Reader view: one open paper, its document session and excerpt capture
//!
//! The view owns everything that lives only while a paper is open. Leaving
//! the reader tears the session down and drops the excerpts with it.

use std::sync::Arc;

use image::RgbImage;
use log::{debug, info};
use ratatui::{
    Frame,
    layout::{Position, Rect},
    style::Modifier,
};

use crate::event_source::{KeyCode, KeyEvent, MouseButton, MouseEvent, MouseEventKind};
use crate::excerpt::ExcerptLog;
use crate::library::{Library, Paper};
use crate::pdf::{DocumentEngine, DocumentSession, LoadError, RenderTag, SessionOptions};
use crate::selection::overlay::OverlaySelection;
use crate::selection::{
    CaptureEffect, CaptureEvent, CaptureState, PointerTarget, ScreenRect,
    SelectionCaptureController,
};
use crate::theme::Base16Palette;
use crate::ui::{self, PageGeometry};

const SCROLL_STEP: u16 = 3;

/// What the app should do after the reader handled an input
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReaderAction {
    /// Leave the reader and show the library again
    Back,
    /// A new excerpt was appended
    Captured { id: u64, page: usize },
}

/// Page image already scaled to the cell grid
struct ScaledPage {
    tag: RenderTag,
    cols: u16,
    rows: u16,
    image: RgbImage,
}

pub struct ReaderView {
    paper: Paper,
    session: DocumentSession,
    excerpts: ExcerptLog,
    capture: SelectionCaptureController,
    selection: OverlaySelection,
    /// Tag of the render whose overlay is installed
    shown: Option<RenderTag>,
    scroll: u16,
    /// Area the page was last laid out in
    page_area: Option<Rect>,
    geometry: Option<PageGeometry>,
    affordance_rect: Option<Rect>,
    scaled: Option<ScaledPage>,
    /// Left button went down on the affordance
    pressed_affordance: bool,
}

impl ReaderView {
    /// Read `paper` through the library, open a fresh session on it and
    /// target page 1.
    pub fn open(
        library: &dyn Library,
        engine: Arc<dyn DocumentEngine>,
        paper: Paper,
        options: SessionOptions,
        zoom_step: f32,
    ) -> Result<Self, LoadError> {
        let bytes = library
            .read_document_bytes(&paper.file_path)
            .map_err(|e| LoadError::Io(e.to_string()))?;

        let mut session = DocumentSession::load(engine, bytes, options)?;
        session.set_zoom_step(zoom_step);
        session.render_page(1);
        info!(
            "Reader opened '{}' ({} pages)",
            paper.title,
            session.page_count()
        );

        Ok(Self {
            paper,
            session,
            excerpts: ExcerptLog::new(),
            capture: SelectionCaptureController::new(ScreenRect::default()),
            selection: OverlaySelection::new(),
            shown: None,
            scroll: 0,
            page_area: None,
            geometry: None,
            affordance_rect: None,
            scaled: None,
            pressed_affordance: false,
        })
    }

    pub fn paper(&self) -> &Paper {
        &self.paper
    }

    pub fn session(&self) -> &DocumentSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DocumentSession {
        &mut self.session
    }

    pub fn excerpts(&self) -> &ExcerptLog {
        &self.excerpts
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    /// Screen cells of the "+ Excerpt" affordance, when it is shown
    pub fn affordance_rect(&self) -> Option<Rect> {
        self.affordance_rect
    }

    pub fn geometry(&self) -> Option<&PageGeometry> {
        self.geometry.as_ref()
    }

    /// Page whose render is on screen; falls back to the session's target
    /// before the first render lands
    pub fn displayed_page(&self) -> usize {
        self.shown.map_or(self.session.page(), |tag| tag.page)
    }

    /// Pick up finished renders. Returns true when the worker sent anything.
    pub fn poll(&mut self) -> bool {
        let received = self.session.poll();
        self.sync_render();
        received
    }

    /// Install the overlay of a newly applied render
    fn sync_render(&mut self) {
        let current = self.session.current_render().cloned();
        let tag = current.as_ref().map(|render| render.tag);
        if tag == self.shown {
            return;
        }

        if self.shown.map(|t| t.page) != tag.map(|t| t.page) {
            self.scroll = 0;
        }
        self.shown = tag;
        self.scaled = None;
        self.selection.clear();

        let effects = self.capture.handle(CaptureEvent::OverlayReplaced);
        if let Some(render) = current {
            self.capture.set_overlay_rect(ScreenRect::new(
                0.0,
                0.0,
                render.overlay.width,
                render.overlay.height,
            ));
            debug!(
                "Installed overlay for page {} ({} spans, {:?})",
                render.tag.page,
                render.overlay.len(),
                render.overlay.origin
            );
        }
        self.apply_effects(effects);
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<ReaderAction> {
        match key.code {
            KeyCode::Char('h') | KeyCode::Left => {
                self.session.prev_page();
                None
            }
            KeyCode::Char('l') | KeyCode::Right => {
                self.session.next_page();
                None
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.session.zoom_in();
                None
            }
            KeyCode::Char('-') => {
                self.session.zoom_out();
                None
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.scroll = self.scroll.saturating_add(1);
                self.relayout();
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.scroll = self.scroll.saturating_sub(1);
                self.relayout();
                None
            }
            KeyCode::Enter | KeyCode::Char('e') => self.confirm(),
            KeyCode::Esc => {
                if self.capture.state() == CaptureState::Idle && self.selection.is_collapsed() {
                    Some(ReaderAction::Back)
                } else {
                    self.dismiss_selection();
                    None
                }
            }
            KeyCode::Char('q') => Some(ReaderAction::Back),
            _ => None,
        }
    }

    pub fn handle_mouse(&mut self, mouse: MouseEvent) -> Option<ReaderAction> {
        let at = Position::new(mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                if self.affordance_rect.is_some_and(|rect| rect.contains(at)) {
                    self.pressed_affordance = true;
                    let effects = self
                        .capture
                        .handle(CaptureEvent::PointerDown(PointerTarget::Affordance));
                    return self.apply_effects(effects);
                }

                match self.overlay_point(mouse.column, mouse.row) {
                    Some((x, y)) => {
                        let effects = self
                            .capture
                            .handle(CaptureEvent::PointerDown(PointerTarget::Overlay));
                        self.apply_effects(effects);
                        self.selection.begin(x, y);
                        self.selection_changed()
                    }
                    None => {
                        self.selection.clear();
                        let effects = self
                            .capture
                            .handle(CaptureEvent::PointerDown(PointerTarget::Outside));
                        self.apply_effects(effects)
                    }
                }
            }

            MouseEventKind::Drag(MouseButton::Left) => {
                if !self.selection.is_dragging() {
                    return None;
                }
                let (x, y) = self.overlay_point(mouse.column, mouse.row)?;
                self.selection.extend(x, y);
                self.selection_changed()
            }

            MouseEventKind::Up(MouseButton::Left) => {
                let mut action = None;
                if self.pressed_affordance {
                    self.pressed_affordance = false;
                    if self.affordance_rect.is_some_and(|rect| rect.contains(at)) {
                        action = self.confirm();
                    }
                }
                self.selection.finish();
                let effects = self.capture.handle(CaptureEvent::PointerUp);
                self.apply_effects(effects);
                action
            }

            MouseEventKind::ScrollDown => {
                self.scroll = self.scroll.saturating_add(SCROLL_STEP);
                self.relayout();
                None
            }
            MouseEventKind::ScrollUp => {
                self.scroll = self.scroll.saturating_sub(SCROLL_STEP);
                self.relayout();
                None
            }
            _ => None,
        }
    }

    fn overlay_point(&self, column: u16, row: u16) -> Option<(f32, f32)> {
        self.session.current_render()?;
        self.geometry?.cell_to_overlay(column, row)
    }

    /// Report the host selection to the capture controller
    fn selection_changed(&mut self) -> Option<ReaderAction> {
        let snapshot = {
            let render = self.session.current_render()?;
            self.selection.snapshot(&render.overlay)
        };
        let effects = self
            .capture
            .handle(CaptureEvent::SelectionChanged(snapshot));
        self.apply_effects(effects)
    }

    fn confirm(&mut self) -> Option<ReaderAction> {
        self.capture.affordance()?;
        let page = self.displayed_page();
        let effects = self.capture.handle(CaptureEvent::Confirm { page });
        self.apply_effects(effects)
    }

    /// Drop the selection as if the user clicked away from the page
    fn dismiss_selection(&mut self) {
        self.selection.clear();
        let effects = self
            .capture
            .handle(CaptureEvent::PointerDown(PointerTarget::Outside));
        self.apply_effects(effects);
        self.capture.handle(CaptureEvent::PointerUp);
    }

    fn apply_effects(&mut self, effects: Vec<CaptureEffect>) -> Option<ReaderAction> {
        let mut action = None;
        for effect in effects {
            match effect {
                CaptureEffect::ShowAffordance(anchor) => {
                    debug!("Affordance at ({:.1}, {:.1})", anchor.x, anchor.y);
                }
                CaptureEffect::HideAffordance => {
                    self.affordance_rect = None;
                }
                CaptureEffect::ClearHostSelection => {
                    self.selection.clear();
                }
                CaptureEffect::Captured { text, page } => {
                    let excerpt = self.excerpts.push(text, page);
                    info!(
                        "Captured excerpt #{} from page {} ({} chars)",
                        excerpt.id,
                        excerpt.page,
                        excerpt.text.chars().count()
                    );
                    action = Some(ReaderAction::Captured {
                        id: excerpt.id,
                        page: excerpt.page,
                    });
                }
            }
        }
        self.refresh_affordance();
        action
    }

    fn refresh_affordance(&mut self) {
        self.affordance_rect = match (self.capture.affordance(), self.geometry) {
            (Some(anchor), Some(geometry)) => geometry.affordance_rect(anchor.x, anchor.y),
            _ => None,
        };
    }

    fn relayout(&mut self) {
        if let Some(area) = self.page_area {
            self.layout(area);
        }
    }

    /// Fit the current page into `area` and refresh everything derived
    /// from its position
    pub fn layout(&mut self, area: Rect) {
        self.page_area = Some(area);
        let Some(render) = self.session.current_render().cloned() else {
            self.geometry = None;
            self.affordance_rect = None;
            return;
        };

        let geometry = PageGeometry::new(
            area,
            render.overlay.width,
            render.overlay.height,
            self.scroll,
        );
        self.scroll = geometry.scroll;

        let stale = self.scaled.as_ref().is_none_or(|s| {
            s.tag != render.tag || s.cols != geometry.cols || s.rows != geometry.rows
        });
        if stale {
            self.scaled = ui::scale_for_cells(&render.raster, geometry.cols, geometry.rows).map(
                |image| ScaledPage {
                    tag: render.tag,
                    cols: geometry.cols,
                    rows: geometry.rows,
                    image,
                },
            );
        }

        self.geometry = Some(geometry);
        self.refresh_affordance();
    }

    pub fn draw(&mut self, f: &mut Frame, area: Rect, palette: &Base16Palette) {
        let (page_panel, excerpt_panel) = ui::reader_layout(area);
        let inner = ui::draw_page_frame(f, page_panel, &self.paper.title, palette);
        self.layout(inner);

        match (&self.geometry, &self.scaled) {
            (Some(geometry), Some(scaled)) => {
                ui::draw_page_image(f, geometry, &scaled.image);
                self.draw_selection(f);
            }
            _ => {
                let message = if self.session.last_error().is_some() {
                    "Could not render this page"
                } else {
                    "Rendering page..."
                };
                ui::draw_page_message(f, inner, message, palette);
            }
        }

        if let Some(rect) = self.affordance_rect {
            ui::draw_affordance(f, rect, palette);
        }
        ui::draw_excerpts(f, excerpt_panel, &self.excerpts, palette);
    }

    /// Reverse-video the cells under the selected spans
    fn draw_selection(&self, f: &mut Frame) {
        let (Some(geometry), Some(render)) = (self.geometry, self.session.current_render()) else {
            return;
        };
        let Some(range) = self.selection.selected_spans(&render.overlay) else {
            return;
        };

        let buf = f.buffer_mut();
        for span in &render.overlay.spans[range] {
            let (left, top) = geometry.overlay_to_cell(span.left, span.top);
            let (right, bottom) =
                geometry.overlay_to_cell(span.right() - 0.01, span.bottom() - 0.01);
            for row in top..=bottom {
                for column in left..=right {
                    let (Ok(column), Ok(row)) = (u16::try_from(column), u16::try_from(row)) else {
                        continue;
                    };
                    if !geometry.visible.contains(Position::new(column, row)) {
                        continue;
                    }
                    if let Some(cell) = buf.cell_mut((column, row)) {
                        cell.modifier.insert(Modifier::REVERSED);
                    }
                }
            }
        }
    }

    /// One-line summary for the status bar
    pub fn status_line(&self) -> String {
        let mut status = format!(
            "p. {}/{}  {:.0}%",
            self.displayed_page(),
            self.session.page_count(),
            self.session.scale() * 100.0
        );
        if self.session.is_loading() {
            status.push_str("  rendering");
        }
        if let Some(err) = self.session.last_error() {
            status.push_str(&format!("  render failed: {err}"));
        }
        status.push_str("  | h/l page  +/- zoom  drag select  Enter capture  q back");
        status
    }

    /// Tear the session down and forget everything captured in it
    pub fn close(&mut self) {
        self.session.teardown();
        self.excerpts.clear();
        self.selection.clear();
        self.capture.handle(CaptureEvent::OverlayReplaced);
        self.affordance_rect = None;
        self.scaled = None;
        self.shown = None;
        info!("Reader closed '{}'", self.paper.title);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_source::KeyModifiers;
    use crate::library::Library;
    use crate::test_utils::fake_engine::{FakeDocumentSpec, FakeEngine, settle};
    use crate::test_utils::fake_library::MemoryLibrary;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const PAGE_AREA: Rect = Rect::new(0, 0, 120, 70);

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    fn open(engine: &FakeEngine) -> ReaderView {
        let library = MemoryLibrary::new().with_paper("spacing", b"%PDF-1.7");
        let paper = library.list_papers().unwrap().remove(0);
        let mut reader = ReaderView::open(
            &library,
            Arc::new(engine.clone()),
            paper,
            SessionOptions::default(),
            0.1,
        )
        .unwrap();
        wait(&mut reader);
        reader
    }

    fn wait(reader: &mut ReaderView) {
        assert!(settle(reader.session_mut(), Duration::from_secs(5)));
        reader.poll();
        reader.layout(PAGE_AREA);
    }

    /// Drag across the "Section n" heading; the page sits at column 10
    fn select_heading(reader: &mut ReaderView) {
        reader.handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 22, 4));
        reader.handle_mouse(mouse(MouseEventKind::Drag(MouseButton::Left), 30, 4));
        reader.handle_mouse(mouse(MouseEventKind::Up(MouseButton::Left), 30, 4));
    }

    #[test]
    fn opening_renders_first_page() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let reader = open(&engine);

        assert_eq!(reader.displayed_page(), 1);
        assert_eq!(engine.rendered_pages(), vec![1]);
        let geometry = reader.geometry().unwrap();
        assert_eq!((geometry.cols, geometry.rows), (100, 65));
        assert_eq!(geometry.page_x, 10);
    }

    #[test]
    fn drag_shows_affordance_above_selection() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let mut reader = open(&engine);

        select_heading(&mut reader);

        assert!(matches!(
            reader.capture_state(),
            CaptureState::AffordanceShown { .. }
        ));
        assert_eq!(reader.affordance_rect(), Some(Rect::new(23, 1, 11, 1)));
    }

    #[test]
    fn enter_captures_excerpt_with_page() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let mut reader = open(&engine);

        select_heading(&mut reader);
        let action = reader.handle_key(key(KeyCode::Enter));

        assert_eq!(action, Some(ReaderAction::Captured { id: 1, page: 1 }));
        let excerpt = reader.excerpts().last().unwrap();
        assert_eq!(excerpt.text, "Section 1");
        assert_eq!(reader.affordance_rect(), None);
        assert_eq!(reader.capture_state(), CaptureState::Idle);
    }

    #[test]
    fn clicking_affordance_confirms() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let mut reader = open(&engine);
        select_heading(&mut reader);

        reader.handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 25, 1));
        let action = reader.handle_mouse(mouse(MouseEventKind::Up(MouseButton::Left), 25, 1));

        assert_eq!(action, Some(ReaderAction::Captured { id: 1, page: 1 }));
        assert_eq!(reader.excerpts().len(), 1);
    }

    #[test]
    fn outside_click_dismisses_without_capture() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let mut reader = open(&engine);
        select_heading(&mut reader);

        reader.handle_mouse(mouse(MouseEventKind::Down(MouseButton::Left), 2, 2));
        reader.handle_mouse(mouse(MouseEventKind::Up(MouseButton::Left), 2, 2));

        assert_eq!(reader.affordance_rect(), None);
        assert_eq!(reader.handle_key(key(KeyCode::Enter)), None);
        assert!(reader.excerpts().is_empty());
    }

    #[test]
    fn page_change_replaces_overlay_and_hides_affordance() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let mut reader = open(&engine);
        select_heading(&mut reader);

        reader.handle_key(key(KeyCode::Char('l')));
        wait(&mut reader);

        assert_eq!(reader.displayed_page(), 2);
        assert_eq!(reader.capture_state(), CaptureState::Idle);
        assert_eq!(reader.affordance_rect(), None);
    }

    #[test]
    fn esc_clears_selection_before_leaving() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let mut reader = open(&engine);
        select_heading(&mut reader);

        assert_eq!(reader.handle_key(key(KeyCode::Esc)), None);
        assert_eq!(reader.affordance_rect(), None);
        assert_eq!(reader.handle_key(key(KeyCode::Esc)), Some(ReaderAction::Back));
    }

    #[test]
    fn close_destroys_document_and_drops_excerpts() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(3));
        let destroyed = engine.destroy_count();
        let mut reader = open(&engine);
        select_heading(&mut reader);
        reader.handle_key(key(KeyCode::Enter));

        reader.close();
        reader.close();

        assert!(reader.session().is_torn_down());
        assert!(reader.excerpts().is_empty());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unreadable_bytes_fail_to_open() {
        let engine = FakeEngine::new(FakeDocumentSpec::with_pages(1));
        let library = MemoryLibrary::new()
            .with_paper("broken", b"not a pdf")
            .with_missing_paper("gone");
        let papers = library.list_papers().unwrap();

        let result = ReaderView::open(
            &library,
            Arc::new(engine.clone()),
            papers[0].clone(),
            SessionOptions::default(),
            0.1,
        );
        assert!(matches!(result, Err(LoadError::Io(_))));

        let result = ReaderView::open(
            &library,
            Arc::new(engine),
            papers[1].clone(),
            SessionOptions::default(),
            0.1,
        );
        assert!(matches!(result, Err(LoadError::Decode(_))));
    }
}
