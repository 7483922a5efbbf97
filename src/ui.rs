//! Terminal drawing for the library list and the reader
//!
//! The page raster is painted with half blocks: every cell shows two
//! vertically stacked samples, upper half as foreground and lower half as
//! background. A cell stands for [`CELL_PX_W`] x [`CELL_PX_H`] logical
//! overlay pixels, so zooming changes how many cells a page covers.

use image::RgbImage;
use image::imageops::{self, FilterType};
use ratatui::{
    Frame,
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Position, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Widget, Wrap},
};

use crate::excerpt::ExcerptLog;
use crate::library::Paper;
use crate::notification::{Notification, NotificationLevel};
use crate::pdf::RasterSurface;
use crate::theme::Base16Palette;

/// Logical overlay pixels covered by one terminal column
pub const CELL_PX_W: f32 = 8.0;
/// Logical overlay pixels covered by one terminal row
pub const CELL_PX_H: f32 = 16.0;

pub const AFFORDANCE_LABEL: &str = " + Excerpt ";

const EXCERPT_PANEL_WIDTH: u16 = 38;

/// Where the current page sits on screen, and how cells map to overlay
/// pixels
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageGeometry {
    /// Screen column of the page's first column
    pub page_x: u16,
    /// On-screen part of the page
    pub visible: Rect,
    /// Page size in cells
    pub cols: u16,
    pub rows: u16,
    /// Page rows scrolled off above `visible`
    pub scroll: u16,
    overlay_width_milli: u32,
    overlay_height_milli: u32,
}

impl PageGeometry {
    /// Lay a page of `overlay_width` x `overlay_height` logical pixels into
    /// `area`, centred horizontally and scrolled down by `scroll` rows
    #[must_use]
    pub fn new(area: Rect, overlay_width: f32, overlay_height: f32, scroll: u16) -> Self {
        let cols = (overlay_width / CELL_PX_W).ceil().max(1.0) as u16;
        let rows = (overlay_height / CELL_PX_H).ceil().max(1.0) as u16;
        let scroll = scroll.min(rows.saturating_sub(area.height));
        let width = cols.min(area.width);
        let height = (rows - scroll).min(area.height);
        let page_x = area.x + (area.width - width) / 2;

        Self {
            page_x,
            visible: Rect::new(page_x, area.y, width, height),
            cols,
            rows,
            scroll,
            overlay_width_milli: (overlay_width.max(0.0) * 1000.0) as u32,
            overlay_height_milli: (overlay_height.max(0.0) * 1000.0) as u32,
        }
    }

    #[must_use]
    pub fn overlay_size(&self) -> (f32, f32) {
        (
            self.overlay_width_milli as f32 / 1000.0,
            self.overlay_height_milli as f32 / 1000.0,
        )
    }

    /// Overlay point at the centre of a screen cell, if the cell shows page
    #[must_use]
    pub fn cell_to_overlay(&self, column: u16, row: u16) -> Option<(f32, f32)> {
        if !self.visible.contains(Position::new(column, row)) {
            return None;
        }
        let (width, height) = self.overlay_size();
        let x = (f32::from(column - self.page_x) + 0.5) * CELL_PX_W;
        let y = (f32::from(row - self.visible.y + self.scroll) + 0.5) * CELL_PX_H;
        Some((x.min(width), y.min(height)))
    }

    /// Screen cell holding an overlay point; may lie off screen
    #[must_use]
    pub fn overlay_to_cell(&self, x: f32, y: f32) -> (i32, i32) {
        let column = i32::from(self.page_x) + (x / CELL_PX_W).floor() as i32;
        let row = i32::from(self.visible.y) + (y / CELL_PX_H).floor() as i32
            - i32::from(self.scroll);
        (column, row)
    }

    /// Screen rectangle for the affordance label centred on an overlay
    /// anchor, pulled back inside the visible page
    #[must_use]
    pub fn affordance_rect(&self, anchor_x: f32, anchor_y: f32) -> Option<Rect> {
        let label = AFFORDANCE_LABEL.chars().count() as u16;
        if self.visible.width < label || self.visible.height == 0 {
            return None;
        }
        let (column, row) = self.overlay_to_cell(anchor_x, anchor_y);
        let left = (column - i32::from(label / 2)).clamp(
            i32::from(self.visible.x),
            i32::from(self.visible.right() - label),
        );
        let top = row.clamp(
            i32::from(self.visible.y),
            i32::from(self.visible.bottom() - 1),
        );
        Some(Rect::new(left as u16, top as u16, label, 1))
    }
}

/// Scale a rendered page to two samples per cell row
#[must_use]
pub fn scale_for_cells(raster: &RasterSurface, cols: u16, rows: u16) -> Option<RgbImage> {
    let image = raster.to_rgb_image()?;
    Some(imageops::resize(
        &image,
        u32::from(cols),
        u32::from(rows) * 2,
        FilterType::Triangle,
    ))
}

/// Half-block painter for a page image scaled by [`scale_for_cells`]
pub struct PageImage<'a> {
    image: &'a RgbImage,
    scroll: u16,
}

impl<'a> PageImage<'a> {
    pub fn new(image: &'a RgbImage, scroll: u16) -> Self {
        Self { image, scroll }
    }
}

impl Widget for PageImage<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let sample = |x: u32, y: u32| -> Color {
            match self.image.get_pixel_checked(x, y) {
                Some(px) => Color::Rgb(px[0], px[1], px[2]),
                None => Color::Reset,
            }
        };

        for dy in 0..area.height {
            let top = u32::from(dy + self.scroll) * 2;
            for dx in 0..area.width {
                let x = u32::from(dx);
                if let Some(cell) = buf.cell_mut((area.x + dx, area.y + dy)) {
                    cell.set_symbol("▀")
                        .set_fg(sample(x, top))
                        .set_bg(sample(x, top + 1));
                }
            }
        }
    }
}

/// Paper list, or a hint when the library is empty
pub fn draw_library(
    f: &mut Frame,
    area: Rect,
    papers: &[Paper],
    list_state: &mut ListState,
    palette: &Base16Palette,
) {
    let (text_color, border_color, _) = palette.get_panel_colors(true);
    let (selection_bg, selection_fg) = palette.get_selection_colors(true);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Library ")
        .border_style(Style::default().fg(border_color));

    if papers.is_empty() {
        let hint = Paragraph::new(vec![
            Line::from("No papers yet."),
            Line::from(""),
            Line::from(Span::styled(
                "Import one with: papermaster add <file.pdf>",
                Style::default().fg(palette.base_03),
            )),
        ])
        .block(block)
        .style(Style::default().fg(text_color));
        f.render_widget(hint, area);
        return;
    }

    let items: Vec<ListItem> = papers
        .iter()
        .map(|paper| {
            let mut spans = vec![Span::styled(
                paper.title.clone(),
                Style::default().fg(text_color),
            )];
            if let Some(authors) = &paper.authors {
                spans.push(Span::styled(
                    format!("  {authors}"),
                    Style::default().fg(palette.base_04),
                ));
            }
            spans.push(Span::styled(
                format!("  ({})", paper.added_at.format("%Y-%m-%d %H:%M")),
                Style::default().fg(palette.base_03),
            ));
            ListItem::new(Line::from(spans))
        })
        .collect();

    let list = List::new(items).block(block).highlight_style(
        Style::default()
            .bg(selection_bg)
            .fg(selection_fg)
            .add_modifier(Modifier::BOLD),
    );
    f.render_stateful_widget(list, area, list_state);
}

/// Split the reader area into the page panel and the excerpt panel
#[must_use]
pub fn reader_layout(area: Rect) -> (Rect, Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(20), Constraint::Length(EXCERPT_PANEL_WIDTH)])
        .split(area);
    (chunks[0], chunks[1])
}

/// Bordered panel that holds the page; returns the inner area
pub fn draw_page_frame(f: &mut Frame, area: Rect, title: &str, palette: &Base16Palette) -> Rect {
    let (_, border_color, _) = palette.get_panel_colors(true);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {title} "))
        .border_style(Style::default().fg(border_color));
    let inner = block.inner(area);
    f.render_widget(block, area);
    inner
}

/// Centred placeholder inside the page panel
pub fn draw_page_message(f: &mut Frame, area: Rect, message: &str, palette: &Base16Palette) {
    let paragraph = Paragraph::new(message.to_string())
        .style(Style::default().fg(palette.base_03))
        .wrap(Wrap { trim: true });
    let y = area.y + area.height / 2;
    f.render_widget(paragraph, Rect::new(area.x + 1, y, area.width.saturating_sub(2), 1));
}

pub fn draw_page_image(f: &mut Frame, geometry: &PageGeometry, image: &RgbImage) {
    f.render_widget(PageImage::new(image, geometry.scroll), geometry.visible);
}

pub fn draw_affordance(f: &mut Frame, rect: Rect, palette: &Base16Palette) {
    let label = Paragraph::new(AFFORDANCE_LABEL).style(
        Style::default()
            .bg(palette.base_0d)
            .fg(palette.base_07)
            .add_modifier(Modifier::BOLD),
    );
    f.render_widget(Clear, rect);
    f.render_widget(label, rect);
}

/// Captured excerpts, newest at the bottom
pub fn draw_excerpts(f: &mut Frame, area: Rect, excerpts: &ExcerptLog, palette: &Base16Palette) {
    let (text_color, border_color, _) = palette.get_panel_colors(false);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Excerpts ({}) ", excerpts.len()))
        .border_style(Style::default().fg(border_color));
    let inner_width = block.inner(area).width.max(1) as usize;

    let mut lines: Vec<Line> = Vec::new();
    if excerpts.is_empty() {
        lines.push(Line::from(Span::styled(
            "Select text on the page to capture it.",
            Style::default().fg(text_color),
        )));
    }
    for excerpt in excerpts.iter() {
        lines.push(Line::from(Span::styled(
            format!("#{} p.{}", excerpt.id, excerpt.page),
            Style::default().fg(palette.base_0a),
        )));
        for wrapped in textwrap::wrap(&excerpt.text, inner_width) {
            lines.push(Line::from(Span::styled(
                wrapped.into_owned(),
                Style::default().fg(palette.base_05),
            )));
        }
        lines.push(Line::from(""));
    }

    let height = block.inner(area).height as usize;
    let scroll = lines.len().saturating_sub(height) as u16;
    let paragraph = Paragraph::new(lines).block(block).scroll((scroll, 0));
    f.render_widget(paragraph, area);
}

/// One-line status bar: view state on the left, the current notification
/// (if any) on the right
pub fn draw_status(
    f: &mut Frame,
    area: Rect,
    status: &str,
    notification: Option<&Notification>,
    palette: &Base16Palette,
) {
    let mut spans = vec![Span::styled(
        status.to_string(),
        Style::default().fg(palette.base_04),
    )];
    if let Some(notification) = notification {
        let color = match notification.level {
            NotificationLevel::Info => palette.base_0b,
            NotificationLevel::Warning => palette.base_0a,
            NotificationLevel::Error => palette.base_08,
        };
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            notification.message.clone(),
            Style::default().fg(color),
        ));
    }
    f.render_widget(
        Paragraph::new(Line::from(spans)).style(Style::default().bg(palette.base_01)),
        area,
    );
}
