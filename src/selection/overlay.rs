//! Host text selection over the invisible overlay
//!
//! A terminal has no native selection over an image, so the reader keeps
//! its own: a mouse drag between two overlay points selects every span from
//! the one nearest the anchor to the one nearest the focus, in layer order.

use std::ops::RangeInclusive;

use super::{ScreenRect, SelectionSnapshot};
use crate::pdf::{TextLayer, TextSpan};

#[derive(Clone, Copy, Debug, PartialEq)]
struct Point {
    x: f32,
    y: f32,
}

#[derive(Clone, Debug, Default)]
pub struct OverlaySelection {
    anchor: Option<Point>,
    focus: Option<Point>,
    dragging: bool,
}

impl OverlaySelection {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a selection at an overlay point
    pub fn begin(&mut self, x: f32, y: f32) {
        let point = Point { x, y };
        self.anchor = Some(point);
        self.focus = Some(point);
        self.dragging = true;
    }

    /// Move the focus while dragging
    pub fn extend(&mut self, x: f32, y: f32) {
        if self.dragging {
            self.focus = Some(Point { x, y });
        }
    }

    pub fn finish(&mut self) {
        self.dragging = false;
    }

    pub fn clear(&mut self) {
        self.anchor = None;
        self.focus = None;
        self.dragging = false;
    }

    #[must_use]
    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    #[must_use]
    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }

    /// Indices of the selected spans, `None` when nothing is selected
    #[must_use]
    pub fn selected_spans(&self, layer: &TextLayer) -> Option<RangeInclusive<usize>> {
        let (anchor, focus) = (self.anchor?, self.focus?);
        if anchor == focus {
            return None;
        }
        let a = nearest_span(&layer.spans, anchor)?;
        let b = nearest_span(&layer.spans, focus)?;
        Some(a.min(b)..=a.max(b))
    }

    /// What the selection currently covers on `layer`
    #[must_use]
    pub fn snapshot(&self, layer: &TextLayer) -> SelectionSnapshot {
        let Some(range) = self.selected_spans(layer) else {
            return SelectionSnapshot::collapsed();
        };
        let spans = &layer.spans[range];

        let mut text = String::new();
        let mut rect: Option<ScreenRect> = None;
        let mut previous: Option<&TextSpan> = None;
        for span in spans {
            if let Some(prev) = previous {
                let same_line = (span.top - prev.top).abs() <= prev.font_size * 0.5;
                text.push(if same_line { ' ' } else { '\n' });
            }
            text.push_str(&span.text);

            let span_rect = ScreenRect::new(span.left, span.top, span.hit_width(), span.font_size);
            rect = Some(rect.map_or(span_rect, |r| r.union(&span_rect)));
            previous = Some(span);
        }

        SelectionSnapshot {
            text,
            collapsed: false,
            rect,
        }
    }
}

/// Index of the span closest to `point`; spans containing it win, ties go
/// to the earlier span.
fn nearest_span(spans: &[TextSpan], point: Point) -> Option<usize> {
    spans
        .iter()
        .enumerate()
        .map(|(i, span)| {
            let dx = (span.left - point.x).max(point.x - span.right()).max(0.0);
            let dy = (span.top - point.y).max(point.y - span.bottom()).max(0.0);
            (i, dx * dx + dy * dy)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::LayerOrigin;

    fn span(text: &str, left: f32, top: f32) -> TextSpan {
        TextSpan {
            text: text.to_string(),
            left,
            top,
            font_size: 10.0,
            width: text.len() as f32 * 5.0,
        }
    }

    fn layer() -> TextLayer {
        TextLayer {
            width: 400.0,
            height: 300.0,
            spans: vec![
                span("Introduction", 20.0, 20.0),
                span("Spaced", 20.0, 50.0),
                span("repetition", 60.0, 50.0),
                span("works.", 20.0, 65.0),
            ],
            origin: LayerOrigin::Fallback,
        }
    }

    #[test]
    fn click_without_drag_is_collapsed() {
        let mut selection = OverlaySelection::new();
        selection.begin(25.0, 25.0);
        selection.finish();

        let snapshot = selection.snapshot(&layer());
        assert!(snapshot.collapsed);
        assert!(!snapshot.is_eligible());
    }

    #[test]
    fn drag_inside_one_span_selects_it() {
        let mut selection = OverlaySelection::new();
        selection.begin(22.0, 25.0);
        selection.extend(70.0, 25.0);

        let snapshot = selection.snapshot(&layer());
        assert_eq!(snapshot.text, "Introduction");
        assert!(snapshot.is_eligible());
        assert_eq!(snapshot.rect, Some(ScreenRect::new(20.0, 20.0, 60.0, 10.0)));
    }

    #[test]
    fn backwards_drag_selects_in_layer_order() {
        let mut selection = OverlaySelection::new();
        selection.begin(30.0, 68.0);
        selection.extend(25.0, 52.0);

        let snapshot = selection.snapshot(&layer());
        assert_eq!(snapshot.text, "Spaced repetition\nworks.");
        let rect = snapshot.rect.unwrap();
        assert_eq!((rect.left, rect.top), (20.0, 50.0));
        assert_eq!(rect.right(), 110.0);
        assert_eq!(rect.bottom(), 75.0);
    }

    #[test]
    fn empty_layer_selects_nothing() {
        let mut selection = OverlaySelection::new();
        selection.begin(0.0, 0.0);
        selection.extend(50.0, 50.0);
        let empty = TextLayer {
            spans: vec![],
            ..layer()
        };
        assert!(selection.snapshot(&empty).collapsed);
    }

    #[test]
    fn extend_after_finish_is_ignored() {
        let mut selection = OverlaySelection::new();
        selection.begin(22.0, 25.0);
        selection.finish();
        selection.extend(70.0, 60.0);
        assert!(selection.is_collapsed());
    }
}
