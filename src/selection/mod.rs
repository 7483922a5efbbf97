//! Selection capture
//!
//! Watches the host's text selection over the page overlay, decides when a
//! selection is worth offering as an excerpt, positions the floating
//! "+ Excerpt" affordance, and turns a confirmation into a captured excerpt.

pub mod overlay;

use log::debug;

/// Shortest selection (after trimming) that can become an excerpt
pub const MIN_EXCERPT_CHARS: usize = 3;

/// How far above the selection the affordance floats, in overlay pixels
pub const AFFORDANCE_LIFT_PX: f32 = 40.0;

/// Axis-aligned rectangle in host pixel coordinates
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScreenRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl ScreenRect {
    #[must_use]
    pub const fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    #[must_use]
    pub fn right(&self) -> f32 {
        self.left + self.width
    }

    #[must_use]
    pub fn bottom(&self) -> f32 {
        self.top + self.height
    }

    #[must_use]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x < self.right() && y >= self.top && y < self.bottom()
    }

    /// Smallest rectangle covering both
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        Self {
            left,
            top,
            width: self.right().max(other.right()) - left,
            height: self.bottom().max(other.bottom()) - top,
        }
    }
}

/// What the host reports about its current selection
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionSnapshot {
    pub text: String,
    /// Anchor and focus are at the same position
    pub collapsed: bool,
    /// Bounding rectangle of the selected range, if it has one
    pub rect: Option<ScreenRect>,
}

impl SelectionSnapshot {
    /// A collapsed, empty selection
    #[must_use]
    pub fn collapsed() -> Self {
        Self {
            collapsed: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_eligible(&self) -> bool {
        !self.collapsed && self.text.trim().chars().count() >= MIN_EXCERPT_CHARS
    }
}

/// Overlay-local position of the affordance (horizontal centre, top edge)
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffordanceAnchor {
    pub x: f32,
    pub y: f32,
}

/// Where a pointer-down landed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerTarget {
    Overlay,
    Affordance,
    Outside,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEvent {
    SelectionChanged(SelectionSnapshot),
    PointerDown(PointerTarget),
    PointerUp,
    /// The user confirmed capture while `page` is displayed
    Confirm { page: usize },
    /// The overlay was rebuilt for another page or zoom; any selection on
    /// the old one is gone
    OverlayReplaced,
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureEffect {
    ShowAffordance(AffordanceAnchor),
    HideAffordance,
    ClearHostSelection,
    Captured { text: String, page: usize },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CaptureState {
    Idle,
    SelectionPending,
    AffordanceShown { anchor: AffordanceAnchor },
}

pub struct SelectionCaptureController {
    state: CaptureState,
    /// Overlay bounds in the same coordinates as selection rectangles
    overlay: ScreenRect,
    /// Last eligible selection
    selection: Option<SelectionSnapshot>,
    /// A pointer went down on the affordance and has not come up yet
    pointer_on_affordance: bool,
}

impl SelectionCaptureController {
    #[must_use]
    pub fn new(overlay: ScreenRect) -> Self {
        Self {
            state: CaptureState::Idle,
            overlay,
            selection: None,
            pointer_on_affordance: false,
        }
    }

    pub fn set_overlay_rect(&mut self, overlay: ScreenRect) {
        self.overlay = overlay;
    }

    #[must_use]
    pub fn state(&self) -> CaptureState {
        self.state
    }

    #[must_use]
    pub fn affordance(&self) -> Option<AffordanceAnchor> {
        match self.state {
            CaptureState::AffordanceShown { anchor } => Some(anchor),
            _ => None,
        }
    }

    pub fn handle(&mut self, event: CaptureEvent) -> Vec<CaptureEffect> {
        match event {
            CaptureEvent::SelectionChanged(snapshot) => self.selection_changed(snapshot),

            CaptureEvent::PointerDown(PointerTarget::Affordance) => {
                self.pointer_on_affordance = true;
                vec![]
            }

            // A press on the overlay starts a new host selection; the
            // resulting selection-change decides what happens next
            CaptureEvent::PointerDown(PointerTarget::Overlay) => vec![],

            CaptureEvent::PointerDown(PointerTarget::Outside) | CaptureEvent::OverlayReplaced => {
                self.dismiss()
            }

            CaptureEvent::PointerUp => {
                self.pointer_on_affordance = false;
                vec![]
            }

            CaptureEvent::Confirm { page } => self.confirm(page),
        }
    }

    fn selection_changed(&mut self, snapshot: SelectionSnapshot) -> Vec<CaptureEffect> {
        if snapshot.is_eligible() {
            let rect = snapshot.rect;
            self.selection = Some(snapshot);

            let Some(rect) = rect else {
                if self.state == CaptureState::Idle {
                    self.state = CaptureState::SelectionPending;
                }
                return vec![];
            };

            let anchor = self.anchor_for(&rect);
            if self.state == (CaptureState::AffordanceShown { anchor }) {
                return vec![];
            }
            self.state = CaptureState::AffordanceShown { anchor };
            return vec![CaptureEffect::ShowAffordance(anchor)];
        }

        if self.pointer_on_affordance {
            // the affordance's own click is in progress
            return vec![];
        }
        if snapshot.collapsed && matches!(self.state, CaptureState::AffordanceShown { .. }) {
            debug!("Selection collapsed momentarily, keeping affordance");
            return vec![];
        }

        self.selection = None;
        let was_shown = matches!(self.state, CaptureState::AffordanceShown { .. });
        self.state = CaptureState::Idle;
        if was_shown {
            vec![CaptureEffect::HideAffordance]
        } else {
            vec![]
        }
    }

    fn anchor_for(&self, selection: &ScreenRect) -> AffordanceAnchor {
        AffordanceAnchor {
            x: selection.left - self.overlay.left + selection.width / 2.0,
            y: selection.top - self.overlay.top - AFFORDANCE_LIFT_PX,
        }
    }

    fn dismiss(&mut self) -> Vec<CaptureEffect> {
        self.pointer_on_affordance = false;
        self.selection = None;
        let effects = match self.state {
            CaptureState::AffordanceShown { .. } => {
                vec![CaptureEffect::HideAffordance, CaptureEffect::ClearHostSelection]
            }
            CaptureState::SelectionPending => vec![CaptureEffect::ClearHostSelection],
            CaptureState::Idle => vec![],
        };
        self.state = CaptureState::Idle;
        effects
    }

    fn confirm(&mut self, page: usize) -> Vec<CaptureEffect> {
        if !matches!(self.state, CaptureState::AffordanceShown { .. }) {
            return vec![];
        }
        let Some(selection) = self.selection.take() else {
            return vec![];
        };

        self.state = CaptureState::Idle;
        self.pointer_on_affordance = false;
        vec![
            CaptureEffect::Captured {
                text: selection.text.trim().to_string(),
                page,
            },
            CaptureEffect::ClearHostSelection,
            CaptureEffect::HideAffordance,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OVERLAY: ScreenRect = ScreenRect::new(100.0, 50.0, 800.0, 1000.0);

    fn selected(text: &str) -> SelectionSnapshot {
        SelectionSnapshot {
            text: text.to_string(),
            collapsed: false,
            rect: Some(ScreenRect::new(200.0, 300.0, 120.0, 14.0)),
        }
    }

    fn shown() -> SelectionCaptureController {
        let mut controller = SelectionCaptureController::new(OVERLAY);
        controller.handle(CaptureEvent::SelectionChanged(selected("Introduction")));
        controller
    }

    #[test]
    fn eligible_selection_shows_affordance_above_midpoint() {
        let mut controller = SelectionCaptureController::new(OVERLAY);
        let effects = controller.handle(CaptureEvent::SelectionChanged(selected("Introduction")));

        let anchor = AffordanceAnchor {
            x: 200.0 - 100.0 + 60.0,
            y: 300.0 - 50.0 - 40.0,
        };
        assert_eq!(effects, vec![CaptureEffect::ShowAffordance(anchor)]);
        assert_eq!(controller.affordance(), Some(anchor));
    }

    #[test]
    fn short_or_collapsed_selections_never_show() {
        let mut controller = SelectionCaptureController::new(OVERLAY);
        assert!(controller
            .handle(CaptureEvent::SelectionChanged(selected("  ab  ")))
            .is_empty());
        assert!(controller
            .handle(CaptureEvent::SelectionChanged(SelectionSnapshot {
                collapsed: true,
                ..selected("Introduction")
            }))
            .is_empty());
        assert_eq!(controller.affordance(), None);
    }

    #[test]
    fn repeated_changes_reposition_idempotently() {
        let mut controller = shown();
        assert!(controller
            .handle(CaptureEvent::SelectionChanged(selected("Introduction")))
            .is_empty());

        let mut wider = selected("Introduction to");
        wider.rect = Some(ScreenRect::new(200.0, 300.0, 160.0, 14.0));
        let effects = controller.handle(CaptureEvent::SelectionChanged(wider));
        assert_eq!(effects.len(), 1);
        assert!(matches!(effects[0], CaptureEffect::ShowAffordance(a) if a.x == 180.0));
    }

    #[test]
    fn shrinking_below_minimum_hides() {
        let mut controller = shown();
        let effects = controller.handle(CaptureEvent::SelectionChanged(selected("In")));
        assert_eq!(effects, vec![CaptureEffect::HideAffordance]);
        assert_eq!(controller.state(), CaptureState::Idle);
    }

    #[test]
    fn momentary_collapse_keeps_affordance() {
        let mut controller = shown();
        assert!(controller
            .handle(CaptureEvent::SelectionChanged(SelectionSnapshot::collapsed()))
            .is_empty());
        assert!(controller.affordance().is_some());
    }

    #[test]
    fn outside_click_hides_and_clears_without_capture() {
        let mut controller = shown();
        let effects = controller.handle(CaptureEvent::PointerDown(PointerTarget::Outside));
        assert_eq!(
            effects,
            vec![CaptureEffect::HideAffordance, CaptureEffect::ClearHostSelection]
        );
        assert!(controller.handle(CaptureEvent::Confirm { page: 1 }).is_empty());
    }

    #[test]
    fn pointer_on_affordance_guards_hide() {
        let mut controller = shown();
        controller.handle(CaptureEvent::PointerDown(PointerTarget::Affordance));

        // the click itself tends to disturb the host selection
        assert!(controller
            .handle(CaptureEvent::SelectionChanged(selected("")))
            .is_empty());
        assert!(controller.affordance().is_some());

        let effects = controller.handle(CaptureEvent::Confirm { page: 7 });
        assert_eq!(
            effects,
            vec![
                CaptureEffect::Captured {
                    text: "Introduction".to_string(),
                    page: 7
                },
                CaptureEffect::ClearHostSelection,
                CaptureEffect::HideAffordance,
            ]
        );
        controller.handle(CaptureEvent::PointerUp);
        assert_eq!(controller.state(), CaptureState::Idle);
    }

    #[test]
    fn confirm_captures_trimmed_text_once() {
        let mut controller = SelectionCaptureController::new(OVERLAY);
        controller.handle(CaptureEvent::SelectionChanged(selected("  Introduction \n")));

        let effects = controller.handle(CaptureEvent::Confirm { page: 2 });
        assert!(matches!(
            &effects[0],
            CaptureEffect::Captured { text, page: 2 } if text == "Introduction"
        ));
        assert!(controller.handle(CaptureEvent::Confirm { page: 2 }).is_empty());
    }

    #[test]
    fn selection_without_rect_waits_pending() {
        let mut controller = SelectionCaptureController::new(OVERLAY);
        let mut snapshot = selected("Introduction");
        snapshot.rect = None;
        assert!(controller
            .handle(CaptureEvent::SelectionChanged(snapshot))
            .is_empty());
        assert_eq!(controller.state(), CaptureState::SelectionPending);
        assert!(controller.handle(CaptureEvent::Confirm { page: 1 }).is_empty());
    }

    #[test]
    fn overlay_replacement_dismisses() {
        let mut controller = shown();
        let effects = controller.handle(CaptureEvent::OverlayReplaced);
        assert!(effects.contains(&CaptureEffect::HideAffordance));
        assert_eq!(controller.affordance(), None);
    }
}
