//! Session state management
//!
//! Pure state machine behind [`super::DocumentSession`]: commands go in,
//! effects come out, and the session executes the effects against its render
//! worker. At most one render is in flight at any time.

use serde::{Deserialize, Serialize};

use super::request::RenderTag;
use super::zoom::Zoom;

/// What page navigation does while a render is still in flight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyNavigation {
    /// Move the target now and render it once the in-flight render resolves
    #[default]
    Coalesce,
    /// Drop the navigation request
    Ignore,
}

/// Current navigation and render state for an open document
#[derive(Clone, Debug)]
pub struct SessionState {
    /// Current page (1-based)
    pub current_page: usize,

    /// Total page count
    pub page_count: usize,

    /// Zoom factor, always within [`Zoom::MIN_SCALE`, `Zoom::MAX_SCALE`]
    pub scale: f32,

    pub busy_navigation: BusyNavigation,

    /// Tag of the render currently being produced by the worker
    in_flight: Option<RenderTag>,
}

impl SessionState {
    #[must_use]
    pub fn new(page_count: usize, scale: f32, busy_navigation: BusyNavigation) -> Self {
        Self {
            current_page: 1,
            page_count,
            scale: Zoom::clamp_factor(scale),
            busy_navigation,
            in_flight: None,
        }
    }

    /// The (page, scale) pair the view should end up showing
    #[must_use]
    pub fn target(&self) -> RenderTag {
        RenderTag::new(self.current_page, self.scale)
    }

    #[must_use]
    pub fn in_flight(&self) -> Option<RenderTag> {
        self.in_flight
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::GoToPage(page) => {
                if page == 0 || page > self.page_count {
                    return vec![];
                }
                self.current_page = page;
                self.retarget()
            }

            Command::NextPage => {
                if self.current_page >= self.page_count || self.navigation_blocked() {
                    return vec![];
                }
                self.current_page += 1;
                self.retarget()
            }

            Command::PrevPage => {
                if self.current_page <= 1 || self.navigation_blocked() {
                    return vec![];
                }
                self.current_page -= 1;
                self.retarget()
            }

            Command::SetScale(scale) => {
                self.scale = Zoom::clamp_factor(scale);
                self.retarget()
            }

            Command::RenderFinished { tag, ok } => {
                if self.in_flight != Some(tag) {
                    // Not ours: the worker answered something we no longer track
                    return vec![Effect::DiscardStale(tag)];
                }
                self.in_flight = None;

                if tag != self.target() {
                    let mut effects = vec![Effect::DiscardStale(tag)];
                    effects.extend(self.retarget());
                    effects
                } else if ok {
                    vec![Effect::Apply(tag)]
                } else {
                    vec![Effect::ReportFailure(tag)]
                }
            }
        }
    }

    fn navigation_blocked(&self) -> bool {
        self.is_loading() && self.busy_navigation == BusyNavigation::Ignore
    }

    /// Issue a render for the current target unless one is already running;
    /// a running render is re-checked against the target when it finishes.
    fn retarget(&mut self) -> Vec<Effect> {
        if self.in_flight.is_some() {
            return vec![];
        }
        let tag = self.target();
        self.in_flight = Some(tag);
        vec![Effect::RequestRender(tag)]
    }
}

/// Commands that modify session state
#[derive(Clone, Debug)]
pub enum Command {
    /// Show a specific page (1-based); out-of-range pages are ignored
    GoToPage(usize),
    NextPage,
    PrevPage,
    /// Set the zoom factor and re-render the current page
    SetScale(f32),
    /// The worker resolved the render tagged `tag`
    RenderFinished { tag: RenderTag, ok: bool },
}

/// Effects produced by state changes
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Ask the worker to render this tag
    RequestRender(RenderTag),
    /// Install the finished render as the visible page
    Apply(RenderTag),
    /// Drop a finished render that is no longer current
    DiscardStale(RenderTag),
    /// The current render failed; keep the previous page on screen
    ReportFailure(RenderTag),
}
