//! Zoom bounds for page rendering

/// Zoom state for a document session
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Zoom {
    /// Current zoom factor (1.0 = 100%)
    pub factor: f32,
}

impl Default for Zoom {
    fn default() -> Self {
        Self {
            factor: Self::DEFAULT_SCALE,
        }
    }
}

impl Zoom {
    /// Minimum allowed zoom factor
    pub const MIN_SCALE: f32 = 0.5;
    /// Maximum allowed zoom factor
    pub const MAX_SCALE: f32 = 3.0;
    /// Zoom factor for a freshly opened document
    pub const DEFAULT_SCALE: f32 = 1.3;
    /// Default step for keyboard zoom
    pub const DEFAULT_STEP: f32 = 0.1;

    #[must_use]
    pub fn new(factor: f32) -> Self {
        Self {
            factor: Self::clamp_factor(factor),
        }
    }

    /// Returns the current zoom factor
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Zoom in by `step`, staying within bounds
    pub fn step_in(&mut self, step: f32) {
        self.factor = Self::clamp_factor(self.factor + step.abs());
    }

    /// Zoom out by `step`, staying within bounds
    pub fn step_out(&mut self, step: f32) {
        self.factor = Self::clamp_factor(self.factor - step.abs());
    }

    /// Clamp factor to valid range, handling NaN/Inf
    pub fn clamp_factor(factor: f32) -> f32 {
        if !factor.is_finite() {
            Self::DEFAULT_SCALE
        } else {
            factor.clamp(Self::MIN_SCALE, Self::MAX_SCALE)
        }
    }
}
