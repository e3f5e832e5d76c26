//! Adaptive schedules for the range limit and the temperature.
//!
//! Both are driven by `alpha`, the fraction of moves accepted during the last
//! temperature step. The range limit grows while more than 44% of moves are
//! accepted and shrinks otherwise; the temperature cools fastest when almost
//! everything is accepted (the search is too hot to be useful) or almost
//! nothing is (it is frozen).

/// Acceptance ratio the range limit is steered toward.
pub const TARGET_ACCEPTANCE: f64 = 0.44;

/// Returns the factor the temperature is multiplied by after a step with
/// acceptance ratio `alpha`.
pub fn cooling_factor(alpha: f64) -> f64 {
    if alpha > 0.96 {
        0.5
    } else if alpha > 0.8 {
        0.9
    } else if alpha > 0.15 {
        0.95
    } else {
        0.8
    }
}

/// The range limit controller.
///
/// The limit is tracked as a real-valued accumulator so small adjustments
/// compound across steps; [`value`](Self::value) rounds it for the swap
/// generator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeLimit {
    rlimd: f64,
    max_rlim: u32,
}

impl RangeLimit {
    /// Creates a controller starting at `initial`, clamped to `[1, max_rlim]`.
    pub fn new(initial: u32, max_rlim: u32) -> Self {
        let max_rlim = max_rlim.max(1);
        Self {
            rlimd: f64::from(initial.clamp(1, max_rlim)),
            max_rlim,
        }
    }

    /// Adjusts the limit after a step with acceptance ratio `alpha`.
    pub fn update(&mut self, alpha: f64) {
        let next = self.rlimd * (1.0 - TARGET_ACCEPTANCE + alpha);
        self.rlimd = next.clamp(1.0, f64::from(self.max_rlim));
    }

    /// Returns the current limit, rounded to whole sites.
    pub fn value(&self) -> u32 {
        // The accumulator is clamped to [1, max_rlim], so the cast is exact.
        self.rlimd.round() as u32
    }

    /// Returns the unrounded accumulator.
    pub fn raw(&self) -> f64 {
        self.rlimd
    }

    /// Returns the upper clamp.
    pub fn max(&self) -> u32 {
        self.max_rlim
    }
}
