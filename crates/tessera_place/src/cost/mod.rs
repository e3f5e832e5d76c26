//! Placement cost models.
//!
//! The annealer is generic over [`CostModel`]. A model evaluates the cost of
//! the current placement and the change a candidate swap would cause, and
//! keeps whatever incremental caches it likes in step with the annealer's
//! apply/revert decisions:
//!
//! - [`begin_iteration_sampling`](CostModel::begin_iteration_sampling) opens
//!   each batch of moves (a temperature step or an estimation sample);
//! - every move calls [`delta_cost`](CostModel::delta_cost) exactly once,
//!   before the swap is applied, and then exactly one of
//!   [`push_through`](CostModel::push_through) (the swap was applied) or
//!   [`revert`](CostModel::revert) (it was not), passing the move's index
//!   within the batch.

mod bbox;

pub use bbox::BoundingBoxCost;

use crate::surface::PlacementSurface;
use crate::swap::Swap;

/// A pluggable placement cost function.
pub trait CostModel {
    /// Builds internal caches from the starting placement. Called once when
    /// the annealer initializes.
    fn initialize(&mut self, _surface: &PlacementSurface) {}

    /// Returns the total cost of the placement as it currently stands.
    fn current_cost(&self, surface: &PlacementSurface) -> f64;

    /// Returns the cost the placement would have with `swap` applied, minus
    /// the current cost. Must not assume the swap will be applied.
    fn delta_cost(&mut self, surface: &PlacementSurface, swap: &Swap) -> f64;

    /// Opens a batch of moves.
    fn begin_iteration_sampling(&mut self, _surface: &PlacementSurface) {}

    /// Commits the speculative state of move `iteration`; its swap has been
    /// applied.
    fn push_through(&mut self, iteration: usize);

    /// Discards the speculative state of move `iteration`.
    fn revert(&mut self, iteration: usize);

    /// Returns a short line describing the model's state, for step logs.
    fn statistics(&self, surface: &PlacementSurface) -> String {
        format!("cost = {:.6}", self.current_cost(surface))
    }
}

impl<C: CostModel + ?Sized> CostModel for Box<C> {
    fn initialize(&mut self, surface: &PlacementSurface) {
        (**self).initialize(surface);
    }

    fn current_cost(&self, surface: &PlacementSurface) -> f64 {
        (**self).current_cost(surface)
    }

    fn delta_cost(&mut self, surface: &PlacementSurface, swap: &Swap) -> f64 {
        (**self).delta_cost(surface, swap)
    }

    fn begin_iteration_sampling(&mut self, surface: &PlacementSurface) {
        (**self).begin_iteration_sampling(surface);
    }

    fn push_through(&mut self, iteration: usize) {
        (**self).push_through(iteration);
    }

    fn revert(&mut self, iteration: usize) {
        (**self).revert(iteration);
    }

    fn statistics(&self, surface: &PlacementSurface) -> String {
        (**self).statistics(surface)
    }
}
