//! The simulated annealing controller.
//!
//! Starting from a legal placement, the controller repeatedly asks the swap
//! generator for a candidate, asks the cost model for its delta, and accepts
//! or rejects it by the Metropolis criterion. After every temperature step
//! the acceptance ratio drives the range limit and the temperature; the run
//! stops once the temperature is small relative to the average cost per
//! movable block.
//!
//! In greedy mode there is no temperature: a single pass accepts every swap
//! that does not worsen the cost.

use crate::cost::CostModel;
use crate::error::{PlaceError, PlaceResult, SwapError};
use crate::estimate;
use crate::generator::SwapGenerator;
use crate::schedule::{cooling_factor, RangeLimit};
use crate::surface::PlacementSurface;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera_config::{validate_placer, PlacerOptions};
use tracing::{debug, info, warn};

/// The temperature is considered frozen below this fraction of the average
/// cost per movable block.
const CONVERGENCE_RATIO: f64 = 0.005;

/// Exponent of the movable block count in the moves-per-temperature rule.
const MOVES_EXPONENT: f64 = 4.0 / 3.0;

/// Lifecycle of an [`Annealer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnealState {
    /// Created, nothing checked yet.
    Uninitialized,
    /// Starting placement verified and caches built.
    Initialized,
    /// Running temperature steps.
    Annealing,
    /// The temperature dropped below the convergence threshold.
    Converged,
    /// The single greedy pass finished.
    GreedyDone,
    /// Stopped early by the cancel flag.
    Cancelled,
}

impl AnnealState {
    /// Returns a short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            AnnealState::Uninitialized => "uninitialized",
            AnnealState::Initialized => "initialized",
            AnnealState::Annealing => "annealing",
            AnnealState::Converged => "converged",
            AnnealState::GreedyDone => "greedy_done",
            AnnealState::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for the states a run ends in.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AnnealState::Converged | AnnealState::GreedyDone | AnnealState::Cancelled
        )
    }
}

impl fmt::Display for AnnealState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Summary of one temperature step, taken after the schedule update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepRecord {
    /// Index of the step.
    pub step: usize,
    /// Temperature after the update.
    pub temperature: f64,
    /// Range limit after the update.
    pub rlim: u32,
    /// Fraction of the step's moves that were accepted.
    pub alpha: f64,
    /// Cost at the end of the step.
    pub cost: f64,
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnnealReport {
    /// Terminal state of the run.
    pub state: AnnealState,
    /// Estimated starting temperature (0 in greedy mode).
    pub initial_temperature: f64,
    /// Temperature when the run stopped.
    pub final_temperature: f64,
    /// Cost of the starting placement.
    pub initial_cost: f64,
    /// Cost of the final placement.
    pub final_cost: f64,
    /// Number of temperature steps (1 in greedy mode).
    pub steps: usize,
    /// Moves attempted per temperature step.
    pub moves_per_temperature: usize,
    /// Moves attempted in total, excluding estimation samples.
    pub total_moves: usize,
    /// Moves applied in total.
    pub accepted_moves: usize,
    /// Per-step history.
    pub history: Vec<StepRecord>,
    /// Whether the cancel flag stopped the run.
    pub cancelled: bool,
}

/// Returns `effort * num_movable^(4/3)`, truncated, and at least 1.
pub fn moves_per_temperature(effort_level: f64, num_movable: usize) -> usize {
    let moves = effort_level * (num_movable as f64).powf(MOVES_EXPONENT);
    (moves as usize).max(1)
}

/// Simulated annealing over a borrowed surface and cost model.
///
/// ```
/// use tessera_config::PlacerOptions;
/// use tessera_place::anneal::{AnnealState, Annealer};
/// use tessera_place::cost::BoundingBoxCost;
/// use tessera_place::surface::{BlockCategory, SurfaceBuilder};
///
/// let mut builder = SurfaceBuilder::new(3, 1);
/// let clb = builder.block_type("clb", BlockCategory::Clb);
/// let sites: Vec<_> = (0..3).map(|x| builder.site(x, 0, clb, 1)).collect();
/// let a = builder.block("a", clb);
/// let b = builder.block("b", clb);
/// let mut surface = builder.build().unwrap();
/// surface.place_block(a, sites[0]).unwrap();
/// surface.place_block(b, sites[2]).unwrap();
///
/// let mut cost = BoundingBoxCost::new(2);
/// cost.add_net(&[a, b], 1.0).unwrap();
///
/// let options = PlacerOptions { greedy: true, ..PlacerOptions::default() };
/// let report = Annealer::with_seed(&mut surface, &mut cost, &options)
///     .run()
///     .unwrap();
/// assert_eq!(report.state, AnnealState::GreedyDone);
/// assert!(report.final_cost <= report.initial_cost);
/// ```
pub struct Annealer<'a, C: CostModel + ?Sized, R: Rng = ChaCha8Rng> {
    surface: &'a mut PlacementSurface,
    cost: &'a mut C,
    options: &'a PlacerOptions,
    rng: R,
    generator: SwapGenerator,
    cancel: Option<Arc<AtomicBool>>,
    state: AnnealState,
    temperature: f64,
    rlim: RangeLimit,
    moves_per_temperature: usize,
    initial_temperature: f64,
    initial_cost: f64,
    total_moves: usize,
    accepted_moves: usize,
    history: Vec<StepRecord>,
}

impl<'a, C: CostModel + ?Sized> Annealer<'a, C, ChaCha8Rng> {
    /// Creates an annealer whose generator is seeded from `options.seed`.
    pub fn with_seed(
        surface: &'a mut PlacementSurface,
        cost: &'a mut C,
        options: &'a PlacerOptions,
    ) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(options.seed);
        Self::new(surface, cost, options, rng)
    }
}

impl<'a, C: CostModel + ?Sized, R: Rng> Annealer<'a, C, R> {
    /// Creates an annealer drawing from `rng`.
    pub fn new(
        surface: &'a mut PlacementSurface,
        cost: &'a mut C,
        options: &'a PlacerOptions,
        rng: R,
    ) -> Self {
        Self {
            surface,
            cost,
            options,
            rng,
            generator: SwapGenerator::new(options.max_swap_retries),
            cancel: None,
            state: AnnealState::Uninitialized,
            temperature: 0.0,
            rlim: RangeLimit::new(1, 1),
            moves_per_temperature: 1,
            initial_temperature: 0.0,
            initial_cost: 0.0,
            total_moves: 0,
            accepted_moves: 0,
            history: Vec::new(),
        }
    }

    /// Installs a flag that stops the run between temperature steps.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Returns the current state.
    pub fn state(&self) -> AnnealState {
        self.state
    }

    /// Returns the current temperature.
    pub fn temperature(&self) -> f64 {
        self.temperature
    }

    /// Returns the current range limit.
    pub fn rlim(&self) -> u32 {
        self.rlim.value()
    }

    /// Returns the number of moves per temperature step.
    pub fn moves_per_temperature(&self) -> usize {
        self.moves_per_temperature
    }

    /// Returns the steps completed so far.
    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    /// Verifies the starting placement and prepares the run.
    ///
    /// Every block must be placed and the surface invariants must hold. The
    /// fixed-block policy is applied here, so blocks fixed by `fix_pins`
    /// keep their starting sites for the whole run.
    pub fn initialize(&mut self) -> PlaceResult<()> {
        self.expect_state(AnnealState::Uninitialized)?;
        validate_placer(self.options)?;

        if let Some(block) = self.surface.blocks().iter().find(|b| b.site().is_none()) {
            return Err(SwapError::UnplacedBlock(block.id()).into());
        }
        self.surface.check_invariants()?;
        self.surface.apply_fixed_policy(self.options.fix_pins);
        let num_movable = self.surface.num_movable();
        if num_movable == 0 {
            return Err(PlaceError::NoMovableBlocks);
        }

        self.cost.initialize(self.surface);
        let (rlim, max_rlim) = self
            .options
            .range_limits(self.surface.width(), self.surface.height());
        self.rlim = RangeLimit::new(rlim, max_rlim);
        self.moves_per_temperature = moves_per_temperature(self.options.effort_level, num_movable);
        self.initial_cost = self.cost.current_cost(self.surface);
        self.state = AnnealState::Initialized;

        info!(
            effort_level = self.options.effort_level,
            moves_per_temperature = self.moves_per_temperature,
            movable_blocks = num_movable,
            rlim = self.rlim.value(),
            cost = self.initial_cost,
            "annealer initialized"
        );
        Ok(())
    }

    /// Runs to completion, initializing first if needed.
    pub fn run(&mut self) -> PlaceResult<AnnealReport> {
        if self.state == AnnealState::Uninitialized {
            self.initialize()?;
        }
        self.expect_state(AnnealState::Initialized)?;

        if self.options.greedy {
            self.run_greedy()?;
        } else {
            self.run_annealing()?;
        }

        let final_cost = self.cost.current_cost(self.surface);
        info!(
            state = %self.state,
            temperature = self.temperature,
            cost = final_cost,
            steps = self.history.len(),
            "placement finished"
        );
        Ok(AnnealReport {
            state: self.state,
            initial_temperature: self.initial_temperature,
            final_temperature: self.temperature,
            initial_cost: self.initial_cost,
            final_cost,
            steps: self.history.len(),
            moves_per_temperature: self.moves_per_temperature,
            total_moves: self.total_moves,
            accepted_moves: self.accepted_moves,
            history: self.history.clone(),
            cancelled: self.state == AnnealState::Cancelled,
        })
    }

    fn run_greedy(&mut self) -> PlaceResult<()> {
        let accepted = self.swap_iteration(0)?;
        let alpha = accepted as f64 / self.moves_per_temperature as f64;
        self.record_step(0, alpha);
        self.state = AnnealState::GreedyDone;
        Ok(())
    }

    fn run_annealing(&mut self) -> PlaceResult<()> {
        let temperature = self.initial_temperature()?;
        if !temperature.is_finite() {
            return Err(PlaceError::NonFiniteTemperature { temperature });
        }
        self.temperature = temperature;
        self.initial_temperature = self.temperature;
        self.state = AnnealState::Annealing;
        info!(temperature = self.temperature, "initial temperature");

        let num_movable = self.surface.num_movable() as f64;
        let mut step = 0;
        while self.temperature > CONVERGENCE_RATIO * self.cost.current_cost(self.surface) / num_movable {
            if self.is_cancelled() {
                warn!(step, temperature = self.temperature, "annealing cancelled");
                self.state = AnnealState::Cancelled;
                return Ok(());
            }

            let accepted = self.swap_iteration(step)?;
            let alpha = accepted as f64 / self.moves_per_temperature as f64;
            self.rlim.update(alpha);
            self.temperature *= cooling_factor(alpha);
            self.record_step(step, alpha);
            step += 1;
        }
        self.state = AnnealState::Converged;
        Ok(())
    }

    /// Samples swaps from the starting placement and estimates a starting
    /// temperature from their deltas.
    fn initial_temperature(&mut self) -> PlaceResult<f64> {
        let num_movable = self.surface.num_movable();
        let multiplier = self.options.t_multiplier;
        if self.options.detailed {
            let deltas = self.sample_deltas(estimate::detailed_sample_count(num_movable))?;
            estimate::detailed_temperature(deltas, multiplier, &self.options.detailed_search)
        } else {
            let deltas = self.sample_deltas(estimate::global_sample_count(num_movable))?;
            Ok(estimate::global_temperature(&deltas, multiplier))
        }
    }

    /// Evaluates `count` candidate swaps without applying any of them.
    fn sample_deltas(&mut self, count: usize) -> PlaceResult<Vec<f64>> {
        self.cost.begin_iteration_sampling(self.surface);
        let mut deltas = Vec::with_capacity(count);
        for i in 0..count {
            let swap = self
                .generator
                .find_swap(self.surface, self.rlim.value(), &mut self.rng)?;
            deltas.push(self.cost.delta_cost(self.surface, &swap));
            self.cost.revert(i);
        }
        Ok(deltas)
    }

    /// Runs one batch of `moves_per_temperature` moves and returns how many
    /// were applied.
    fn swap_iteration(&mut self, step: usize) -> PlaceResult<usize> {
        self.cost.begin_iteration_sampling(self.surface);
        let rlim = self.rlim.value();
        let mut accepted = 0;
        for i in 0..self.moves_per_temperature {
            let swap = self.generator.find_swap(self.surface, rlim, &mut self.rng)?;
            let delta = self.cost.delta_cost(self.surface, &swap);
            self.total_moves += 1;

            if self.accepts(delta) {
                if let Err(source) = swap.apply(self.surface) {
                    return Err(PlaceError::Consistency {
                        step,
                        move_index: i,
                        swap: swap.to_string(),
                        temperature: self.temperature,
                        rlim,
                        source,
                    });
                }
                accepted += 1;
                self.cost.push_through(i);
            } else {
                self.cost.revert(i);
            }
        }
        self.accepted_moves += accepted;
        Ok(accepted)
    }

    /// Metropolis criterion. The generator is only drawn from for worsening
    /// moves outside greedy mode.
    fn accepts(&mut self, delta: f64) -> bool {
        if delta <= 0.0 {
            return true;
        }
        if self.options.greedy {
            return false;
        }
        self.rng.gen::<f64>() < (-delta / self.temperature).exp()
    }

    fn record_step(&mut self, step: usize, alpha: f64) {
        debug!(
            step,
            temperature = self.temperature,
            rlim = self.rlim.value(),
            alpha,
            stats = %self.cost.statistics(self.surface),
            "temperature step"
        );
        self.history.push(StepRecord {
            step,
            temperature: self.temperature,
            rlim: self.rlim.value(),
            alpha,
            cost: self.cost.current_cost(self.surface),
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn expect_state(&self, expected: AnnealState) -> PlaceResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PlaceError::InvalidState {
                expected: expected.name(),
                actual: self.state.name(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::BoundingBoxCost;
    use crate::ids::{BlockId, SiteId};
    use crate::surface::{BlockCategory, SurfaceBuilder};
    use crate::swap::Swap;

    /// 4x4 CLB grid with `n` blocks chained by two-terminal nets, placed
    /// row-major.
    fn chain(n: usize) -> (PlacementSurface, BoundingBoxCost) {
        let mut b = SurfaceBuilder::new(4, 4);
        let clb = b.block_type("clb", BlockCategory::Clb);
        for y in 0..4 {
            for x in 0..4 {
                b.site(x, y, clb, 1);
            }
        }
        let blocks: Vec<BlockId> = (0..n).map(|i| b.block(format!("b{i}"), clb)).collect();
        let mut s = b.build().unwrap();
        // Scatter the chain so annealing has something to improve.
        for (i, &block) in blocks.iter().enumerate() {
            let site = SiteId::from_raw(((i * 7) % 16) as u32);
            s.place_block(block, site).unwrap();
        }
        let mut cost = BoundingBoxCost::new(n);
        for pair in blocks.windows(2) {
            cost.add_net(pair, 1.0).unwrap();
        }
        (s, cost)
    }

    #[test]
    fn moves_per_temperature_rule() {
        assert_eq!(moves_per_temperature(1.0, 4), 6);
        assert_eq!(moves_per_temperature(1.0, 10), 21);
        assert_eq!(moves_per_temperature(0.5, 10), 10);
        assert_eq!(moves_per_temperature(0.001, 1), 1);
    }

    #[test]
    fn initialize_transitions_state() {
        let (mut s, mut cost) = chain(6);
        let options = PlacerOptions::default();
        let mut annealer = Annealer::with_seed(&mut s, &mut cost, &options);
        assert_eq!(annealer.state(), AnnealState::Uninitialized);
        annealer.initialize().unwrap();
        assert_eq!(annealer.state(), AnnealState::Initialized);
        assert_eq!(annealer.rlim(), 4);
        assert_eq!(annealer.moves_per_temperature(), 10);

        let err = annealer.initialize().unwrap_err();
        assert!(matches!(err, PlaceError::InvalidState { .. }));
    }

    #[test]
    fn annealing_converges_and_improves() {
        let (mut s, mut cost) = chain(8);
        let options = PlacerOptions::default();
        let report = Annealer::with_seed(&mut s, &mut cost, &options).run().unwrap();
        assert_eq!(report.state, AnnealState::Converged);
        assert!(!report.cancelled);
        assert!(report.steps > 0);
        assert_eq!(report.history.len(), report.steps);
        assert_eq!(report.total_moves, report.steps * report.moves_per_temperature);
        assert!(report.final_cost <= report.initial_cost);
        assert!(report.initial_temperature > 0.0);
        assert!(s.check_invariants().is_ok());
    }

    #[test]
    fn run_twice_is_rejected() {
        let (mut s, mut cost) = chain(4);
        let options = PlacerOptions {
            greedy: true,
            ..PlacerOptions::default()
        };
        let mut annealer = Annealer::with_seed(&mut s, &mut cost, &options);
        annealer.run().unwrap();
        assert_eq!(annealer.state(), AnnealState::GreedyDone);
        assert!(matches!(
            annealer.run().unwrap_err(),
            PlaceError::InvalidState { .. }
        ));
    }

    #[test]
    fn unplaced_block_fails_initialize() {
        let mut b = SurfaceBuilder::new(2, 1);
        let clb = b.block_type("clb", BlockCategory::Clb);
        b.site(0, 0, clb, 1);
        b.site(1, 0, clb, 1);
        let lut = b.block("lut", clb);
        let mut s = b.build().unwrap();
        let mut cost = BoundingBoxCost::new(1);
        let options = PlacerOptions::default();
        let err = Annealer::with_seed(&mut s, &mut cost, &options)
            .run()
            .unwrap_err();
        assert!(matches!(err, PlaceError::Swap(SwapError::UnplacedBlock(id)) if id == lut));
    }

    #[test]
    fn all_fixed_fails_initialize() {
        let mut b = SurfaceBuilder::new(2, 1);
        let io = b.block_type("io", BlockCategory::Io);
        b.site(0, 0, io, 1);
        b.site(1, 0, io, 1);
        let pad = b.block("pad", io);
        let mut s = b.build().unwrap();
        s.place_block(pad, SiteId::from_raw(0)).unwrap();
        let mut cost = BoundingBoxCost::new(1);
        let options = PlacerOptions::default();
        let err = Annealer::with_seed(&mut s, &mut cost, &options)
            .initialize()
            .unwrap_err();
        assert!(matches!(err, PlaceError::NoMovableBlocks));
    }

    #[test]
    fn invalid_options_fail_initialize() {
        let (mut s, mut cost) = chain(4);
        let options = PlacerOptions {
            effort_level: 0.0,
            ..PlacerOptions::default()
        };
        let err = Annealer::with_seed(&mut s, &mut cost, &options)
            .initialize()
            .unwrap_err();
        assert!(matches!(err, PlaceError::Config(_)));
    }

    #[test]
    fn cancel_before_first_step() {
        let (mut s, mut cost) = chain(8);
        let before: Vec<_> = s.blocks().iter().map(|b| b.site()).collect();
        let options = PlacerOptions::default();
        let flag = Arc::new(AtomicBool::new(true));
        let report = Annealer::with_seed(&mut s, &mut cost, &options)
            .with_cancel_flag(flag)
            .run()
            .unwrap();
        assert_eq!(report.state, AnnealState::Cancelled);
        assert!(report.cancelled);
        assert_eq!(report.steps, 0);
        assert_eq!(report.final_cost, report.initial_cost);
        let after: Vec<_> = s.blocks().iter().map(|b| b.site()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn greedy_never_worsens() {
        let (mut s, mut cost) = chain(10);
        let options = PlacerOptions {
            greedy: true,
            effort_level: 3.0,
            ..PlacerOptions::default()
        };
        let report = Annealer::with_seed(&mut s, &mut cost, &options).run().unwrap();
        assert_eq!(report.state, AnnealState::GreedyDone);
        assert_eq!(report.steps, 1);
        assert_eq!(report.initial_temperature, 0.0);
        assert!(report.final_cost <= report.initial_cost);
    }

    /// Deltas of alternating sign and unbounded spread.
    struct Exploding {
        calls: usize,
    }

    impl CostModel for Exploding {
        fn current_cost(&self, _surface: &PlacementSurface) -> f64 {
            1.0
        }

        fn delta_cost(&mut self, _surface: &PlacementSurface, _swap: &Swap) -> f64 {
            self.calls += 1;
            if self.calls % 2 == 0 {
                f64::MAX
            } else {
                -f64::MAX
            }
        }

        fn push_through(&mut self, _iteration: usize) {}

        fn revert(&mut self, _iteration: usize) {}
    }

    #[test]
    fn non_finite_initial_temperature_is_rejected() {
        let (mut s, _) = chain(4);
        let mut cost = Exploding { calls: 0 };
        let options = PlacerOptions::default();
        let mut annealer = Annealer::with_seed(&mut s, &mut cost, &options);
        let err = annealer.run().unwrap_err();
        assert!(matches!(
            err,
            PlaceError::NonFiniteTemperature { temperature } if temperature.is_infinite()
        ));
        assert!(annealer.history().is_empty());
    }

    #[test]
    fn state_names() {
        assert_eq!(AnnealState::GreedyDone.to_string(), "greedy_done");
        assert!(AnnealState::Cancelled.is_terminal());
        assert!(!AnnealState::Annealing.is_terminal());
    }
}
