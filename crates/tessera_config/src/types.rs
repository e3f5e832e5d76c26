//! Configuration types deserialized from `tessera.toml`.

use serde::Deserialize;

/// The top-level configuration parsed from `tessera.toml`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TesseraConfig {
    /// Options of the simulated-annealing placer.
    #[serde(default)]
    pub placer: PlacerOptions,
}

/// Options controlling a simulated-annealing placement run.
///
/// Constructed once (from a file or in code) and passed by reference into
/// the annealer; nothing mutates it during a run.
///
/// ```toml
/// [placer]
/// effort_level = 2.0
/// detailed = true
/// rlim = 8
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlacerOptions {
    /// Scales the number of moves attempted per temperature.
    pub effort_level: f64,
    /// Scales the estimated initial temperature.
    pub t_multiplier: f64,
    /// Use the equilibrium-dynamics initial temperature estimator instead
    /// of the global standard-deviation estimate.
    pub detailed: bool,
    /// Skip annealing and run a single accept-if-improving pass.
    pub greedy: bool,
    /// Initial range limit. Defaults to `max(width, height)` of the grid.
    pub rlim: Option<u32>,
    /// Upper clamp of the range limit. Defaults to `max(width, height)`.
    pub max_rlim: Option<u32>,
    /// Treat every I/O block as immovable.
    pub fix_pins: bool,
    /// Seed of the annealer's random generator.
    pub seed: u64,
    /// Seed of the random initial placement.
    pub initial_seed: u64,
    /// Number of candidate swaps the swap generator may reject before the
    /// run is aborted.
    pub max_swap_retries: usize,
    /// Tuning knobs of the detailed initial temperature search.
    pub detailed_search: DetailedSearch,
}

impl Default for PlacerOptions {
    fn default() -> Self {
        Self {
            effort_level: 1.0,
            t_multiplier: 1.0,
            detailed: false,
            greedy: false,
            rlim: None,
            max_rlim: None,
            fix_pins: true,
            seed: 10,
            initial_seed: 100,
            max_swap_retries: 10_000,
            detailed_search: DetailedSearch::default(),
        }
    }
}

impl PlacerOptions {
    /// Resolves `(rlim, max_rlim)` for a grid of the given size.
    ///
    /// Both default to `max(width, height)` when unset.
    pub fn range_limits(&self, width: u32, height: u32) -> (u32, u32) {
        let size = width.max(height);
        (self.rlim.unwrap_or(size), self.max_rlim.unwrap_or(size))
    }
}

/// Constants of the bracketing search used by the detailed initial
/// temperature estimator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetailedSearch {
    /// The search starts at `max_delta / coarse_divisor`.
    pub coarse_divisor: f64,
    /// The search stops once `max_t / min_t` drops to this ratio.
    pub tolerance: f64,
    /// Maximum number of search steps before the estimate is declared failed.
    pub max_steps: usize,
}

impl Default for DetailedSearch {
    fn default() -> Self {
        Self {
            coarse_divisor: 1000.0,
            tolerance: 1.1,
            max_steps: 1000,
        }
    }
}
