//! Initial temperature estimation.
//!
//! Both estimators work on the delta costs of swaps sampled from the starting
//! placement; the annealer does the sampling (without applying any swap) and
//! hands the deltas to the functions here.
//!
//! The detailed estimator looks for the temperature at which the expected
//! cost increase of the worsening moves, weighted by their acceptance
//! probability, balances the mean cost decrease of the improving moves.

use crate::error::{PlaceError, PlaceResult};
use tessera_config::DetailedSearch;

/// Scale applied to the standard deviation by the global estimator.
const GLOBAL_STDDEV_SCALE: f64 = 5.0;

/// Minimum number of samples drawn by the detailed estimator.
const MIN_DETAILED_SAMPLES: usize = 500;

/// Number of swaps the global estimator samples.
pub fn global_sample_count(num_movable: usize) -> usize {
    num_movable
}

/// Number of swaps the detailed estimator samples.
pub fn detailed_sample_count(num_movable: usize) -> usize {
    (num_movable / 5).max(MIN_DETAILED_SAMPLES)
}

/// Population standard deviation of `deltas`.
pub fn population_stddev(deltas: &[f64]) -> f64 {
    if deltas.is_empty() {
        return 0.0;
    }
    let n = deltas.len() as f64;
    let sum: f64 = deltas.iter().sum();
    let sum_sq: f64 = deltas.iter().map(|d| d * d).sum();
    (sum_sq / n - (sum * sum) / (n * n)).abs().sqrt()
}

/// Global estimate: `multiplier * 5 * stddev(deltas)`.
pub fn global_temperature(deltas: &[f64], multiplier: f64) -> f64 {
    multiplier * GLOBAL_STDDEV_SCALE * population_stddev(deltas)
}

/// `|Σ d·exp(-d/T)| / total` over `positive`; at `T == 0` the plain sum.
fn eplus(positive: &[f64], total: usize, temperature: f64) -> f64 {
    let sum: f64 = if temperature == 0.0 {
        positive.iter().sum()
    } else {
        positive
            .iter()
            .map(|&d| d * (-d / temperature).exp())
            .sum()
    };
    (sum / total as f64).abs()
}

/// Detailed estimate by bracketing and bisection.
///
/// Sorts `deltas`, splits them at zero into improving (`d <= 0`) and
/// worsening moves, and searches for `T` with `Eplus(T) == Emin`. The search
/// starts from `max(deltas) / coarse_divisor`, widens the bracket by a factor
/// of 8 until both ends are known, then bisects until
/// `max_t / min_t <= tolerance`.
///
/// # Errors
///
/// Returns [`PlaceError::EstimatorFailed`] if no worsening move was sampled,
/// if the unweighted worsening mass does not exceed `Emin` (the balance
/// point would lie at infinity), if the bracket widens past the largest
/// finite temperature, or if the search does not settle within
/// `search.max_steps` steps.
pub fn detailed_temperature(
    mut deltas: Vec<f64>,
    multiplier: f64,
    search: &DetailedSearch,
) -> PlaceResult<f64> {
    deltas.sort_by(f64::total_cmp);
    let samples = deltas.len();
    let zero = deltas.partition_point(|&d| d <= 0.0);
    let (improving, worsening) = deltas.split_at(zero);

    let emin = if samples == 0 {
        0.0
    } else {
        (improving.iter().sum::<f64>() / samples as f64).abs()
    };
    let max_eplus = if samples == 0 {
        0.0
    } else {
        eplus(worsening, samples, 0.0)
    };
    let fail = |reason: &str| PlaceError::EstimatorFailed {
        reason: reason.to_string(),
        emin,
        max_eplus,
        samples,
    };

    let Some(&max_delta) = worsening.last() else {
        return Err(fail("no worsening move was sampled"));
    };
    if max_eplus <= emin {
        return Err(fail("worsening moves never outweigh improving ones"));
    }

    let mut min_t = 0.0_f64;
    let mut max_t = f64::MAX;
    let mut temperature = max_delta / search.coarse_divisor;
    let mut steps = 0;
    while min_t == 0.0 || max_t / min_t > search.tolerance {
        if steps == search.max_steps {
            return Err(fail("temperature search did not converge"));
        }
        steps += 1;

        if emin < eplus(worsening, samples, temperature) {
            max_t = max_t.min(temperature);
            temperature = if min_t == 0.0 {
                temperature / 8.0
            } else {
                (max_t + min_t) / 2.0
            };
        } else {
            min_t = min_t.max(temperature);
            temperature = if max_t == f64::MAX {
                temperature * 8.0
            } else {
                (max_t + min_t) / 2.0
            };
            if !temperature.is_finite() {
                return Err(fail("temperature search diverged"));
            }
        }
    }
    let temperature = temperature * multiplier;
    if !temperature.is_finite() {
        return Err(fail("scaled temperature is not finite"));
    }
    Ok(temperature)
}
