//! Candidate swap generation.
//!
//! A candidate is a random movable block paired with a random compatible site
//! within the current range limit. Candidates that cannot become a legal swap
//! are discarded and a fresh block is drawn; the number of discards is capped.

use crate::error::{PlaceError, PlaceResult};
use crate::surface::PlacementSurface;
use crate::swap::Swap;
use rand::Rng;

/// Default cap on rejected candidates per [`SwapGenerator::find_swap`] call.
pub const DEFAULT_MAX_RETRIES: usize = 10_000;

/// Samples candidate swaps from a placement surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapGenerator {
    max_retries: usize,
}

impl Default for SwapGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl SwapGenerator {
    /// Creates a generator that gives up after `max_retries` rejected
    /// candidates. A cap of zero is treated as one.
    pub fn new(max_retries: usize) -> Self {
        Self {
            max_retries: max_retries.max(1),
        }
    }

    /// Returns the retry cap.
    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Finds a legal candidate swap within `rlim` of its source block.
    ///
    /// A candidate is rejected when the sampled block has no compatible site
    /// in range, or when the sampled target slot holds a fixed block. Each
    /// rejection draws a fresh source block.
    pub fn find_swap<R: Rng + ?Sized>(
        &self,
        surface: &PlacementSurface,
        rlim: u32,
        rng: &mut R,
    ) -> PlaceResult<Swap> {
        for _ in 0..self.max_retries {
            let block1 = surface
                .random_movable_block(rng)
                .ok_or(PlaceError::NoMovableBlocks)?;
            let Some(site2) = surface.random_site_near(block1, rlim, rng) else {
                continue;
            };
            if surface.block(block1).site() == Some(site2) {
                continue;
            }
            let swap = Swap::propose(surface, block1, site2, rng)?;
            if let Some(block2) = swap.block2() {
                if surface.block(block2).is_fixed() {
                    continue;
                }
            }
            return Ok(swap);
        }
        Err(PlaceError::RetriesExhausted {
            attempts: self.max_retries,
            rlim,
        })
    }
}
