//! Simulated annealing placement engine for the Tessera FPGA toolchain.
//!
//! This crate assigns the blocks of a netlist to the sites of a fixed 2-D
//! grid so as to minimize a pluggable [`CostModel`]. The search is a
//! Metropolis annealer whose temperature and spatial search radius adapt to
//! the fraction of accepted moves; every move is a reversible [`Swap`]
//! transaction that never leaves the surface in an illegal state.
//!
//! # Pipeline
//!
//! 1. **Describe**: build a [`PlacementSurface`] with [`SurfaceBuilder`] or
//!    from a serialized [`Design`]
//! 2. **Seed**: give every block a legal site with [`random_placement`]
//! 3. **Anneal**: refine with an [`Annealer`] driving a cost model such as
//!    [`BoundingBoxCost`]
//!
//! [`place`] runs steps 2 and 3 with the seeds from [`PlacerOptions`].
//!
//! # Usage
//!
//! ```ignore
//! use tessera_place::{place, Design};
//!
//! let (mut surface, mut cost) = design.build()?;
//! let report = place(&mut surface, &mut cost, &options)?;
//! assert!(report.final_cost <= report.initial_cost);
//! ```

#![warn(missing_docs)]

pub mod anneal;
pub mod cost;
pub mod design;
pub mod error;
pub mod estimate;
pub mod generator;
pub mod ids;
pub mod random;
pub mod schedule;
pub mod surface;
pub mod swap;

pub use anneal::{AnnealReport, AnnealState, Annealer, StepRecord};
pub use cost::{BoundingBoxCost, CostModel};
pub use design::{block_assignments, render_place_file, BlockAssignment, Design};
pub use error::{PlaceError, PlaceResult, SwapError};
pub use generator::SwapGenerator;
pub use ids::{BlockId, BlockTypeId, NetId, SiteId};
pub use random::random_placement;
pub use surface::{BlockCategory, PlacementSurface, SlotRef, SurfaceBuilder};
pub use swap::Swap;
pub use tessera_config::PlacerOptions;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

/// Places every unplaced block at random and anneals the result.
///
/// The initial placement draws from a generator seeded with
/// `options.initial_seed`; the annealer draws from one seeded with
/// `options.seed`.
pub fn place<C: CostModel + ?Sized>(
    surface: &mut PlacementSurface,
    cost: &mut C,
    options: &PlacerOptions,
) -> PlaceResult<AnnealReport> {
    let mut rng = ChaCha8Rng::seed_from_u64(options.initial_seed);
    random_placement(surface, &mut rng)?;
    Annealer::with_seed(surface, cost, options).run()
}
