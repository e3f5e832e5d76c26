//! Error types for placement.
//!
//! [`SwapError`] is what a single swap transaction reports when one of its
//! preconditions does not hold. [`PlaceError`] is the error of a whole run;
//! every variant is fatal, since an ordinary rejected move is not an error.

use crate::ids::{BlockId, SiteId};
use tessera_config::ConfigError;

/// The standard result type for placement operations.
pub type PlaceResult<T> = Result<T, PlaceError>;

/// A precondition of a swap (or of a direct block placement) did not hold.
///
/// The surface is left untouched whenever one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SwapError {
    /// The block has no site.
    #[error("block {0} is not placed")]
    UnplacedBlock(BlockId),

    /// The block already has a site.
    #[error("block {block} is already placed at site {site}")]
    PlacedBlock {
        /// The block being placed.
        block: BlockId,
        /// Its current site.
        site: SiteId,
    },

    /// The block is fixed and must not move.
    #[error("block {0} is fixed")]
    FixedBlock(BlockId),

    /// The block's type does not match the site's type.
    #[error("block {block} cannot occupy site {site}: incompatible type")]
    IncompatibleSite {
        /// The block.
        block: BlockId,
        /// The incompatible site.
        site: SiteId,
    },

    /// The target slot is taken by a block the swap does not account for.
    #[error("site {site} slot {slot} is already occupied")]
    FullSite {
        /// The site.
        site: SiteId,
        /// The occupied slot.
        slot: usize,
    },

    /// The slot index is beyond the site's capacity.
    #[error("site {site} has no slot {slot}")]
    InvalidSlot {
        /// The site.
        site: SiteId,
        /// The out-of-range slot.
        slot: usize,
    },

    /// The source slot of a swap holds no block.
    #[error("site {site} slot {slot} is empty")]
    EmptySlot {
        /// The site.
        site: SiteId,
        /// The empty slot.
        slot: usize,
    },

    /// A block's back-reference disagrees with the site's occupant list.
    #[error("block {block} is not an occupant of site {site}")]
    NotAnOccupant {
        /// The block.
        block: BlockId,
        /// The site that was expected to hold it.
        site: SiteId,
    },

    /// A block occupies more than one slot.
    #[error("block {0} occupies more than one slot")]
    DuplicateOccupant(BlockId),

    /// Source and target are the same site.
    #[error("swap of block {block} targets its own site {site}")]
    SameSite {
        /// The block.
        block: BlockId,
        /// Its site.
        site: SiteId,
    },
}

/// A fatal placement error.
#[derive(Debug, thiserror::Error)]
pub enum PlaceError {
    /// Applying an accepted swap failed: a collaborator broke an invariant.
    #[error(
        "internal consistency fault at step {step}, move {move_index}: {source} \
         (swap {swap}, temperature {temperature}, rlim {rlim})"
    )]
    Consistency {
        /// Index of the temperature step (0 in greedy mode).
        step: usize,
        /// Index of the move within the step.
        move_index: usize,
        /// Description of the failing swap.
        swap: String,
        /// Temperature at the time of the failure.
        temperature: f64,
        /// Range limit at the time of the failure.
        rlim: u32,
        /// The underlying transaction failure.
        #[source]
        source: SwapError,
    },

    /// The detailed initial temperature search found no usable temperature.
    #[error(
        "initial temperature estimate failed: {reason} \
         (emin {emin}, max eplus {max_eplus}, {samples} samples)"
    )]
    EstimatorFailed {
        /// What went wrong.
        reason: String,
        /// Mean magnitude of the improving sampled moves.
        emin: f64,
        /// Mean magnitude of the worsening sampled moves, unweighted.
        max_eplus: f64,
        /// Number of sampled moves.
        samples: usize,
    },

    /// An estimator produced a temperature the annealer cannot cool from.
    #[error("initial temperature {temperature} is not finite")]
    NonFiniteTemperature {
        /// The rejected estimate.
        temperature: f64,
    },

    /// The swap generator found no legal swap within its retry cap.
    #[error("no legal swap found after {attempts} attempts (rlim {rlim})")]
    RetriesExhausted {
        /// Number of rejected candidates.
        attempts: usize,
        /// Range limit in effect.
        rlim: u32,
    },

    /// There is nothing to move.
    #[error("placement has no movable blocks")]
    NoMovableBlocks,

    /// The initial placement ran out of free slots for a block type.
    #[error("not enough sites for type '{block_type}': {blocks} blocks, {slots} free slots")]
    InsufficientSites {
        /// Name of the block type.
        block_type: String,
        /// Number of blocks waiting for a slot.
        blocks: usize,
        /// Number of free slots of that type.
        slots: usize,
    },

    /// The surface description is malformed.
    #[error("invalid surface: {0}")]
    InvalidSurface(String),

    /// The annealer was driven out of order.
    #[error("annealer is {actual}, expected {expected}")]
    InvalidState {
        /// The state the operation requires.
        expected: &'static str,
        /// The state the annealer is in.
        actual: &'static str,
    },

    /// A swap or placement precondition failed outside of an annealing step.
    #[error(transparent)]
    Swap(#[from] SwapError),

    /// The options failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
