//! Random initial placement.
//!
//! Gives every unplaced block a random free slot of its type so the annealer
//! has a legal starting point. Blocks that already have a site (for example
//! pads pre-placed by the design) are left alone.

use crate::error::{PlaceError, PlaceResult};
use crate::ids::BlockTypeId;
use crate::surface::{PlacementSurface, SlotRef};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;

/// Places every unplaced block into a shuffled free slot of its type.
///
/// Types are handled in ID order and blocks in ID order within a type, so
/// the result depends only on the surface and the generator's state.
///
/// # Errors
///
/// Returns [`PlaceError::InsufficientSites`] if a type has more unplaced
/// blocks than free slots. Types processed before the failing one stay
/// placed.
pub fn random_placement<R: Rng + ?Sized>(
    surface: &mut PlacementSurface,
    rng: &mut R,
) -> PlaceResult<()> {
    for t in 0..surface.block_types().len() {
        let ty = BlockTypeId::from_raw(t as u32);

        let mut free: Vec<SlotRef> = surface
            .sites()
            .iter()
            .filter(|s| s.block_type() == ty)
            .flat_map(|s| {
                (0..s.capacity())
                    .filter(move |&slot| s.slot(slot).is_none())
                    .map(move |slot| SlotRef { site: s.id(), slot })
            })
            .collect();
        let unplaced: Vec<_> = surface
            .blocks()
            .iter()
            .filter(|b| b.block_type() == ty && b.site().is_none())
            .map(|b| b.id())
            .collect();
        if unplaced.is_empty() {
            continue;
        }
        if unplaced.len() > free.len() {
            return Err(PlaceError::InsufficientSites {
                block_type: surface.block_type(ty).name.clone(),
                blocks: unplaced.len(),
                slots: free.len(),
            });
        }

        free.shuffle(rng);
        for (&block, &at) in unplaced.iter().zip(&free) {
            surface.place_block_at(block, at)?;
        }
        debug!(
            block_type = %surface.block_type(ty).name,
            blocks = unplaced.len(),
            slots = free.len(),
            "random placement"
        );
    }
    Ok(())
}
