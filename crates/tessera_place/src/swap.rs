//! Reversible swap transactions on the placement surface.
//!
//! A [`Swap`] moves `block1` from its slot into a target slot. If the target
//! slot holds `block2`, that block moves the other way into `block1`'s old
//! slot; otherwise the swap is a plain move into a free slot.

use crate::error::SwapError;
use crate::ids::{BlockId, SiteId};
use crate::surface::{PlacementSurface, SlotRef};
use rand::Rng;
use std::fmt;

/// A candidate reassignment of one or two blocks.
///
/// Swaps are cheap values that own no surface state; they are built, evaluated
/// by the cost model, possibly applied, and dropped within one move.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Swap {
    block1: BlockId,
    from: SlotRef,
    to: SlotRef,
    block2: Option<BlockId>,
}

impl Swap {
    /// Builds a swap of `block1` into a random slot of `to_site`.
    ///
    /// The slot is drawn uniformly from the site's capacity, so a partially
    /// filled multi-slot site yields a move or an exchange in proportion to
    /// its occupancy. The returned swap is not validated; [`apply`](Self::apply)
    /// checks it.
    pub fn propose<R: Rng + ?Sized>(
        surface: &PlacementSurface,
        block1: BlockId,
        to_site: SiteId,
        rng: &mut R,
    ) -> Result<Self, SwapError> {
        let from = surface
            .slot_of(block1)
            .ok_or(SwapError::UnplacedBlock(block1))?;
        let target = surface.site(to_site);
        let slot = rng.gen_range(0..target.capacity());
        Ok(Self {
            block1,
            from,
            to: SlotRef {
                site: to_site,
                slot,
            },
            block2: target.slot(slot),
        })
    }

    /// Builds a swap of the occupant of `from` into `to`.
    pub fn between(surface: &PlacementSurface, from: SlotRef, to: SlotRef) -> Result<Self, SwapError> {
        let block1 = surface
            .site(from.site)
            .slot(from.slot)
            .ok_or(SwapError::EmptySlot {
                site: from.site,
                slot: from.slot,
            })?;
        Ok(Self {
            block1,
            from,
            to,
            block2: surface.site(to.site).slot(to.slot),
        })
    }

    /// Returns the block that moves into the target slot.
    pub fn block1(&self) -> BlockId {
        self.block1
    }

    /// Returns the block that moves back into `block1`'s slot, if any.
    pub fn block2(&self) -> Option<BlockId> {
        self.block2
    }

    /// Returns `block1`'s original slot.
    pub fn from(&self) -> SlotRef {
        self.from
    }

    /// Returns the target slot.
    pub fn to(&self) -> SlotRef {
        self.to
    }

    /// Returns `true` if two blocks trade places.
    pub fn is_exchange(&self) -> bool {
        self.block2.is_some()
    }

    /// Returns the site `block` occupies once this swap is applied, or `None`
    /// if the swap does not move it.
    pub fn destination(&self, block: BlockId) -> Option<SiteId> {
        if block == self.block1 {
            Some(self.to.site)
        } else if Some(block) == self.block2 {
            Some(self.from.site)
        } else {
            None
        }
    }

    /// Returns the inverse swap.
    pub fn inverse(&self) -> Self {
        Self {
            block1: self.block1,
            from: self.to,
            to: self.from,
            block2: self.block2,
        }
    }

    /// Performs the reassignment.
    ///
    /// Every precondition is checked before the first write, so on error the
    /// surface is unchanged.
    pub fn apply(&self, surface: &mut PlacementSurface) -> Result<(), SwapError> {
        self.validate(surface)?;
        surface.set_slot(self.to, Some(self.block1));
        surface.set_slot(self.from, self.block2);
        surface.set_block_site(self.block1, Some(self.to.site));
        if let Some(block2) = self.block2 {
            surface.set_block_site(block2, Some(self.from.site));
        }
        Ok(())
    }

    /// Undoes a previously applied swap, restoring the exact slots.
    pub fn revert(&self, surface: &mut PlacementSurface) -> Result<(), SwapError> {
        self.inverse().apply(surface)
    }

    fn validate(&self, surface: &PlacementSurface) -> Result<(), SwapError> {
        let block1 = surface.block(self.block1);
        if self.from.site == self.to.site {
            return Err(SwapError::SameSite {
                block: self.block1,
                site: self.from.site,
            });
        }
        if block1.is_fixed() {
            return Err(SwapError::FixedBlock(self.block1));
        }
        if block1.site().is_none() {
            return Err(SwapError::UnplacedBlock(self.block1));
        }
        let from_site = surface.site(self.from.site);
        if block1.site() != Some(self.from.site) || from_site.slot(self.from.slot) != Some(self.block1) {
            return Err(SwapError::NotAnOccupant {
                block: self.block1,
                site: self.from.site,
            });
        }

        let to_site = surface.site(self.to.site);
        if self.to.slot >= to_site.capacity() {
            return Err(SwapError::InvalidSlot {
                site: self.to.site,
                slot: self.to.slot,
            });
        }
        if to_site.block_type() != block1.block_type() {
            return Err(SwapError::IncompatibleSite {
                block: self.block1,
                site: self.to.site,
            });
        }

        match self.block2 {
            None => {
                if to_site.slot(self.to.slot).is_some() {
                    return Err(SwapError::FullSite {
                        site: self.to.site,
                        slot: self.to.slot,
                    });
                }
            }
            Some(block2) => {
                let b2 = surface.block(block2);
                if b2.is_fixed() {
                    return Err(SwapError::FixedBlock(block2));
                }
                if b2.site() != Some(self.to.site) || to_site.slot(self.to.slot) != Some(block2) {
                    return Err(SwapError::NotAnOccupant {
                        block: block2,
                        site: self.to.site,
                    });
                }
                if from_site.block_type() != b2.block_type() {
                    return Err(SwapError::IncompatibleSite {
                        block: block2,
                        site: self.from.site,
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Display for Swap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.block2 {
            Some(block2) => write!(
                f,
                "block {} ({}) <-> block {} ({})",
                self.block1, self.from, block2, self.to
            ),
            None => write!(f, "block {} ({}) -> {}", self.block1, self.from, self.to),
        }
    }
}
