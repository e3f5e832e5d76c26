//! The placement surface: the grid of sites and the blocks placed on it.
//!
//! Sites are fixed once the surface is built; only their occupant slots and
//! the blocks' site back-references change during placement. Each site has
//! `capacity` slots, so a swap can address an exact `(site, slot)` pair and
//! the occupancy bound holds by construction.
//!
//! The two random-sampling primitives used by the swap generator live here:
//! [`PlacementSurface::random_movable_block`] and
//! [`PlacementSurface::random_site_near`]. The latter answers window queries
//! from a per-type compressed column index built once in
//! [`SurfaceBuilder::build`].

use crate::error::{PlaceError, PlaceResult, SwapError};
use crate::ids::{BlockId, BlockTypeId, SiteId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Broad category of a block type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockCategory {
    /// I/O pads; fixed when `fix_pins` is set.
    Io,
    /// Configurable logic blocks.
    Clb,
    /// Memories, multipliers, and other hard blocks.
    Hardblock,
}

impl fmt::Display for BlockCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockCategory::Io => write!(f, "io"),
            BlockCategory::Clb => write!(f, "clb"),
            BlockCategory::Hardblock => write!(f, "hardblock"),
        }
    }
}

/// A block type. Blocks and sites are compatible iff their types are equal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockType {
    /// Type name (e.g. `"clb"`, `"io"`, `"memory"`).
    pub name: String,
    /// Category of the type.
    pub category: BlockCategory,
}

/// Address of one occupant slot of a site.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SlotRef {
    /// The site.
    pub site: SiteId,
    /// Slot index, below the site's capacity.
    pub slot: usize,
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site, self.slot)
    }
}

/// A physical location on the grid that can hold up to `capacity` blocks.
#[derive(Debug, Clone)]
pub struct Site {
    id: SiteId,
    x: u32,
    y: u32,
    block_type: BlockTypeId,
    slots: Vec<Option<BlockId>>,
}

impl Site {
    /// Returns the site's ID.
    pub fn id(&self) -> SiteId {
        self.id
    }

    /// Returns the column.
    pub fn x(&self) -> u32 {
        self.x
    }

    /// Returns the row.
    pub fn y(&self) -> u32 {
        self.y
    }

    /// Returns the type of block this site accepts.
    pub fn block_type(&self) -> BlockTypeId {
        self.block_type
    }

    /// Returns the maximum number of simultaneous occupants.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the occupant of a slot, if any.
    pub fn slot(&self, slot: usize) -> Option<BlockId> {
        self.slots.get(slot).copied().flatten()
    }

    /// Returns the slot holding `block`, if it is an occupant.
    pub fn slot_of(&self, block: BlockId) -> Option<usize> {
        self.slots.iter().position(|&occ| occ == Some(block))
    }

    /// Iterates over the current occupants.
    pub fn occupants(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.slots.iter().filter_map(|&occ| occ)
    }

    /// Returns the number of current occupants.
    pub fn occupancy(&self) -> usize {
        self.slots.iter().filter(|occ| occ.is_some()).count()
    }

    /// Returns `true` if every slot is taken.
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }
}

/// A placeable unit of the netlist.
#[derive(Debug, Clone)]
pub struct Block {
    id: BlockId,
    name: String,
    block_type: BlockTypeId,
    fixed: bool,
    site: Option<SiteId>,
}

impl Block {
    /// Returns the block's ID.
    pub fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the block's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the block's type.
    pub fn block_type(&self) -> BlockTypeId {
        self.block_type
    }

    /// Returns `true` if the annealer must never move this block.
    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    /// Returns the block's current site, or `None` while unplaced.
    pub fn site(&self) -> Option<SiteId> {
        self.site
    }
}

/// Sites of one type in one column, sorted by row.
#[derive(Debug, Clone)]
struct TypeColumn {
    x: u32,
    rows: Vec<(u32, SiteId)>,
}

impl TypeColumn {
    fn rows_in(&self, y0: u32, y1: u32) -> &[(u32, SiteId)] {
        let lo = self.rows.partition_point(|&(y, _)| y < y0);
        let hi = self.rows.partition_point(|&(y, _)| y <= y1);
        &self.rows[lo..hi]
    }
}

/// Compressed column index of the sites of one block type, sorted by column.
#[derive(Debug, Clone, Default)]
struct TypeIndex {
    columns: Vec<TypeColumn>,
}

impl TypeIndex {
    fn columns_in(&self, x0: u32, x1: u32) -> &[TypeColumn] {
        let lo = self.columns.partition_point(|c| c.x < x0);
        let hi = self.columns.partition_point(|c| c.x <= x1);
        &self.columns[lo..hi]
    }
}

/// Square window of half-width `rlim` around a site.
#[derive(Debug, Clone, Copy)]
struct Window {
    x0: u32,
    x1: u32,
    y0: u32,
    y1: u32,
}

impl Window {
    fn around(x: u32, y: u32, rlim: u32) -> Self {
        Self {
            x0: x.saturating_sub(rlim),
            x1: x.saturating_add(rlim),
            y0: y.saturating_sub(rlim),
            y1: y.saturating_add(rlim),
        }
    }
}

/// The grid of sites together with the block registry.
#[derive(Debug, Clone)]
pub struct PlacementSurface {
    width: u32,
    height: u32,
    block_types: Vec<BlockType>,
    sites: Vec<Site>,
    blocks: Vec<Block>,
    site_at: HashMap<(u32, u32), SiteId>,
    type_index: Vec<TypeIndex>,
    movable: Vec<BlockId>,
}

impl PlacementSurface {
    /// Returns the grid width in columns.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the grid height in rows.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns all block types.
    pub fn block_types(&self) -> &[BlockType] {
        &self.block_types
    }

    /// Returns the block type with the given ID.
    pub fn block_type(&self, id: BlockTypeId) -> &BlockType {
        &self.block_types[id.index()]
    }

    /// Returns all sites.
    pub fn sites(&self) -> &[Site] {
        &self.sites
    }

    /// Returns the site with the given ID.
    pub fn site(&self, id: SiteId) -> &Site {
        &self.sites[id.index()]
    }

    /// Returns the site at the given coordinates, if any.
    pub fn site_at(&self, x: u32, y: u32) -> Option<SiteId> {
        self.site_at.get(&(x, y)).copied()
    }

    /// Returns all blocks.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Returns the block with the given ID.
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    /// Returns the category of a block's type.
    pub fn category(&self, block: BlockId) -> BlockCategory {
        self.block_type(self.block(block).block_type).category
    }

    /// Returns the blocks the annealer may move.
    pub fn movable_blocks(&self) -> &[BlockId] {
        &self.movable
    }

    /// Returns the number of movable blocks.
    pub fn num_movable(&self) -> usize {
        self.movable.len()
    }

    /// Returns `true` if every block has a site.
    pub fn is_fully_placed(&self) -> bool {
        self.blocks.iter().all(|b| b.site.is_some())
    }

    /// Returns the `(x, y)` coordinates of a block's site.
    pub fn position(&self, block: BlockId) -> Option<(u32, u32)> {
        self.block(block).site.map(|s| {
            let site = self.site(s);
            (site.x, site.y)
        })
    }

    /// Returns the slot a block occupies.
    pub fn slot_of(&self, block: BlockId) -> Option<SlotRef> {
        let site = self.block(block).site?;
        let slot = self.site(site).slot_of(block)?;
        Some(SlotRef { site, slot })
    }

    /// Applies the fixed-block policy: with `fix_pins`, exactly the I/O
    /// blocks are fixed; without it, no block is.
    ///
    /// Rebuilds the list of movable blocks.
    pub fn apply_fixed_policy(&mut self, fix_pins: bool) {
        for i in 0..self.blocks.len() {
            let category = self.block_types[self.blocks[i].block_type.index()].category;
            self.blocks[i].fixed = fix_pins && category == BlockCategory::Io;
        }
        self.movable = self
            .blocks
            .iter()
            .filter(|b| !b.fixed)
            .map(|b| b.id)
            .collect();
    }

    /// Places an unplaced block into the first free slot of `site`.
    pub fn place_block(&mut self, block: BlockId, site: SiteId) -> Result<SlotRef, SwapError> {
        let slot = self
            .site(site)
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SwapError::FullSite {
                site,
                slot: self.site(site).capacity(),
            })?;
        let at = SlotRef { site, slot };
        self.place_block_at(block, at)?;
        Ok(at)
    }

    /// Places an unplaced block into a specific free slot.
    pub fn place_block_at(&mut self, block: BlockId, at: SlotRef) -> Result<(), SwapError> {
        let b = self.block(block);
        if let Some(site) = b.site {
            return Err(SwapError::PlacedBlock { block, site });
        }
        let site = self.site(at.site);
        if site.block_type != b.block_type {
            return Err(SwapError::IncompatibleSite {
                block,
                site: at.site,
            });
        }
        match site.slots.get(at.slot) {
            None => {
                return Err(SwapError::InvalidSlot {
                    site: at.site,
                    slot: at.slot,
                })
            }
            Some(Some(_)) => {
                return Err(SwapError::FullSite {
                    site: at.site,
                    slot: at.slot,
                })
            }
            Some(None) => {}
        }
        self.set_slot(at, Some(block));
        self.set_block_site(block, Some(at.site));
        Ok(())
    }

    /// Samples a movable block uniformly. Returns `None` if there is none.
    pub fn random_movable_block<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<BlockId> {
        if self.movable.is_empty() {
            return None;
        }
        Some(self.movable[rng.gen_range(0..self.movable.len())])
    }

    /// Samples a site compatible with `block` within `rlim` columns and rows
    /// of its current site, uniformly among the candidates, excluding the
    /// block's own site.
    ///
    /// Returns `None` if the block is unplaced or has no candidate in range.
    pub fn random_site_near<R: Rng + ?Sized>(
        &self,
        block: BlockId,
        rlim: u32,
        rng: &mut R,
    ) -> Option<SiteId> {
        let block = self.block(block);
        let anchor = self.site(block.site?);
        let index = &self.type_index[block.block_type.index()];
        let window = Window::around(anchor.x, anchor.y, rlim);
        let anchor_in_index = anchor.block_type == block.block_type;

        let mut total = 0;
        for column in index.columns_in(window.x0, window.x1) {
            total += column.rows_in(window.y0, window.y1).len();
        }
        let candidates = total.checked_sub(usize::from(anchor_in_index))?;
        if candidates == 0 {
            return None;
        }

        let mut pick = rng.gen_range(0..candidates);
        for column in index.columns_in(window.x0, window.x1) {
            let rows = column.rows_in(window.y0, window.y1);
            let holds_anchor = anchor_in_index && column.x == anchor.x;
            let len = rows.len() - usize::from(holds_anchor);
            if pick < len {
                if holds_anchor {
                    let anchor_pos = rows.partition_point(|&(y, _)| y < anchor.y);
                    if pick >= anchor_pos {
                        pick += 1;
                    }
                }
                return Some(rows[pick].1);
            }
            pick -= len;
        }
        None
    }

    /// Verifies the occupancy invariants: every occupant is type-compatible
    /// with its site and points back at it, and no block occupies more than
    /// one slot.
    pub fn check_invariants(&self) -> Result<(), SwapError> {
        let mut seen = vec![false; self.blocks.len()];
        for site in &self.sites {
            for block in site.occupants() {
                if std::mem::replace(&mut seen[block.index()], true) {
                    return Err(SwapError::DuplicateOccupant(block));
                }
                let b = self.block(block);
                if b.block_type != site.block_type {
                    return Err(SwapError::IncompatibleSite {
                        block,
                        site: site.id,
                    });
                }
                if b.site != Some(site.id) {
                    return Err(SwapError::NotAnOccupant {
                        block,
                        site: site.id,
                    });
                }
            }
        }
        for block in &self.blocks {
            if let Some(site) = block.site {
                if !seen[block.id.index()] {
                    return Err(SwapError::NotAnOccupant {
                        block: block.id,
                        site,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn set_slot(&mut self, at: SlotRef, occupant: Option<BlockId>) {
        self.sites[at.site.index()].slots[at.slot] = occupant;
    }

    pub(crate) fn set_block_site(&mut self, block: BlockId, site: Option<SiteId>) {
        self.blocks[block.index()].site = site;
    }
}

/// Incrementally assembles a [`PlacementSurface`].
///
/// ```
/// use tessera_place::surface::{BlockCategory, SurfaceBuilder};
///
/// let mut builder = SurfaceBuilder::new(2, 1);
/// let clb = builder.block_type("clb", BlockCategory::Clb);
/// builder.site(0, 0, clb, 1);
/// builder.site(1, 0, clb, 1);
/// builder.block("lut_0", clb);
/// let surface = builder.build().unwrap();
/// assert_eq!(surface.sites().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct SurfaceBuilder {
    width: u32,
    height: u32,
    block_types: Vec<BlockType>,
    sites: Vec<(u32, u32, BlockTypeId, usize)>,
    blocks: Vec<(String, BlockTypeId)>,
}

impl SurfaceBuilder {
    /// Starts a surface with a `width` × `height` grid.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            block_types: Vec::new(),
            sites: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Registers a block type and returns its ID.
    pub fn block_type(&mut self, name: impl Into<String>, category: BlockCategory) -> BlockTypeId {
        let id = BlockTypeId::from_raw(self.block_types.len() as u32);
        self.block_types.push(BlockType {
            name: name.into(),
            category,
        });
        id
    }

    /// Adds a site and returns its ID.
    pub fn site(&mut self, x: u32, y: u32, block_type: BlockTypeId, capacity: usize) -> SiteId {
        let id = SiteId::from_raw(self.sites.len() as u32);
        self.sites.push((x, y, block_type, capacity));
        id
    }

    /// Adds an unplaced block and returns its ID.
    pub fn block(&mut self, name: impl Into<String>, block_type: BlockTypeId) -> BlockId {
        let id = BlockId::from_raw(self.blocks.len() as u32);
        self.blocks.push((name.into(), block_type));
        id
    }

    /// Validates the description and builds the surface with its site index.
    ///
    /// No block is fixed until [`PlacementSurface::apply_fixed_policy`] runs.
    pub fn build(self) -> PlaceResult<PlacementSurface> {
        if self.width == 0 || self.height == 0 {
            return Err(PlaceError::InvalidSurface(format!(
                "grid must be non-empty, got {}x{}",
                self.width, self.height
            )));
        }
        let num_types = self.block_types.len();

        let mut sites = Vec::with_capacity(self.sites.len());
        let mut site_at = HashMap::with_capacity(self.sites.len());
        let mut by_type: Vec<BTreeMap<u32, Vec<(u32, SiteId)>>> = vec![BTreeMap::new(); num_types];
        for (i, &(x, y, block_type, capacity)) in self.sites.iter().enumerate() {
            let id = SiteId::from_raw(i as u32);
            if x >= self.width || y >= self.height {
                return Err(PlaceError::InvalidSurface(format!(
                    "site {id} at ({x}, {y}) lies outside the {}x{} grid",
                    self.width, self.height
                )));
            }
            if block_type.index() >= num_types {
                return Err(PlaceError::InvalidSurface(format!(
                    "site {id} has unknown block type {block_type}"
                )));
            }
            if capacity == 0 {
                return Err(PlaceError::InvalidSurface(format!(
                    "site {id} at ({x}, {y}) has zero capacity"
                )));
            }
            if let Some(other) = site_at.insert((x, y), id) {
                return Err(PlaceError::InvalidSurface(format!(
                    "sites {other} and {id} share location ({x}, {y})"
                )));
            }
            by_type[block_type.index()].entry(x).or_default().push((y, id));
            sites.push(Site {
                id,
                x,
                y,
                block_type,
                slots: vec![None; capacity],
            });
        }

        let type_index = by_type
            .into_iter()
            .map(|columns| TypeIndex {
                columns: columns
                    .into_iter()
                    .map(|(x, mut rows)| {
                        rows.sort_unstable();
                        TypeColumn { x, rows }
                    })
                    .collect(),
            })
            .collect();

        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (i, (name, block_type)) in self.blocks.into_iter().enumerate() {
            let id = BlockId::from_raw(i as u32);
            if block_type.index() >= num_types {
                return Err(PlaceError::InvalidSurface(format!(
                    "block '{name}' has unknown block type {block_type}"
                )));
            }
            blocks.push(Block {
                id,
                name,
                block_type,
                fixed: false,
                site: None,
            });
        }
        let movable = blocks.iter().map(|b| b.id).collect();

        Ok(PlacementSurface {
            width: self.width,
            height: self.height,
            block_types: self.block_types,
            sites,
            blocks,
            site_at,
            type_index,
            movable,
        })
    }
}
