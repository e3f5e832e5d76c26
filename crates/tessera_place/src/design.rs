//! Serializable design descriptions.
//!
//! A [`Design`] names everything by string: block types, the types of sites
//! and blocks, and the blocks on each net. [`Design::build`] resolves the
//! names and produces a [`PlacementSurface`] plus a [`BoundingBoxCost`] over
//! its nets. Blocks with a `site` are placed there before annealing; all
//! others start unplaced.
//!
//! [`block_assignments`] and [`render_place_file`] go the other way and
//! describe a finished placement.

use crate::cost::BoundingBoxCost;
use crate::error::{PlaceError, PlaceResult};
use crate::ids::{BlockId, BlockTypeId};
use crate::surface::{BlockType, PlacementSurface, SurfaceBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Write as _;

fn default_capacity() -> usize {
    1
}

fn default_weight() -> f64 {
    1.0
}

/// A grid location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
}

/// A site of the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SiteSpec {
    /// Column.
    pub x: u32,
    /// Row.
    pub y: u32,
    /// Name of the site's block type.
    #[serde(rename = "type")]
    pub block_type: String,
    /// Number of blocks the site can hold.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// A placeable block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BlockSpec {
    /// Unique block name.
    pub name: String,
    /// Name of the block's type.
    #[serde(rename = "type")]
    pub block_type: String,
    /// Starting location, if the block is pre-placed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<Location>,
}

/// A net connecting blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetSpec {
    /// Net name, used in error messages.
    #[serde(default)]
    pub name: String,
    /// Names of the connected blocks.
    pub blocks: Vec<String>,
    /// Weight of the net in the wirelength cost.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

/// A complete placement problem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Design {
    /// Grid width in columns.
    pub width: u32,
    /// Grid height in rows.
    pub height: u32,
    /// Block types, referenced by name.
    pub block_types: Vec<BlockType>,
    /// Sites of the grid.
    pub sites: Vec<SiteSpec>,
    /// Blocks to place.
    pub blocks: Vec<BlockSpec>,
    /// Nets between blocks.
    #[serde(default)]
    pub nets: Vec<NetSpec>,
}

impl Design {
    /// Resolves names and builds the surface and its wirelength model.
    pub fn build(&self) -> PlaceResult<(PlacementSurface, BoundingBoxCost)> {
        let mut builder = SurfaceBuilder::new(self.width, self.height);

        let mut types: HashMap<&str, BlockTypeId> = HashMap::new();
        for ty in &self.block_types {
            let id = builder.block_type(ty.name.clone(), ty.category);
            if types.insert(&ty.name, id).is_some() {
                return Err(invalid(format!("duplicate block type '{}'", ty.name)));
            }
        }
        let lookup = |name: &str| {
            types
                .get(name)
                .copied()
                .ok_or_else(|| invalid(format!("unknown block type '{name}'")))
        };

        for site in &self.sites {
            builder.site(site.x, site.y, lookup(&site.block_type)?, site.capacity);
        }

        let mut blocks: HashMap<&str, BlockId> = HashMap::new();
        for block in &self.blocks {
            let id = builder.block(block.name.clone(), lookup(&block.block_type)?);
            if blocks.insert(&block.name, id).is_some() {
                return Err(invalid(format!("duplicate block '{}'", block.name)));
            }
        }

        let mut surface = builder.build()?;
        for (spec, i) in self.blocks.iter().zip(0u32..) {
            let Some(at) = spec.site else { continue };
            let site = surface.site_at(at.x, at.y).ok_or_else(|| {
                invalid(format!(
                    "block '{}' starts at ({}, {}), which has no site",
                    spec.name, at.x, at.y
                ))
            })?;
            surface.place_block(BlockId::from_raw(i), site)?;
        }

        let mut cost = BoundingBoxCost::new(self.blocks.len());
        for (n, net) in self.nets.iter().enumerate() {
            let terminals = net
                .blocks
                .iter()
                .map(|name| {
                    blocks.get(name.as_str()).copied().ok_or_else(|| {
                        invalid(format!("net {n} '{}' references unknown block '{name}'", net.name))
                    })
                })
                .collect::<PlaceResult<Vec<_>>>()?;
            cost.add_net(&terminals, net.weight)?;
        }
        Ok((surface, cost))
    }
}

fn invalid(msg: String) -> PlaceError {
    PlaceError::InvalidSurface(msg)
}

/// Where one block ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockAssignment {
    /// Block name.
    pub name: String,
    /// Block index.
    pub index: u32,
    /// Column of its site.
    pub x: u32,
    /// Row of its site.
    pub y: u32,
    /// Slot within the site.
    pub slot: usize,
}

/// Lists the placed blocks in ID order. Unplaced blocks are skipped.
pub fn block_assignments(surface: &PlacementSurface) -> Vec<BlockAssignment> {
    surface
        .blocks()
        .iter()
        .filter_map(|block| {
            let at = surface.slot_of(block.id())?;
            let site = surface.site(at.site);
            Some(BlockAssignment {
                name: block.name().to_string(),
                index: block.id().as_raw(),
                x: site.x(),
                y: site.y(),
                slot: at.slot,
            })
        })
        .collect()
}

/// Renders assignments as a column-aligned text table, one block per line.
pub fn render_place_file(width: u32, height: u32, assignments: &[BlockAssignment]) -> String {
    let name_width = assignments
        .iter()
        .map(|a| a.name.len())
        .max()
        .unwrap_or(0)
        .max(10);
    let mut out = String::new();
    let _ = writeln!(out, "Array size: {width} x {height}");
    let _ = writeln!(out);
    let _ = writeln!(out, "{:<name_width$} x       y       slot    block number", "block name");
    let _ = writeln!(out, "{:<name_width$} --      --      ----    ------------", "----------");
    for a in assignments {
        let _ = writeln!(
            out,
            "{:<name_width$} {:<7} {:<7} {:<7} #{}",
            a.name, a.x, a.y, a.slot, a.index
        );
    }
    out
}
