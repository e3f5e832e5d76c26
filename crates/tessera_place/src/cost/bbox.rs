//! Half-perimeter wirelength (HPWL) cost.
//!
//! The cost of a net is its weight times the half-perimeter of the bounding
//! box of its placed terminals; the total is the sum over all nets. Per-net
//! costs are cached, so a delta only revisits the nets of the moved blocks.

use super::CostModel;
use crate::error::{PlaceError, PlaceResult};
use crate::ids::{BlockId, NetId, SiteId};
use crate::surface::PlacementSurface;
use crate::swap::Swap;

#[derive(Debug, Clone)]
struct Net {
    terminals: Vec<BlockId>,
    weight: f64,
}

/// Incremental bounding-box wirelength model.
#[derive(Debug, Clone)]
pub struct BoundingBoxCost {
    nets: Vec<Net>,
    nets_of: Vec<Vec<NetId>>,
    net_cost: Vec<f64>,
    total: f64,
    pending: Vec<(NetId, f64)>,
    pending_delta: f64,
    cached: bool,
}

impl BoundingBoxCost {
    /// Creates a model for a design with `num_blocks` blocks and no nets.
    pub fn new(num_blocks: usize) -> Self {
        Self {
            nets: Vec::new(),
            nets_of: vec![Vec::new(); num_blocks],
            net_cost: Vec::new(),
            total: 0.0,
            pending: Vec::new(),
            pending_delta: 0.0,
            cached: false,
        }
    }

    /// Adds a net over `terminals` with the given weight.
    ///
    /// A block listed more than once counts once.
    pub fn add_net(&mut self, terminals: &[BlockId], weight: f64) -> PlaceResult<NetId> {
        let id = NetId::from_raw(self.nets.len() as u32);
        if !(weight.is_finite() && weight >= 0.0) {
            return Err(PlaceError::InvalidSurface(format!(
                "net {id} has invalid weight {weight}"
            )));
        }
        let mut unique = Vec::with_capacity(terminals.len());
        for &block in terminals {
            if block.index() >= self.nets_of.len() {
                return Err(PlaceError::InvalidSurface(format!(
                    "net {id} references unknown block {block}"
                )));
            }
            if !unique.contains(&block) {
                unique.push(block);
            }
        }
        for &block in &unique {
            self.nets_of[block.index()].push(id);
        }
        self.nets.push(Net {
            terminals: unique,
            weight,
        });
        self.net_cost.push(0.0);
        self.cached = false;
        Ok(id)
    }

    /// Returns the number of nets.
    pub fn num_nets(&self) -> usize {
        self.nets.len()
    }

    /// Returns the cached cost of one net.
    pub fn net_cost(&self, net: NetId) -> f64 {
        self.net_cost[net.index()]
    }

    /// Computes the cost of `net` with the moved blocks of `swap`, if any, at
    /// their destinations.
    fn evaluate(&self, surface: &PlacementSurface, net: NetId, swap: Option<&Swap>) -> f64 {
        let net = &self.nets[net.index()];
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for &block in &net.terminals {
            let site: Option<SiteId> = swap
                .and_then(|s| s.destination(block))
                .or_else(|| surface.block(block).site());
            let Some(site) = site else { continue };
            let site = surface.site(site);
            let (x, y) = (site.x(), site.y());
            bounds = Some(match bounds {
                None => (x, x, y, y),
                Some((x0, x1, y0, y1)) => (x0.min(x), x1.max(x), y0.min(y), y1.max(y)),
            });
        }
        match bounds {
            Some((x0, x1, y0, y1)) => net.weight * f64::from((x1 - x0) + (y1 - y0)),
            None => 0.0,
        }
    }

    fn nets_of_block(&self, block: BlockId) -> &[NetId] {
        self.nets_of.get(block.index()).map_or(&[], Vec::as_slice)
    }

    /// Sums every net from the placement without touching the cache.
    fn full_cost(&self, surface: &PlacementSurface) -> f64 {
        (0..self.nets.len())
            .map(|i| self.evaluate(surface, NetId::from_raw(i as u32), None))
            .sum()
    }

    /// Recomputes every net from the placement.
    fn recompute(&mut self, surface: &PlacementSurface) {
        for i in 0..self.nets.len() {
            let id = NetId::from_raw(i as u32);
            self.net_cost[i] = self.evaluate(surface, id, None);
        }
        self.total = self.net_cost.iter().sum();
        self.pending.clear();
        self.pending_delta = 0.0;
        self.cached = true;
    }
}

impl CostModel for BoundingBoxCost {
    /// Blocks the model was not sized for belong to no net.
    fn initialize(&mut self, surface: &PlacementSurface) {
        if self.nets_of.len() < surface.blocks().len() {
            self.nets_of.resize(surface.blocks().len(), Vec::new());
        }
        self.recompute(surface);
    }

    fn current_cost(&self, surface: &PlacementSurface) -> f64 {
        if self.cached {
            self.total
        } else {
            self.full_cost(surface)
        }
    }

    fn delta_cost(&mut self, surface: &PlacementSurface, swap: &Swap) -> f64 {
        if !self.cached {
            self.recompute(surface);
        }
        self.pending.clear();
        self.pending_delta = 0.0;

        let mut affected: Vec<NetId> = self.nets_of_block(swap.block1()).to_vec();
        if let Some(block2) = swap.block2() {
            for &net in self.nets_of_block(block2) {
                if !affected.contains(&net) {
                    affected.push(net);
                }
            }
        }

        for net in affected {
            let cost = self.evaluate(surface, net, Some(swap));
            self.pending_delta += cost - self.net_cost[net.index()];
            self.pending.push((net, cost));
        }
        self.pending_delta
    }

    fn begin_iteration_sampling(&mut self, _surface: &PlacementSurface) {
        // Re-sum the cache so accumulated deltas do not drift.
        self.total = self.net_cost.iter().sum();
    }

    fn push_through(&mut self, _iteration: usize) {
        for (net, cost) in self.pending.drain(..) {
            self.net_cost[net.index()] = cost;
        }
        self.total += self.pending_delta;
        self.pending_delta = 0.0;
    }

    fn revert(&mut self, _iteration: usize) {
        self.pending.clear();
        self.pending_delta = 0.0;
    }

    fn statistics(&self, surface: &PlacementSurface) -> String {
        format!(
            "bb cost = {:.4}, nets = {}",
            self.current_cost(surface),
            self.nets.len()
        )
    }
}
