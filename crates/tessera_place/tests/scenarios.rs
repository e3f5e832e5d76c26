//! End-to-end annealing scenarios.
//!
//! These tests drive the public API only: a surface built with
//! [`SurfaceBuilder`], a cost model implemented outside the crate, and the
//! [`Annealer`] run to completion.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tessera_place::{
    AnnealState, Annealer, BlockCategory, BlockId, BoundingBoxCost, CostModel, PlaceError,
    PlacementSurface, PlacerOptions, SiteId, SurfaceBuilder, Swap,
};

// ---------------------------------------------------------------------------
// Helper: cost models
// ---------------------------------------------------------------------------

/// Sum of Manhattan distances over connected pairs, each pair counted from
/// both endpoints. Stateless: every query recomputes from the surface.
struct PairwiseManhattan {
    pairs: Vec<(BlockId, BlockId)>,
}

impl PairwiseManhattan {
    fn cost_with(&self, surface: &PlacementSurface, swap: Option<&Swap>) -> f64 {
        let pos = |b: BlockId| {
            let site = swap
                .and_then(|s| s.destination(b))
                .or_else(|| surface.block(b).site())
                .expect("placed");
            let site = surface.site(site);
            (i64::from(site.x()), i64::from(site.y()))
        };
        self.pairs
            .iter()
            .map(|&(a, b)| {
                let (ax, ay) = pos(a);
                let (bx, by) = pos(b);
                2.0 * ((ax - bx).abs() + (ay - by).abs()) as f64
            })
            .sum()
    }
}

impl CostModel for PairwiseManhattan {
    fn current_cost(&self, surface: &PlacementSurface) -> f64 {
        self.cost_with(surface, None)
    }

    fn delta_cost(&mut self, surface: &PlacementSurface, swap: &Swap) -> f64 {
        self.cost_with(surface, Some(swap)) - self.cost_with(surface, None)
    }

    fn push_through(&mut self, _iteration: usize) {}

    fn revert(&mut self, _iteration: usize) {}
}

/// Every sampled swap is worth exactly +1 or -1, alternately, so the
/// improving and worsening masses are equal.
struct Symmetric {
    calls: usize,
}

impl CostModel for Symmetric {
    fn current_cost(&self, _surface: &PlacementSurface) -> f64 {
        10.0
    }

    fn delta_cost(&mut self, _surface: &PlacementSurface, _swap: &Swap) -> f64 {
        self.calls += 1;
        if self.calls % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }

    fn push_through(&mut self, _iteration: usize) {}

    fn revert(&mut self, _iteration: usize) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    Begin,
    Delta,
    Push(usize),
    Revert(usize),
}

/// Wraps a model, logs every lifecycle call, and checks the surface
/// invariants whenever it is handed the surface.
struct Recording<C> {
    inner: C,
    events: Vec<Event>,
    violations: usize,
}

impl<C: CostModel> Recording<C> {
    fn new(inner: C) -> Self {
        Self {
            inner,
            events: Vec::new(),
            violations: 0,
        }
    }

    fn check(&mut self, surface: &PlacementSurface) {
        let over_capacity = surface
            .sites()
            .iter()
            .any(|s| s.occupancy() > s.capacity());
        if over_capacity || surface.check_invariants().is_err() {
            self.violations += 1;
        }
    }
}

impl<C: CostModel> CostModel for Recording<C> {
    fn initialize(&mut self, surface: &PlacementSurface) {
        self.check(surface);
        self.inner.initialize(surface);
    }

    fn current_cost(&self, surface: &PlacementSurface) -> f64 {
        self.inner.current_cost(surface)
    }

    fn delta_cost(&mut self, surface: &PlacementSurface, swap: &Swap) -> f64 {
        self.check(surface);
        self.events.push(Event::Delta);
        self.inner.delta_cost(surface, swap)
    }

    fn begin_iteration_sampling(&mut self, surface: &PlacementSurface) {
        self.check(surface);
        self.events.push(Event::Begin);
        self.inner.begin_iteration_sampling(surface);
    }

    fn push_through(&mut self, iteration: usize) {
        self.events.push(Event::Push(iteration));
        self.inner.push_through(iteration);
    }

    fn revert(&mut self, iteration: usize) {
        self.events.push(Event::Revert(iteration));
        self.inner.revert(iteration);
    }
}

// ---------------------------------------------------------------------------
// Helper: surfaces
// ---------------------------------------------------------------------------

/// 2x2 grid of CLB sites, block i at site i (row-major).
fn two_by_two() -> (PlacementSurface, Vec<BlockId>) {
    let mut b = SurfaceBuilder::new(2, 2);
    let clb = b.block_type("clb", BlockCategory::Clb);
    for y in 0..2 {
        for x in 0..2 {
            b.site(x, y, clb, 1);
        }
    }
    let blocks: Vec<_> = (0..4).map(|i| b.block(format!("b{i}"), clb)).collect();
    let mut s = b.build().unwrap();
    for (i, &block) in blocks.iter().enumerate() {
        s.place_block(block, SiteId::from_raw(i as u32)).unwrap();
    }
    (s, blocks)
}

/// 5x5 grid: capacity-2 pads on column 0, CLBs elsewhere. One pad in the
/// middle of the column, twelve CLBs scattered over the fabric, chained to
/// each other and to the pad.
fn fabric() -> (PlacementSurface, BoundingBoxCost, BlockId) {
    let mut b = SurfaceBuilder::new(5, 5);
    let io = b.block_type("io", BlockCategory::Io);
    let clb = b.block_type("clb", BlockCategory::Clb);
    for y in 0..5 {
        b.site(0, y, io, 2);
        for x in 1..5 {
            b.site(x, y, clb, 1);
        }
    }
    let pad = b.block("pad", io);
    let luts: Vec<_> = (0..12).map(|i| b.block(format!("lut_{i}"), clb)).collect();
    let mut s = b.build().unwrap();
    s.place_block(pad, s.site_at(0, 2).unwrap()).unwrap();
    let clb_sites: Vec<_> = s
        .sites()
        .iter()
        .filter(|site| site.x() > 0)
        .map(|site| site.id())
        .collect();
    for (i, &lut) in luts.iter().enumerate() {
        s.place_block(lut, clb_sites[(i * 7) % clb_sites.len()]).unwrap();
    }

    let mut cost = BoundingBoxCost::new(s.blocks().len());
    cost.add_net(&[pad, luts[0]], 1.0).unwrap();
    for pair in luts.windows(2) {
        cost.add_net(pair, 1.0).unwrap();
    }
    (s, cost, pad)
}

/// 4x4 CLB grid filled row by row with a chain of twelve blocks: a good
/// placement, so nearly every sampled move worsens the cost.
fn compact_chain() -> (PlacementSurface, BoundingBoxCost) {
    let mut b = SurfaceBuilder::new(4, 4);
    let clb = b.block_type("clb", BlockCategory::Clb);
    for y in 0..4 {
        for x in 0..4 {
            b.site(x, y, clb, 1);
        }
    }
    let blocks: Vec<_> = (0..12).map(|i| b.block(format!("b{i}"), clb)).collect();
    let mut s = b.build().unwrap();
    for (i, &block) in blocks.iter().enumerate() {
        s.place_block(block, SiteId::from_raw(i as u32)).unwrap();
    }
    let mut cost = BoundingBoxCost::new(blocks.len());
    for pair in blocks.windows(2) {
        cost.add_net(pair, 1.0).unwrap();
    }
    (s, cost)
}

fn sites_of(surface: &PlacementSurface) -> Vec<Option<SiteId>> {
    surface.blocks().iter().map(|b| b.site()).collect()
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[test]
fn greedy_two_by_two_never_worsens() {
    let (mut s, blocks) = two_by_two();
    let mut cost = Recording::new(PairwiseManhattan {
        pairs: vec![(blocks[0], blocks[2]), (blocks[1], blocks[3])],
    });
    assert_eq!(cost.current_cost(&s), 4.0);

    let options = PlacerOptions {
        greedy: true,
        ..PlacerOptions::default()
    };
    assert_eq!(options.seed, 10);
    let report = Annealer::with_seed(&mut s, &mut cost, &options).run().unwrap();

    assert_eq!(report.state, AnnealState::GreedyDone);
    assert_eq!(report.initial_cost, 4.0);
    assert!(report.final_cost <= 4.0);
    assert_eq!(report.moves_per_temperature, 6);
    assert_eq!(cost.violations, 0);
    assert!(s.sites().iter().all(|site| site.occupancy() <= 1));
    assert!(s.check_invariants().is_ok());
}

#[test]
fn fixed_pad_keeps_its_site() {
    let (mut s, mut cost, pad) = fabric();
    let pad_site = s.block(pad).site();
    let options = PlacerOptions::default();
    assert!(options.fix_pins);
    let report = Annealer::with_seed(&mut s, &mut cost, &options).run().unwrap();

    assert_eq!(report.state, AnnealState::Converged);
    assert!(report.accepted_moves > 0);
    assert_eq!(s.block(pad).site(), pad_site);
    assert!(s.block(pad).is_fixed());
    assert_eq!(s.num_movable(), 12);
    assert!(report.final_cost < report.initial_cost);
}

#[test]
fn pads_move_without_fix_pins() {
    let (mut s, mut cost, pad) = fabric();
    let options = PlacerOptions {
        fix_pins: false,
        ..PlacerOptions::default()
    };
    let report = Annealer::with_seed(&mut s, &mut cost, &options).run().unwrap();
    assert_eq!(report.state, AnnealState::Converged);
    assert!(!s.block(pad).is_fixed());
    assert_eq!(s.num_movable(), 13);
    assert!(s.check_invariants().is_ok());
}

#[test]
fn same_seed_same_result() {
    let run = |seed: u64| {
        let (mut s, mut cost, _) = fabric();
        let options = PlacerOptions {
            seed,
            ..PlacerOptions::default()
        };
        let report = Annealer::with_seed(&mut s, &mut cost, &options).run().unwrap();
        (report, sites_of(&s))
    };
    let (report_a, sites_a) = run(10);
    let (report_b, sites_b) = run(10);
    assert_eq!(report_a, report_b);
    assert_eq!(sites_a, sites_b);
}

#[test]
fn schedule_properties_hold_over_a_run() {
    let (mut s, mut cost, _) = fabric();
    let options = PlacerOptions::default();
    let (_, max_rlim) = options.range_limits(s.width(), s.height());
    let report = Annealer::with_seed(&mut s, &mut cost, &options).run().unwrap();

    let mut previous = report.initial_temperature;
    for step in &report.history {
        assert!(step.temperature < previous, "temperature rose at step {}", step.step);
        assert!((1..=max_rlim).contains(&step.rlim));
        assert!((0.0..=1.0).contains(&step.alpha));
        previous = step.temperature;
    }

    // Stops at the first step below the threshold.
    let num_movable = s.num_movable() as f64;
    assert!(report.final_temperature <= 0.005 * report.final_cost / num_movable);
    if let Some(before_last) = report.history.iter().rev().nth(1) {
        assert!(before_last.temperature > 0.005 * before_last.cost / num_movable);
    }
}

#[test]
fn lifecycle_calls_are_paired_in_order() {
    let (mut s, inner, _) = fabric();
    let mut cost = Recording::new(inner);
    let options = PlacerOptions::default();
    let report = Annealer::with_seed(&mut s, &mut cost, &options).run().unwrap();
    assert_eq!(cost.violations, 0);

    let events = &cost.events;
    assert_eq!(events.first(), Some(&Event::Begin));
    let mut expected_index = 0;
    let mut pushes = 0;
    let mut i = 0;
    while i < events.len() {
        match events[i] {
            Event::Begin => {
                expected_index = 0;
                i += 1;
            }
            Event::Delta => {
                let next = events.get(i + 1).copied();
                match next {
                    Some(Event::Push(n)) => {
                        assert_eq!(n, expected_index);
                        pushes += 1;
                    }
                    Some(Event::Revert(n)) => assert_eq!(n, expected_index),
                    other => panic!("delta at {i} followed by {other:?}"),
                }
                expected_index += 1;
                i += 2;
            }
            other => panic!("unpaired {other:?} at {i}"),
        }
    }
    assert_eq!(pushes, report.accepted_moves);

    // One batch for the estimate plus one per temperature step.
    let batches = events.iter().filter(|e| **e == Event::Begin).count();
    assert_eq!(batches, report.steps + 1);
}

#[test]
fn estimation_does_not_move_blocks() {
    for detailed in [false, true] {
        let (mut s, mut cost) = compact_chain();
        let before = sites_of(&s);
        let options = PlacerOptions {
            detailed,
            ..PlacerOptions::default()
        };
        // Cancelled before the first step: only the estimate runs.
        let report = Annealer::with_seed(&mut s, &mut cost, &options)
            .with_cancel_flag(Arc::new(AtomicBool::new(true)))
            .run()
            .unwrap();
        assert_eq!(report.state, AnnealState::Cancelled);
        assert!(report.initial_temperature > 0.0);
        assert!(report.initial_temperature.is_finite());
        assert_eq!(report.accepted_moves, 0);
        assert_eq!(sites_of(&s), before);
    }
}

#[test]
fn detailed_estimate_anneals_to_convergence() {
    let (mut s, mut cost) = compact_chain();
    let options = PlacerOptions {
        detailed: true,
        ..PlacerOptions::default()
    };
    let report = Annealer::with_seed(&mut s, &mut cost, &options).run().unwrap();
    assert_eq!(report.state, AnnealState::Converged);
    assert!(report.initial_temperature > 0.0);
    assert!(report.initial_temperature.is_finite());
    assert!(s.check_invariants().is_ok());
}

#[test]
fn balanced_landscape_fails_detailed_estimate() {
    let (mut s, _) = compact_chain();
    let mut cost = Symmetric { calls: 0 };
    let options = PlacerOptions {
        detailed: true,
        ..PlacerOptions::default()
    };
    let err = Annealer::with_seed(&mut s, &mut cost, &options)
        .run()
        .unwrap_err();
    match err {
        PlaceError::EstimatorFailed {
            emin,
            max_eplus,
            samples,
            ..
        } => {
            assert_eq!(samples % 2, 0);
            assert_eq!(emin, max_eplus);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn t_multiplier_scales_initial_temperature() {
    let estimate = |t_multiplier: f64| {
        let (mut s, mut cost) = compact_chain();
        let options = PlacerOptions {
            t_multiplier,
            ..PlacerOptions::default()
        };
        Annealer::with_seed(&mut s, &mut cost, &options)
            .with_cancel_flag(Arc::new(AtomicBool::new(true)))
            .run()
            .unwrap()
            .initial_temperature
    };
    let t1 = estimate(1.0);
    let t3 = estimate(3.0);
    assert!((t3 - 3.0 * t1).abs() <= 1e-9 * t3);
}
