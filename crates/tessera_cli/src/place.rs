//! `tessera place`: load a design, anneal it, write the placement.
//!
//! 1. Resolve the placer options (config file, then flag overrides)
//! 2. Read and build the JSON design
//! 3. Random initial placement + simulated annealing
//! 4. Render the report as JSON or as a placement table

use std::fs;
use std::path::Path;

use serde::Serialize;
use tessera_config::{load_config, validate_placer, PlacerOptions, CONFIG_FILE_NAME};
use tessera_place::{
    block_assignments, place, render_place_file, AnnealReport, AnnealState, BlockAssignment,
    Design, PlacementSurface,
};
use tracing::debug;

use crate::{GlobalArgs, OutputFormat, PlaceArgs};

/// The JSON document written by `tessera place`.
#[derive(Debug, Serialize)]
struct PlacementReport<'a> {
    state: AnnealState,
    width: u32,
    height: u32,
    initial_cost: f64,
    final_cost: f64,
    initial_temperature: f64,
    final_temperature: f64,
    steps: usize,
    moves_per_temperature: usize,
    total_moves: usize,
    accepted_moves: usize,
    blocks: &'a [BlockAssignment],
}

/// Runs the `tessera place` command.
///
/// Returns exit code 0 on success; every failure is reported as an error.
pub fn run(args: &PlaceArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let options = resolve_options(args, global)?;
    debug!(?options, "resolved placer options");

    let text = fs::read_to_string(&args.design)
        .map_err(|e| format!("cannot read design '{}': {e}", args.design))?;
    let design: Design = serde_json::from_str(&text)
        .map_err(|e| format!("invalid design '{}': {e}", args.design))?;
    let (mut surface, mut cost) = design.build()?;

    if !global.quiet {
        eprintln!(
            "     Placing {} blocks on {} sites ({}x{})",
            surface.blocks().len(),
            surface.sites().len(),
            surface.width(),
            surface.height()
        );
    }

    let report = place(&mut surface, &mut cost, &options)?;

    if !global.quiet {
        eprintln!(
            "    Finished {}: cost {:.3} -> {:.3} after {} step(s)",
            report.state, report.initial_cost, report.final_cost, report.steps
        );
    }

    let rendered = render(args.format, &surface, &report)?;
    match &args.output {
        Some(path) => fs::write(path, rendered)?,
        None => print!("{rendered}"),
    }
    Ok(0)
}

/// Loads the configuration and applies the command-line overrides.
///
/// Without `--config`, a `tessera.toml` in the working directory is used if
/// present; otherwise the defaults apply.
fn resolve_options(
    args: &PlaceArgs,
    global: &GlobalArgs,
) -> Result<PlacerOptions, Box<dyn std::error::Error>> {
    let mut options = match &global.config {
        Some(path) => load_config(Path::new(path))?.placer,
        None if Path::new(CONFIG_FILE_NAME).is_file() => {
            load_config(Path::new(CONFIG_FILE_NAME))?.placer
        }
        None => PlacerOptions::default(),
    };

    if let Some(seed) = args.seed {
        options.seed = seed;
    }
    if let Some(effort_level) = args.effort_level {
        options.effort_level = effort_level;
    }
    if args.greedy {
        options.greedy = true;
    }
    if args.detailed {
        options.detailed = true;
    }
    if args.no_fix_pins {
        options.fix_pins = false;
    }
    validate_placer(&options)?;
    Ok(options)
}

fn render(
    format: OutputFormat,
    surface: &PlacementSurface,
    report: &AnnealReport,
) -> Result<String, serde_json::Error> {
    let blocks = block_assignments(surface);
    match format {
        OutputFormat::Json => {
            let doc = PlacementReport {
                state: report.state,
                width: surface.width(),
                height: surface.height(),
                initial_cost: report.initial_cost,
                final_cost: report.final_cost,
                initial_temperature: report.initial_temperature,
                final_temperature: report.final_temperature,
                steps: report.steps,
                moves_per_temperature: report.moves_per_temperature,
                total_moves: report.total_moves,
                accepted_moves: report.accepted_moves,
                blocks: &blocks,
            };
            let mut json = serde_json::to_string_pretty(&doc)?;
            json.push('\n');
            Ok(json)
        }
        OutputFormat::Place => Ok(render_place_file(surface.width(), surface.height(), &blocks)),
    }
}
