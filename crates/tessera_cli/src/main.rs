//! Tessera CLI: the command-line driver for the Tessera placement engine.
//!
//! Provides `tessera place`, which reads a JSON design description, places
//! it with simulated annealing, and writes the resulting block assignment.

#![warn(missing_docs)]

mod place;

use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

/// Tessera: simulated annealing FPGA placement.
#[derive(Parser, Debug)]
#[command(name = "tessera", version, about = "Tessera FPGA placer")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output, including per-step annealing logs.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a `tessera.toml` configuration file or its directory.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Place a design.
    Place(PlaceArgs),
}

/// Arguments for the `tessera place` subcommand.
///
/// Flags override the values read from the configuration file.
#[derive(Parser, Debug)]
pub struct PlaceArgs {
    /// Path to the JSON design description.
    pub design: String,

    /// Seed of the annealer's random generator.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Run a single greedy pass instead of annealing.
    #[arg(long)]
    pub greedy: bool,

    /// Use the detailed initial temperature estimator.
    #[arg(long)]
    pub detailed: bool,

    /// Scale factor for the number of moves per temperature.
    #[arg(long)]
    pub effort_level: Option<f64>,

    /// Let the annealer move I/O blocks.
    #[arg(long)]
    pub no_fix_pins: bool,

    /// Output format of the placement.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Output path (default: stdout).
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Placement output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// JSON report with costs, run statistics, and block assignments.
    Json,
    /// Column-aligned text table of block assignments.
    Place,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };
    init_logging(&global);

    let result = match cli.command {
        Command::Place(ref args) => place::run(args, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}

/// Returns the default log filter for the global flags.
fn log_level(global: &GlobalArgs) -> &'static str {
    if global.quiet {
        "error"
    } else if global.verbose {
        "debug"
    } else {
        "warn"
    }
}

/// Installs the stderr subscriber. `RUST_LOG` takes precedence over the
/// flags.
fn init_logging(global: &GlobalArgs) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level(global)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
