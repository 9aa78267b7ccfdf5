//! Modgate scenario runner
//!
//! Builds module layers from a scenario file and runs access checks
//! against them.

mod output;
mod runner;
mod scenario;

use clap::{Parser, Subcommand};
use output::{resolve_color_choice, StyledOutput};
use runner::Runner;
use scenario::Scenario;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "modgate")]
#[command(about = "Module access-control scenario runner", long_about = None)]
#[command(version)]
struct Cli {
    /// Color output: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every step of a scenario and report its checks
    Run {
        /// Scenario file
        file: PathBuf,
    },

    /// Create the layers of a scenario without running its steps
    Validate {
        /// Scenario file
        file: PathBuf,
    },
}

/// Install the log subscriber; `MODGATE_LOG` takes `RUST_LOG` syntax.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_env("MODGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));

    match execute(cli.command, &mut out) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            out.stderr_error(&format!("{:#}", err));
            ExitCode::from(2)
        }
    }
}

/// Returns whether every check met its expectation
fn execute(command: Commands, out: &mut StyledOutput) -> anyhow::Result<bool> {
    match command {
        Commands::Run { file } => {
            let scenario = Scenario::from_file(&file)?;
            let mut runner = Runner::build(&scenario)?;
            let report = runner.run(&scenario)?;
            for outcome in &report.checks {
                out.check(outcome);
            }
            out.summary(&report);
            out.flush();
            Ok(report.failures() == 0)
        }

        Commands::Validate { file } => {
            let scenario = Scenario::from_file(&file)?;
            let runner = Runner::build(&scenario)?;
            let defined: usize = scenario
                .layers
                .iter()
                .filter_map(|layer| runner.layer(&layer.name))
                .map(|layer| layer.len())
                .sum();
            for name in runner.unused_modules() {
                out.warning(&format!("module {} is declared but not in any layer", name));
            }
            out.success(&format!(
                "{}: {} layers, {} modules defined, {} steps",
                file.display(),
                scenario.layers.len(),
                defined,
                scenario.steps.len()
            ));
            Ok(true)
        }
    }
}
