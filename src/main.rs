use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sfci::config::{CONFIG_FILE, SfciConfig};

mod doctor;
mod exit;
mod format;
mod pipeline_cmd;
mod promote_cmd;

use exit::ExitCodeError;
use format::OutputFormat;

/// Salesforce CI/CD helper
///
/// Promotes branches by merging them into fresh promotion branches, and runs
/// the delta-based CI steps (scan, LWC tests, dry-run deploys) around the
/// Salesforce CLI.
///
/// CONFIGURATION:
///
///   Settings are read from .sfci.toml in the current directory (override
///   with --config or SFCI_CONFIG). Command-line flags take precedence.
///
/// LOGGING:
///
///   Logs go to stderr. Filter with RUST_LOG (default: info); set
///   SFCI_LOG_FORMAT=json for one JSON object per event.
#[derive(Parser)]
#[command(name = "sfci")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'sfci <command> --help' for more information on a specific command.")]
struct Cli {
    /// Configuration file
    #[arg(long, global = true, env = "SFCI_CONFIG", default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Promote(promote_cmd::PromoteArgs),

    Pipeline(pipeline_cmd::PipelineArgs),

    /// Check that git, gh, sf and npm are installed
    Doctor {
        /// Output format
        #[arg(long, value_enum, default_value_t)]
        format: OutputFormat,
    },
}

fn main() {
    sfci::telemetry::init();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            // Exit code 2 is reserved for merge conflicts.
            std::process::exit(i32::from(err.use_stderr()));
        }
    };

    if let Err(err) = run(cli) {
        if let Some(code) = err.downcast_ref::<ExitCodeError>() {
            std::process::exit(code.0);
        }
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Promote(args) => promote_cmd::run(args, SfciConfig::load(&cli.config)?),
        Commands::Pipeline(args) => pipeline_cmd::run(args, SfciConfig::load(&cli.config)?),
        Commands::Doctor { format } => doctor::run(format, &cli.config),
    }
}
