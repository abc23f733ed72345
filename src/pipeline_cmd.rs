use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use sfci::config::SfciConfig;
use sfci::pipeline::{ApexTests, CiSummary, Pipeline, PipelineOptions, StepKind, StepOutcome, SystemRunner};
use sfci::request::Credential;
use sfci_git::Deadline;

use crate::format::OutputFormat;

/// Run Salesforce CI steps against the project in the current directory
///
/// Steps use the Salesforce CLI (`sf`, with the sfdx-git-delta and code
/// analyzer plugins) and `npm`. Run `prepare-delta` before the steps that
/// read the delta directory, and `login` before the dry-run deploys.
#[derive(Args, Debug)]
pub struct PipelineArgs {
    #[command(subcommand)]
    pub step: PipelineStep,

    /// Project root
    #[arg(long, global = true, default_value = ".")]
    pub project_dir: PathBuf,

    /// Package directory the delta is computed over [default: from config]
    #[arg(long, global = true)]
    pub source_dir: Option<String>,

    /// Delta output directory [default: from config]
    #[arg(long, global = true)]
    pub delta_dir: Option<String>,

    /// Org alias [default: from config]
    #[arg(long, global = true)]
    pub alias: Option<String>,

    /// "all" or comma-separated Apex test classes [default: from config]
    #[arg(long, global = true)]
    pub apex_tests: Option<String>,

    /// LWC tests to run in `ci`: all, delta or none [default: from config]
    #[arg(long, global = true)]
    pub lwc_tests: Option<String>,

    /// Overall deadline in seconds, 0 to disable
    #[arg(long, global = true, default_value_t = 0)]
    pub timeout: u64,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PipelineStep {
    /// Compute the HEAD^..HEAD delta with sfdx-git-delta
    PrepareDelta,
    /// Scan the delta's Apex classes, writing SARIF results
    ScanDelta,
    /// Run LWC Jest unit tests with coverage
    LwcTests,
    /// Log in to the org with an SFDX auth URL
    Login(AuthArgs),
    /// Validate the delta's changes against the org without deploying
    DryRunDeploy,
    /// Validate the delta's destructive changes without deleting
    DryRunDestructive,
    /// Run every step in order, stopping at the first failure
    Ci(AuthArgs),
}

#[derive(Args, Debug, Clone)]
pub struct AuthArgs {
    /// SFDX auth URL (passed to sf on stdin)
    #[arg(long, env = "SF_AUTH_URL", hide_env_values = true)]
    pub auth_url: String,
}

#[derive(Serialize)]
struct StepEnvelope {
    step: StepKind,
    #[serde(flatten)]
    outcome: StepOutcome,
}

pub fn run(args: PipelineArgs, config: SfciConfig) -> Result<()> {
    let mut section = config.pipeline;
    if let Some(v) = args.source_dir {
        section.source_dir = v;
    }
    if let Some(v) = args.delta_dir {
        section.delta_dir = v;
    }
    if let Some(v) = args.alias {
        section.alias = v;
    }
    if let Some(v) = args.lwc_tests {
        section.lwc_tests = v;
    }
    let mut options = PipelineOptions::from_config(&section, args.project_dir)?;
    if let Some(v) = args.apex_tests {
        options.apex_tests = ApexTests::parse(&v);
    }

    let deadline = if args.timeout == 0 {
        Deadline::NONE
    } else {
        Deadline::after(Duration::from_secs(args.timeout))
    };
    let pipeline = Pipeline::new(SystemRunner::new(deadline), options);

    let (step, outcome) = match args.step {
        PipelineStep::Ci(auth) => {
            let summary = pipeline
                .ci(&Credential::new(auth.auth_url))
                .context("CI pipeline failed")?;
            return print_summary(args.format, &summary);
        }
        PipelineStep::PrepareDelta => (StepKind::PrepareDelta, pipeline.prepare_delta()),
        PipelineStep::ScanDelta => (StepKind::ScanDelta, pipeline.scan_delta()),
        PipelineStep::LwcTests => (StepKind::LwcTests, pipeline.run_lwc_tests()),
        PipelineStep::Login(auth) => (
            StepKind::Login,
            pipeline.login(&Credential::new(auth.auth_url)),
        ),
        PipelineStep::DryRunDeploy => (StepKind::DryRunDeploy, pipeline.dry_run_deploy()),
        PipelineStep::DryRunDestructive => {
            (StepKind::DryRunDestructive, pipeline.dry_run_destructive())
        }
    };
    let outcome = outcome?;

    match args.format {
        OutputFormat::Json => println!(
            "{}",
            args.format.serialize(&StepEnvelope { step, outcome })?
        ),
        OutputFormat::Text => println!("{step}: {outcome}"),
    }
    Ok(())
}

fn print_summary(format: OutputFormat, summary: &CiSummary) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", format.serialize(summary)?),
        OutputFormat::Text => print!("{summary}"),
    }
    Ok(())
}
