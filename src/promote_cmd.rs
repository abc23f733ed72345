use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use sfci::config::SfciConfig;
use sfci::error::PromoteError;
use sfci::hosting::GhCli;
use sfci::promote::BranchPromoter;
use sfci::request::{Credential, PromotionRequest};
use sfci_git::{GitCli, Identity};

use crate::exit::{CONFLICT, ExitCodeError};
use crate::format::OutputFormat;

/// Merge a source branch into a new promotion branch cut from the target
///
/// Creates `promotion/<source>-to-<target>` from the target branch, merges
/// the source into it with a merge commit, and pushes it when the merge is
/// clean. On conflicts the merge is aborted, nothing is pushed, and both
/// sides of every conflicted file are written to the report.
///
/// Exit codes: 0 clean merge, 2 conflicts, 1 any other failure.
///
/// Examples:
///   sfci promote --repo acme/app --source feature/login --target uat
///   sfci promote --repo acme/app --source uat --target main --format json
#[derive(Args, Debug)]
pub struct PromoteArgs {
    /// Repository as owner/name
    #[arg(long)]
    pub repo: String,

    /// Branch to promote
    #[arg(long)]
    pub source: String,

    /// Branch to promote into
    #[arg(long)]
    pub target: String,

    /// Hosting token
    #[arg(long, env = "GH_TOKEN", hide_env_values = true)]
    pub token: String,

    /// Hosting server [default: from config, else github.com]
    #[arg(long)]
    pub host: Option<String>,

    /// Clone from this URL or path instead of the hosting server
    #[arg(long)]
    pub remote_url: Option<String>,

    /// Directory for report artifacts [default: from config]
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Parent directory for the temporary checkout
    #[arg(long)]
    pub work_root: Option<PathBuf>,

    /// Overall deadline in seconds, 0 to disable [default: from config, else 600]
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value_t)]
    pub format: OutputFormat,
}

pub fn run(args: PromoteArgs, config: SfciConfig) -> Result<()> {
    let SfciConfig {
        hosting,
        mut promote,
        git,
        ..
    } = config;

    let request = PromotionRequest::new(
        args.repo,
        args.source,
        args.target,
        Credential::new(args.token),
    )
    .map_err(PromoteError::from)?;

    let host = args.host.unwrap_or(hosting.host);
    if let Some(secs) = args.timeout {
        promote.timeout_secs = secs;
    }
    let timeout = promote.timeout();
    let output_dir = args.output_dir.unwrap_or(promote.artifact_dir);

    let mut client = GitCli::new().with_identity(Identity::new(git.user_name, git.user_email));
    if let Some(root) = args.work_root.or(promote.work_root) {
        client = client.with_work_root(root);
    }

    let promoter = BranchPromoter::new(client, GhCli::new(&host), &host)
        .with_timeout(timeout)
        .with_remote_url(args.remote_url.or(promote.remote_url));

    let (report, paths) = promoter
        .promote_and_record(&request, &output_dir)
        .with_context(|| {
            format!(
                "promoting {} into {} in {}",
                request.source_branch(),
                request.target_branch(),
                request.repository()
            )
        })?;

    match args.format {
        OutputFormat::Json => println!("{}", args.format.serialize(&report.to_record())?),
        OutputFormat::Text => {
            print!("{}", report.render_summary());
            println!();
            println!("Artifacts: {}", paths.dir.display());
        }
    }

    if !report.success() {
        return Err(ExitCodeError(CONFLICT).into());
    }
    Ok(())
}
