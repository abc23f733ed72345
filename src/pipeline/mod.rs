//! Salesforce CI steps: delta preparation, static scan, LWC unit tests, org
//! login, and dry-run deploys of additive and destructive changes.
//!
//! Every step is a short sequence of `sf`/`npm` invocations run through a
//! [`CommandRunner`] in the project directory. The tools themselves are
//! black boxes: a step only decides what to run, whether to skip, and how to
//! turn a non-zero exit into a [`PipelineError`].
//!
//! ```text
//! prepare-delta → scan-delta → lwc-tests → login → dry-run-deploy → dry-run-destructive
//! ```

pub mod runner;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;
use sfci_git::{Invocation, ProcessError, ProcessOutput};
use thiserror::Error;
use tracing::instrument;

use crate::config::PipelineConfig;
use crate::request::Credential;

pub use runner::{CommandRunner, SystemRunner};

/// Scan output written inside the delta directory.
pub const SARIF_FILE: &str = "apexScanResults.sarif";

/// Written when the delta holds no Apex classes to scan.
const EMPTY_SARIF: &str = r#"{"version":"2.1.0","$schema":"https://json.schemastore.org/sarif-2.1.0.json","runs":[{"tool":{"driver":{"name":"Salesforce Code Analyzer","version":"5.0.0"}},"results":[]}]}"#;

const COVERAGE_SUMMARY: &str = "coverage/coverage-summary.json";
const DESTRUCTIVE_DIR: &str = "destructiveChanges";
const DESTRUCTIVE_MANIFEST: &str = "destructiveChanges/destructiveChanges.xml";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which Apex tests a dry-run deploy runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApexTests {
    /// `RunLocalTests`.
    All,
    /// `RunSpecifiedTests` with these class names.
    Specified(Vec<String>),
}

impl ApexTests {
    /// `all` in any case, or an empty list, means every local test.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim();
        if value.eq_ignore_ascii_case("all") {
            return Self::All;
        }
        let classes: Vec<String> = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .collect();
        if classes.is_empty() {
            Self::All
        } else {
            Self::Specified(classes)
        }
    }
}

/// Which LWC tests the CI chain runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LwcMode {
    All,
    /// Accepted for compatibility; runs the same suite as `All`.
    Delta,
    None,
}

impl FromStr for LwcMode {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "delta" => Ok(Self::Delta),
            "none" => Ok(Self::None),
            _ => Err(PipelineError::InvalidOption {
                name: "lwc_tests",
                value: s.to_owned(),
            }),
        }
    }
}

/// Where and how the pipeline runs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineOptions {
    pub project_dir: PathBuf,
    pub source_dir: String,
    pub delta_dir: String,
    pub alias: String,
    pub apex_tests: ApexTests,
    pub lwc_tests: LwcMode,
}

impl PipelineOptions {
    /// Options for `project_dir` taken from the `[pipeline]` config section.
    ///
    /// # Errors
    /// Returns [`PipelineError::InvalidOption`] for an unknown LWC mode.
    pub fn from_config(config: &PipelineConfig, project_dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        Ok(Self {
            project_dir: project_dir.into(),
            source_dir: config.source_dir.clone(),
            delta_dir: config.delta_dir.clone(),
            alias: config.alias.clone(),
            apex_tests: ApexTests::parse(&config.apex_tests),
            lwc_tests: config.lwc_tests.parse()?,
        })
    }

    fn delta_path(&self) -> PathBuf {
        self.project_dir.join(&self.delta_dir)
    }
}

// ---------------------------------------------------------------------------
// Steps and outcomes
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    PrepareDelta,
    ScanDelta,
    LwcTests,
    Login,
    DryRunDeploy,
    DryRunDestructive,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrepareDelta => "prepare-delta",
            Self::ScanDelta => "scan-delta",
            Self::LwcTests => "lwc-tests",
            Self::Login => "login",
            Self::DryRunDeploy => "dry-run-deploy",
            Self::DryRunDestructive => "dry-run-destructive",
        };
        f.pad(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepOutcome {
    Completed { detail: String },
    Skipped { reason: String },
}

impl StepOutcome {
    fn completed(detail: impl Into<String>) -> Self {
        Self::Completed {
            detail: detail.into(),
        }
    }

    fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed { detail } => write!(f, "completed: {detail}"),
            Self::Skipped { reason } => write!(f, "skipped: {reason}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: StepKind,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Status of every step the CI chain ran, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CiSummary {
    pub steps: Vec<StepReport>,
}

impl CiSummary {
    fn push(&mut self, step: StepKind, outcome: StepOutcome) {
        tracing::info!(%step, %outcome, "step finished");
        self.steps.push(StepReport { step, outcome });
    }
}

impl fmt::Display for CiSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in &self.steps {
            writeln!(f, "{:<20} {}", report.step, report.outcome)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A tool ran and exited non-zero.
    #[error("{step}: `{command}` exited with {}: {stderr}", exit_label(.exit_code.as_ref()))]
    StepFailed {
        step: StepKind,
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// A tool could not be run to completion.
    #[error("{step}: {source}")]
    Process {
        step: StepKind,
        #[source]
        source: ProcessError,
    },

    #[error("delta directory {} is missing or empty; run prepare-delta first", .path.display())]
    MissingDelta { path: PathBuf },

    #[error("failed to {action} {}: {source}", .path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tool exited 0 without producing the file it was asked for.
    #[error("{step}: expected output {} was not written", .path.display())]
    MissingOutput { step: StepKind, path: PathBuf },

    #[error("invalid {name} value '{value}'")]
    InvalidOption { name: &'static str, value: String },
}

fn exit_label(code: Option<&i32>) -> String {
    code.map_or_else(|| "a signal".to_owned(), |c| format!("code {c}"))
}

impl PipelineError {
    /// The step that failed, when the failure came from a tool.
    #[must_use]
    pub const fn step(&self) -> Option<StepKind> {
        match self {
            Self::StepFailed { step, .. }
            | Self::Process { step, .. }
            | Self::MissingOutput { step, .. } => Some(*step),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Process {
                source: ProcessError::TimedOut { .. },
                ..
            }
        )
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline<R> {
    runner: R,
    options: PipelineOptions,
}

impl<R: CommandRunner> Pipeline<R> {
    #[must_use]
    pub const fn new(runner: R, options: PipelineOptions) -> Self {
        Self { runner, options }
    }

    #[must_use]
    pub const fn options(&self) -> &PipelineOptions {
        &self.options
    }

    #[must_use]
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Compute the changes between `HEAD^` and `HEAD` into the delta
    /// directory.
    ///
    /// # Errors
    /// Fails if the directory cannot be created or `sf sgd` fails.
    #[instrument(skip(self), fields(delta_dir = %self.options.delta_dir))]
    pub fn prepare_delta(&self) -> Result<StepOutcome, PipelineError> {
        let step = StepKind::PrepareDelta;
        let out = self.options.delta_path();
        std::fs::create_dir_all(&out).map_err(|source| PipelineError::Io {
            action: "create directory",
            path: out.clone(),
            source,
        })?;

        self.run_checked(
            step,
            self.sf().args([
                "sgd",
                "source",
                "delta",
                "--to",
                "HEAD",
                "--from",
                "HEAD^",
                "--output-dir",
                &format!("{}/", self.options.delta_dir),
                "--generate-delta",
                "--source-dir",
                &self.options.source_dir,
            ]),
        )?;

        let entries = count_entries(&out)?;
        Ok(StepOutcome::completed(format!(
            "{entries} top-level entries in {}",
            self.options.delta_dir
        )))
    }

    /// Scan the delta's Apex classes, writing SARIF results into the delta
    /// directory. Without Apex classes an empty SARIF document is written.
    ///
    /// # Errors
    /// [`PipelineError::MissingDelta`] if there is no delta to scan.
    #[instrument(skip(self))]
    pub fn scan_delta(&self) -> Result<StepOutcome, PipelineError> {
        let step = StepKind::ScanDelta;
        let out = self.require_delta(true)?;
        let sarif = out.join(SARIF_FILE);

        if contains_apex_classes(&out) {
            self.run_checked(
                step,
                Invocation::new("sf").current_dir(&out).args([
                    "scanner",
                    "run",
                    "--format",
                    "sarif",
                    "--target",
                    ".",
                    "--category",
                    "Design",
                    "--category",
                    "Best Practices",
                    "--category",
                    "Performance",
                    "--outfile",
                    SARIF_FILE,
                    "--engine",
                    "pmd",
                ]),
            )?;
            if !sarif.is_file() {
                return Err(PipelineError::MissingOutput { step, path: sarif });
            }
        } else {
            tracing::info!("no Apex classes in delta, writing empty scan results");
            std::fs::write(&sarif, EMPTY_SARIF).map_err(|source| PipelineError::Io {
                action: "write",
                path: sarif.clone(),
                source,
            })?;
        }
        Ok(StepOutcome::completed(sarif.display().to_string()))
    }

    /// Run the Jest suites and coverage.
    ///
    /// # Errors
    /// Fails if either npm script fails.
    #[instrument(skip(self))]
    pub fn run_lwc_tests(&self) -> Result<StepOutcome, PipelineError> {
        let step = StepKind::LwcTests;
        let dir = &self.options.project_dir;
        if !dir.join("jest.config.js").is_file() && !dir.join("package.json").is_file() {
            return Ok(StepOutcome::skipped("no jest.config.js or package.json"));
        }

        self.run_checked(step, self.npm().args(["run", "test:unit"]))?;
        self.run_checked(step, self.npm().args(["run", "test:unit:coverage"]))?;

        let detail = if dir.join(COVERAGE_SUMMARY).is_file() {
            format!("coverage summary at {COVERAGE_SUMMARY}")
        } else {
            "tests passed; no coverage summary produced".to_owned()
        };
        Ok(StepOutcome::completed(detail))
    }

    /// Log in to the org with an SFDX auth URL and make it the default.
    ///
    /// The auth URL is passed on stdin only.
    ///
    /// # Errors
    /// Fails if login or the follow-up `sf org display` fails.
    #[instrument(skip(self, auth_url), fields(alias = %self.options.alias))]
    pub fn login(&self, auth_url: &Credential) -> Result<StepOutcome, PipelineError> {
        let step = StepKind::Login;
        let alias = &self.options.alias;
        self.run_checked(
            step,
            self.sf()
                .args([
                    "org",
                    "login",
                    "sfdx-url",
                    "--sfdx-url-stdin",
                    "--set-default",
                    "--alias",
                    alias,
                ])
                .stdin_bytes(auth_url.expose()),
        )?;
        self.run_checked(
            step,
            self.sf().args(["org", "display", "--target-org", alias]),
        )?;
        Ok(StepOutcome::completed(format!("logged in as {alias}")))
    }

    /// Validate the delta's additive changes against the org without
    /// deploying.
    ///
    /// # Errors
    /// [`PipelineError::MissingDelta`] without a delta directory, or the
    /// deploy's failure.
    #[instrument(skip(self))]
    pub fn dry_run_deploy(&self) -> Result<StepOutcome, PipelineError> {
        let step = StepKind::DryRunDeploy;
        let out = self.require_delta(false)?;
        if !out.join("force-app").is_dir() {
            return Ok(StepOutcome::skipped("no force-app directory in delta"));
        }

        let source_dir = format!("{}/force-app", self.options.delta_dir);
        let mut deploy = self.sf().args([
            "project",
            "deploy",
            "start",
            "--source-dir",
            &source_dir,
            "--dry-run",
        ]);
        deploy = match &self.options.apex_tests {
            ApexTests::All => deploy.args(["--test-level", "RunLocalTests"]),
            ApexTests::Specified(classes) => deploy.args([
                "--test-level",
                "RunSpecifiedTests",
                "--tests",
                &classes.join(","),
            ]),
        };
        deploy = deploy.args(["--target-org", &self.options.alias, "--json"]);

        self.run_checked(step, deploy)?;
        Ok(StepOutcome::completed("dry-run deploy validated"))
    }

    /// Validate the delta's destructive changes without deleting anything.
    ///
    /// # Errors
    /// [`PipelineError::MissingDelta`] without a delta directory, or the
    /// deploy's failure.
    #[instrument(skip(self))]
    pub fn dry_run_destructive(&self) -> Result<StepOutcome, PipelineError> {
        let step = StepKind::DryRunDestructive;
        let out = self.require_delta(false)?;
        if !out.join(DESTRUCTIVE_MANIFEST).is_file() {
            return Ok(StepOutcome::skipped("no destructive changes in delta"));
        }

        let metadata_dir = format!("{}/{DESTRUCTIVE_DIR}", self.options.delta_dir);
        self.run_checked(
            step,
            self.sf().args([
                "project",
                "deploy",
                "start",
                "--metadata-dir",
                &metadata_dir,
                "--dry-run",
                "--ignore-warnings",
                "--target-org",
                &self.options.alias,
                "--json",
            ]),
        )?;
        Ok(StepOutcome::completed("destructive dry-run validated"))
    }

    /// Run every step in order, stopping at the first failure.
    ///
    /// # Errors
    /// The first step's error.
    #[instrument(skip(self, auth_url))]
    pub fn ci(&self, auth_url: &Credential) -> Result<CiSummary, PipelineError> {
        let mut summary = CiSummary::default();
        summary.push(StepKind::PrepareDelta, self.prepare_delta()?);
        summary.push(StepKind::ScanDelta, self.scan_delta()?);
        let lwc = if self.options.lwc_tests == LwcMode::None {
            StepOutcome::skipped("LWC tests disabled")
        } else {
            self.run_lwc_tests()?
        };
        summary.push(StepKind::LwcTests, lwc);
        summary.push(StepKind::Login, self.login(auth_url)?);
        summary.push(StepKind::DryRunDeploy, self.dry_run_deploy()?);
        summary.push(StepKind::DryRunDestructive, self.dry_run_destructive()?);
        Ok(summary)
    }

    // -- helpers ------------------------------------------------------------

    fn sf(&self) -> Invocation {
        Invocation::new("sf").current_dir(&self.options.project_dir)
    }

    fn npm(&self) -> Invocation {
        Invocation::new("npm").current_dir(&self.options.project_dir)
    }

    fn run_checked(&self, step: StepKind, invocation: Invocation) -> Result<ProcessOutput, PipelineError> {
        let output = self
            .runner
            .run(&invocation)
            .map_err(|source| PipelineError::Process { step, source })?;
        if !output.success() {
            return Err(PipelineError::StepFailed {
                step,
                command: output.command.clone(),
                exit_code: output.exit_code,
                stderr: output.stderr_lossy(),
            });
        }
        Ok(output)
    }

    /// The delta directory, which must exist (and, for a scan, hold files).
    fn require_delta(&self, non_empty: bool) -> Result<PathBuf, PipelineError> {
        let out = self.options.delta_path();
        let missing = || PipelineError::MissingDelta { path: out.clone() };
        if !out.is_dir() {
            return Err(missing());
        }
        if non_empty && count_entries(&out)? == 0 {
            return Err(missing());
        }
        Ok(out)
    }
}

fn count_entries(dir: &Path) -> Result<usize, PipelineError> {
    let entries = std::fs::read_dir(dir).map_err(|source| PipelineError::Io {
        action: "read directory",
        path: dir.to_path_buf(),
        source,
    })?;
    Ok(entries.count())
}

fn contains_apex_classes(dir: &Path) -> bool {
    let pattern = format!("{}/**/*.cls", glob::Pattern::escape(&dir.to_string_lossy()));
    glob::glob(&pattern)
        .map(|mut paths| paths.any(|p| p.is_ok()))
        .unwrap_or(false)
}
