//! sfci configuration (`.sfci.toml`).
//!
//! Every section and field is optional. A missing file means all defaults;
//! unknown keys are errors so typos do not pass silently.
//!
//! ```toml
//! [hosting]
//! host = "github.com"
//!
//! [promote]
//! remote_url = "/srv/git/app.git"  # clone from here instead of the host
//! artifact_dir = "promotion-artifacts"
//! work_root = "/var/tmp/sfci"
//! timeout_secs = 600
//!
//! [git]
//! user_name = "sfci"
//! user_email = "sfci@localhost"
//!
//! [pipeline]
//! source_dir = "force-app/"
//! delta_dir = "changed-sources"
//! alias = "target-org"
//! apex_tests = "all"
//! lwc_tests = "all"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::hosting::DEFAULT_HOST;

/// Conventional file name, looked up in the current directory.
pub const CONFIG_FILE: &str = ".sfci.toml";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SfciConfig {
    #[serde(default)]
    pub hosting: HostingConfig,

    #[serde(default)]
    pub promote: PromoteConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,
}

// ---------------------------------------------------------------------------
// HostingConfig
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostingConfig {
    /// Git hosting server (default: `"github.com"`).
    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for HostingConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
        }
    }
}

fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

// ---------------------------------------------------------------------------
// PromoteConfig
// ---------------------------------------------------------------------------

/// Branch promotion settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PromoteConfig {
    /// Clone from this URL or path instead of the hosting server.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Where report artifacts are written (default: `"promotion-artifacts"`).
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Parent directory for temporary checkouts (default: system temp dir).
    #[serde(default)]
    pub work_root: Option<PathBuf>,

    /// Overall deadline for one attempt in seconds; 0 disables it
    /// (default: 600).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PromoteConfig {
    fn default() -> Self {
        Self {
            remote_url: None,
            artifact_dir: default_artifact_dir(),
            work_root: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl PromoteConfig {
    /// The configured deadline, `None` when disabled.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        if self.timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.timeout_secs))
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("promotion-artifacts")
}

const fn default_timeout_secs() -> u64 {
    600
}

// ---------------------------------------------------------------------------
// GitConfig
// ---------------------------------------------------------------------------

/// Identity used for the promotion merge commit.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GitConfig {
    #[serde(default = "default_user_name")]
    pub user_name: String,

    #[serde(default = "default_user_email")]
    pub user_email: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            user_email: default_user_email(),
        }
    }
}

fn default_user_name() -> String {
    "sfci".to_owned()
}

fn default_user_email() -> String {
    "sfci@localhost".to_owned()
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

/// Defaults for `sfci pipeline` steps.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Package directory the delta is computed over (default: `"force-app/"`).
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Delta output directory (default: `"changed-sources"`).
    #[serde(default = "default_delta_dir")]
    pub delta_dir: String,

    /// Org alias used for login and deploys (default: `"target-org"`).
    #[serde(default = "default_alias")]
    pub alias: String,

    /// `"all"` or a comma-separated list of Apex test classes.
    #[serde(default = "default_all")]
    pub apex_tests: String,

    /// `"all"`, `"delta"` or `"none"`.
    #[serde(default = "default_all")]
    pub lwc_tests: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            delta_dir: default_delta_dir(),
            alias: default_alias(),
            apex_tests: default_all(),
            lwc_tests: default_all(),
        }
    }
}

fn default_source_dir() -> String {
    "force-app/".to_owned()
}

fn default_delta_dir() -> String {
    "changed-sources".to_owned()
}

fn default_alias() -> String {
    "target-org".to_owned()
}

fn default_all() -> String {
    "all".to_owned()
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error loading a configuration file.
#[derive(Debug, Error)]
#[error("{}", describe(.path.as_deref(), .message))]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

fn describe(path: Option<&Path>, message: &str) -> String {
    match path {
        Some(p) => format!("{}: {message}", p.display()),
        None => format!("config error: {message}"),
    }
}

impl SfciConfig {
    /// Load configuration from a TOML file. A missing file yields defaults.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML or unknown fields.
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = SfciConfig::default();
        assert_eq!(cfg.hosting.host, "github.com");
        assert_eq!(cfg.promote.remote_url, None);
        assert_eq!(cfg.promote.artifact_dir, PathBuf::from("promotion-artifacts"));
        assert_eq!(cfg.promote.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(cfg.git.user_name, "sfci");
        assert_eq!(cfg.pipeline.source_dir, "force-app/");
        assert_eq!(cfg.pipeline.delta_dir, "changed-sources");
        assert_eq!(cfg.pipeline.alias, "target-org");
        assert_eq!(cfg.pipeline.apex_tests, "all");
        assert_eq!(cfg.pipeline.lwc_tests, "all");
    }

    #[test]
    fn empty_string_is_defaults() {
        assert_eq!(SfciConfig::parse("").unwrap(), SfciConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = SfciConfig::parse(
            r#"
[hosting]
host = "github.example.com"

[promote]
timeout_secs = 0
work_root = "/var/tmp/sfci"

[pipeline]
apex_tests = "AccountTest,ContactTest"
"#,
        )
        .unwrap();
        assert_eq!(cfg.hosting.host, "github.example.com");
        assert_eq!(cfg.promote.timeout(), None);
        assert_eq!(cfg.promote.work_root, Some(PathBuf::from("/var/tmp/sfci")));
        assert_eq!(cfg.promote.artifact_dir, PathBuf::from("promotion-artifacts"));
        assert_eq!(cfg.pipeline.apex_tests, "AccountTest,ContactTest");
        assert_eq!(cfg.pipeline.alias, "target-org");
        assert_eq!(cfg.git, GitConfig::default());
    }

    #[test]
    fn unknown_field_reports_line() {
        let err = SfciConfig::parse("[promote]\ntimeout_secs = 5\nremote = \"x\"\n").unwrap_err();
        assert!(err.message.contains("line 3"), "{}", err.message);
        assert!(err.to_string().starts_with("config error:"));
    }

    #[test]
    fn unknown_section_is_rejected() {
        assert!(SfciConfig::parse("[deploy]\nfoo = 1\n").is_err());
    }

    #[test]
    fn missing_file_is_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = SfciConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(cfg, SfciConfig::default());
    }

    #[test]
    fn load_error_names_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[git]\nuser_name = 3\n").unwrap();
        let err = SfciConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(err.to_string().contains(".sfci.toml"));
    }
}
