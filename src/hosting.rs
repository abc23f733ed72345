//! Remote hosting (GitHub) authentication and URL resolution.
//!
//! [`RemoteHostingClient`] is the seam the promoter authenticates through;
//! [`GhCli`] implements it with the GitHub CLI.

use sfci_git::{Deadline, Invocation, ProcessError, ToolHome};
use thiserror::Error;
use tracing::instrument;

use crate::request::Credential;

/// Host used when none is configured.
pub const DEFAULT_HOST: &str = "github.com";

/// Environment variables that make `gh` ignore its stored login.
const TOKEN_ENV_VARS: &[&str] = &["GH_TOKEN", "GITHUB_TOKEN", "GH_ENTERPRISE_TOKEN"];

/// Errors from a [`RemoteHostingClient`].
#[derive(Debug, Error)]
pub enum HostError {
    /// The host refused the credential, or could not be reached.
    #[error("{host} rejected the credential: {message}")]
    Rejected { host: String, message: String },

    /// The hosting CLI could not be run.
    #[error(transparent)]
    Process(#[from] ProcessError),
}

impl HostError {
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Process(ProcessError::TimedOut { .. }))
    }
}

/// An authenticated connection to a host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    host: String,
    env: Vec<(String, String)>,
}

impl Session {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            env: Vec::new(),
        }
    }

    /// Attach the environment the login was stored under.
    #[must_use]
    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }
}

/// Hosting operations the promoter depends on.
pub trait RemoteHostingClient {
    /// Log in with `credential`, storing the login only inside `home`.
    ///
    /// # Errors
    /// [`HostError::Rejected`] when the host refuses the credential.
    fn authenticate(
        &self,
        credential: &Credential,
        home: &ToolHome,
        deadline: Deadline,
    ) -> Result<Session, HostError>;

    /// Confirm the session is usable.
    ///
    /// # Errors
    /// [`HostError::Process`] when the check itself cannot run.
    fn verify(&self, session: &Session, deadline: Deadline) -> Result<bool, HostError>;

    /// The URL to clone `repository` from.
    fn clone_url(&self, session: &Session, repository: &str) -> String {
        format!("https://{}/{repository}.git", session.host())
    }

    /// The web URL showing `branch` of `repository`.
    fn browse_url(&self, session: &Session, repository: &str, branch: &str) -> String {
        format!("https://{}/{repository}/tree/{branch}", session.host())
    }
}

// ---------------------------------------------------------------------------
// GhCli
// ---------------------------------------------------------------------------

/// A [`RemoteHostingClient`] backed by the `gh` executable.
///
/// Authentication stores the token in the attempt's [`ToolHome`] and registers
/// gh as git's credential helper there, so later `git clone`/`git push` calls
/// are authenticated without the token ever appearing in argv or a URL. The
/// operator's own gh login and git config are left alone.
#[derive(Clone, Debug)]
pub struct GhCli {
    program: String,
    host: String,
}

impl GhCli {
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            program: "gh".to_owned(),
            host: host.into(),
        }
    }

    /// Use a different gh executable.
    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn invocation(&self, env: &[(String, String)]) -> Invocation {
        TOKEN_ENV_VARS
            .iter()
            .fold(Invocation::new(&self.program), |inv, var| inv.env_remove(*var))
            .env("GH_PROMPT_DISABLED", "1")
            .envs(env.iter().cloned())
    }

    fn rejected(&self, message: String) -> HostError {
        HostError::Rejected {
            host: self.host.clone(),
            message,
        }
    }
}

impl RemoteHostingClient for GhCli {
    #[instrument(skip(self, credential, home, deadline), fields(host = %self.host))]
    fn authenticate(
        &self,
        credential: &Credential,
        home: &ToolHome,
        deadline: Deadline,
    ) -> Result<Session, HostError> {
        let env = home.env();
        let login = self
            .invocation(&env)
            .args(["auth", "login", "--hostname", &self.host, "--with-token"])
            .stdin_bytes(credential.expose())
            .run(deadline)?;
        if !login.success() {
            return Err(self.rejected(login.stderr_lossy()));
        }

        let setup = self
            .invocation(&env)
            .args(["auth", "setup-git", "--hostname", &self.host])
            .run(deadline)?;
        if !setup.success() {
            return Err(self.rejected(format!(
                "could not register git credential helper: {}",
                setup.stderr_lossy()
            )));
        }

        tracing::info!("authenticated");
        Ok(Session::new(&self.host).with_env(env))
    }

    fn verify(&self, session: &Session, deadline: Deadline) -> Result<bool, HostError> {
        let status = self
            .invocation(session.env())
            .args(["auth", "status", "--hostname", session.host()])
            .run(deadline)?;
        Ok(status.success())
    }
}
