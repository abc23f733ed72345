//! Subprocess plumbing shared by the git backend and the CLI tool wrappers.
//!
//! Every external program (`git`, `gh`, `sf`, `npm`) is launched through an
//! [`Invocation`]: arguments are passed as argv (never through a shell), and
//! the process is killed once the caller's [`Deadline`] expires.

use std::fmt;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ---------------------------------------------------------------------------
// Deadline
// ---------------------------------------------------------------------------

/// A wall-clock limit shared by every step of one operation.
///
/// `Deadline::NONE` never expires.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline that never expires.
    pub const NONE: Self = Self { at: None };

    /// A deadline `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now().checked_add(budget),
        }
    }

    /// Time left before expiry, or `None` for an unbounded deadline.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Returns `true` once the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Self::NONE
    }
}

// ---------------------------------------------------------------------------
// ProcessError / ProcessOutput
// ---------------------------------------------------------------------------

/// Failure to run a process to completion.
///
/// A process that ran and exited non-zero is *not* a `ProcessError`; callers
/// inspect [`ProcessOutput::exit_code`] for that.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started (not installed, not executable, ...).
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The deadline expired before the process exited. The process was killed.
    #[error("`{command}` did not finish before the deadline and was killed")]
    TimedOut { command: String },

    /// Feeding stdin or waiting on the child failed.
    #[error("I/O error while running `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished process.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessOutput {
    /// The rendered command line (program + args, stdin never included).
    pub command: String,
    /// Exit code (`None` if killed by a signal).
    pub exit_code: Option<i32>,
    /// Raw stdout bytes.
    pub stdout: Vec<u8>,
    /// Raw stderr bytes.
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Whether the process exited with status 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Stdout decoded lossily as UTF-8.
    #[must_use]
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stderr decoded lossily as UTF-8, trimmed.
    #[must_use]
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_owned()
    }
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

/// A fully described external command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    dir: Option<PathBuf>,
    stdin: Option<Vec<u8>>,
    envs: Vec<(String, String)>,
    env_removals: Vec<String>,
}

impl Invocation {
    /// Start describing a call to `program`.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the program in `dir`.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = Some(dir.into());
        self
    }

    /// Feed `data` to the program's stdin. Stdin content never appears in
    /// logs or error messages, so secrets belong here rather than in argv.
    #[must_use]
    pub fn stdin_bytes(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(data.into());
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.envs
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    #[must_use]
    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_removals.push(key.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Variables set on top of the inherited environment.
    #[must_use]
    pub fn env_vars(&self) -> &[(String, String)] {
        &self.envs
    }

    #[must_use]
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Whether stdin content was attached.
    #[must_use]
    pub const fn has_stdin(&self) -> bool {
        self.stdin.is_some()
    }

    /// Run to completion, killing the process if `deadline` expires first.
    ///
    /// # Errors
    /// Returns [`ProcessError`] if the program cannot be started, stdin
    /// cannot be written, or the deadline expires.
    pub fn run(&self, deadline: Deadline) -> Result<ProcessOutput, ProcessError> {
        let command = self.to_string();
        if deadline.is_expired() {
            return Err(ProcessError::TimedOut { command });
        }

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        for key in &self.env_removals {
            cmd.env_remove(key);
        }
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }

        tracing::debug!(%command, "spawning");
        let mut child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        // Fed from a thread: a child that never reads stdin must not stall
        // us past the deadline.
        let feeder = match (&self.stdin, child.stdin.take()) {
            (Some(data), Some(pipe)) => Some(feed(pipe, data.clone())),
            _ => None,
        };
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let status = wait_with_deadline(&mut child, deadline, &command)?;
        if let Some(source) = feeder.and_then(|rx| rx.try_recv().ok()) {
            return Err(ProcessError::Io { command, source });
        }
        // Grandchildren that inherited the pipes can keep them open after the
        // child exits; the deadline still bounds how long we wait for EOF.
        let stdout = collect(stdout, deadline, &command)?;
        let stderr = collect(stderr, deadline, &command)?;
        let output = ProcessOutput {
            exit_code: status.code(),
            stdout,
            stderr,
            command,
        };
        tracing::debug!(command = %output.command, exit_code = ?output.exit_code, "finished");
        Ok(output)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " {arg:?}")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

fn wait_with_deadline(
    child: &mut Child,
    deadline: Deadline,
    command: &str,
) -> Result<ExitStatus, ProcessError> {
    if deadline.remaining().is_none() {
        return child.wait().map_err(|source| ProcessError::Io {
            command: command.to_owned(),
            source,
        });
    }

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if deadline.is_expired() {
                    let _ = child.kill();
                    let _ = child.wait();
                    tracing::warn!(%command, "killed after deadline expired");
                    // Reader threads are left detached: grandchildren (e.g.
                    // git-remote-https) may still hold the pipes open.
                    return Err(ProcessError::TimedOut {
                        command: command.to_owned(),
                    });
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(source) => {
                return Err(ProcessError::Io {
                    command: command.to_owned(),
                    source,
                });
            }
        }
    }
}

/// Write `data` to the child's stdin and close it. Only a failure other than
/// a broken pipe is sent back; the child may exit without reading its input.
fn feed<W: Write + Send + 'static>(mut pipe: W, data: Vec<u8>) -> Receiver<std::io::Error> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if let Err(err) = pipe.write_all(&data)
            && err.kind() != ErrorKind::BrokenPipe
        {
            let _ = tx.send(err);
        }
    });
    rx
}

/// Read a pipe to EOF on its own thread so a chatty child never blocks on a
/// full pipe buffer while we wait for it.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<Vec<u8>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        let _ = tx.send(buf);
    });
    rx
}

/// Wait for a drained pipe until `deadline`. A reader still blocked at expiry
/// is left detached.
fn collect(
    pipe: Option<Receiver<Vec<u8>>>,
    deadline: Deadline,
    command: &str,
) -> Result<Vec<u8>, ProcessError> {
    let Some(rx) = pipe else {
        return Ok(Vec::new());
    };
    let received = match deadline.remaining() {
        None => rx.recv().ok(),
        Some(left) => match rx.recv_timeout(left) {
            Ok(buf) => Some(buf),
            Err(RecvTimeoutError::Disconnected) => None,
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(%command, "output still open when the deadline expired");
                return Err(ProcessError::TimedOut {
                    command: command.to_owned(),
                });
            }
        },
    };
    Ok(received.unwrap_or_default())
}
