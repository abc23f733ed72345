//! Git abstraction layer for sfci.
//!
//! This crate defines the [`VersionControlClient`] trait — the single
//! interface through which the promotion workflow interacts with git — and a
//! backend, [`GitCli`], that drives the `git` executable.
//!
//! # Crate layout
//!
//! - [`client`] — the [`VersionControlClient`] trait definition.
//! - [`types`] — value types used in trait signatures ([`WorkingCopy`],
//!   [`ToolHome`], [`MergeResult`], [`CommitSummary`], etc.).
//! - [`error`] — the [`GitError`] enum returned by all trait methods.
//! - [`process`] — deadline-aware subprocess execution, also used for the
//!   other external tools sfci drives.

pub mod client;
pub mod error;
pub mod process;
pub mod types;

mod git_cli;

pub use git_cli::{GitCli, Identity};

pub use client::VersionControlClient;
pub use error::GitError;
pub use process::{Deadline, Invocation, ProcessError, ProcessOutput};
pub use types::{
    CommitSummary, MergeOptions, MergeResult, ORIGIN, Stage, ToolHome, WorkingCopy, remote_ref,
};
