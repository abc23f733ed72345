//! Promotion state machine.
//!
//! # Lifecycle
//!
//! ```text
//! Init → Authenticated → Cloned → BranchesVerified → PromotionBranchCreated
//!      → MergeAttempted ─┬→ MergeClean → Pushed → DoneSuccess
//!                        └→ MergeConflict → Aborted → DoneConflict
//! ```
//!
//! Fatal errors leave the machine wherever it was; there is no failure state
//! because a failed attempt produces no report.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::time::now_iso8601;

// ---------------------------------------------------------------------------
// PromotionPhase
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPhase {
    Init,
    Authenticated,
    Cloned,
    BranchesVerified,
    PromotionBranchCreated,
    MergeAttempted,
    MergeClean,
    Pushed,
    DoneSuccess,
    MergeConflict,
    Aborted,
    DoneConflict,
}

impl PromotionPhase {
    /// `DoneSuccess` and `DoneConflict` are the only terminal phases.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::DoneSuccess | Self::DoneConflict)
    }

    #[must_use]
    pub const fn valid_transitions(&self) -> &'static [Self] {
        match self {
            Self::Init => &[Self::Authenticated],
            Self::Authenticated => &[Self::Cloned],
            Self::Cloned => &[Self::BranchesVerified],
            Self::BranchesVerified => &[Self::PromotionBranchCreated],
            Self::PromotionBranchCreated => &[Self::MergeAttempted],
            Self::MergeAttempted => &[Self::MergeClean, Self::MergeConflict],
            Self::MergeClean => &[Self::Pushed],
            Self::Pushed => &[Self::DoneSuccess],
            Self::MergeConflict => &[Self::Aborted],
            Self::Aborted => &[Self::DoneConflict],
            Self::DoneSuccess | Self::DoneConflict => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(&self, next: &Self) -> bool {
        self.valid_transitions().contains(next)
    }
}

impl fmt::Display for PromotionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Authenticated => "authenticated",
            Self::Cloned => "cloned",
            Self::BranchesVerified => "branches-verified",
            Self::PromotionBranchCreated => "promotion-branch-created",
            Self::MergeAttempted => "merge-attempted",
            Self::MergeClean => "merge-clean",
            Self::Pushed => "pushed",
            Self::DoneSuccess => "done-success",
            Self::MergeConflict => "merge-conflict",
            Self::Aborted => "aborted",
            Self::DoneConflict => "done-conflict",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Attempt
// ---------------------------------------------------------------------------

/// Tried to move the machine along an edge it does not have.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("invalid promotion transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: PromotionPhase,
    pub to: PromotionPhase,
}

/// The running state of one attempt: current phase plus the operation log.
///
/// Every transition and note is emitted as a tracing event and appended to
/// the log that ends up in `promotion.log`.
#[derive(Debug)]
pub struct Attempt {
    phase: PromotionPhase,
    log: Vec<String>,
}

impl Default for Attempt {
    fn default() -> Self {
        Self::new()
    }
}

impl Attempt {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: PromotionPhase::Init,
            log: Vec::new(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> PromotionPhase {
        self.phase
    }

    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }

    #[must_use]
    pub fn into_log(self) -> Vec<String> {
        self.log
    }

    /// Move to `next`, recording `detail`.
    ///
    /// # Errors
    /// Returns [`InvalidTransition`] if `next` is not reachable from the
    /// current phase; the phase is left unchanged.
    pub fn advance(
        &mut self,
        next: PromotionPhase,
        detail: impl fmt::Display,
    ) -> Result<(), InvalidTransition> {
        if !self.phase.can_transition_to(&next) {
            return Err(InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::info!(from = %self.phase, to = %next, "{detail}");
        self.push_line(&format!("{next}: {detail}"));
        self.phase = next;
        Ok(())
    }

    /// Record a line without changing phase.
    pub fn note(&mut self, detail: impl fmt::Display) {
        tracing::debug!(phase = %self.phase, "{detail}");
        self.push_line(&format!("{}: {detail}", self.phase));
    }

    fn push_line(&mut self, line: &str) {
        self.log.push(format!("[{}] {line}", now_iso8601()));
    }
}
