//! How pipeline steps run external tools.

use sfci_git::{Deadline, Invocation, ProcessError, ProcessOutput};

/// Runs one fully described command and captures its output.
///
/// [`SystemRunner`] spawns real processes; tests substitute a recorder.
pub trait CommandRunner {
    /// # Errors
    /// Returns [`ProcessError`] when the command cannot be run to completion.
    /// A non-zero exit is a successful run with a failing [`ProcessOutput`].
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError>;
}

/// Spawns commands on the host, all under one shared deadline.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemRunner {
    deadline: Deadline,
}

impl SystemRunner {
    #[must_use]
    pub const fn new(deadline: Deadline) -> Self {
        Self { deadline }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ProcessError> {
        invocation.run(self.deadline)
    }
}
