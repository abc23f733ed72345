//! Process exit codes.

/// Exit code for a promotion that stopped on merge conflicts.
pub const CONFLICT: i32 = 2;

/// Error carrying a specific exit code. `main` exits with it silently; the
/// command has already printed its output.
#[derive(Debug)]
pub struct ExitCodeError(pub i32);

impl std::fmt::Display for ExitCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "command exited with code {}", self.0)
    }
}

impl std::error::Error for ExitCodeError {}
