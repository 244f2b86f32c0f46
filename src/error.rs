// Error taxonomy for the core. This enum exists so `main.rs` can match on a
// *kind* exactly once to pick an exit code (spec §6); everywhere else in the
// crate propagates with `anyhow::Context` the way the rest of the codebase
// does, only reaching for a concrete `Error` variant at the handful of sites
// that need to preserve the kind across a `?`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("git is not available: {0}")]
    GitUnavailable(String),

    #[error("git exited with code {exit_code}: {stderr}")]
    GitExec {
        exit_code: i32,
        stderr: String,
        stdout: String,
    },

    #[error("step {step} failed with exit code {exit_code:?}")]
    StepFailure { step: String, exit_code: Option<i32> },

    #[error("step {step} timed out after {timeout_ms}ms")]
    StepTimeout { step: String, timeout_ms: u64 },

    #[error("tree hash changed mid-run ({before} -> {after}); result not cached")]
    Unstable { before: String, after: String },

    #[error("cancelled")]
    Cancelled,

    #[error("not a git repository (or any parent up to /)")]
    NotARepo,
}

impl Error {
    /// Exit code this error kind maps to, per spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config { .. } | Error::GitUnavailable(_) | Error::NotARepo => 2,
            Error::GitExec { .. } | Error::StepFailure { .. } | Error::StepTimeout { .. } => 1,
            Error::Unstable { .. } => 0, // the pipeline itself may still have passed
            Error::Cancelled => 130,
        }
    }
}

#[derive(Debug, Error)]
#[error("git note not found")]
pub struct NotFound;

/// Result alias for lookups where "not found" is a normal, non-exceptional
/// outcome rather than an error (spec §9, "exceptions for cache-miss").
pub type NotesResult<T> = Result<Option<T>, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_match_spec_table() {
        assert_eq!(
            Error::Config {
                path: "x".into(),
                message: "bad".into()
            }
            .exit_code(),
            2
        );
        assert_eq!(Error::GitUnavailable("no git".into()).exit_code(), 2);
        assert_eq!(Error::NotARepo.exit_code(), 2);
        assert_eq!(
            Error::GitExec {
                exit_code: 1,
                stderr: String::new(),
                stdout: String::new()
            }
            .exit_code(),
            1
        );
        assert_eq!(Error::Cancelled.exit_code(), 130);
    }
}
