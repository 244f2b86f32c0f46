// Small extension traits shared by every subprocess invocation in this crate.
// GitPort and CommandRunner both bottom out here so that "run this argv and
// either get an Output or a readable error" is implemented exactly once.

use std::process::Output;

use anyhow::{bail, Context, Result};
use tokio::process::Command;

/// Helpers for a completed process `Output`.
pub trait OutputExt {
    /// Exit code, erroring out if the process was killed by a signal rather
    /// than exiting normally (there's no code to report in that case).
    fn code_not_killed(&self) -> Result<i32>;

    /// Turn a non-zero exit into an error carrying stdout/stderr, otherwise
    /// discard the output.
    fn ok(&self) -> Result<()>;
}

impl OutputExt for Output {
    fn code_not_killed(&self) -> Result<i32> {
        self.status
            .code()
            .ok_or_else(|| anyhow::anyhow!("process was killed by a signal"))
    }

    fn ok(&self) -> Result<()> {
        if self.status.success() {
            return Ok(());
        }
        bail!(
            "exited with {:?}\nstdout:\n{}\nstderr:\n{}",
            self.status.code(),
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr),
        )
    }
}

/// Helpers for an unspawned async `Command`.
pub trait CommandExt {
    /// Spawn, wait, and bail with stdout/stderr attached if the exit status
    /// wasn't success. Use this for "fire and forget, but tell me if it
    /// broke" call sites. Call sites that need to inspect a specific exit
    /// code (e.g. git's "128 means the ref doesn't exist" convention) should
    /// use plain `.output()` instead and interpret the status themselves.
    async fn execute(&mut self) -> Result<Output>;
}

impl CommandExt for Command {
    async fn execute(&mut self) -> Result<Output> {
        let output = self.output().await.context("spawning process")?;
        output.ok()?;
        Ok(output)
    }
}

/// Same contract as `CommandExt`, for synchronous `std::process::Command`.
/// Used only where async isn't available, e.g. inside `Drop` impls.
pub trait SyncCommandExt {
    fn execute(&mut self) -> Result<Output>;
}

impl SyncCommandExt for std::process::Command {
    fn execute(&mut self) -> Result<Output> {
        let output = self.output().context("spawning process")?;
        output.ok()?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn execute_bails_on_nonzero_exit() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo oops >&2; exit 3"]);
        let err = cmd.execute().await.unwrap_err();
        assert!(err.to_string().contains("exited with Some(3)"));
        assert!(err.to_string().contains("oops"));
    }

    #[tokio::test]
    async fn execute_returns_output_on_success() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hi"]);
        let output = cmd.execute().await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hi");
    }

    #[test]
    fn code_not_killed_errors_when_signalled() {
        use std::os::unix::process::ExitStatusExt;
        let status = std::process::ExitStatus::from_raw(9); // killed by SIGKILL-ish encoding
        let output = Output {
            status,
            stdout: vec![],
            stderr: vec![],
        };
        assert!(output.code_not_killed().is_err());
    }
}
