// Spawns a single step command, captures output, and enforces a timeout
// (spec "CommandRunner", §4.6). Cancellation and timeout both go through the
// same terminate-then-kill path: SIGTERM, a grace period, then SIGKILL
// (spec §5: "step cancellation sends terminate, waits up to 5s, then kill").

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use anyhow::Context;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Default per-step timeout when none is configured.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Grace period between SIGTERM and SIGKILL for a step that's timed out or
/// been cancelled (spec §5 default: 5s).
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct RunSpec {
    pub command: String,
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: Option<i32>,
    pub output: String,
    pub duration: Duration,
    pub timed_out: bool,
    pub cancelled: bool,
}

/// Parses a command line POSIX-style: single and double quotes group
/// whitespace, and a backslash escapes only a following quote character or
/// another backslash (so `C:\path\to` on an unquoted Windows-style argument
/// survives unescaped, per spec §4.6).
pub fn parse_argv(command: &str) -> anyhow::Result<Vec<String>> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut has_token = false;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' if !in_double => {
                in_single = !in_single;
                has_token = true;
            }
            '"' if !in_single => {
                in_double = !in_double;
                has_token = true;
            }
            '\\' if !in_single => {
                match chars.peek() {
                    Some('"') | Some('\'') | Some('\\') => {
                        current.push(chars.next().unwrap());
                    }
                    _ => current.push('\\'),
                }
                has_token = true;
            }
            c if c.is_whitespace() && !in_single && !in_double => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if in_single || in_double {
        anyhow::bail!("unterminated quote in command: {command:?}");
    }
    if has_token {
        args.push(current);
    }
    if args.is_empty() {
        anyhow::bail!("empty command");
    }
    Ok(args)
}

pub struct CommandRunner;

impl CommandRunner {
    pub async fn run(spec: &RunSpec) -> anyhow::Result<RunOutcome> {
        Self::run_cancellable(spec, &CancellationToken::new()).await
    }

    pub async fn run_cancellable(spec: &RunSpec, cancel: &CancellationToken) -> anyhow::Result<RunOutcome> {
        let argv = parse_argv(&spec.command)?;
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        cmd.current_dir(&spec.cwd);
        cmd.envs(&spec.env);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            cmd.process_group(0);
        }

        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning step command {:?}", spec.command))?;

        let mut stdout = BufReader::new(child.stdout.take().expect("stdout piped")).lines();
        let mut stderr = BufReader::new(child.stderr.take().expect("stderr piped")).lines();
        let combined = std::sync::Arc::new(tokio::sync::Mutex::new(String::new()));

        let stdout_buf = combined.clone();
        let stdout_task = tokio::spawn(async move {
            while let Ok(Some(line)) = stdout.next_line().await {
                let mut buf = stdout_buf.lock().await;
                buf.push_str(&line);
                buf.push('\n');
            }
        });
        let stderr_buf = combined.clone();
        let stderr_task = tokio::spawn(async move {
            while let Ok(Some(line)) = stderr.next_line().await {
                let mut buf = stderr_buf.lock().await;
                buf.push_str(&line);
                buf.push('\n');
            }
        });

        let (exit_code, timed_out, cancelled) = tokio::select! {
            status = child.wait() => (status.ok().and_then(|s| s.code()), false, false),
            _ = tokio::time::sleep(spec.timeout) => {
                terminate_then_kill(&mut child, DEFAULT_GRACE_PERIOD).await;
                (None, true, false)
            }
            _ = cancel.cancelled() => {
                terminate_then_kill(&mut child, DEFAULT_GRACE_PERIOD).await;
                (None, false, true)
            }
        };
        let _ = tokio::join!(stdout_task, stderr_task);

        let output = std::sync::Arc::try_unwrap(combined)
            .map(|m| m.into_inner())
            .unwrap_or_default();

        Ok(RunOutcome {
            exit_code,
            output,
            duration: start.elapsed(),
            timed_out,
            cancelled,
        })
    }

    /// Writes `output` to a fresh temp file and returns its path, used to
    /// populate `fullOutputFile` on a stored run record (spec §4.6: written
    /// on both success and failure, never truncated).
    pub async fn write_full_output(output: &str) -> anyhow::Result<PathBuf> {
        let dir = std::env::temp_dir().join("vibe-validate-output");
        tokio::fs::create_dir_all(&dir).await.ok();
        let path = dir.join(format!("{}.log", uuid::Uuid::new_v4()));
        let mut file = tokio::fs::File::create(&path).await?;
        file.write_all(output.as_bytes()).await?;
        Ok(path)
    }
}

/// Sends SIGTERM, waits up to `grace` for the child to exit on its own, then
/// SIGKILLs it. Best-effort throughout: a child that's already exited, or a
/// signal that fails to deliver, is not an error worth surfacing here.
async fn terminate_then_kill(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
    #[cfg(not(unix))]
    let _ = child.start_kill();

    if tokio::time::timeout(grace, child.wait()).await.is_err() {
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

pub fn default_env(overrides: &HashMap<String, String>, command_name_override: Option<&str>) -> HashMap<String, String> {
    let mut env = overrides.clone();
    if let Some(name) = command_name_override {
        env.insert("VV_COMMAND_NAME".to_owned(), name.to_owned());
    }
    env
}

pub fn resolve_cwd(base: &Path, cwd: Option<&str>) -> PathBuf {
    match cwd {
        Some(c) => base.join(c),
        None => base.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_argv_splits_on_whitespace() {
        assert_eq!(parse_argv("echo hello world").unwrap(), vec!["echo", "hello", "world"]);
    }

    #[test]
    fn parse_argv_respects_quotes() {
        assert_eq!(
            parse_argv("echo \"hello  world\"").unwrap(),
            vec!["echo", "hello  world"]
        );
        assert_eq!(parse_argv("echo 'a b' c").unwrap(), vec!["echo", "a b", "c"]);
    }

    #[test]
    fn parse_argv_escapes_only_quote_and_backslash() {
        assert_eq!(parse_argv(r#"echo \"x\""#).unwrap(), vec!["echo", "\"x\""]);
        assert_eq!(parse_argv(r"echo C:\path\to").unwrap(), vec!["echo", r"C:\path\to"]);
    }

    #[test]
    fn parse_argv_rejects_unterminated_quotes() {
        assert!(parse_argv("echo \"unterminated").is_err());
    }

    #[tokio::test]
    async fn run_captures_exit_code_and_output() {
        let spec = RunSpec {
            command: "echo hello".to_owned(),
            cwd: std::env::temp_dir(),
            env: HashMap::new(),
            timeout: Duration::from_secs(5),
        };
        let outcome = CommandRunner::run(&spec).await.unwrap();
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.output.contains("hello"));
        assert!(!outcome.timed_out);
        assert!(!outcome.cancelled);
    }

    #[tokio::test]
    async fn run_reports_nonzero_exit() {
        let spec = RunSpec {
            command: "sh -c 'exit 3'".to_owned(),
            cwd: std::env::temp_dir(),
            env: HashMap::new(),
            timeout: Duration::from_secs(5),
        };
        let outcome = CommandRunner::run(&spec).await.unwrap();
        assert_eq!(outcome.exit_code, Some(3));
    }

    #[tokio::test]
    async fn run_times_out() {
        let spec = RunSpec {
            command: "sleep 5".to_owned(),
            cwd: std::env::temp_dir(),
            env: HashMap::new(),
            timeout: Duration::from_millis(100),
        };
        let outcome = CommandRunner::run(&spec).await.unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
    }

    #[tokio::test]
    async fn cancellation_terminates_the_child() {
        let spec = RunSpec {
            command: "sleep 5".to_owned(),
            cwd: std::env::temp_dir(),
            env: HashMap::new(),
            timeout: Duration::from_secs(30),
        };
        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            cancel_clone.cancel();
        });
        let outcome = CommandRunner::run_cancellable(&spec, &cancel).await.unwrap();
        assert!(outcome.cancelled);
        assert!(outcome.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn write_full_output_round_trips_through_a_temp_file() {
        let path = CommandRunner::write_full_output("line one\nline two\n").await.unwrap();
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents, "line one\nline two\n");
    }
}
