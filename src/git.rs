// Sole owner of subprocess invocations to `git` (spec §4.1). No other module
// in this crate is permitted to spawn `git` directly -- that's what makes
// command injection a non-issue here rather than something every caller has
// to remember to think about.

use core::fmt;
use core::fmt::{Debug, Display};
use std::ffi::{OsStr, OsString};
use std::ops::Deref;
use std::os::unix::ffi::OsStrExt as _;
use std::path::PathBuf;
use std::process::Output;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use tokio::process::Command;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::time::timeout;

use crate::process::{CommandExt as _, OutputExt as _};

/// Default per-invocation timeout (spec §5: "default git timeout 30s").
pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(30);

static COMMAND_SEM: LazyLock<Semaphore> = LazyLock::new(|| Semaphore::new(64));

/// An opaque content identifier, e.g. a commit or tree object id.
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct Hash(String);

impl Hash {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<OsStr> for Hash {
    fn as_ref(&self) -> &OsStr {
        OsStr::from_bytes(self.0.as_bytes())
    }
}

impl AsRef<str> for Hash {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct CommitHash(Hash);

impl CommitHash {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Hash::new(s))
    }
}

impl Deref for CommitHash {
    type Target = Hash;
    fn deref(&self) -> &Hash {
        &self.0
    }
}

impl Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct GitTreeHash(Hash);

impl GitTreeHash {
    pub fn new(s: impl Into<String>) -> Self {
        Self(Hash::new(s))
    }
}

impl Deref for GitTreeHash {
    type Target = Hash;
    fn deref(&self) -> &Hash {
        &self.0
    }
}

impl Display for GitTreeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Argv validation (spec §4.1)
// ---------------------------------------------------------------------------

const FORBIDDEN_REF_CHARS: &[char] = &[
    ';', '&', '|', '`', '$', '(', ')', '{', '}', '[', ']', '<', '>', '!', '\\', '"',
];

/// Validates a caller-supplied identifier before it's used as argv to `git`.
/// Refs must be non-empty, not start with `-` (so they can't be mistaken for
/// a flag), and free of shell metacharacters, `..`, `//`, null bytes and
/// newlines, even though we never pass through a shell -- a malformed ref is
/// a bug regardless, and this catches it close to the source.
pub fn validate_ref(r: &str) -> anyhow::Result<()> {
    if r.is_empty() {
        bail!("ref must not be empty");
    }
    if r.starts_with('-') {
        bail!("ref must not start with '-': {r:?}");
    }
    if r.contains("..") {
        bail!("ref must not contain '..': {r:?}");
    }
    if r.contains("//") {
        bail!("ref must not contain '//': {r:?}");
    }
    if r.bytes().any(|b| b == 0) {
        bail!("ref must not contain null bytes: {r:?}");
    }
    if r.contains('\n') {
        bail!("ref must not contain newlines: {r:?}");
    }
    if r.contains(FORBIDDEN_REF_CHARS) {
        bail!("ref contains forbidden characters: {r:?}");
    }
    Ok(())
}

/// Tree hashes must look like `[0-9a-f]{4,40}`.
pub fn validate_tree_hash(h: &str) -> anyhow::Result<()> {
    if h.len() < 4 || h.len() > 40 {
        bail!("tree hash has invalid length: {h:?}");
    }
    if !h.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
        bail!("tree hash contains non-hex characters: {h:?}");
    }
    Ok(())
}

/// Notes refs inherit ref rules and additionally forbid whitespace.
pub fn validate_notes_ref(r: &str) -> anyhow::Result<()> {
    validate_ref(r)?;
    if r.chars().any(char::is_whitespace) {
        bail!("notes ref must not contain whitespace: {r:?}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// GitPort
// ---------------------------------------------------------------------------

/// A handle for a worktree plus the `git` binary to run for it. This is the
/// only type in the crate allowed to spawn `git`.
#[derive(Debug, Clone)]
pub struct GitPort {
    pub root: PathBuf,
    pub git_binary: PathBuf,
}

/// Thin wrapper around a `Command` that holds a semaphore permit for the
/// process's lifetime, bounding how many `git` children we have open at once
/// (protects against fd exhaustion when a pipeline fans out widely).
struct GitCommand {
    _permit: SemaphorePermit<'static>,
    command: Command,
}

impl GitCommand {
    fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        self.command.arg(arg);
        self
    }

    fn env(&mut self, key: impl AsRef<OsStr>, val: impl AsRef<OsStr>) -> &mut Self {
        self.command.env(key, val);
        self
    }

    async fn execute(&mut self) -> anyhow::Result<Output> {
        let out = run_with_timeout(&mut self.command, DEFAULT_GIT_TIMEOUT).await?;
        out.ok()?;
        Ok(out)
    }

    /// Like `execute`, but doesn't bail on non-zero exit -- for callers that
    /// need to interpret a specific exit code themselves (e.g. git's
    /// convention of exiting 128 for "no such ref").
    async fn output(&mut self) -> anyhow::Result<Output> {
        run_with_timeout(&mut self.command, DEFAULT_GIT_TIMEOUT).await
    }
}

async fn run_with_timeout(command: &mut Command, dur: Duration) -> anyhow::Result<Output> {
    match timeout(dur, command.output()).await {
        Ok(res) => res.context("spawning git"),
        Err(_) => bail!("git command timed out after {:?}", dur),
    }
}

impl GitPort {
    pub fn new(root: impl Into<PathBuf>, git_binary: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            git_binary: git_binary.into(),
        }
    }

    /// Walk upward from the current directory looking for `.git`, per spec
    /// §6 ("subdirectory invocation must walk upward").
    pub fn discover(git_binary: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let git_binary = git_binary.into();
        let mut dir = std::env::current_dir().context("getting cwd")?;
        loop {
            if dir.join(".git").exists() {
                return Ok(Self::new(dir, git_binary));
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => bail!(crate::error::Error::NotARepo),
            }
        }
    }

    fn git<I, S>(&self, args: I) -> GitCommand
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.git_binary);
        cmd.current_dir(&self.root);
        cmd.args(args);
        // A separate process group means the child doesn't inherit SIGINT
        // from the user's terminal; cancellation is driven explicitly.
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            cmd.process_group(0);
        }
        GitCommand {
            _permit: COMMAND_SEM.try_acquire().unwrap_or_else(|_| {
                // Semaphore starts at 64 permits and is never exhausted in
                // practice outside of pathological fan-out; block briefly
                // rather than fail the call.
                futures::executor::block_on(COMMAND_SEM.acquire()).expect("semaphore closed")
            }),
            command: cmd,
        }
    }

    // -- rev-parse derivatives --------------------------------------------

    pub async fn is_repo(&self) -> bool {
        self.git(["rev-parse", "--is-inside-work-tree"])
            .execute()
            .await
            .is_ok()
    }

    pub async fn root_dir(&self) -> anyhow::Result<PathBuf> {
        let out = self
            .git(["rev-parse", "--show-toplevel"])
            .execute()
            .await
            .context("'git rev-parse --show-toplevel' failed")?;
        Ok(PathBuf::from(trimmed(&out.stdout)?))
    }

    pub async fn git_dir(&self) -> anyhow::Result<PathBuf> {
        let out = self
            .git(["rev-parse", "--git-dir"])
            .execute()
            .await
            .context("'git rev-parse --git-dir' failed")?;
        Ok(self.root.join(trimmed(&out.stdout)?))
    }

    pub async fn current_branch(&self) -> anyhow::Result<Option<String>> {
        let out = self
            .git(["branch", "--show-current"])
            .execute()
            .await
            .context("'git branch --show-current' failed")?;
        let branch = trimmed(&out.stdout)?;
        Ok(if branch.is_empty() { None } else { Some(branch) })
    }

    pub async fn head_commit(&self) -> anyhow::Result<Option<CommitHash>> {
        self.verify_ref("HEAD").await
    }

    pub async fn head_tree(&self) -> anyhow::Result<Option<GitTreeHash>> {
        let out = self.git(["rev-parse", "HEAD^{tree}"]).output().await?;
        if out.code_not_killed()? != 0 {
            return Ok(None);
        }
        Ok(Some(GitTreeHash::new(trimmed(&out.stdout)?)))
    }

    /// Resolve a revspec to a commit hash, or `None` if it doesn't exist.
    pub async fn verify_ref(&self, rev_spec: &str) -> anyhow::Result<Option<CommitHash>> {
        validate_ref(rev_spec)?;
        let out = self
            .git(["rev-parse", "--verify", "-q"])
            .arg(rev_spec)
            .output()
            .await
            .context("'git rev-parse --verify' failed")?;
        let code = out.code_not_killed()?;
        if code == 1 {
            return Ok(None);
        }
        if code != 0 {
            bail!(
                "'git rev-parse --verify {rev_spec}' failed: {}",
                String::from_utf8_lossy(&out.stderr)
            );
        }
        Ok(Some(CommitHash::new(trimmed(&out.stdout)?)))
    }

    // -- index / tree-hash primitives (spec §4.2) --------------------------

    pub async fn ls_files_all(&self) -> anyhow::Result<Vec<PathBuf>> {
        let out = self
            .git(["ls-files", "-z", "--cached", "--others", "--exclude-standard"])
            .execute()
            .await
            .context("'git ls-files' failed")?;
        Ok(split_nul_paths(&out.stdout))
    }

    /// Writes a tree object from a private, throwaway index containing every
    /// tracked and non-ignored untracked file, without touching the user's
    /// real index. Returns the tree object id.
    pub async fn write_worktree_tree(&self) -> anyhow::Result<GitTreeHash> {
        let index_dir = tempfile::tempdir().context("creating temp index dir")?;
        let index_path = index_dir.path().join("index");

        // Seed the temp index from HEAD when it exists so files unchanged
        // since HEAD don't need re-hashing; `add --all` below layers in
        // everything the worktree actually has on top of that.
        if self.head_commit().await?.is_some() {
            self.git(["read-tree", "HEAD"])
                .env("GIT_INDEX_FILE", &index_path)
                .execute()
                .await
                .context("seeding temp index from HEAD")?;
        }

        self.git(["add", "--all", "--force", "."])
            .env("GIT_INDEX_FILE", &index_path)
            .execute()
            .await
            .context("adding worktree content to temp index")?;

        let out = self
            .git(["write-tree"])
            .env("GIT_INDEX_FILE", &index_path)
            .execute()
            .await
            .context("'git write-tree' failed")?;
        Ok(GitTreeHash::new(trimmed(&out.stdout)?))
    }

    // -- submodules ---------------------------------------------------------

    pub fn has_gitmodules(&self) -> bool {
        self.root.join(".gitmodules").exists()
    }

    /// Relative paths of direct submodules, in the order `git submodule
    /// status` reports them (not recursive -- recursion happens by
    /// constructing a `GitPort` rooted at each submodule and recursing).
    pub async fn submodule_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
        if !self.has_gitmodules() {
            return Ok(vec![]);
        }
        let out = self
            .git(["submodule", "status"])
            .execute()
            .await
            .context("'git submodule status' failed")?;
        let text = String::from_utf8(out.stdout).context("non-utf8 submodule status")?;
        let mut paths = Vec::new();
        for line in text.lines() {
            let line = line.trim_start_matches(['-', '+', 'U', ' ']);
            let mut parts = line.split_whitespace();
            let _sha = parts.next();
            if let Some(path) = parts.next() {
                paths.push(PathBuf::from(path));
            }
        }
        Ok(paths)
    }

    // -- notes (spec §4.3) ---------------------------------------------------
    //
    // Notes are attached to a git object, but our cache keys (tree hashes,
    // percent-encoded command strings) aren't guaranteed to resolve to a
    // real object -- a submodule-composite tree hash is a SHA-256 digest,
    // not a git object id at all. So every key is first written as a blob
    // via `hash-object -w`, which is deterministic and content-addressed:
    // the same key string always produces the same blob id, and the
    // original key is always recoverable with `cat-file -p` for listing.

    async fn blob_for_key(&self, key: &str) -> anyhow::Result<Hash> {
        use std::process::Stdio;
        use tokio::io::AsyncWriteExt as _;

        let mut cmd = self.git(["hash-object", "-w", "--stdin"]);
        cmd.command.stdin(Stdio::piped());
        let mut child = cmd.command.spawn().context("spawning 'git hash-object'")?;
        child
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(key.as_bytes())
            .await
            .context("writing key blob")?;
        let output = child
            .wait_with_output()
            .await
            .context("waiting for 'git hash-object'")?;
        output.ok().context("'git hash-object' failed")?;
        Ok(Hash::new(trimmed(&output.stdout)?))
    }

    pub async fn notes_add(&self, notes_ref: &str, key: &str, content: &str) -> anyhow::Result<()> {
        validate_notes_ref(notes_ref)?;
        if key.bytes().any(|b| b == 0) {
            bail!("note key must not contain null bytes");
        }
        use std::process::Stdio;
        use tokio::io::AsyncWriteExt as _;

        let object = self.blob_for_key(key).await?;
        let mut cmd = self.git([
            "notes",
            &format!("--ref={notes_ref}"),
            "add",
            "-f",
            "-F",
            "-",
        ]);
        cmd.arg(&object);
        cmd.command.stdin(Stdio::piped());
        let mut child = cmd.command.spawn().context("spawning 'git notes add'")?;
        child
            .stdin
            .take()
            .expect("stdin was piped")
            .write_all(content.as_bytes())
            .await
            .context("writing note content")?;
        let output = child
            .wait_with_output()
            .await
            .context("waiting for 'git notes add'")?;
        output.ok().context("'git notes add' failed")?;
        Ok(())
    }

    pub async fn notes_show(&self, notes_ref: &str, key: &str) -> anyhow::Result<Option<String>> {
        validate_notes_ref(notes_ref)?;
        let object = self.blob_for_key(key).await?;
        let out = self
            .git(["notes", &format!("--ref={notes_ref}"), "show"])
            .arg(&object)
            .output()
            .await
            .context("'git notes show' failed to spawn")?;
        if !out.status.success() {
            // Non-zero overwhelmingly means "no note on that key", a normal
            // cache miss rather than an error worth surfacing.
            return Ok(None);
        }
        String::from_utf8(out.stdout)
            .context("note content is not utf-8")
            .map(Some)
    }

    pub async fn notes_remove(&self, notes_ref: &str, key: &str) -> anyhow::Result<()> {
        validate_notes_ref(notes_ref)?;
        let object = self.blob_for_key(key).await?;
        self.git([
            "notes",
            &format!("--ref={notes_ref}"),
            "remove",
            "--ignore-missing",
        ])
        .arg(&object)
        .execute()
        .await
        .context("'git notes remove' failed")?;
        Ok(())
    }

    /// Ordered `(object_sha, key)` pairs, without reading note content. The
    /// original key text is recovered from the blob each object sha points
    /// at (see `blob_for_key`), one `cat-file` per entry.
    pub async fn notes_list(&self, notes_ref: &str) -> anyhow::Result<Vec<(String, String)>> {
        validate_notes_ref(notes_ref)?;
        let out = self
            .git(["notes", &format!("--ref={notes_ref}"), "list"])
            .output()
            .await
            .context("'git notes list' failed to spawn")?;
        if !out.status.success() {
            // No notes ref yet -- empty namespace.
            return Ok(vec![]);
        }
        let text = String::from_utf8(out.stdout).context("notes list is not utf-8")?;
        let mut result = Vec::new();
        for line in text.lines() {
            let mut parts = line.split_whitespace();
            let Some(_note_sha) = parts.next() else { continue };
            let Some(object_sha) = parts.next() else { continue };
            let key_out = self
                .git(["cat-file", "-p"])
                .arg(object_sha)
                .execute()
                .await
                .with_context(|| format!("recovering note key for object {object_sha}"))?;
            let key = String::from_utf8(key_out.stdout).context("note key is not utf-8")?;
            result.push((object_sha.to_owned(), key));
        }
        Ok(result)
    }

    pub async fn for_each_ref(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        validate_ref(prefix)?;
        let out = self
            .git(["for-each-ref", "--format=%(refname)"])
            .arg(prefix)
            .execute()
            .await
            .context("'git for-each-ref' failed")?;
        Ok(String::from_utf8(out.stdout)
            .context("for-each-ref output is not utf-8")?
            .lines()
            .map(str::to_owned)
            .collect())
    }

    pub async fn has_ref(&self, r: &str) -> anyhow::Result<bool> {
        validate_ref(r)?;
        let out = self
            .git(["show-ref", "--verify", "--quiet"])
            .arg(r)
            .output()
            .await
            .context("'git show-ref' failed to spawn")?;
        Ok(out.status.success())
    }

    pub async fn ref_last_modified_at(
        &self,
        r: &str,
    ) -> anyhow::Result<Option<chrono::DateTime<chrono::Utc>>> {
        validate_ref(r)?;
        if !self.has_ref(r).await? {
            return Ok(None);
        }
        let out = self
            .git(["log", "-1", "--format=%aI"])
            .arg(r)
            .execute()
            .await
            .context("'git log -1' failed")?;
        let s = trimmed(&out.stdout)?;
        if s.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            chrono::DateTime::parse_from_rfc3339(&s)
                .with_context(|| format!("parsing git timestamp {s:?}"))?
                .with_timezone(&chrono::Utc),
        ))
    }

    pub async fn rev_list_count(&self, range_spec: &str) -> anyhow::Result<usize> {
        validate_ref(range_spec)?;
        let out = self
            .git(["rev-list", "--count"])
            .arg(range_spec)
            .execute()
            .await
            .context("'git rev-list --count' failed")?;
        trimmed(&out.stdout)?
            .parse()
            .context("parsing rev-list --count output")
    }

    pub async fn diff_numstat(
        &self,
        range_spec: &str,
    ) -> anyhow::Result<Vec<(usize, usize, PathBuf)>> {
        validate_ref(range_spec)?;
        let out = self
            .git(["diff", "--numstat"])
            .arg(range_spec)
            .execute()
            .await
            .context("'git diff --numstat' failed")?;
        let text = String::from_utf8(out.stdout).context("diff --numstat output is not utf-8")?;
        Ok(text
            .lines()
            .map(|line| {
                let mut parts = line.splitn(3, '\t');
                let added = parts.next().unwrap_or("0").parse().unwrap_or(0);
                let removed = parts.next().unwrap_or("0").parse().unwrap_or(0);
                let path = PathBuf::from(parts.next().unwrap_or(""));
                (added, removed, path)
            })
            .collect())
    }
}

fn trimmed(bytes: &[u8]) -> anyhow::Result<String> {
    Ok(String::from_utf8(bytes.to_vec())
        .context("git output is not utf-8")?
        .trim()
        .to_owned())
}

fn split_nul_paths(bytes: &[u8]) -> Vec<PathBuf> {
    bytes
        .split(|&b| b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| PathBuf::from(OsString::from(OsStr::from_bytes(chunk))))
        .collect()
}

/// Fixture used by this crate's own unit tests and by `tests/` integration
/// tests; not gated behind `cfg(test)` since integration tests link the
/// library as an ordinary dependency and can't see test-only items.
#[doc(hidden)]
pub mod test_utils {
    use super::*;
    use crate::process::SyncCommandExt as _;

    pub struct TempRepo {
        pub dir: tempfile::TempDir,
        pub port: GitPort,
    }

    impl TempRepo {
        pub async fn new() -> anyhow::Result<Self> {
            let dir = tempfile::TempDir::with_prefix("vv-fixture-").context("mkdtemp")?;
            let port = GitPort::new(dir.path(), "git");
            std::process::Command::new("git")
                .current_dir(dir.path())
                .args(["init", "-q"])
                .execute()?;
            std::process::Command::new("git")
                .current_dir(dir.path())
                .args(["config", "user.name", "test"])
                .execute()?;
            std::process::Command::new("git")
                .current_dir(dir.path())
                .args(["config", "user.email", "test@test"])
                .execute()?;
            Ok(Self { dir, port })
        }

        pub async fn commit(&self, message: &str) -> anyhow::Result<CommitHash> {
            self.port
                .git(["commit", "--allow-empty", "-m"])
                .arg(message)
                .execute()
                .await
                .context("git commit")?;
            self.port
                .head_commit()
                .await?
                .ok_or_else(|| anyhow!("no HEAD after commit"))
        }

        pub fn write_file(&self, relpath: &str, content: &str) -> anyhow::Result<()> {
            let full = self.port.root.join(relpath);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(full, content)?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_ref_rejects_dangerous_strings() {
        assert!(validate_ref("").is_err());
        assert!(validate_ref("-x").is_err());
        assert!(validate_ref("a;b").is_err());
        assert!(validate_ref("a&&b").is_err());
        assert!(validate_ref("$(rm -rf /)").is_err());
        assert!(validate_ref("a..b").is_err());
        assert!(validate_ref("a//b").is_err());
        assert!(validate_ref("a\nb").is_err());
        assert!(validate_ref("a\0b").is_err());
        assert!(validate_ref("main").is_ok());
        assert!(validate_ref("refs/heads/feature/x").is_ok());
    }

    #[test]
    fn validate_tree_hash_requires_hex() {
        assert!(validate_tree_hash("abc").is_err()); // too short
        assert!(validate_tree_hash("zzzzzzzz").is_err()); // non-hex
        assert!(validate_tree_hash("deadbeef").is_ok());
        assert!(validate_tree_hash(&"a".repeat(40)).is_ok());
        assert!(validate_tree_hash(&"a".repeat(41)).is_err());
    }

    #[test]
    fn validate_notes_ref_forbids_whitespace() {
        assert!(validate_notes_ref("refs/notes/vibe-validate/validate").is_ok());
        assert!(validate_notes_ref("refs/notes/has space").is_err());
    }

    #[tokio::test]
    async fn discover_and_basic_ops_on_fresh_repo() {
        let repo = test_utils::TempRepo::new().await.unwrap();
        assert!(repo.port.is_repo().await);
        assert_eq!(repo.port.head_commit().await.unwrap(), None);
        repo.commit("first").await.unwrap();
        assert!(repo.port.head_commit().await.unwrap().is_some());
        assert!(repo.port.head_tree().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn notes_roundtrip() {
        let repo = test_utils::TempRepo::new().await.unwrap();
        repo.commit("first").await.unwrap();
        let notes_ref = "refs/notes/vibe-validate/validate";
        assert_eq!(
            repo.port.notes_show(notes_ref, "deadbeef").await.unwrap(),
            None
        );
        repo.port
            .notes_add(notes_ref, "deadbeef", "hello: world\n")
            .await
            .unwrap();
        assert_eq!(
            repo.port.notes_show(notes_ref, "deadbeef").await.unwrap(),
            Some("hello: world\n".to_owned())
        );
        let listed = repo.port.notes_list(notes_ref).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1, "deadbeef");
        repo.port.notes_remove(notes_ref, "deadbeef").await.unwrap();
        assert_eq!(
            repo.port.notes_show(notes_ref, "deadbeef").await.unwrap(),
            None
        );
    }
}
