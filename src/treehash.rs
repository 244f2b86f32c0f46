// Composite content fingerprint across the main worktree and any submodules
// (spec "TreeHasher"). Built entirely on top of GitPort -- no git invocations
// of its own.

use std::path::PathBuf;

use anyhow::Context;
use sha2::{Digest, Sha256};

use crate::git::{GitPort, GitTreeHash};

/// A content-addressed fingerprint of the worktree: either the raw git tree
/// object id (no submodules) or a SHA-256 digest composed over the main repo
/// plus every submodule (spec §4.2/§3).
#[derive(Clone, PartialEq, Eq, Debug, Hash)]
pub struct TreeHash(String);

impl TreeHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TreeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct TreeHasher<'a> {
    port: &'a GitPort,
}

impl<'a> TreeHasher<'a> {
    pub fn new(port: &'a GitPort) -> Self {
        Self { port }
    }

    /// Computes the current tree hash. Recurses into submodules if
    /// `.gitmodules` is present; otherwise this is just the main repo's
    /// worktree tree object id.
    pub async fn compute(&self) -> anyhow::Result<TreeHash> {
        let main_hash = self
            .port
            .write_worktree_tree()
            .await
            .context("hashing main worktree")?;

        if !self.port.has_gitmodules() {
            return Ok(TreeHash(main_hash.to_string()));
        }

        let mut pairs: Vec<(String, String)> = vec![(".".to_owned(), main_hash.to_string())];
        for rel in self.port.submodule_paths().await? {
            let sub_root = self.port.root.join(&rel);
            if !sub_root.join(".git").exists() {
                // Uninitialized submodule: nothing to hash, skip it rather
                // than fail the whole pipeline.
                continue;
            }
            let sub_port = GitPort::new(sub_root, self.port.git_binary.clone());
            let sub_hash = Box::pin(TreeHasher::new(&sub_port).compute()).await?;
            pairs.push((path_to_unix(&rel), sub_hash.as_str().to_owned()));
        }
        pairs[1..].sort_by(|a, b| a.0.cmp(&b.0));

        let joined = pairs
            .iter()
            .map(|(path, hash)| format!("{path}:{hash}"))
            .collect::<Vec<_>>()
            .join("\n");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        Ok(TreeHash(hex::encode(hasher.finalize())))
    }

    /// True iff the worktree differs from HEAD's committed tree.
    pub async fn has_working_tree_changes(&self) -> anyhow::Result<bool> {
        let head_tree = self.port.head_tree().await?;
        let current = self.compute().await?;
        Ok(match head_tree {
            Some(head) => head.as_str() != current.as_str(),
            None => true, // no HEAD at all -- everything is "uncommitted"
        })
    }
}

fn path_to_unix(p: &PathBuf) -> String {
    p.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TempRepo;

    #[tokio::test]
    async fn deterministic_across_calls() {
        let repo = TempRepo::new().await.unwrap();
        repo.write_file("a.txt", "hello").unwrap();
        repo.commit("init").await.unwrap();

        let hasher = TreeHasher::new(&repo.port);
        let h1 = hasher.compute().await.unwrap();
        let h2 = hasher.compute().await.unwrap();
        assert_eq!(h1, h2);
    }

    #[tokio::test]
    async fn modifying_and_reverting_restores_hash() {
        let repo = TempRepo::new().await.unwrap();
        repo.write_file("a.txt", "hello").unwrap();
        repo.commit("init").await.unwrap();

        let hasher = TreeHasher::new(&repo.port);
        let original = hasher.compute().await.unwrap();

        repo.write_file("a.txt", "goodbye").unwrap();
        let modified = hasher.compute().await.unwrap();
        assert_ne!(original, modified);

        repo.write_file("a.txt", "hello").unwrap();
        let reverted = hasher.compute().await.unwrap();
        assert_eq!(original, reverted);
    }

    #[tokio::test]
    async fn untracked_file_changes_hash() {
        let repo = TempRepo::new().await.unwrap();
        repo.write_file("a.txt", "hello").unwrap();
        repo.commit("init").await.unwrap();
        let hasher = TreeHasher::new(&repo.port);
        let before = hasher.compute().await.unwrap();

        repo.write_file("untracked.txt", "surprise").unwrap();
        let after = hasher.compute().await.unwrap();
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn has_working_tree_changes_detects_dirt() {
        let repo = TempRepo::new().await.unwrap();
        repo.write_file("a.txt", "hello").unwrap();
        repo.commit("init").await.unwrap();
        let hasher = TreeHasher::new(&repo.port);
        assert!(!hasher.has_working_tree_changes().await.unwrap());

        repo.write_file("a.txt", "changed").unwrap();
        assert!(hasher.has_working_tree_changes().await.unwrap());
    }
}
