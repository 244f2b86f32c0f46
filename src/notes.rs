// Typed key/value layer over `git notes` on a private ref namespace (spec
// "NotesStore"). Everything here is UTF-8 YAML in, UTF-8 YAML out; git
// subprocess mechanics live entirely in `GitPort`.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::git::GitPort;

pub const VALIDATE_REF: &str = "refs/notes/vibe-validate/validate";
pub const RUN_REF_PREFIX: &str = "refs/notes/vibe-validate/run";

pub struct NotesStore<'a> {
    port: &'a GitPort,
}

impl<'a> NotesStore<'a> {
    pub fn new(port: &'a GitPort) -> Self {
        Self { port }
    }

    /// Writes `value` as YAML under `key`, overwriting any prior note.
    /// Failures here are surfaced to the caller -- it's the caller's job to
    /// decide whether a failed *write* is fatal (spec §7: "git writes for
    /// persistence are best-effort with a single log line on failure").
    pub async fn put<T: Serialize>(&self, notes_ref: &str, key: &str, value: &T) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(value)?;
        self.port.notes_add(notes_ref, key, &yaml).await
    }

    /// Reads and decodes the note at `key`. A missing note, or one that
    /// fails to parse, is treated as a cache miss (`Ok(None)`) rather than
    /// an error -- corruption in an optional cache should never block a run.
    pub async fn get<T: DeserializeOwned>(&self, notes_ref: &str, key: &str) -> anyhow::Result<Option<T>> {
        let Some(raw) = self.port.notes_show(notes_ref, key).await? else {
            return Ok(None);
        };
        match serde_yaml::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("discarding corrupt note {notes_ref}/{key}: {e}");
                Ok(None)
            }
        }
    }

    pub async fn delete(&self, notes_ref: &str, key: &str) -> anyhow::Result<()> {
        self.port.notes_remove(notes_ref, key).await
    }

    /// Ordered `(objectSha, key)` pairs, without reading note content.
    pub async fn list(&self, notes_ref: &str) -> anyhow::Result<Vec<(String, String)>> {
        self.port.notes_list(notes_ref).await
    }

    pub async fn list_refs(&self, prefix: &str) -> anyhow::Result<Vec<String>> {
        self.port.for_each_ref(prefix).await
    }

    pub async fn has_ref(&self, notes_ref: &str) -> anyhow::Result<bool> {
        self.port.has_ref(notes_ref).await
    }

    pub async fn ref_last_modified_at(&self, notes_ref: &str) -> anyhow::Result<Option<DateTime<Utc>>> {
        self.port.ref_last_modified_at(notes_ref).await
    }

    /// Deletes every entry whose note's newest entry is older than `days`.
    /// `newest_timestamp` extracts the instant that should be compared
    /// against the cutoff from a decoded value (callers pass a closure since
    /// this module has no notion of what a history note looks like).
    pub async fn prune_older_than<T, F>(
        &self,
        notes_ref: &str,
        days: i64,
        newest_timestamp: F,
    ) -> anyhow::Result<usize>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> DateTime<Utc>,
    {
        let cutoff = Utc::now() - chrono::Duration::days(days);
        let mut pruned = 0;
        for (_sha, key) in self.list(notes_ref).await? {
            let Some(value): Option<T> = self.get(notes_ref, &key).await? else {
                continue;
            };
            if newest_timestamp(&value) < cutoff {
                self.delete(notes_ref, &key).await?;
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Deletes the entire notes namespace under `notes_ref`.
    pub async fn prune_all(&self, notes_ref: &str) -> anyhow::Result<usize> {
        let entries = self.list(notes_ref).await?;
        for (_sha, key) in &entries {
            self.delete(notes_ref, key).await?;
        }
        Ok(entries.len())
    }
}

/// Percent-encodes a run-cache key body for use as a notes key.
pub fn encode_run_key(normalized: &str) -> String {
    percent_encoding::utf8_percent_encode(normalized, percent_encoding::NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TempRepo;
    use serde::Deserialize;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Dummy {
        value: u32,
        at: DateTime<Utc>,
    }

    #[tokio::test]
    async fn put_get_delete_roundtrip() {
        let repo = TempRepo::new().await.unwrap();
        repo.commit("init").await.unwrap();
        let store = NotesStore::new(&repo.port);
        let val = Dummy {
            value: 42,
            at: Utc::now(),
        };
        assert_eq!(store.get::<Dummy>(VALIDATE_REF, "abc").await.unwrap(), None);
        store.put(VALIDATE_REF, "abc", &val).await.unwrap();
        assert_eq!(store.get::<Dummy>(VALIDATE_REF, "abc").await.unwrap(), Some(val));
        store.delete(VALIDATE_REF, "abc").await.unwrap();
        assert_eq!(store.get::<Dummy>(VALIDATE_REF, "abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_note_is_treated_as_miss() {
        let repo = TempRepo::new().await.unwrap();
        repo.commit("init").await.unwrap();
        repo.port
            .notes_add(VALIDATE_REF, "abc", "not: [valid yaml for Dummy")
            .await
            .unwrap();
        let store = NotesStore::new(&repo.port);
        assert_eq!(store.get::<Dummy>(VALIDATE_REF, "abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prune_all_clears_namespace() {
        let repo = TempRepo::new().await.unwrap();
        repo.commit("init").await.unwrap();
        let store = NotesStore::new(&repo.port);
        store
            .put(VALIDATE_REF, "a", &Dummy { value: 1, at: Utc::now() })
            .await
            .unwrap();
        store
            .put(VALIDATE_REF, "b", &Dummy { value: 2, at: Utc::now() })
            .await
            .unwrap();
        assert_eq!(store.prune_all(VALIDATE_REF).await.unwrap(), 2);
        assert_eq!(store.list(VALIDATE_REF).await.unwrap().len(), 0);
    }

    #[test]
    fn encode_run_key_is_stable() {
        assert_eq!(encode_run_key("npm test"), "npm%20test");
    }
}
