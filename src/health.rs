// O(1)-in-notes-count cache health check (spec §4.8 HealthMonitor).

use chrono::Duration;

use crate::notes::{NotesStore, VALIDATE_REF};

/// Default retention threshold past which the whole namespace is flagged as
/// stale (spec §5 resource caps: "default retention 30 days").
pub const DEFAULT_RETENTION_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub total_notes: usize,
    pub old_notes_count: usize,
}

pub struct HealthMonitor<'a> {
    notes: NotesStore<'a>,
    retention_days: i64,
}

impl<'a> HealthMonitor<'a> {
    pub fn new(notes: NotesStore<'a>) -> Self {
        Self { notes, retention_days: DEFAULT_RETENTION_DAYS }
    }

    pub fn with_retention_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    /// `totalNotes` costs one `git notes list`; `oldNotesCount` is a coarse
    /// all-or-nothing signal from the ref's last-modification timestamp, not
    /// a per-entry scan (spec §4.8: "deliberately coarse... an attention
    /// signal, not a precise age histogram").
    pub async fn check(&self) -> anyhow::Result<HealthReport> {
        let entries = self.notes.list(VALIDATE_REF).await?;
        let total_notes = entries.len();

        let last_modified = self.notes.ref_last_modified_at(VALIDATE_REF).await?;
        let cutoff = chrono::Utc::now() - Duration::days(self.retention_days);
        let old_notes_count = match last_modified {
            Some(ts) if ts < cutoff => total_notes,
            _ => 0,
        };

        Ok(HealthReport { total_notes, old_notes_count })
    }
}
