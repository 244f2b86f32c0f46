// Wraps ValidationCache with the ambient output-budget trimming (spec §4.8
// HistoryRecorder).

use crate::cache::ValidationCache;
use crate::model::ValidationRecord;

/// Bytes of captured step output retained per step record before storage;
/// beyond this, output is truncated with a marker so the notes object
/// doesn't balloon (spec §5 resource caps -- git call buffer 10 MiB is the
/// read-side cap, this is the analogous write-side cap for what we choose
/// to persist).
pub const DEFAULT_OUTPUT_BYTE_BUDGET: usize = 64 * 1024;

pub struct HistoryRecorder<'a> {
    cache: ValidationCache<'a>,
    output_byte_budget: usize,
}

impl<'a> HistoryRecorder<'a> {
    pub fn new(cache: ValidationCache<'a>) -> Self {
        Self {
            cache,
            output_byte_budget: DEFAULT_OUTPUT_BYTE_BUDGET,
        }
    }

    pub fn with_output_byte_budget(mut self, bytes: usize) -> Self {
        self.output_byte_budget = bytes;
        self
    }

    pub async fn record(
        &self,
        mut record: ValidationRecord,
        branch: Option<String>,
        head_commit: Option<String>,
        uncommitted_changes: bool,
    ) -> anyhow::Result<()> {
        self.strip_oversized_output(&mut record);
        self.cache.store_validation(record, branch, head_commit, uncommitted_changes).await
    }

    fn strip_oversized_output(&self, record: &mut ValidationRecord) {
        for phase in &mut record.phases {
            for step in &mut phase.steps {
                let Some(extraction) = &mut step.extraction else { continue };
                if extraction.error_summary.len() > self.output_byte_budget {
                    let cut = floor_char_boundary(&extraction.error_summary, self.output_byte_budget);
                    extraction.error_summary.truncate(cut);
                    extraction.error_summary.push_str("\n... [truncated]");
                }
            }
        }
    }
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_utils::TempRepo;
    use crate::model::{ExtractionMetadata, ExtractionResult, PhaseRecord, StepRecord};
    use crate::notes::NotesStore;
    use chrono::Utc;

    fn base_record(error_summary: String) -> ValidationRecord {
        ValidationRecord {
            tree_hash: "abc".into(),
            passed: false,
            timestamp: Utc::now(),
            duration_ms: 1,
            summary: "failed".into(),
            failed_step: Some("build".into()),
            phases: vec![PhaseRecord {
                name: "Build".into(),
                passed: false,
                duration_secs: 1.0,
                steps: vec![StepRecord {
                    name: "build".into(),
                    command: "cargo build".into(),
                    exit_code: Some(1),
                    duration_secs: 1.0,
                    passed: false,
                    extraction: Some(ExtractionResult {
                        summary: "errors".into(),
                        total_errors: 1,
                        errors: vec![],
                        guidance: None,
                        error_summary,
                        metadata: ExtractionMetadata::default(),
                    }),
                }],
            }],
            unstable: false,
            vibe_validate_version: None,
        }
    }

    #[tokio::test]
    async fn truncates_oversized_output() {
        let repo = TempRepo::new().await.unwrap();
        repo.commit("init").await.unwrap();
        let recorder = HistoryRecorder::new(ValidationCache::new(NotesStore::new(&repo.port)))
            .with_output_byte_budget(10);
        let record = base_record("x".repeat(1000));
        recorder.record(record, None, None, false).await.unwrap();

        let cache = ValidationCache::new(NotesStore::new(&repo.port));
        let stored = cache.lookup_validation("abc", false).await.unwrap().unwrap();
        let summary = &stored.phases[0].steps[0].extraction.as_ref().unwrap().error_summary;
        assert!(summary.len() < 1000);
        assert!(summary.ends_with("[truncated]"));
    }

    #[tokio::test]
    async fn leaves_small_output_untouched() {
        let repo = TempRepo::new().await.unwrap();
        repo.commit("init").await.unwrap();
        let recorder = HistoryRecorder::new(ValidationCache::new(NotesStore::new(&repo.port)));
        let record = base_record("short".into());
        recorder.record(record, None, None, false).await.unwrap();

        let cache = ValidationCache::new(NotesStore::new(&repo.port));
        let stored = cache.lookup_validation("abc", false).await.unwrap().unwrap();
        assert_eq!(stored.phases[0].steps[0].extraction.as_ref().unwrap().error_summary, "short");
    }
}
