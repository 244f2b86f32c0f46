// Wire/storage types (spec §3). Field declaration order matches the tables
// in the spec so serde_yaml's order-preserving output stays stable and
// human-diffable across runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hard cap on how many structured errors an extractor reports directly;
/// `totalErrors` may exceed this (spec §3, §5: "max errors per extraction 10").
pub const MAX_ERRORS_IN_ARRAY: usize = 10;

/// Default number of runs retained per tree hash in a `HistoryNote`.
pub const DEFAULT_MAX_RUNS_PER_TREE: usize = 10;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionInfo {
    pub extractor: String,
    pub confidence: u8,
    pub patterns: Vec<String>,
    pub reason: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionMetadata {
    pub confidence: u8,
    pub completeness: u8,
    pub issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detection: Option<DetectionInfo>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub summary: String,
    pub total_errors: usize,
    pub errors: Vec<ExtractedError>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    pub error_summary: String,
    pub metadata: ExtractionMetadata,
}

impl ExtractionResult {
    /// Enforces the `errors.len() <= min(totalErrors, MAX_ERRORS_IN_ARRAY)`
    /// invariant (spec §3) by truncating if a plugin over-produced.
    pub fn capped(mut self) -> Self {
        let cap = self.total_errors.min(MAX_ERRORS_IN_ARRAY);
        self.errors.truncate(cap);
        self
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    pub name: String,
    pub command: String,
    pub exit_code: Option<i32>,
    pub duration_secs: f64,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionResult>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhaseRecord {
    pub name: String,
    pub passed: bool,
    pub duration_secs: f64,
    pub steps: Vec<StepRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub tree_hash: String,
    pub passed: bool,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    pub phases: Vec<PhaseRecord>,
    /// True when the tree hash changed between the start and end of the
    /// run; an unstable record is reported but never written to the cache.
    #[serde(default)]
    pub unstable: bool,
    /// Crate version that produced this record; ignored on read if absent
    /// or from a different version (forward-compatible, best-effort field).
    #[serde(default)]
    pub vibe_validate_version: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRun {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head_commit: Option<String>,
    pub uncommitted_changes: bool,
    pub result: ValidationRecord,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryNote {
    pub tree_hash: String,
    pub runs: Vec<HistoryRun>,
}

impl HistoryNote {
    /// The record consulted for cache lookups: the most recently appended
    /// run (newest-first ordering, spec §4.4 store contract).
    pub fn latest(&self) -> Option<&HistoryRun> {
        self.runs.first()
    }

    /// Prepends `run`, then prunes to `max_runs`, discarding the oldest
    /// (spec §9: "on any write, prune to cap, discarding oldest").
    pub fn push(&mut self, run: HistoryRun, max_runs: usize) {
        self.runs.insert(0, run);
        self.runs.truncate(max_runs);
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub tree_hash: String,
    /// Original, human-readable command text (pre-normalization); the cache
    /// *key* uses the normalized form, stored here only for display.
    pub command: String,
    pub workdir: String,
    pub timestamp: DateTime<Utc>,
    pub exit_code: i32,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extraction: Option<ExtractionResult>,
    /// Path to the full captured output, written by `CommandRunner` (spec
    /// §4.6: "output may be written to a temp path and the path returned as
    /// `fullOutputFile`"). Never truncated, unlike `extraction.errorSummary`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_output_file: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_result_capped_enforces_invariant() {
        let result = ExtractionResult {
            total_errors: 3,
            errors: vec![ExtractedError::default(); 10],
            ..Default::default()
        }
        .capped();
        assert_eq!(result.errors.len(), 3);

        let result = ExtractionResult {
            total_errors: 100,
            errors: vec![ExtractedError::default(); 10],
            ..Default::default()
        }
        .capped();
        assert_eq!(result.errors.len(), MAX_ERRORS_IN_ARRAY);
    }

    #[test]
    fn history_note_push_prunes_oldest() {
        let mut note = HistoryNote {
            tree_hash: "abc".into(),
            runs: vec![],
        };
        for i in 0..15 {
            note.push(
                HistoryRun {
                    id: i.to_string(),
                    timestamp: Utc::now(),
                    duration_ms: 0,
                    passed: true,
                    branch: None,
                    head_commit: None,
                    uncommitted_changes: false,
                    result: ValidationRecord {
                        tree_hash: "abc".into(),
                        passed: true,
                        timestamp: Utc::now(),
                        duration_ms: 0,
                        summary: String::new(),
                        failed_step: None,
                        phases: vec![],
                        unstable: false,
                        vibe_validate_version: None,
                    },
                },
                DEFAULT_MAX_RUNS_PER_TREE,
            );
        }
        assert_eq!(note.runs.len(), DEFAULT_MAX_RUNS_PER_TREE);
        // newest-first: the most recently pushed id is "14", oldest retained is "5".
        assert_eq!(note.latest().unwrap().id, "14");
        assert_eq!(note.runs.last().unwrap().id, "5");
    }

    #[test]
    fn serde_round_trip_validation_record() {
        let record = ValidationRecord {
            tree_hash: "deadbeef".into(),
            passed: false,
            timestamp: Utc::now(),
            duration_ms: 123,
            summary: "1 step failed".into(),
            failed_step: Some("build".into()),
            phases: vec![PhaseRecord {
                name: "Build".into(),
                passed: false,
                duration_secs: 1.5,
                steps: vec![StepRecord {
                    name: "build".into(),
                    command: "cargo build".into(),
                    exit_code: Some(1),
                    duration_secs: 1.5,
                    passed: false,
                    extraction: None,
                }],
            }],
            unstable: false,
            vibe_validate_version: Some("0.1.0".into()),
        };
        let yaml = serde_yaml::to_string(&record).unwrap();
        assert!(yaml.contains("treeHash: deadbeef"));
        let decoded: ValidationRecord = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(decoded, record);
    }
}
