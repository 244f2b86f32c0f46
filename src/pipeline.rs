// Phase/step state machine (spec "PipelineOrchestrator", §4.7).

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::cache::{RunCache, ValidationCache};
use crate::config::{PhaseConfig, StepConfig, ValidationConfig};
use crate::extract;
use crate::git::GitPort;
use crate::model::{ExtractionResult, PhaseRecord, RunRecord, StepRecord, ValidationRecord};
use crate::notes::NotesStore;
use crate::runner::{default_env, parse_argv, resolve_cwd, CommandRunner, RunSpec, DEFAULT_STEP_TIMEOUT};
use crate::treehash::TreeHasher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Pending,
    Running,
    Passed,
    PassedFromCache,
    Failed,
    Skipped,
    TimedOut,
    Cancelled,
}

#[derive(Default, Clone, Copy)]
pub struct RunOptions {
    pub force: bool,
    pub retry_failed: bool,
}

pub struct Outcome {
    pub record: ValidationRecord,
    pub cached: bool,
}

pub struct Orchestrator<'a> {
    port: &'a GitPort,
    config: &'a ValidationConfig,
    cancel: CancellationToken,
}

impl<'a> Orchestrator<'a> {
    pub fn new(port: &'a GitPort, config: &'a ValidationConfig, cancel: CancellationToken) -> Self {
        Self { port, config, cancel }
    }

    pub async fn run(&self, opts: RunOptions) -> anyhow::Result<Outcome> {
        let hasher = TreeHasher::new(self.port);
        let start_hash = hasher.compute().await?;

        let notes = NotesStore::new(self.port);
        let validation_cache = ValidationCache::new(NotesStore::new(self.port));
        let run_cache = RunCache::new(NotesStore::new(self.port));
        let _ = &notes;

        let mut skip_until: Option<(usize, usize)> = None;
        if !opts.force {
            if let Some(cached) = validation_cache
                .lookup_validation(start_hash.as_str(), opts.retry_failed)
                .await?
            {
                return Ok(Outcome { record: cached, cached: true });
            }
            if opts.retry_failed {
                if let Some(previous) = validation_cache.lookup_previous_run(start_hash.as_str()).await? {
                    skip_until = find_failure_point(&previous.result);
                }
            }
        }

        let run_start = Instant::now();
        let mut phase_records = Vec::with_capacity(self.config.phases.len());
        let mut failed_step: Option<String> = None;
        let mut overall_passed = true;
        let mut fail_fast_triggered = false;

        for (phase_idx, phase) in self.config.phases.iter().enumerate() {
            if fail_fast_triggered {
                phase_records.push(skipped_phase(phase));
                continue;
            }
            if self.cancel.is_cancelled() {
                phase_records.push(skipped_phase(phase));
                continue;
            }

            let resume_from_step = match skip_until {
                Some((j, i)) if j == phase_idx => Some(i),
                Some((j, _)) if j > phase_idx => Some(phase.steps.len()), // fully cached
                _ => None,
            };

            let phase_start = Instant::now();
            let (steps, phase_passed, phase_fail_fast) = self
                .run_phase(phase, start_hash.as_str(), resume_from_step, &run_cache)
                .await;

            if !phase_passed {
                overall_passed = false;
                if failed_step.is_none() {
                    failed_step = steps
                        .iter()
                        .find(|s| !s.passed)
                        .map(|s| s.name.clone());
                }
                if phase_fail_fast {
                    fail_fast_triggered = true;
                }
            }

            phase_records.push(PhaseRecord {
                name: phase.name.clone(),
                passed: phase_passed,
                duration_secs: phase_start.elapsed().as_secs_f64(),
                steps,
            });
        }

        let end_hash = hasher.compute().await?;
        let unstable = end_hash != start_hash;
        let cancelled = self.cancel.is_cancelled();

        let record = ValidationRecord {
            tree_hash: start_hash.as_str().to_owned(),
            passed: overall_passed && !cancelled,
            timestamp: Utc::now(),
            duration_ms: run_start.elapsed().as_millis() as u64,
            summary: summarize(overall_passed, &failed_step),
            failed_step,
            phases: phase_records,
            unstable,
            vibe_validate_version: Some(env!("CARGO_PKG_VERSION").to_owned()),
        };

        // Persistence is the caller's job (`HistoryRecorder::record`), which
        // also enforces the output-byte budget; storing here too would
        // double up `HistoryRun` entries and bypass that trimming.
        Ok(Outcome { record, cached: false })
    }

    async fn run_phase(
        &self,
        phase: &PhaseConfig,
        tree_hash: &str,
        resume_from_step: Option<usize>,
        run_cache: &RunCache<'_>,
    ) -> (Vec<StepRecord>, bool, bool) {
        let start = resume_from_step.unwrap_or(0);
        let mut records: Vec<StepRecord> = phase.steps[..start]
            .iter()
            .map(|s| StepRecord {
                name: s.name.clone(),
                command: s.command.clone(),
                exit_code: Some(0),
                duration_secs: 0.0,
                passed: true,
                extraction: None,
            })
            .collect();

        if phase.parallel {
            // Fail-fast cancellation within a parallel phase must not leak
            // into `self.cancel`: that token is also the process-wide
            // Ctrl-C signal, and cancelling it would make a fail-fast
            // failure masquerade as a user-requested abort (wrong exit
            // code). A child token is cancelled transitively by a genuine
            // external cancel, but cancelling it never propagates back up.
            let phase_cancel = self.cancel.child_token();
            let step_meta: HashMap<String, bool> = phase.steps[start..]
                .iter()
                .map(|s| (s.name.clone(), s.continue_on_error))
                .collect();
            let mut handles = Vec::new();
            for step in &phase.steps[start..] {
                if let Some(cached) = try_run_cache(run_cache, tree_hash, step).await {
                    handles.push(tokio::spawn(async move { (cached, None) }));
                    continue;
                }
                let step = step.clone();
                let tree_hash = tree_hash.to_owned();
                let port = self.port.clone();
                let cancel = phase_cancel.clone();
                handles.push(tokio::spawn(async move {
                    run_step(&port, &step, &tree_hash, &cancel).await
                }));
            }
            let mut any_failed = false;
            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                let (record, raw_output) = handle.await.unwrap_or_else(|_| {
                    (
                        StepRecord {
                            name: "<panicked>".to_owned(),
                            command: String::new(),
                            exit_code: None,
                            duration_secs: 0.0,
                            passed: false,
                            extraction: None,
                        },
                        None,
                    )
                });
                if !record.passed && !step_meta.get(&record.name).copied().unwrap_or(false) {
                    any_failed = true;
                    if phase.fail_fast {
                        phase_cancel.cancel();
                    }
                }
                if record.passed && record.exit_code == Some(0) {
                    if let Some(step) = phase.steps[start..].iter().find(|s| s.name == record.name) {
                        store_run_cache(run_cache, tree_hash, step, &record, raw_output.as_deref()).await;
                    }
                }
                results.push(record);
            }
            records.extend(results);
            (records, !any_failed, phase.fail_fast && any_failed)
        } else {
            let mut any_failed = false;
            let mut skip_rest = false;
            for step in &phase.steps[start..] {
                if skip_rest {
                    records.push(StepRecord {
                        name: step.name.clone(),
                        command: step.command.clone(),
                        exit_code: None,
                        duration_secs: 0.0,
                        passed: false,
                        extraction: None,
                    });
                    continue;
                }
                if let Some(cached) = try_run_cache(run_cache, tree_hash, step).await {
                    records.push(cached);
                    continue;
                }
                let (record, raw_output) = run_step(self.port, step, tree_hash, &self.cancel).await;
                if !record.passed && !step.continue_on_error {
                    any_failed = true;
                    if phase.fail_fast {
                        skip_rest = true;
                    }
                }
                if record.passed && record.exit_code == Some(0) {
                    store_run_cache(run_cache, tree_hash, step, &record, raw_output.as_deref()).await;
                }
                records.push(record);
            }
            (records, !any_failed, phase.fail_fast && any_failed)
        }
    }
}

async fn try_run_cache(run_cache: &RunCache<'_>, tree_hash: &str, step: &StepConfig) -> Option<StepRecord> {
    let cwd = step.cwd.clone().unwrap_or_default();
    let cached = run_cache.lookup_run(tree_hash, &step.command, &cwd).await.ok()??;
    Some(StepRecord {
        name: step.name.clone(),
        command: step.command.clone(),
        exit_code: Some(cached.exit_code),
        duration_secs: cached.duration_ms as f64 / 1000.0,
        passed: true,
        extraction: cached.extraction,
    })
}

async fn store_run_cache(
    run_cache: &RunCache<'_>,
    tree_hash: &str,
    step: &StepConfig,
    record: &StepRecord,
    raw_output: Option<&str>,
) {
    let cwd = step.cwd.clone().unwrap_or_default();
    let full_output_file = match raw_output {
        Some(output) => CommandRunner::write_full_output(output)
            .await
            .map(|p| p.display().to_string())
            .ok(),
        None => None,
    };
    let run_record = RunRecord {
        tree_hash: tree_hash.to_owned(),
        command: step.command.clone(),
        workdir: cwd,
        timestamp: Utc::now(),
        exit_code: record.exit_code.unwrap_or(0),
        duration_ms: (record.duration_secs * 1000.0) as u64,
        extraction: record.extraction.clone(),
        full_output_file,
    };
    if let Err(e) = run_cache.store_run(run_record).await {
        log::warn!("failed to persist run cache entry for step {}: {e}", step.name);
    }
}

/// Runs one step. Returns the record plus the raw captured output when a
/// subprocess actually ran (spec §4.6: output is written to a temp file and
/// referenced as `fullOutputFile` regardless of success or failure).
async fn run_step(
    port: &GitPort,
    step: &StepConfig,
    _tree_hash: &str,
    cancel: &CancellationToken,
) -> (StepRecord, Option<String>) {
    if cancel.is_cancelled() {
        return (
            StepRecord {
                name: step.name.clone(),
                command: step.command.clone(),
                exit_code: None,
                duration_secs: 0.0,
                passed: false,
                extraction: None,
            },
            None,
        );
    }
    if let Err(e) = parse_argv(&step.command) {
        return (
            StepRecord {
                name: step.name.clone(),
                command: step.command.clone(),
                exit_code: None,
                duration_secs: 0.0,
                passed: false,
                extraction: Some(extract::auto_detect_and_extract(&e.to_string(), Some(&step.command))),
            },
            None,
        );
    }

    let spec = RunSpec {
        command: step.command.clone(),
        cwd: resolve_cwd(&port.root, step.cwd.as_deref()),
        env: default_env(&step.env, Some(&step.name)),
        timeout: step.timeout_ms.map(Duration::from_millis).unwrap_or(DEFAULT_STEP_TIMEOUT),
    };

    let outcome = CommandRunner::run_cancellable(&spec, cancel).await;

    match outcome {
        Ok(result) if result.cancelled => (
            StepRecord {
                name: step.name.clone(),
                command: step.command.clone(),
                exit_code: None,
                duration_secs: result.duration.as_secs_f64(),
                passed: false,
                extraction: None,
            },
            None,
        ),
        Ok(result) if result.timed_out => (
            StepRecord {
                name: step.name.clone(),
                command: step.command.clone(),
                exit_code: None,
                duration_secs: result.duration.as_secs_f64(),
                passed: false,
                extraction: Some(extract::auto_detect_and_extract(&result.output, Some(&step.command))),
            },
            Some(result.output),
        ),
        Ok(result) => {
            let passed = result.exit_code == Some(0);
            let extraction: Option<ExtractionResult> = if passed {
                None
            } else {
                Some(extract::auto_detect_and_extract(&result.output, Some(&step.command)))
            };
            (
                StepRecord {
                    name: step.name.clone(),
                    command: step.command.clone(),
                    exit_code: result.exit_code,
                    duration_secs: result.duration.as_secs_f64(),
                    passed,
                    extraction,
                },
                Some(result.output),
            )
        }
        Err(e) => (
            StepRecord {
                name: step.name.clone(),
                command: step.command.clone(),
                exit_code: None,
                duration_secs: 0.0,
                passed: false,
                extraction: Some(extract::auto_detect_and_extract(&e.to_string(), Some(&step.command))),
            },
            None,
        ),
    }
}

fn skipped_phase(phase: &PhaseConfig) -> PhaseRecord {
    PhaseRecord {
        name: phase.name.clone(),
        passed: false,
        duration_secs: 0.0,
        steps: phase
            .steps
            .iter()
            .map(|s| StepRecord {
                name: s.name.clone(),
                command: s.command.clone(),
                exit_code: None,
                duration_secs: 0.0,
                passed: false,
                extraction: None,
            })
            .collect(),
    }
}

fn find_failure_point(record: &ValidationRecord) -> Option<(usize, usize)> {
    for (j, phase) in record.phases.iter().enumerate() {
        for (i, step) in phase.steps.iter().enumerate() {
            if !step.passed {
                return Some((j, i));
            }
        }
    }
    None
}

fn summarize(passed: bool, failed_step: &Option<String>) -> String {
    match (passed, failed_step) {
        (true, _) => "all steps passed".to_owned(),
        (false, Some(step)) => format!("failed at step {step}"),
        (false, None) => "pipeline failed".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PhaseConfig, StepConfig, ValidationConfig};
    use crate::git::test_utils::TempRepo;

    fn simple_config(command: &str) -> ValidationConfig {
        ValidationConfig {
            phases: vec![PhaseConfig {
                name: "Test".to_owned(),
                parallel: false,
                fail_fast: true,
                timeout_ms: None,
                steps: vec![StepConfig {
                    name: "T".to_owned(),
                    command: command.to_owned(),
                    cwd: None,
                    env: HashMap::new(),
                    continue_on_error: false,
                    timeout_ms: None,
                }],
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn cache_hit_on_second_run() {
        let repo = TempRepo::new().await.unwrap();
        repo.write_file("a.txt", "x").unwrap();
        repo.commit("init").await.unwrap();

        let config = simple_config("true");
        let orchestrator = Orchestrator::new(&repo.port, &config, CancellationToken::new());
        let first = orchestrator.run(RunOptions::default()).await.unwrap();
        assert!(!first.cached);
        assert!(first.record.passed);

        let second = orchestrator.run(RunOptions::default()).await.unwrap();
        assert!(second.cached);
        assert!(second.record.passed);
    }

    #[tokio::test]
    async fn cache_invalidated_by_untracked_file() {
        let repo = TempRepo::new().await.unwrap();
        repo.write_file("a.txt", "x").unwrap();
        repo.commit("init").await.unwrap();

        let config = simple_config("true");
        let orchestrator = Orchestrator::new(&repo.port, &config, CancellationToken::new());
        orchestrator.run(RunOptions::default()).await.unwrap();

        repo.write_file("new-file.txt", "surprise").unwrap();
        let second = orchestrator.run(RunOptions::default()).await.unwrap();
        assert!(!second.cached);
    }

    #[tokio::test]
    async fn failing_step_marks_pipeline_failed() {
        let repo = TempRepo::new().await.unwrap();
        repo.commit("init").await.unwrap();
        let config = simple_config("false");
        let orchestrator = Orchestrator::new(&repo.port, &config, CancellationToken::new());
        let outcome = orchestrator.run(RunOptions::default()).await.unwrap();
        assert!(!outcome.record.passed);
        assert_eq!(outcome.record.failed_step.as_deref(), Some("T"));
    }

    #[tokio::test]
    async fn parallel_fail_fast_cancels_sibling_steps() {
        let repo = TempRepo::new().await.unwrap();
        repo.commit("init").await.unwrap();
        let config = ValidationConfig {
            phases: vec![PhaseConfig {
                name: "Test".to_owned(),
                parallel: true,
                fail_fast: true,
                timeout_ms: None,
                steps: vec![
                    StepConfig {
                        name: "slow".to_owned(),
                        command: "sleep 5".to_owned(),
                        cwd: None,
                        env: HashMap::new(),
                        continue_on_error: false,
                        timeout_ms: None,
                    },
                    StepConfig {
                        name: "quick-fail".to_owned(),
                        command: "sh -c 'sleep 0.2; false'".to_owned(),
                        cwd: None,
                        env: HashMap::new(),
                        continue_on_error: false,
                        timeout_ms: None,
                    },
                ],
            }],
            ..Default::default()
        };
        let orchestrator = Orchestrator::new(&repo.port, &config, CancellationToken::new());
        let started = Instant::now();
        let outcome = orchestrator.run(RunOptions::default()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!outcome.record.passed);
        let slow = outcome.record.phases[0].steps.iter().find(|s| s.name == "slow").unwrap();
        assert!(!slow.passed);
    }

    #[tokio::test]
    async fn stability_violation_is_not_cached() {
        let repo = TempRepo::new().await.unwrap();
        repo.commit("init").await.unwrap();
        let config = simple_config("sh -c \"echo x > new.txt\"");
        let orchestrator = Orchestrator::new(&repo.port, &config, CancellationToken::new());
        let outcome = orchestrator.run(RunOptions::default()).await.unwrap();
        assert!(outcome.record.unstable);

        let second = orchestrator.run(RunOptions::default()).await.unwrap();
        assert!(!second.cached);
    }
}
