// Terminal rendering of a validation record (spec §6 CLI surface). Plain
// enough that it reads correctly both on a tty and redirected to a file.

use std::io::Write;

use colored::Colorize;

use crate::model::ValidationRecord;

pub fn render<W: Write>(out: &mut W, record: &ValidationRecord, cached: bool) -> std::io::Result<()> {
    for phase in &record.phases {
        let phase_mark = if phase.passed { "PASS".green() } else { "FAIL".red() };
        writeln!(out, "{phase_mark} {} ({:.2}s)", phase.name, phase.duration_secs)?;
        for step in &phase.steps {
            let mark = if step.passed { "ok".green() } else { "FAILED".red() };
            writeln!(
                out,
                "  {mark} {} [{}] ({:.2}s)",
                step.name,
                step.command,
                step.duration_secs
            )?;
            if let Some(extraction) = &step.extraction {
                writeln!(out, "    {}", extraction.summary.dimmed())?;
                for err in &extraction.errors {
                    let loc = match (&err.file, err.line) {
                        (Some(f), Some(l)) => format!("{f}:{l}"),
                        (Some(f), None) => f.clone(),
                        _ => String::new(),
                    };
                    if loc.is_empty() {
                        writeln!(out, "      {}", err.message)?;
                    } else {
                        writeln!(out, "      {loc}: {}", err.message)?;
                    }
                }
            }
        }
    }

    let summary_mark = if record.passed { "PASSED".green().bold() } else { "FAILED".red().bold() };
    writeln!(
        out,
        "{summary_mark} {} (cached={cached}, duration={}ms)",
        record.summary, record.duration_ms
    )?;
    if record.unstable {
        writeln!(out, "{}", "warning: working tree changed during the run; result was not cached".yellow())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult, PhaseRecord, StepRecord};
    use chrono::Utc;

    fn sample_record(passed: bool) -> ValidationRecord {
        ValidationRecord {
            tree_hash: "deadbeef".into(),
            passed,
            timestamp: Utc::now(),
            duration_ms: 42,
            summary: if passed { "all steps passed".into() } else { "failed at step build".into() },
            failed_step: if passed { None } else { Some("build".into()) },
            phases: vec![PhaseRecord {
                name: "Build".into(),
                passed,
                duration_secs: 0.5,
                steps: vec![StepRecord {
                    name: "build".into(),
                    command: "cargo build".into(),
                    exit_code: Some(if passed { 0 } else { 1 }),
                    duration_secs: 0.5,
                    passed,
                    extraction: if passed {
                        None
                    } else {
                        Some(ExtractionResult {
                            summary: "1 error".into(),
                            total_errors: 1,
                            errors: vec![ExtractedError {
                                file: Some("src/main.rs".into()),
                                line: Some(3),
                                message: "mismatched types".into(),
                                ..Default::default()
                            }],
                            error_summary: "mismatched types".into(),
                            guidance: None,
                            metadata: ExtractionMetadata::default(),
                        })
                    },
                }],
            }],
            unstable: false,
            vibe_validate_version: None,
        }
    }

    #[test]
    fn renders_passing_run() {
        let mut buf = Vec::new();
        render(&mut buf, &sample_record(true), false).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("PASSED"));
        assert!(text.contains("cached=false"));
    }

    #[test]
    fn renders_failure_with_extraction() {
        let mut buf = Vec::new();
        render(&mut buf, &sample_record(false), true).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("FAILED"));
        assert!(text.contains("src/main.rs:3"));
        assert!(text.contains("cached=true"));
    }
}
