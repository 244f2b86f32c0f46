use regex::Regex;
use std::sync::LazyLock;

use super::{Detection, ExtractorPlugin, Hints};
use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

static FAIL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*\d+\)\s+(?P<file>[\w./-]+\.spec\.ts)(?::\d+)?\s*\u{203a}\s*(?P<test>.+)$")
        .expect("static regex")
});
static SUMMARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?P<failed>\d+) failed").expect("static regex"));

pub const PLUGIN: ExtractorPlugin = ExtractorPlugin {
    name: "playwright",
    priority: 95,
    hints: Hints {
        required: &[".spec.ts"],
        any_of: &["\u{203a}"],
        forbidden: &[],
    },
    detect,
    extract,
};

fn detect(output: &str) -> Detection {
    if FAIL_LINE.is_match(output) {
        Detection {
            confidence: 95,
            patterns: vec![".spec.ts with \u{203a} separator".to_owned()],
            reason: "matched Playwright failure list".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "no Playwright markers".to_owned() }
    }
}

fn extract(output: &str, _command: Option<&str>) -> ExtractionResult {
    let errors: Vec<ExtractedError> = FAIL_LINE
        .captures_iter(output)
        .map(|caps| ExtractedError {
            file: Some(caps["file"].to_owned()),
            message: caps["test"].trim().to_owned(),
            severity: Some("error".to_owned()),
            ..Default::default()
        })
        .collect();
    let total_errors = SUMMARY
        .captures(output)
        .and_then(|c| c["failed"].parse().ok())
        .unwrap_or(errors.len());

    ExtractionResult {
        summary: format!("{total_errors} test(s) failed"),
        total_errors: total_errors.max(errors.len()),
        error_summary: errors
            .iter()
            .map(|e| format!("{}: {}", e.file.as_deref().unwrap_or("?"), e.message))
            .collect::<Vec<_>>()
            .join("\n"),
        errors,
        guidance: None,
        metadata: ExtractionMetadata {
            confidence: 95,
            completeness: 70,
            issues: vec![],
            suggestions: None,
            detection: None,
        },
    }
}
