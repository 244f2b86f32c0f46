use regex::Regex;
use std::sync::LazyLock;

use super::{Detection, ExtractorPlugin, Hints};
use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*\u{25cf}\s+(?P<message>.+)$").expect("static regex"));
static SUITES_SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Test Suites:.*?(?P<failed>\d+) failed").expect("static regex"));
static FAIL_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^FAIL\s+(?P<file>\S+)").expect("static regex"));

pub const PLUGIN: ExtractorPlugin = ExtractorPlugin {
    name: "jest",
    priority: 90,
    hints: Hints {
        required: &[],
        any_of: &["\u{25cf}", "Test Suites:"],
        forbidden: &[],
    },
    detect,
    extract,
};

fn detect(output: &str) -> Detection {
    if BULLET.is_match(output) || SUITES_SUMMARY.is_match(output) {
        Detection {
            confidence: 90,
            patterns: vec!["\u{25cf} bullet or Test Suites: summary".to_owned()],
            reason: "matched Jest failure format".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "no Jest markers".to_owned() }
    }
}

fn extract(output: &str, _command: Option<&str>) -> ExtractionResult {
    let current_file = FAIL_HEADER.captures(output).map(|c| c["file"].to_owned());
    let errors: Vec<ExtractedError> = BULLET
        .captures_iter(output)
        .map(|caps| ExtractedError {
            file: current_file.clone(),
            message: caps["message"].trim().to_owned(),
            severity: Some("error".to_owned()),
            ..Default::default()
        })
        .collect();
    let total_errors = SUITES_SUMMARY
        .captures(output)
        .and_then(|c| c["failed"].parse().ok())
        .unwrap_or(errors.len());

    ExtractionResult {
        summary: format!("{total_errors} test suite(s) failed"),
        total_errors: total_errors.max(errors.len()),
        error_summary: errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>().join("\n"),
        errors,
        guidance: None,
        metadata: ExtractionMetadata {
            confidence: 90,
            completeness: if current_file.is_some() { 80 } else { 20 },
            issues: vec![],
            suggestions: None,
            detection: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_bullet_failures() {
        let output = "FAIL src/a.test.js\n  \u{25cf} adds numbers\n\n    expected 2 to be 3\n\nTest Suites: 1 failed, 1 total";
        let result = extract(output, None);
        assert_eq!(result.total_errors, 1);
        assert_eq!(result.errors[0].file.as_deref(), Some("src/a.test.js"));
    }
}
