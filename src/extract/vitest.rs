use regex::Regex;
use std::sync::LazyLock;

use super::{Detection, ExtractorPlugin, Hints};
use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

static RUN_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"RUN v\d+\.\d+").expect("static regex"));
static FAIL_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:FAIL|×|\u{d7})\s+(?P<file>\S+)\s*(?:>\s*(?P<test>.+))?$").expect("static regex")
});
static SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Tests\s+(?P<failed>\d+)\s+failed").expect("static regex"));

pub const PRIMARY: ExtractorPlugin = ExtractorPlugin {
    name: "vitest",
    priority: 100,
    hints: Hints {
        required: &[],
        any_of: &["RUN v"],
        forbidden: &[],
    },
    detect: detect_primary,
    extract,
};

pub const FALLBACK: ExtractorPlugin = ExtractorPlugin {
    name: "vitest-fallback",
    priority: 90,
    hints: Hints {
        required: &["Test Files"],
        any_of: &["FAIL", "\u{d7}", "failed"],
        forbidden: &[],
    },
    detect: detect_fallback,
    extract,
};

fn detect_primary(output: &str) -> Detection {
    if RUN_HEADER.is_match(output) {
        Detection {
            confidence: 100,
            patterns: vec!["RUN v\\d+\\.\\d+".to_owned()],
            reason: "matched Vitest run banner".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "no Vitest banner".to_owned() }
    }
}

fn detect_fallback(output: &str) -> Detection {
    if output.contains("Test Files") && (output.contains("FAIL") || output.contains('\u{d7}')) {
        Detection {
            confidence: 80,
            patterns: vec!["Test Files".to_owned()],
            reason: "matched Vitest summary without run banner".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "no Vitest summary".to_owned() }
    }
}

fn extract(output: &str, _command: Option<&str>) -> ExtractionResult {
    let errors: Vec<ExtractedError> = FAIL_LINE
        .captures_iter(output)
        .map(|caps| ExtractedError {
            file: Some(caps["file"].to_owned()),
            message: caps
                .name("test")
                .map(|m| m.as_str().trim().to_owned())
                .unwrap_or_else(|| "test failed".to_owned()),
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
            completeness: 50,
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
    fn extracts_failed_suite() {
        let output = "\n RUN v1.4.0\n\n \u{d7} src/a.test.ts > adds numbers\n\n Tests  1 failed\n";
        let result = extract(output, None);
        assert_eq!(result.total_errors, 1);
        assert_eq!(result.errors[0].file.as_deref(), Some("src/a.test.ts"));
    }
}
