use regex::Regex;
use std::sync::LazyLock;

use super::{Detection, ExtractorPlugin, Hints};
use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

static FAILURE_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\d+\)\s+(?P<message>.+)$").expect("static regex"));

pub const PLUGIN: ExtractorPlugin = ExtractorPlugin {
    name: "jasmine",
    priority: 85,
    hints: Hints {
        required: &["Failures:"],
        any_of: &[],
        forbidden: &[],
    },
    detect,
    extract,
};

fn detect(output: &str) -> Detection {
    if output.contains("Failures:") && FAILURE_ITEM.is_match(output) {
        Detection {
            confidence: 85,
            patterns: vec!["Failures: + numbered list".to_owned()],
            reason: "matched Jasmine failure report".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "no Jasmine markers".to_owned() }
    }
}

fn extract(output: &str, _command: Option<&str>) -> ExtractionResult {
    let errors: Vec<ExtractedError> = FAILURE_ITEM
        .captures_iter(output)
        .map(|caps| ExtractedError {
            message: caps["message"].trim().to_owned(),
            severity: Some("error".to_owned()),
            ..Default::default()
        })
        .collect();
    let total_errors = errors.len();

    ExtractionResult {
        summary: format!("{total_errors} spec(s) failed"),
        total_errors,
        error_summary: errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>().join("\n"),
        errors,
        guidance: None,
        metadata: ExtractionMetadata {
            confidence: 85,
            completeness: 20,
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
    fn extracts_numbered_failures() {
        let output = "Failures:\n1) a spec should pass\n  Expected true to be false.";
        let result = extract(output, None);
        assert_eq!(result.total_errors, 1);
    }
}
