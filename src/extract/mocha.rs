use regex::Regex;
use std::sync::LazyLock;

use super::{Detection, ExtractorPlugin, Hints};
use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

static SUMMARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?P<passing>\d+) passing|(?P<failing>\d+) failing").expect("static regex"));
static FAILURE_ITEM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*\d+\)\s+(?P<message>.+)$").expect("static regex"));

pub const PLUGIN: ExtractorPlugin = ExtractorPlugin {
    name: "mocha",
    priority: 80,
    hints: Hints {
        required: &[],
        any_of: &["passing", "failing"],
        forbidden: &[],
    },
    detect,
    extract,
};

fn detect(output: &str) -> Detection {
    if (output.contains("passing") || output.contains("failing")) && FAILURE_ITEM.is_match(output) {
        Detection {
            confidence: 80,
            patterns: vec!["N passing/failing + numbered failures".to_owned()],
            reason: "matched Mocha summary format".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "no Mocha markers".to_owned() }
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
    let failing = output
        .lines()
        .find_map(|l| {
            let caps = SUMMARY.captures(l)?;
            caps.name("failing").map(|m| m.as_str().parse().unwrap_or(0))
        })
        .unwrap_or(errors.len());

    ExtractionResult {
        summary: format!("{failing} test(s) failing"),
        total_errors: failing.max(errors.len()),
        error_summary: errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>().join("\n"),
        errors,
        guidance: None,
        metadata: ExtractionMetadata {
            confidence: 80,
            completeness: 30,
            issues: vec!["Mocha output rarely carries file/line data".to_owned()],
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
        let output = "  2 passing\n  1 failing\n\n  1) adds numbers:\n     AssertionError: expected 2 to equal 3";
        let result = extract(output, None);
        assert_eq!(result.total_errors, 1);
    }
}
