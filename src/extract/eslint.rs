use regex::Regex;
use std::sync::LazyLock;

use super::{Detection, ExtractorPlugin, Hints};
use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

static PROBLEM_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?P<line>\d+):(?P<col>\d+)\s+(?P<severity>error|warning)\s+(?P<message>.+?)(?:\s{2,}(?P<rule>[\w-]+(?:/[\w-]+)?))?\s*$")
        .expect("static regex")
});
static FILE_HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^(?P<file>/\S+|\S+\.[jt]sx?)$").expect("static regex"));
static SUMMARY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"✖\s*(?P<total>\d+)\s+problems?").expect("static regex")
});

pub const PLUGIN: ExtractorPlugin = ExtractorPlugin {
    name: "eslint",
    priority: 90,
    hints: Hints {
        required: &[],
        any_of: &["\u{2716}", "problem"],
        forbidden: &[],
    },
    detect,
    extract,
};

fn detect(output: &str) -> Detection {
    if SUMMARY.is_match(output) || PROBLEM_LINE.is_match(output) {
        Detection {
            confidence: 90,
            patterns: vec!["line:col severity message".to_owned()],
            reason: "matched ESLint stylish output".to_owned(),
        }
    } else {
        Detection {
            confidence: 0,
            patterns: vec![],
            reason: "no ESLint-style problem lines".to_owned(),
        }
    }
}

fn extract(output: &str, _command: Option<&str>) -> ExtractionResult {
    let mut errors = Vec::new();
    let mut current_file: Option<String> = None;
    for line in output.lines() {
        if let Some(caps) = FILE_HEADER.captures(line) {
            current_file = Some(caps["file"].to_owned());
            continue;
        }
        if let Some(caps) = PROBLEM_LINE.captures(line) {
            errors.push(ExtractedError {
                file: current_file.clone(),
                line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
                column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
                severity: Some(caps["severity"].to_owned()),
                message: caps["message"].trim().to_owned(),
                code: caps.name("rule").map(|m| m.as_str().to_owned()),
                ..Default::default()
            });
        }
    }
    let total_errors = SUMMARY
        .captures(output)
        .and_then(|c| c["total"].parse().ok())
        .unwrap_or(errors.len());
    let with_location = errors.iter().filter(|e| e.file.is_some() && e.line.is_some()).count();
    let completeness = if errors.is_empty() { 100 } else { ((with_location * 100) / errors.len()) as u8 };

    ExtractionResult {
        summary: format!("{total_errors} lint problem(s)"),
        total_errors: total_errors.max(errors.len()),
        error_summary: errors
            .iter()
            .map(|e| format!("{}:{} {}", e.file.as_deref().unwrap_or("?"), e.line.unwrap_or(0), e.message))
            .collect::<Vec<_>>()
            .join("\n"),
        errors,
        guidance: None,
        metadata: ExtractionMetadata {
            confidence: 90,
            completeness,
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
    fn extracts_problem_with_file_header() {
        let output = "/repo/src/a.js\n  3:1  error  'x' is not defined  no-undef\n\n\u{2716} 1 problem (1 error, 0 warnings)";
        let result = extract(output, None);
        assert_eq!(result.total_errors, 1);
        assert_eq!(result.errors[0].file.as_deref(), Some("/repo/src/a.js"));
        assert_eq!(result.errors[0].line, Some(3));
        assert_eq!(result.errors[0].code.as_deref(), Some("no-undef"));
    }
}
