use regex::Regex;
use std::sync::LazyLock;

use super::{Detection, ExtractorPlugin, Hints};
use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

static TESTCASE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<testcase[^>]*\bname="(?P<name>[^"]*)"[^>]*\bclassname="(?P<class>[^"]*)"[^>]*>.*?<(?P<kind>failure|error)[^>]*\bmessage="(?P<message>[^"]*)"[^>]*/?>"#)
        .expect("static regex")
});
static SELF_CLOSING_SKIP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"<testcase[^>]*/>"#).expect("static regex"));

pub const PLUGIN: ExtractorPlugin = ExtractorPlugin {
    name: "junit",
    priority: 100,
    hints: Hints {
        required: &["<testsuite"],
        any_of: &["<?xml"],
        forbidden: &[],
    },
    detect,
    extract,
};

fn detect(output: &str) -> Detection {
    let trimmed = output.trim_start();
    if trimmed.starts_with("<?xml") && output.contains("<testsuite") {
        Detection {
            confidence: 100,
            patterns: vec!["<?xml header + <testsuite>".to_owned()],
            reason: "matched JUnit XML report".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "not a JUnit XML document".to_owned() }
    }
}

fn extract(output: &str, _command: Option<&str>) -> ExtractionResult {
    let _ = &*SELF_CLOSING_SKIP; // passing testcases are self-closing and simply skipped by TESTCASE's pattern
    let errors: Vec<ExtractedError> = TESTCASE
        .captures_iter(output)
        .map(|caps| ExtractedError {
            file: Some(caps["class"].to_owned()),
            message: format!("{}: {}", caps["name"].to_owned(), unescape_xml(&caps["message"])),
            severity: Some(if &caps["kind"] == "error" { "error" } else { "failure" }.to_owned()),
            ..Default::default()
        })
        .collect();
    let total_errors = errors.len();

    ExtractionResult {
        summary: format!("{total_errors} test case(s) failed"),
        total_errors,
        error_summary: errors.iter().map(|e| e.message.clone()).collect::<Vec<_>>().join("\n"),
        errors,
        guidance: None,
        metadata: ExtractionMetadata {
            confidence: 100,
            completeness: 60,
            issues: vec![],
            suggestions: None,
            detection: None,
        },
    }
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_failing_testcase() {
        let xml = r#"<?xml version="1.0"?>
<testsuite tests="2" failures="1">
  <testcase name="adds" classname="MathTest" time="0.01">
    <failure message="expected 2 but was 3" type="AssertionError">stack trace here</failure>
  </testcase>
  <testcase name="subtracts" classname="MathTest" time="0.01"/>
</testsuite>"#;
        let result = extract(xml, None);
        assert_eq!(result.total_errors, 1);
        assert!(result.errors[0].message.contains("expected 2 but was 3"));
    }
}
