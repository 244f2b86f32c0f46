use regex::Regex;
use std::sync::LazyLock;

use super::{Detection, ExtractorPlugin, Hints};
use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

static FAILURE_TEST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?P<test>[\w.]+)\s+Time elapsed.*?<<< FAILURE!\s*$").expect("static regex")
});
static TESTS_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Tests run: (?P<run>\d+), Failures: (?P<failures>\d+), Errors: (?P<errors>\d+)")
        .expect("static regex")
});

pub const SUREFIRE: ExtractorPlugin = ExtractorPlugin {
    name: "maven-surefire",
    priority: 95,
    hints: Hints {
        required: &["[ERROR]"],
        any_of: &["<<< FAILURE!", "Tests run:"],
        forbidden: &[],
    },
    detect: detect_surefire,
    extract: extract_surefire,
};

fn detect_surefire(output: &str) -> Detection {
    if output.contains("[ERROR] Tests run:") && output.contains("<<< FAILURE!") {
        Detection {
            confidence: 95,
            patterns: vec!["[ERROR] Tests run: + <<< FAILURE!".to_owned()],
            reason: "matched Maven Surefire/Failsafe failure report".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "no Surefire failure markers".to_owned() }
    }
}

fn extract_surefire(output: &str, _command: Option<&str>) -> ExtractionResult {
    let errors: Vec<ExtractedError> = FAILURE_TEST
        .captures_iter(output)
        .map(|caps| ExtractedError {
            file: Some(caps["test"].to_owned()),
            message: "test failed".to_owned(),
            severity: Some("error".to_owned()),
            ..Default::default()
        })
        .collect();
    let total_errors = TESTS_RUN
        .captures(output)
        .map(|c| {
            c["failures"].parse::<usize>().unwrap_or(0) + c["errors"].parse::<usize>().unwrap_or(0)
        })
        .unwrap_or(errors.len());

    ExtractionResult {
        summary: format!("{total_errors} test failure(s)/error(s)"),
        total_errors: total_errors.max(errors.len()),
        error_summary: errors.iter().map(|e| e.file.clone().unwrap_or_default()).collect::<Vec<_>>().join("\n"),
        errors,
        guidance: None,
        metadata: ExtractionMetadata {
            confidence: 95,
            completeness: 40,
            issues: vec![],
            suggestions: None,
            detection: None,
        },
    }
}

pub const CHECKSTYLE: ExtractorPlugin = ExtractorPlugin {
    name: "maven-checkstyle",
    priority: 70,
    hints: Hints {
        required: &["checkstyle"],
        any_of: &["[ERROR]", "[WARN]"],
        forbidden: &[],
    },
    detect: detect_checkstyle,
    extract: extract_plugin_lines,
};

pub const COMPILER: ExtractorPlugin = ExtractorPlugin {
    name: "maven-compiler",
    priority: 70,
    hints: Hints {
        required: &["maven-compiler-plugin"],
        any_of: &["[ERROR]"],
        forbidden: &[],
    },
    detect: detect_compiler,
    extract: extract_plugin_lines,
};

static PLUGIN_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\[(?:ERROR|WARN)\]\s+(?P<file>[^:\[\]]+):\[(?P<line>\d+)(?:,(?P<col>\d+))?\]\s+(?P<message>.+)$")
        .expect("static regex")
});

fn detect_checkstyle(output: &str) -> Detection {
    if output.contains("checkstyle") && PLUGIN_LINE.is_match(output) {
        Detection {
            confidence: 70,
            patterns: vec!["maven-checkstyle-plugin marker".to_owned()],
            reason: "matched Checkstyle plugin output".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "no Checkstyle markers".to_owned() }
    }
}

fn detect_compiler(output: &str) -> Detection {
    if output.contains("maven-compiler-plugin") && PLUGIN_LINE.is_match(output) {
        Detection {
            confidence: 70,
            patterns: vec!["maven-compiler-plugin marker".to_owned()],
            reason: "matched Compiler plugin output".to_owned(),
        }
    } else {
        Detection { confidence: 0, patterns: vec![], reason: "no Compiler plugin markers".to_owned() }
    }
}

fn extract_plugin_lines(output: &str, _command: Option<&str>) -> ExtractionResult {
    let errors: Vec<ExtractedError> = PLUGIN_LINE
        .captures_iter(output)
        .map(|caps| ExtractedError {
            file: Some(caps["file"].trim().to_owned()),
            line: caps.name("line").and_then(|m| m.as_str().parse().ok()),
            column: caps.name("col").and_then(|m| m.as_str().parse().ok()),
            message: caps["message"].trim().to_owned(),
            ..Default::default()
        })
        .collect();
    let total_errors = errors.len();

    ExtractionResult {
        summary: format!("{total_errors} plugin diagnostic(s)"),
        total_errors,
        error_summary: errors
            .iter()
            .map(|e| format!("{}:{} {}", e.file.as_deref().unwrap_or("?"), e.line.unwrap_or(0), e.message))
            .collect::<Vec<_>>()
            .join("\n"),
        errors,
        guidance: None,
        metadata: ExtractionMetadata {
            confidence: 70,
            completeness: 90,
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
    fn extracts_surefire_failure() {
        let output = "[ERROR] Tests run: 3, Failures: 1, Errors: 0, Skipped: 0\ncom.example.MathTest  Time elapsed: 0.01 s  <<< FAILURE!";
        let result = extract_surefire(output, None);
        assert_eq!(result.total_errors, 1);
    }

    #[test]
    fn extracts_compiler_diagnostic() {
        let output = "[ERROR] /repo/src/Main.java:[10,5] cannot find symbol (maven-compiler-plugin)";
        let result = extract_plugin_lines(output, None);
        assert_eq!(result.total_errors, 1);
        assert_eq!(result.errors[0].line, Some(10));
    }
}
