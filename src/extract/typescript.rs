use regex::Regex;
use std::sync::LazyLock;

use super::{Detection, ExtractorPlugin, Hints};
use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?P<file>[^\s(][^(\n]*)\((?P<line>\d+),(?P<col>\d+)\):\s*(?P<severity>error|warning)\s+(?P<code>TS\d+):\s*(?P<message>.+)$")
        .expect("static regex")
});

pub const PLUGIN: ExtractorPlugin = ExtractorPlugin {
    name: "typescript",
    priority: 95,
    hints: Hints {
        required: &[],
        any_of: &["error TS", "warning TS"],
        forbidden: &[],
    },
    detect,
    extract,
};

fn detect(output: &str) -> Detection {
    if LINE_RE.is_match(output) {
        Detection {
            confidence: 95,
            patterns: vec!["error TS\\d+:".to_owned()],
            reason: "matched TypeScript compiler diagnostic format".to_owned(),
        }
    } else {
        Detection {
            confidence: 0,
            patterns: vec![],
            reason: "no TSxxxx diagnostics found".to_owned(),
        }
    }
}

fn extract(output: &str, _command: Option<&str>) -> ExtractionResult {
    let mut errors = Vec::new();
    let mut with_location = 0usize;
    for caps in LINE_RE.captures_iter(output) {
        with_location += 1;
        errors.push(ExtractedError {
            file: Some(caps["file"].to_owned()),
            line: caps["line"].parse().ok(),
            column: caps["col"].parse().ok(),
            message: caps["message"].trim().to_owned(),
            code: Some(caps["code"].to_owned()),
            severity: Some(caps["severity"].to_owned()),
            ..Default::default()
        });
    }
    let total_errors = errors.len();
    let completeness = if total_errors == 0 {
        100
    } else {
        ((with_location * 100) / total_errors) as u8
    };
    let error_count = errors.iter().filter(|e| e.severity.as_deref() == Some("error")).count();
    let warning_count = total_errors - error_count;

    ExtractionResult {
        summary: format!("{error_count} type error(s), {warning_count} warning(s)"),
        total_errors,
        error_summary: errors
            .iter()
            .map(|e| format!("{}:{}:{} {}", e.file.as_deref().unwrap_or("?"), e.line.unwrap_or(0), e.code.as_deref().unwrap_or(""), e.message))
            .collect::<Vec<_>>()
            .join("\n"),
        errors,
        guidance: None,
        metadata: ExtractionMetadata {
            confidence: 95,
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
    fn extracts_single_diagnostic() {
        let output = "src/x.ts(10,5): error TS2322: Type 'string' is not assignable to type 'number'.";
        let result = extract(output, None);
        assert_eq!(result.total_errors, 1);
        assert_eq!(result.errors[0].file.as_deref(), Some("src/x.ts"));
        assert_eq!(result.errors[0].line, Some(10));
        assert_eq!(result.errors[0].column, Some(5));
        assert_eq!(result.errors[0].code.as_deref(), Some("TS2322"));
    }

    #[test]
    fn counts_errors_and_warnings_separately() {
        let output = "a.ts(1,1): error TS1: bad\nb.ts(2,2): warning TS2: meh\n";
        let result = extract(output, None);
        assert_eq!(result.summary, "1 type error(s), 1 warning(s)");
    }
}
