// Fallback used when no plugin clears the detection threshold (spec §4.5).

use crate::model::{ExtractedError, ExtractionMetadata, ExtractionResult};

const ERROR_TOKENS: &[&str] = &["error", "Error", "ERROR", "fail", "Fail", "FAIL", "exception"];
const BANNER_PREFIXES: &[&str] = &["npm warn", "npm notice", "> ", "$ "];

pub fn extract(output: &str, _command: Option<&str>) -> ExtractionResult {
    let tail: Vec<&str> = output
        .lines()
        .filter(|line| {
            let lower = line.to_ascii_lowercase();
            !BANNER_PREFIXES.iter().any(|p| lower.starts_with(p))
        })
        .filter(|line| ERROR_TOKENS.iter().any(|t| line.contains(t)))
        .collect();
    let tail: Vec<&str> = tail.iter().rev().take(40).rev().copied().collect();

    let total_errors = tail.len();
    let errors = tail
        .iter()
        .map(|line| ExtractedError {
            message: line.trim().to_owned(),
            ..Default::default()
        })
        .collect::<Vec<_>>();

    ExtractionResult {
        summary: format!("{total_errors} error-like line(s) (unrecognized tool output)"),
        total_errors,
        errors,
        guidance: None,
        error_summary: tail.join("\n"),
        metadata: ExtractionMetadata {
            confidence: 0,
            completeness: 0,
            issues: vec!["no extractor recognized this output".to_owned()],
            suggestions: None,
            detection: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tails_to_error_like_lines() {
        let output = "building...\nlinking...\nerror: something broke\nfile saved";
        let result = extract(output, None);
        assert_eq!(result.total_errors, 1);
        assert_eq!(result.errors[0].message, "error: something broke");
    }

    #[test]
    fn empty_output_yields_zero_errors() {
        let result = extract("all good, nothing to see", None);
        assert_eq!(result.total_errors, 0);
    }
}
