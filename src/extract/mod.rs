// Registry of tool-specific output parsers (spec "Extractors", §4.5). Each
// plugin is a value -- a `const` descriptor holding plain fn pointers --
// rather than a trait object, per the design note that runtime plugin
// loading is out of scope and a static list is sufficient.

mod eslint;
mod generic;
mod jasmine;
mod jest;
mod junit;
mod maven;
mod mocha;
mod playwright;
mod typescript;
mod vitest;

use crate::model::{DetectionInfo, ExtractionResult};

/// Confidence `detect` must clear before `extract` is invoked.
pub const DETECTION_THRESHOLD: u8 = 70;

#[derive(Debug, Clone, Default)]
pub struct Hints {
    pub required: &'static [&'static str],
    pub any_of: &'static [&'static str],
    pub forbidden: &'static [&'static str],
}

impl Hints {
    /// Cheap substring pre-filter run before the more expensive `detect`.
    fn matches(&self, output: &str) -> bool {
        if self.required.iter().any(|h| !output.contains(h)) {
            return false;
        }
        if !self.any_of.is_empty() && !self.any_of.iter().any(|h| output.contains(h)) {
            return false;
        }
        if self.forbidden.iter().any(|h| output.contains(h)) {
            return false;
        }
        true
    }
}

pub struct Detection {
    pub confidence: u8,
    pub patterns: Vec<String>,
    pub reason: String,
}

pub struct ExtractorPlugin {
    pub name: &'static str,
    pub priority: u32,
    pub hints: Hints,
    pub detect: fn(&str) -> Detection,
    pub extract: fn(&str, Option<&str>) -> ExtractionResult,
}

/// Priority ladder, highest first (spec §4.5 table). Declaration order is
/// the tie-break for equal-confidence detections.
static REGISTRY: &[ExtractorPlugin] = &[
    vitest::PRIMARY,
    junit::PLUGIN,
    typescript::PLUGIN,
    maven::SUREFIRE,
    playwright::PLUGIN,
    eslint::PLUGIN,
    jest::PLUGIN,
    vitest::FALLBACK,
    jasmine::PLUGIN,
    mocha::PLUGIN,
    maven::CHECKSTYLE,
    maven::COMPILER,
];

/// Strips ANSI escapes, then CI-runner log-line prefixes of the shape
/// `<job>\t<step>\t<ISO-timestamp> ` (spec §4.5 "Key extraction edge
/// rules") at a single central point before any plugin or the fallback
/// sees the text.
pub fn normalize_output(raw: &str) -> String {
    let stripped = crate::util::strip_ansi(raw);
    let ci_prefix = regex::Regex::new(
        r"^[^\t\n]+\t[^\t\n]+\t\u{feff}?\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:\d{2})?\s",
    )
    .expect("static regex");
    stripped
        .lines()
        .map(|line| ci_prefix.replace(line, "").into_owned())
        .collect::<Vec<_>>()
        .join("\n")
}

/// If `output` contains a validator-matrix YAML block (delimited by lines of
/// exactly `---`) whose parsed document carries an `extraction` field
/// (top-level or nested under `phases[].steps[].extraction`), returns it
/// verbatim instead of running any plugin (spec §4.5, §9).
fn passthrough_extraction(output: &str) -> Option<ExtractionResult> {
    let lines: Vec<&str> = output.lines().collect();
    let mut separators: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| l.trim_end() == "---")
        .map(|(i, _)| i)
        .collect();
    if separators.is_empty() {
        return None;
    }
    separators.push(lines.len());

    let blocks = separators.windows(2).filter_map(|w| {
        let (start, end) = (w[0] + 1, w[1]);
        (start < end).then(|| lines[start..end].join("\n"))
    });

    for block in blocks {
        let Ok(doc) = serde_yaml::from_str::<serde_yaml::Value>(&block) else {
            continue;
        };
        if let Some(extraction) = doc.get("extraction") {
            if let Ok(result) = serde_yaml::from_value::<ExtractionResult>(extraction.clone()) {
                return Some(result);
            }
        }
        if let Some(phases) = doc.get("phases").and_then(|p| p.as_sequence()) {
            for phase in phases {
                if let Some(steps) = phase.get("steps").and_then(|s| s.as_sequence()) {
                    for step in steps {
                        if let Some(extraction) = step.get("extraction") {
                            if let Ok(result) =
                                serde_yaml::from_value::<ExtractionResult>(extraction.clone())
                            {
                                return Some(result);
                            }
                        }
                    }
                }
            }
        }
    }
    None
}

/// Runs the full pipeline: normalize, check for a pass-through block,
/// otherwise dispatch in priority order to the first plugin whose detection
/// confidence clears `DETECTION_THRESHOLD`, falling back to the generic
/// extractor.
pub fn auto_detect_and_extract(raw_output: &str, command: Option<&str>) -> ExtractionResult {
    let output = normalize_output(raw_output);

    if let Some(result) = passthrough_extraction(&output) {
        return result.capped();
    }

    let mut best: Option<(&ExtractorPlugin, Detection)> = None;
    for plugin in REGISTRY {
        if !plugin.hints.matches(&output) {
            continue;
        }
        let detection = (plugin.detect)(&output);
        if detection.confidence < DETECTION_THRESHOLD {
            continue;
        }
        let keep = match &best {
            None => true,
            Some((_, best_detection)) => detection.confidence > best_detection.confidence,
        };
        if keep {
            best = Some((plugin, detection));
        }
    }

    match best {
        Some((plugin, detection)) => {
            let mut result = (plugin.extract)(&output, command).capped();
            result.metadata.detection = Some(DetectionInfo {
                extractor: plugin.name.to_owned(),
                confidence: detection.confidence,
                patterns: detection.patterns,
                reason: detection.reason,
            });
            result
        }
        None => generic::extract(&output, command).capped(),
    }
}
