// Validation config parsing (spec "validation config", §4.7/§6). YAML in,
// strict about unknown fields the way the teacher's TOML config is.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _};
use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub continue_on_error: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "camelCase")]
pub struct PhaseConfig {
    pub name: String,
    #[serde(default)]
    pub parallel: bool,
    #[serde(default = "default_fail_fast")]
    pub fail_fast: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    pub steps: Vec<StepConfig>,
}

fn default_fail_fast() -> bool {
    true
}

#[derive(Deserialize, JsonSchema, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    #[serde(default = "default_max_runs_per_tree")]
    pub max_runs_per_tree: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    #[serde(default)]
    pub phases: Vec<PhaseConfig>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_runs_per_tree: default_max_runs_per_tree(),
            retention_days: default_retention_days(),
            phases: Vec::new(),
        }
    }
}

fn default_max_runs_per_tree() -> usize {
    crate::model::DEFAULT_MAX_RUNS_PER_TREE
}

fn default_retention_days() -> i64 {
    30
}

pub const CONFIG_FILE_NAME: &str = "vibe-validate.config.yaml";

impl ValidationConfig {
    pub fn parse(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml).context("parsing vibe-validate.config.yaml")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen_phases = std::collections::HashSet::new();
        for phase in &self.phases {
            if !seen_phases.insert(&phase.name) {
                bail!("duplicate phase name {:?}", phase.name);
            }
            let mut seen_steps = std::collections::HashSet::new();
            for step in &phase.steps {
                if !seen_steps.insert(&step.name) {
                    bail!("duplicate step name {:?} in phase {:?}", step.name, phase.name);
                }
            }
        }
        Ok(())
    }

    /// Walks upward from `start` looking for the config file alongside a
    /// `.git` directory (spec §6: "subdirectory invocation must walk upward
    /// to find both the config and the `.git` directory").
    pub fn discover(start: &Path) -> anyhow::Result<(Self, PathBuf)> {
        let mut dir = start.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE_NAME);
            if candidate.exists() && dir.join(".git").exists() {
                let yaml = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                return Ok((Self::parse(&yaml)?, candidate));
            }
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => bail!(crate::error::Error::Config {
                    path: start.to_path_buf(),
                    message: format!("no {CONFIG_FILE_NAME} found in {} or any parent directory", start.display()),
                }),
            }
        }
    }
}
