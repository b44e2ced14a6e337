//! Configuration I/O (YAML)
//!
//! ```yaml
//! version: 1
//! preset: fast
//! overrides:
//!   max_call_depth: 8
//! ```

use super::analysis_config::{AnalysisConfig, Preset};
use super::error::{ConfigError, ConfigResult};
use super::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported schema versions
const SUPPORTED_VERSIONS: &[u32] = &[1];

/// YAML Schema v1
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileV1 {
    /// Schema version (always 1 for v1)
    pub version: u32,

    /// Base preset
    pub preset: String,

    /// Fine-grained overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<AnalysisOverrides>,
}

/// Per-field overrides; absent fields keep the preset value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_call_depth: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exhaustive_match_frames: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub solver_step_limit: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_opcodes: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_none_filtering: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_errors: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_bindings_per_variable: Option<usize>,
}

impl AnalysisOverrides {
    fn apply(self, mut config: AnalysisConfig) -> AnalysisConfig {
        if let Some(v) = self.max_call_depth {
            config.max_call_depth = v;
        }
        if let Some(v) = self.exhaustive_match_frames {
            config.exhaustive_match_frames = v;
        }
        if let Some(v) = self.solver_step_limit {
            config.solver_step_limit = v;
        }
        if let Some(v) = self.trace_opcodes {
            config.trace_opcodes = v;
        }
        if let Some(v) = self.strict_none_filtering {
            config.strict_none_filtering = v;
        }
        if let Some(v) = self.report_errors {
            config.report_errors = v;
        }
        if let Some(v) = self.max_bindings_per_variable {
            config.max_bindings_per_variable = v;
        }
        config
    }
}

impl AnalysisConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(content: &str) -> ConfigResult<Self> {
        let file: ConfigFileV1 = serde_yaml::from_str(content)?;

        if !SUPPORTED_VERSIONS.contains(&file.version) {
            return Err(ConfigError::UnsupportedVersion {
                found: file.version,
                supported: SUPPORTED_VERSIONS.to_vec(),
            });
        }

        let preset: Preset = file.preset.parse()?;

        let base = Self::from_preset(preset);
        let config = match file.overrides {
            Some(overrides) => overrides.apply(base),
            None => base,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Export as a `custom` preset with every field overridden
    pub fn to_yaml_string(&self) -> ConfigResult<String> {
        let file = ConfigFileV1 {
            version: 1,
            preset: Preset::Custom.to_string(),
            overrides: Some(AnalysisOverrides {
                max_call_depth: Some(self.max_call_depth),
                exhaustive_match_frames: Some(self.exhaustive_match_frames),
                solver_step_limit: Some(self.solver_step_limit),
                trace_opcodes: Some(self.trace_opcodes),
                strict_none_filtering: Some(self.strict_none_filtering),
                report_errors: Some(self.report_errors),
                max_bindings_per_variable: Some(self.max_bindings_per_variable),
            }),
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}
