//! Errors raised while loading or checking an [`AnalysisConfig`](super::AnalysisConfig)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric knob outside its accepted bounds
    #[error("{field} = {value} is outside {min}..={max} ({hint})")]
    Range {
        field: &'static str,
        value: usize,
        min: usize,
        max: usize,
        hint: &'static str,
    },

    #[error("config file version {found} cannot be read (this build reads {})", join_versions(supported))]
    UnsupportedVersion { found: u32, supported: Vec<u32> },

    #[error("unknown preset '{0}' (expected fast, balanced, thorough or custom)")]
    UnknownPreset(String),

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Knob combinations that pass their individual bounds but not together
    #[error("inconsistent config: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

fn join_versions(versions: &[u32]) -> String {
    versions
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
