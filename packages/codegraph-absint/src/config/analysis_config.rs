//! Engine configuration
//!
//! One flat struct; every knob bounds cost or toggles an approximation.

use super::error::{ConfigError, ConfigResult};
use super::validation::{check_range, Validatable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named starting point for [`AnalysisConfig::from_preset`]
///
/// `fast` keeps call chains shallow for CI, `thorough` digs deep for audits,
/// `custom` starts from the balanced values and expects YAML overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Fast,
    #[default]
    Balanced,
    Thorough,
    Custom,
}

impl Preset {
    pub const ALL: [Preset; 4] = [Self::Fast, Self::Balanced, Self::Thorough, Self::Custom];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Balanced => "balanced",
            Self::Thorough => "thorough",
            Self::Custom => "custom",
        }
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    /// Case-insensitive
    fn from_str(name: &str) -> ConfigResult<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Abstract interpreter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Maximum number of frames on the call stack (1..=200).
    /// Calls that would exceed it yield an unsolvable result.
    pub max_call_depth: usize,

    /// Match exhaustiveness is only checked while the call stack holds
    /// at most this many frames (0..=max_call_depth+1).
    pub exhaustive_match_frames: usize,

    /// Maximum solver states explored per `has_combination` query
    /// (1..=10_000_000). Exceeding it answers `true`.
    pub solver_step_limit: usize,

    /// Record an opcode trace for every executed instruction
    pub trace_opcodes: bool,

    /// Drop `None` bindings whose provenance cannot reach the current frame
    pub strict_none_filtering: bool,

    /// Queue diagnostics (when false the error log stays empty)
    pub report_errors: bool,

    /// Variables growing beyond this many bindings are widened to unsolvable
    /// (1..=10_000)
    pub max_bindings_per_variable: usize,
}

impl AnalysisConfig {
    /// Build a configuration from a preset
    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::Fast => Self {
                max_call_depth: 6,
                exhaustive_match_frames: 1,
                solver_step_limit: 10_000,
                trace_opcodes: false,
                strict_none_filtering: true,
                report_errors: true,
                max_bindings_per_variable: 32,
            },
            Preset::Balanced | Preset::Custom => Self {
                max_call_depth: 20,
                exhaustive_match_frames: 2,
                solver_step_limit: 100_000,
                trace_opcodes: true,
                strict_none_filtering: true,
                report_errors: true,
                max_bindings_per_variable: 64,
            },
            Preset::Thorough => Self {
                max_call_depth: 40,
                exhaustive_match_frames: 4,
                solver_step_limit: 1_000_000,
                trace_opcodes: true,
                strict_none_filtering: true,
                report_errors: true,
                max_bindings_per_variable: 256,
            },
        }
    }

    /// Builder: Set max_call_depth
    pub fn max_call_depth(mut self, v: usize) -> Self {
        self.max_call_depth = v;
        self
    }

    /// Builder: Set exhaustive_match_frames
    pub fn exhaustive_match_frames(mut self, v: usize) -> Self {
        self.exhaustive_match_frames = v;
        self
    }

    /// Builder: Set solver_step_limit
    pub fn solver_step_limit(mut self, v: usize) -> Self {
        self.solver_step_limit = v;
        self
    }

    /// Builder: Set trace_opcodes
    pub fn trace_opcodes(mut self, v: bool) -> Self {
        self.trace_opcodes = v;
        self
    }

    /// Builder: Set strict_none_filtering
    pub fn strict_none_filtering(mut self, v: bool) -> Self {
        self.strict_none_filtering = v;
        self
    }

    /// Builder: Set report_errors
    pub fn report_errors(mut self, v: bool) -> Self {
        self.report_errors = v;
        self
    }

    /// Builder: Set max_bindings_per_variable
    pub fn max_bindings_per_variable(mut self, v: usize) -> Self {
        self.max_bindings_per_variable = v;
        self
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self::from_preset(Preset::default())
    }
}

impl Validatable for AnalysisConfig {
    fn validate(&self) -> ConfigResult<()> {
        check_range(
            "max_call_depth",
            self.max_call_depth,
            1,
            200,
            "Call stack depth must allow at least the module frame",
        )?;
        check_range(
            "exhaustive_match_frames",
            self.exhaustive_match_frames,
            0,
            self.max_call_depth + 1,
            "Exhaustiveness cannot be checked deeper than the call stack can grow",
        )?;
        check_range(
            "solver_step_limit",
            self.solver_step_limit,
            1,
            10_000_000,
            "Solver budget must be finite",
        )?;
        check_range(
            "max_bindings_per_variable",
            self.max_bindings_per_variable,
            1,
            10_000,
            "Variables need room for at least one binding",
        )?;
        if !self.report_errors && self.exhaustive_match_frames > 0 {
            tracing::debug!("exhaustive_match_frames has no effect while report_errors=false");
        }
        if self.max_call_depth > 100 && self.solver_step_limit > 1_000_000 {
            return Err(ConfigError::Validation(
                "max_call_depth > 100 combined with solver_step_limit > 1000000 is unbounded in practice"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn config_name(&self) -> &'static str {
        "AnalysisConfig"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_balanced() {
        let config = AnalysisConfig::default();
        assert_eq!(config.max_call_depth, 20);
        assert_eq!(config.exhaustive_match_frames, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_all_presets_validate() {
        for preset in Preset::ALL {
            assert!(AnalysisConfig::from_preset(preset).validate().is_ok(), "{preset}");
        }
    }

    #[test]
    fn test_preset_names_parse_case_insensitively() {
        assert_eq!("THOROUGH".parse::<Preset>().unwrap(), Preset::Thorough);
        for preset in Preset::ALL {
            assert_eq!(preset.to_string().parse::<Preset>().unwrap(), preset);
        }
        let err = "exhaustive".parse::<Preset>().unwrap_err();
        assert!(matches!(err, ConfigError::UnknownPreset(ref name) if name == "exhaustive"));
    }

    #[test]
    fn test_zero_depth_rejected() {
        let err = AnalysisConfig::default().max_call_depth(0).validate().unwrap_err();
        assert!(matches!(err, ConfigError::Range { .. }));
    }

    #[test]
    fn test_match_frames_bounded_by_depth() {
        let config = AnalysisConfig::default()
            .max_call_depth(2)
            .exhaustive_match_frames(5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = AnalysisConfig::from_preset(Preset::Fast)
            .trace_opcodes(true)
            .solver_step_limit(500);
        assert!(config.trace_opcodes);
        assert_eq!(config.solver_step_limit, 500);
    }
}
