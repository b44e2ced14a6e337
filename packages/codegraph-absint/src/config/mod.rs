//! Analysis configuration
//!
//! Three levels, from least to most control:
//! - Level 1: Preset (`fast`, `balanced`, `thorough`)
//! - Level 2: Builder overrides on top of a preset
//! - Level 3: YAML file with explicit overrides
//!
//! # Examples
//!
//! ```rust,ignore
//! use codegraph_absint::config::{AnalysisConfig, Preset};
//!
//! let config = AnalysisConfig::from_preset(Preset::Fast);
//!
//! let config = AnalysisConfig::from_preset(Preset::Balanced)
//!     .max_call_depth(8)
//!     .exhaustive_match_frames(1);
//!
//! let config = AnalysisConfig::from_yaml_file("absint.yaml")?;
//! ```

pub mod analysis_config;
pub mod error;
pub mod io;
pub mod validation;

pub use analysis_config::{AnalysisConfig, Preset};
pub use error::{ConfigError, ConfigResult};
pub use io::{AnalysisOverrides, ConfigFileV1};
pub use validation::Validatable;
