//! Configuration validation

use super::error::{ConfigError, ConfigResult};

/// Trait for validatable configuration objects
///
/// # Example
/// ```rust,ignore
/// use codegraph_absint::config::Validatable;
///
/// fn start<C: Validatable>(config: &C) -> Result<(), ConfigError> {
///     config.validate()?;
///     Ok(())
/// }
/// ```
pub trait Validatable {
    /// Validate the configuration
    ///
    /// Returns `Ok(())` if valid, `Err(ConfigError)` with details if invalid.
    fn validate(&self) -> ConfigResult<()>;

    /// Get the configuration name for error messages
    fn config_name(&self) -> &'static str {
        "Config"
    }
}

/// Check `value` against an inclusive range
pub(crate) fn check_range(
    field: &'static str,
    value: usize,
    min: usize,
    max: usize,
    hint: &'static str,
) -> ConfigResult<()> {
    if (min..=max).contains(&value) {
        return Ok(());
    }
    Err(ConfigError::Range {
        field,
        value,
        min,
        max,
        hint,
    })
}
