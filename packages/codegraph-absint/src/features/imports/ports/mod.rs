//! Imports Ports
//!
//! The engine never reads files. Module resolution is delegated to an
//! [`Importer`] supplied by the caller.

use super::domain::ModuleSpec;

/// Resolves `import` statements
///
/// # Implementors
/// - `StaticImporter` (in-memory table)
/// - `NullImporter` (every import fails)
pub trait Importer {
    /// Module for an absolute (`level == 0`) or relative import; `None` when
    /// it cannot be found
    fn import_module(&self, name: &str, level: u32) -> Option<ModuleSpec>;
}
