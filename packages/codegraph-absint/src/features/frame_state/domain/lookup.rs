//! Result of a tiered name lookup

use crate::features::typegraph::VariableId;

/// Outcome of looking a name up in locals, globals and builtins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupResult {
    Found(VariableId),
    NotFound,
    /// Not defined yet; the variable holds a placeholder resolved later
    Deferred(VariableId),
}

impl LookupResult {
    pub fn variable(self) -> Option<VariableId> {
        match self {
            LookupResult::Found(v) | LookupResult::Deferred(v) => Some(v),
            LookupResult::NotFound => None,
        }
    }

    pub fn is_found(self) -> bool {
        matches!(self, LookupResult::Found(_))
    }

    /// Try the next tier only on a plain miss
    pub fn or_else(self, next: impl FnOnce() -> LookupResult) -> LookupResult {
        match self {
            LookupResult::NotFound => next(),
            found => found,
        }
    }
}
