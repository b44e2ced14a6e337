//! Pattern-test narrowing waiting for its conditional jump

use crate::features::typegraph::VariableId;

/// Produced by a pattern test, consumed by the jump right after it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Narrowing {
    /// Local or global name the subject was loaded from, if any
    pub name: Option<String>,
    /// The boolean the jump tests
    pub success: VariableId,
    /// Subject bindings that can match
    pub matched: VariableId,
    /// Subject bindings that can fail to match
    pub unmatched: VariableId,
}
