//! Opcode trace records

use serde::Serialize;

use crate::features::typegraph::{CfgNodeId, VariableId};

/// One executed instruction, as seen by tooling (jump to definition,
/// coverage)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpcodeTrace {
    pub index: usize,
    pub line: u32,
    pub opcode: String,
    /// Name, attribute or constant the instruction refers to
    pub symbol: Option<String>,
    /// Variables the instruction consumed or produced
    pub data: Vec<VariableId>,
    /// Node the instruction finished at
    pub node: CfgNodeId,
}

/// Symbol and data a handler attaches to the trace of the current instruction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceDraft {
    pub symbol: Option<String>,
    pub data: Vec<VariableId>,
}
