//! Activation records

use std::collections::BTreeMap;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::state::FrameState;
use crate::features::abstract_values::Annotation;
use crate::features::typegraph::{CfgNodeId, ValueId, VariableId};
use crate::shared::models::CodeObject;

/// One activation: a module, class body or function being analyzed
#[derive(Debug)]
pub struct Frame {
    pub code: Rc<CodeObject>,
    /// Namespace values (`AbstractValue::Namespace`)
    pub f_globals: ValueId,
    pub f_locals: ValueId,
    pub f_builtins: ValueId,
    /// Cell variables: `cellvars` then `freevars`
    pub cells: Vec<VariableId>,
    /// Entry state per instruction index
    pub states: BTreeMap<usize, FrameState>,
    /// Jump targets recorded per basic block id
    pub targets: FxHashMap<usize, Vec<usize>>,
    pub return_var: VariableId,
    /// Accumulated `yield` values (generators and coroutines)
    pub yield_var: Option<VariableId>,
    /// First positional argument, for methods
    pub first_arg: Option<VariableId>,
    /// Function value this frame runs, if any
    pub func: Option<ValueId>,
    /// Node the frame was entered at
    pub start_node: CfgNodeId,
    pub current_block: usize,
    /// Line of the instruction being executed, for diagnostics
    pub current_line: u32,
    /// Declared return type
    pub allowed_returns: Option<Annotation>,
    pub is_module: bool,
    /// Nodes where an instruction that also falls through left the frame
    /// (an exception re-raised by END_FINALLY next to the normal path)
    pub side_exits: Vec<CfgNodeId>,
}

impl Frame {
    pub fn new(
        code: Rc<CodeObject>,
        f_globals: ValueId,
        f_locals: ValueId,
        f_builtins: ValueId,
        return_var: VariableId,
        start_node: CfgNodeId,
    ) -> Self {
        let current_line = code.first_line;
        Self {
            code,
            f_globals,
            f_locals,
            f_builtins,
            cells: Vec::new(),
            states: BTreeMap::new(),
            targets: FxHashMap::default(),
            return_var,
            yield_var: None,
            first_arg: None,
            func: None,
            start_node,
            current_block: 0,
            current_line,
            allowed_returns: None,
            is_module: false,
            side_exits: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.code.name
    }

    pub fn cell_index(&self, name: &str) -> Option<usize> {
        self.code.cell_names().position(|n| n == name)
    }

    pub fn record_target(&mut self, block: usize, target: usize) {
        self.targets.entry(block).or_default().push(target);
    }

    pub fn simple(&self, line: u32) -> SimpleFrame {
        SimpleFrame {
            name: self.code.name.clone(),
            line,
            filename: self.code.filename.clone(),
        }
    }
}

/// Frame summary attached to diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SimpleFrame {
    pub name: String,
    pub line: u32,
    pub filename: String,
}

impl std::fmt::Display for SimpleFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.name, self.filename, self.line)
    }
}
