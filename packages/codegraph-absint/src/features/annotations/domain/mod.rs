//! Declared-type bookkeeping records

use serde::Serialize;

use crate::features::abstract_values::Annotation;
use crate::features::frame_state::SimpleFrame;
use crate::features::typegraph::VariableId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalOpKind {
    Assign,
    Annotate,
}

/// A name was assigned or annotated, in execution order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct LocalOp {
    pub name: String,
    pub kind: LocalOpKind,
}

impl LocalOp {
    pub fn is_assign(&self) -> bool {
        self.kind == LocalOpKind::Assign
    }

    pub fn is_annotate(&self) -> bool {
        self.kind == LocalOpKind::Annotate
    }
}

/// Declared and observed state of one annotated name
#[derive(Debug, Clone, PartialEq)]
pub struct Local {
    /// First explicit annotation
    pub typ: Option<Annotation>,
    /// Most recently assigned value
    pub orig: Option<VariableId>,
    pub is_final: bool,
    pub is_classvar: bool,
    /// Instruction index of the last recorded assignment
    pub last_update_op: Option<usize>,
}

impl Local {
    pub fn new() -> Self {
        Self {
            typ: None,
            orig: None,
            is_final: false,
            is_classvar: false,
            last_update_op: None,
        }
    }

    pub fn is_annotated(&self) -> bool {
        self.typ.is_some()
    }
}

impl Default for Local {
    fn default() -> Self {
        Self::new()
    }
}

/// A forward reference waiting for its name to be defined
#[derive(Debug, Clone, PartialEq)]
pub struct LateAnnotation {
    pub id: usize,
    /// Full expression text
    pub expr: String,
    /// The name that failed to resolve
    pub missing: String,
    /// Call stack when the reference was made
    pub stack: Vec<SimpleFrame>,
    pub resolved: Option<Annotation>,
    /// Variable holding the placeholder
    pub var: VariableId,
}

impl LateAnnotation {
    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }
}
