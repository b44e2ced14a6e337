//! Graph records: nodes, variables, bindings, origins

use std::collections::BTreeSet;

use rustc_hash::FxHashMap;
use serde::Serialize;

use super::ids::{BindingId, CfgNodeId, ValueId, VariableId};

/// One alternative set of bindings that justifies a binding
pub type SourceSet = BTreeSet<BindingId>;

/// A point in the reconstructed control-flow graph
#[derive(Debug, Clone, Serialize)]
pub struct CfgNode {
    pub id: CfgNodeId,
    pub name: String,
    /// Binding that must hold for control to pass through this node
    pub condition: Option<BindingId>,
    /// Bindings with an origin at this node, in insertion order
    pub bindings: Vec<BindingId>,
}

/// Where a binding was created and from what
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Origin {
    #[serde(rename = "where")]
    pub where_: CfgNodeId,
    pub source_sets: Vec<SourceSet>,
}

impl Origin {
    pub(crate) fn add_source_set(&mut self, set: SourceSet) {
        if !self.source_sets.contains(&set) {
            self.source_sets.push(set);
        }
    }
}

/// "This value may hold here": a value plus its origins
#[derive(Debug, Clone, Serialize)]
pub struct Binding {
    pub id: BindingId,
    pub variable: VariableId,
    pub data: ValueId,
    pub origins: Vec<Origin>,
}

impl Binding {
    /// Origin recorded at `node`, if any
    pub fn find_origin(&self, node: CfgNodeId) -> Option<&Origin> {
        self.origins.iter().find(|o| o.where_ == node)
    }

    pub fn has_origin_at(&self, node: CfgNodeId) -> bool {
        self.find_origin(node).is_some()
    }
}

/// The set of bindings a name or expression may evaluate to
#[derive(Debug, Clone, Serialize)]
pub struct Variable {
    pub id: VariableId,
    pub(crate) bindings: Vec<BindingId>,
    #[serde(skip)]
    pub(crate) by_data: FxHashMap<ValueId, BindingId>,
    /// Nodes where some binding of this variable has an origin
    #[serde(skip)]
    pub(crate) nodes: BTreeSet<CfgNodeId>,
}

impl Variable {
    pub(crate) fn new(id: VariableId) -> Self {
        Self {
            id,
            bindings: Vec::new(),
            by_data: FxHashMap::default(),
            nodes: BTreeSet::new(),
        }
    }

    /// Bindings in insertion order
    pub fn bindings(&self) -> &[BindingId] {
        &self.bindings
    }

    pub fn binding_for(&self, data: ValueId) -> Option<BindingId> {
        self.by_data.get(&data).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Nodes where the variable is (re)assigned
    pub fn nodes(&self) -> &BTreeSet<CfgNodeId> {
        &self.nodes
    }
}
