//! The program arena: CFG plus every variable and binding of one analysis run.

use std::cell::Cell;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::Serialize;

use super::ids::{BindingId, CfgNodeId, ValueId, VariableId};
use super::records::{Binding, CfgNode, Origin, SourceSet, Variable};
use crate::features::typegraph::infrastructure::Solver;

/// Counters exposed for logging and benches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgramStats {
    pub nodes: usize,
    pub variables: usize,
    pub bindings: usize,
    pub solver_queries: u64,
    pub solver_states: u64,
}

/// Owner of the CFG, variables and bindings
///
/// Nodes, variables and bindings are never removed; ids are dense and
/// assigned in creation order, so two runs over the same input produce
/// identical graphs.
#[derive(Debug)]
pub struct Program {
    graph: DiGraph<CfgNode, ()>,
    variables: Vec<Variable>,
    bindings: Vec<Binding>,
    entrypoint: Option<CfgNodeId>,
    solver_step_limit: usize,
    solver_queries: Cell<u64>,
    solver_states: Cell<u64>,
}

impl Program {
    pub fn new() -> Self {
        Self::with_step_limit(100_000)
    }

    /// Program whose solver explores at most `limit` states per query
    pub fn with_step_limit(limit: usize) -> Self {
        Self {
            graph: DiGraph::new(),
            variables: Vec::new(),
            bindings: Vec::new(),
            entrypoint: None,
            solver_step_limit: limit,
            solver_queries: Cell::new(0),
            solver_states: Cell::new(0),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // CFG
    // ═══════════════════════════════════════════════════════════════════

    /// Create an unconnected node
    pub fn new_cfg_node(&mut self, name: impl Into<String>, condition: Option<BindingId>) -> CfgNodeId {
        let id = CfgNodeId::from_index(self.graph.node_count());
        let idx = self.graph.add_node(CfgNode {
            id,
            name: name.into(),
            condition,
            bindings: Vec::new(),
        });
        debug_assert_eq!(idx.index(), id.index());
        id
    }

    /// Create a node with an edge from `from`
    pub fn connect_new(
        &mut self,
        from: CfgNodeId,
        name: impl Into<String>,
        condition: Option<BindingId>,
    ) -> CfgNodeId {
        let node = self.new_cfg_node(name, condition);
        self.connect_to(from, node);
        node
    }

    /// Add an edge `from -> to` (idempotent)
    pub fn connect_to(&mut self, from: CfgNodeId, to: CfgNodeId) {
        let (a, b) = (Self::idx(from), Self::idx(to));
        if self.graph.find_edge(a, b).is_none() {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Attach a condition to a node that has not been queried yet
    pub fn set_condition(&mut self, node: CfgNodeId, condition: BindingId) {
        self.graph[Self::idx(node)].condition = Some(condition);
    }

    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        &self.graph[Self::idx(id)]
    }

    pub fn nodes(&self) -> impl Iterator<Item = &CfgNode> {
        self.graph.node_weights()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Incoming neighbours, lowest id first
    pub fn predecessors(&self, id: CfgNodeId) -> Vec<CfgNodeId> {
        let mut preds: Vec<CfgNodeId> = self
            .graph
            .neighbors_directed(Self::idx(id), Direction::Incoming)
            .map(|n| CfgNodeId::from_index(n.index()))
            .collect();
        preds.sort_unstable();
        preds
    }

    /// Outgoing neighbours, lowest id first
    pub fn successors(&self, id: CfgNodeId) -> Vec<CfgNodeId> {
        let mut succs: Vec<CfgNodeId> = self
            .graph
            .neighbors_directed(Self::idx(id), Direction::Outgoing)
            .map(|n| CfgNodeId::from_index(n.index()))
            .collect();
        succs.sort_unstable();
        succs
    }

    /// Forward reachability (`from` reaches itself)
    pub fn is_reachable(&self, from: CfgNodeId, to: CfgNodeId) -> bool {
        petgraph::algo::has_path_connecting(&self.graph, Self::idx(from), Self::idx(to), None)
    }

    pub fn entrypoint(&self) -> Option<CfgNodeId> {
        self.entrypoint
    }

    pub fn set_entrypoint(&mut self, node: CfgNodeId) {
        self.entrypoint = Some(node);
    }

    pub fn graph(&self) -> &DiGraph<CfgNode, ()> {
        &self.graph
    }

    fn idx(id: CfgNodeId) -> NodeIndex {
        NodeIndex::new(id.index())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Variables and bindings
    // ═══════════════════════════════════════════════════════════════════

    pub fn new_variable(&mut self) -> VariableId {
        let id = VariableId::from_index(self.variables.len());
        self.variables.push(Variable::new(id));
        id
    }

    /// New variable holding `data`, each value justified by `sources` at `where_`
    pub fn new_variable_with(
        &mut self,
        data: &[ValueId],
        sources: &[BindingId],
        where_: CfgNodeId,
    ) -> VariableId {
        let var = self.new_variable();
        for &d in data {
            self.add_binding(var, d, sources.iter().copied(), where_);
        }
        var
    }

    /// Bind `data` in `var` at `where_` with one source set.
    ///
    /// Binding the same data twice returns the existing binding and only
    /// records the extra origin / source set.
    pub fn add_binding(
        &mut self,
        var: VariableId,
        data: ValueId,
        sources: impl IntoIterator<Item = BindingId>,
        where_: CfgNodeId,
    ) -> BindingId {
        let binding = self.find_or_add_binding(var, data);
        self.add_origin(binding, where_, sources);
        binding
    }

    /// Binding of `data` in `var` without any origin yet; invisible until
    /// [`Program::add_origin`] gives it one
    pub fn add_bare_binding(&mut self, var: VariableId, data: ValueId) -> BindingId {
        self.find_or_add_binding(var, data)
    }

    fn find_or_add_binding(&mut self, var: VariableId, data: ValueId) -> BindingId {
        if let Some(existing) = self.variables[var.index()].binding_for(data) {
            return existing;
        }
        let id = BindingId::from_index(self.bindings.len());
        self.bindings.push(Binding {
            id,
            variable: var,
            data,
            origins: Vec::new(),
        });
        let variable = &mut self.variables[var.index()];
        variable.bindings.push(id);
        variable.by_data.insert(data, id);
        id
    }

    /// Record that `binding` holds at `where_` given `sources`
    pub fn add_origin(
        &mut self,
        binding: BindingId,
        where_: CfgNodeId,
        sources: impl IntoIterator<Item = BindingId>,
    ) {
        let set: SourceSet = sources.into_iter().collect();
        let b = &mut self.bindings[binding.index()];
        match b.origins.iter_mut().find(|o| o.where_ == where_) {
            Some(origin) => origin.add_source_set(set),
            None => {
                b.origins.push(Origin {
                    where_,
                    source_sets: vec![set],
                });
                let var = b.variable;
                self.graph[Self::idx(where_)].bindings.push(binding);
                self.variables[var.index()].nodes.insert(where_);
            }
        }
    }

    /// Copy a binding of another variable into `var`.
    ///
    /// - `where_ == None`: every origin is copied verbatim.
    /// - the binding already has an origin at `where_`: that origin's source
    ///   sets are copied, so the new binding sits beside it rather than after.
    /// - otherwise the pasted binding becomes the source.
    pub fn paste_binding(
        &mut self,
        var: VariableId,
        binding: BindingId,
        where_: Option<CfgNodeId>,
        additional: &[BindingId],
    ) -> BindingId {
        let data = self.bindings[binding.index()].data;
        let new = self.find_or_add_binding(var, data);
        if new == binding {
            return new;
        }
        match where_ {
            None => {
                let origins = self.bindings[binding.index()].origins.clone();
                for origin in origins {
                    for set in origin.source_sets {
                        let merged = set.into_iter().chain(additional.iter().copied());
                        self.add_origin(new, origin.where_, merged);
                    }
                }
            }
            Some(node) => {
                let same_node = self.bindings[binding.index()].find_origin(node).cloned();
                match same_node {
                    Some(origin) => {
                        for set in origin.source_sets {
                            let merged = set.into_iter().chain(additional.iter().copied());
                            self.add_origin(new, node, merged);
                        }
                    }
                    None => {
                        let sources = std::iter::once(binding).chain(additional.iter().copied());
                        self.add_origin(new, node, sources);
                    }
                }
            }
        }
        new
    }

    /// Paste every binding of `other` into `var`
    pub fn paste_variable(
        &mut self,
        var: VariableId,
        other: VariableId,
        where_: Option<CfgNodeId>,
        additional: &[BindingId],
    ) {
        if var == other {
            return;
        }
        let bindings = self.variables[other.index()].bindings.clone();
        for b in bindings {
            self.paste_binding(var, b, where_, additional);
        }
    }

    /// Fresh variable whose bindings each cite the corresponding old binding
    pub fn assign_to_new_variable(&mut self, var: VariableId, where_: CfgNodeId) -> VariableId {
        let new = self.new_variable();
        let bindings = self.variables[var.index()].bindings.clone();
        for b in bindings {
            let data = self.bindings[b.index()].data;
            self.add_binding(new, data, [b], where_);
        }
        new
    }

    pub fn variable(&self, id: VariableId) -> &Variable {
        &self.variables[id.index()]
    }

    pub fn binding(&self, id: BindingId) -> &Binding {
        &self.bindings[id.index()]
    }

    pub fn bindings(&self, var: VariableId) -> &[BindingId] {
        self.variables[var.index()].bindings()
    }

    pub fn binding_data(&self, binding: BindingId) -> ValueId {
        self.bindings[binding.index()].data
    }

    /// All values of a variable, unfiltered
    pub fn data(&self, var: VariableId) -> Vec<ValueId> {
        self.bindings(var)
            .iter()
            .map(|b| self.binding_data(*b))
            .collect()
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn binding_count(&self) -> usize {
        self.bindings.len()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Queries
    // ═══════════════════════════════════════════════════════════════════

    /// Can all `bindings` hold simultaneously at `node`?
    pub fn has_combination(&self, node: CfgNodeId, bindings: &[BindingId]) -> bool {
        self.solver_queries.set(self.solver_queries.get() + 1);
        let mut solver = Solver::new(self, self.solver_step_limit);
        let outcome = solver.solve(node, bindings);
        self.solver_states
            .set(self.solver_states.get() + solver.states_explored() as u64);
        outcome.is_satisfiable()
    }

    /// Is this binding visible (not overwritten, reachable) at `node`?
    pub fn is_visible(&self, binding: BindingId, node: CfgNodeId) -> bool {
        self.has_combination(node, &[binding])
    }

    /// Bindings of `var` visible at `node`, in insertion order
    pub fn filter(&self, var: VariableId, node: CfgNodeId) -> Vec<BindingId> {
        self.bindings(var)
            .iter()
            .copied()
            .filter(|b| self.is_visible(*b, node))
            .collect()
    }

    /// Values of the bindings visible at `node`
    pub fn filtered_data(&self, var: VariableId, node: CfgNodeId) -> Vec<ValueId> {
        self.filter(var, node)
            .into_iter()
            .map(|b| self.binding_data(b))
            .collect()
    }

    pub fn stats(&self) -> ProgramStats {
        ProgramStats {
            nodes: self.graph.node_count(),
            variables: self.variables.len(),
            bindings: self.bindings.len(),
            solver_queries: self.solver_queries.get(),
            solver_states: self.solver_states.get(),
        }
    }
}

impl Default for Program {
    fn default() -> Self {
        Self::new()
    }
}
