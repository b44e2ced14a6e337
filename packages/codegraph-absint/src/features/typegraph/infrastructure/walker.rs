//! Provenance walker
//!
//! Enumerates the `(binding, origin, source set)` steps reachable from a
//! root binding. Each binding is expanded once, so cyclic provenance ends.

use rustc_hash::FxHashSet;

use crate::features::typegraph::domain::{BindingId, CfgNodeId, Program, SourceSet};

/// One origin source set of one binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenanceStep<'p> {
    pub binding: BindingId,
    pub where_: CfgNodeId,
    pub sources: &'p SourceSet,
}

pub struct ProvenanceWalker<'p> {
    program: &'p Program,
}

impl<'p> ProvenanceWalker<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self { program }
    }

    /// All steps reachable from `root`, depth first, root first
    pub fn steps(&self, root: BindingId) -> Vec<ProvenanceStep<'p>> {
        self.steps_through(root, |_| true)
    }

    /// Steps reachable from `root` passing only through bindings accepted by
    /// `keep`; a rejected binding (the root included) is not expanded
    pub fn steps_through(
        &self,
        root: BindingId,
        keep: impl Fn(BindingId) -> bool,
    ) -> Vec<ProvenanceStep<'p>> {
        let mut out = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack = vec![root];
        while let Some(binding) = stack.pop() {
            if !keep(binding) || !seen.insert(binding) {
                continue;
            }
            let record = self.program.binding(binding);
            for origin in &record.origins {
                for sources in &origin.source_sets {
                    out.push(ProvenanceStep {
                        binding,
                        where_: origin.where_,
                        sources,
                    });
                    stack.extend(sources.iter().rev().copied());
                }
            }
        }
        out
    }

    /// Nodes where values along the kept walk were created from nothing
    pub fn creation_nodes(
        &self,
        root: BindingId,
        keep: impl Fn(BindingId) -> bool,
    ) -> Vec<CfgNodeId> {
        let mut nodes = Vec::new();
        for step in self.steps_through(root, keep) {
            if step.sources.is_empty() && !nodes.contains(&step.where_) {
                nodes.push(step.where_);
            }
        }
        nodes
    }
}
