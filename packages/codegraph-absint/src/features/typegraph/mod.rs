//! Value/provenance graph ("typegraph")
//!
//! Hexagonal Architecture:
//! - domain: CFG nodes, variables, bindings, origins and the arena that owns them
//! - infrastructure: the `has_combination` solver and its path finder
//!
//! Every record is arena-allocated and addressed by an integer id, so
//! back-references (predecessors, origin source sets) are plain indices and
//! cyclic provenance is harmless.

pub mod domain;
pub mod infrastructure;

pub use domain::{
    Binding, BindingId, CfgNode, CfgNodeId, Origin, Program, ProgramStats, SourceSet, ValueId,
    Variable, VariableId,
};
pub use infrastructure::{PathFinder, ProvenanceStep, ProvenanceWalker, Solver, SolverOutcome};
