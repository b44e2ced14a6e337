//! Feature modules - Each feature follows Hexagonal Architecture
//!
//! Each feature contains:
//! - domain/     - Pure records and value types (no engine state)
//! - ports/      - Interface definitions (traits)
//! - application/ - Use cases
//! - infrastructure/ - Implementations over the arenas
//!
//! Dependency order, leaves first: typegraph → abstract_values →
//! frame_state → diagnostics / annotations / imports → vm.

// Value/provenance graph: CFG nodes, variables, bindings, the solver
pub mod typegraph;

// Abstract value arena, builtins, MRO, truthiness, type rendering
pub mod abstract_values;

// Operand/block stacks and activation records
pub mod frame_state;

// Structured diagnostics and the error log
pub mod diagnostics;

// Declared vs. inferred types per name, late annotations
pub mod annotations;

// Importer port and module loading
pub mod imports;

// The virtual machine and the `run_program` entry point
pub mod vm;
