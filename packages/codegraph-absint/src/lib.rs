/*
 * Codegraph AbsInt - Bytecode Abstract Interpreter
 *
 * Feature-First Hexagonal Architecture:
 * - shared/      : Input models (CodeObject, Instruction, Director, Assembler)
 * - features/    : Vertical slices (typegraph → values → frames → vm)
 * - config/      : Presets, validation, YAML io
 *
 * The engine executes bytecode symbolically and records every possible
 * value in a provenance graph that a type checker queries afterwards.
 */

// Crate-level lint configuration
#![allow(clippy::too_many_arguments)] // Call plumbing carries many ids
#![allow(clippy::type_complexity)] // Id tuples in tracker tables
#![allow(clippy::module_inception)] // Module naming intentional
#![allow(clippy::new_without_default)] // Default impl not always needed

// ═══════════════════════════════════════════════════════════════════════════
// Module Exports - Feature-First Architecture
// ═══════════════════════════════════════════════════════════════════════════

/// Shared models and macros
#[macro_use]
pub mod shared;

/// Feature modules (typegraph → values → frames → vm)
pub mod features;

/// Configuration system
pub mod config;

/// Error types
pub mod errors;

// ═══════════════════════════════════════════════════════════════════════════
// Re-exports for Public API
// ═══════════════════════════════════════════════════════════════════════════

pub use config::{AnalysisConfig, Preset};
pub use errors::{AbsintError, Result, VirtualMachineError};
pub use features::abstract_values::{Type, TypeKind};
pub use features::diagnostics::{Diagnostic, DiagnosticSink, ErrorKind, TracingSink};
pub use features::imports::{Importer, ModuleSpec, NullImporter, StaticImporter};
pub use features::typegraph::{BindingId, CfgNodeId, Program, ValueId, VariableId};
pub use features::vm::{run_program, AnalysisResult, OpcodeTrace};
pub use shared::models::{Assembler, CodeObject, Constant, Director, Instruction, Opcode};
