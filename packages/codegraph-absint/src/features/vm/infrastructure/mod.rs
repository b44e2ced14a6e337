//! The virtual machine and everything it runs
//!
//! `context` owns the state of one run; the remaining modules add `impl`
//! blocks to [`VirtualMachine`]: frame setup and the block loop, dispatch,
//! name resolution, calls, attributes, operators, annotations and the
//! per-opcode handlers.

mod annotations;
mod args;
mod attributes;
pub mod branch_tracker;
mod calls;
pub mod context;
mod dispatch;
pub mod finally_tracker;
pub(crate) mod frames;
mod handlers;
pub(crate) mod names;
pub(crate) mod operators;

pub use branch_tracker::{BranchTracker, CaseCoverage};
pub use context::{AnalysisContext, LateCell, VirtualMachine};
pub use finally_tracker::FinallyStateTracker;
pub use frames::FrameOutcome;
