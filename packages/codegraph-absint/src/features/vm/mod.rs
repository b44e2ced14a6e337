//! Bytecode virtual machine
//!
//! Hexagonal Architecture:
//! - domain: call arguments, opcode traces, pending pattern narrowing
//! - infrastructure: `AnalysisContext`, `VirtualMachine` and its handlers
//! - application: `run_program`, the entry point producing an
//!   [`AnalysisResult`]
//!
//! The VM executes each frame's blocks once, in order, threading a
//! [`FrameState`](crate::features::frame_state::FrameState) through every
//! instruction and recording possible values in the typegraph.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::{run_program, AnalysisResult};
pub use domain::{CallArgs, Narrowing, OpcodeTrace};
pub use infrastructure::{AnalysisContext, FrameOutcome, VirtualMachine};
