//! Per-opcode handlers
//!
//! Every handler has the shape `op_<name>(state, op) -> VmResult<FrameState>`
//! and is called from the dispatcher only. Handlers are grouped the way the
//! dispatcher groups opcodes.

mod attributes;
mod calls;
mod containers;
mod control;
mod exceptions;
mod generators;
mod imports;
mod matching;
mod names;
mod operators;
mod stack;
