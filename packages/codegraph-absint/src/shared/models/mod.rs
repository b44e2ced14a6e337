//! Input models: decoded bytecode and director metadata

pub mod assembler;
pub mod bytecode;
pub mod director;
pub mod opcode;

pub use assembler::{AsmError, Assembler, Label};
pub use bytecode::{BasicBlock, CodeFlags, CodeObject, Constant, Instruction};
pub use director::{CaseInfo, Director, LineInfo, MatchStatement};
pub use opcode::Opcode;
