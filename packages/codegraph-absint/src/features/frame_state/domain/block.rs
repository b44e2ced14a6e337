//! Block stack entries and abnormal-exit reasons

use serde::Serialize;

/// What kind of construct a block stack entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BlockKind {
    /// `SETUP_LOOP`; target is the loop exit
    Loop,
    /// `SETUP_EXCEPT`; target is the first handler
    SetupExcept,
    /// `SETUP_FINALLY` / `SETUP_WITH`; target is the finally body
    Finally,
}

/// One entry of the block stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Block {
    pub kind: BlockKind,
    /// Instruction index control transfers to when the block is left abnormally
    pub target: usize,
    /// Operand stack depth to restore when unwinding to this block
    pub level: usize,
    /// Instruction that pushed the block
    pub op_index: usize,
}

impl Block {
    pub fn new(kind: BlockKind, target: usize, level: usize, op_index: usize) -> Self {
        Self {
            kind,
            target,
            level,
            op_index,
        }
    }

    /// Catches exceptions raised inside it
    pub fn handles_exceptions(&self) -> bool {
        matches!(self.kind, BlockKind::SetupExcept | BlockKind::Finally)
    }
}

/// Why control left the straight-line path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Why {
    Return,
    Exception,
    Reraise,
    Yield,
    /// No state can continue (dead branch)
    Never,
}

impl Why {
    /// The frame may produce its return value at a node left with this reason
    pub fn can_return(self) -> bool {
        matches!(self, Why::Return | Why::Yield)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Why::Return => "return",
            Why::Exception => "exception",
            Why::Reraise => "reraise",
            Why::Yield => "yield",
            Why::Never => "never",
        }
    }
}

impl std::fmt::Display for Why {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
