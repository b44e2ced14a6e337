//! Error types for codegraph-absint
//!
//! Two tiers of failure exist. Fatal [`VirtualMachineError`]s abort the whole
//! analysis run and unwind every open frame. Recoverable problems in the
//! analyzed program never surface here; they become diagnostics.

use thiserror::Error;

use crate::config::ConfigError;

/// Fatal engine failure: a dispatcher or decoder contract was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VirtualMachineError {
    /// Mnemonic with no handler
    #[error("Unknown opcode '{mnemonic}' at line {line}")]
    UnknownOpcode { mnemonic: String, line: u32 },

    /// Operand stack popped past its bottom
    #[error("Stack underflow in {opcode}: needed {needed}, available {available}")]
    StackUnderflow {
        opcode: String,
        needed: usize,
        available: usize,
    },

    /// Two states reaching one instruction disagree on stack depth
    #[error("Stack depth mismatch at instruction {target}: expected {expected}, found {found}")]
    StackMismatch {
        target: usize,
        expected: usize,
        found: usize,
    },

    /// POP_BLOCK (or an unwind) with an empty block stack
    #[error("Block stack underflow in {opcode}")]
    BlockUnderflow { opcode: String },

    /// Instruction lacks the argument its opcode requires
    #[error("Missing argument for {opcode} at instruction {index}")]
    MissingArgument { opcode: String, index: usize },

    /// Structurally invalid code object
    #[error("Invalid bytecode: {0}")]
    InvalidBytecode(String),

    /// Engine used outside of an active frame
    #[error("No active frame: {0}")]
    NoFrame(String),
}

impl VirtualMachineError {
    /// Create a stack underflow error
    pub fn stack_underflow(opcode: impl Into<String>, needed: usize, available: usize) -> Self {
        Self::StackUnderflow {
            opcode: opcode.into(),
            needed,
            available,
        }
    }

    /// Create an unknown opcode error
    pub fn unknown_opcode(mnemonic: impl Into<String>, line: u32) -> Self {
        Self::UnknownOpcode {
            mnemonic: mnemonic.into(),
            line,
        }
    }

    /// Create an invalid bytecode error
    pub fn invalid_bytecode(msg: impl Into<String>) -> Self {
        Self::InvalidBytecode(msg.into())
    }

    /// Attribute a stack or block error to the instruction being executed
    pub fn at_opcode(self, mnemonic: &str) -> Self {
        match self {
            Self::StackUnderflow {
                needed, available, ..
            } => Self::StackUnderflow {
                opcode: mnemonic.to_string(),
                needed,
                available,
            },
            Self::BlockUnderflow { .. } => Self::BlockUnderflow {
                opcode: mnemonic.to_string(),
            },
            other => other,
        }
    }
}

/// Result type used inside the engine
pub type VmResult<T> = std::result::Result<T, VirtualMachineError>;

/// Main error type for codegraph-absint operations
#[derive(Debug, Error)]
pub enum AbsintError {
    /// Fatal engine error
    #[error("Virtual machine error: {0}")]
    Vm(#[from] VirtualMachineError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Bytecode (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AbsintError {
    /// Create a stack underflow error
    pub fn stack_underflow(opcode: impl Into<String>, needed: usize, available: usize) -> Self {
        AbsintError::Vm(VirtualMachineError::stack_underflow(opcode, needed, available))
    }

    /// Create an unknown opcode error
    pub fn unknown_opcode(mnemonic: impl Into<String>, line: u32) -> Self {
        AbsintError::Vm(VirtualMachineError::unknown_opcode(mnemonic, line))
    }

    /// Create an invalid bytecode error
    pub fn invalid_bytecode(msg: impl Into<String>) -> Self {
        AbsintError::Vm(VirtualMachineError::invalid_bytecode(msg))
    }

    /// Create a configuration validation error
    pub fn config(msg: impl Into<String>) -> Self {
        AbsintError::Config(ConfigError::Validation(msg.into()))
    }

    /// Whether the error came from the engine itself
    pub fn is_fatal_vm_error(&self) -> bool {
        matches!(self, AbsintError::Vm(_))
    }
}

/// Result type alias for codegraph-absint operations
pub type Result<T> = std::result::Result<T, AbsintError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_opcode_message() {
        let err = VirtualMachineError::unknown_opcode("FROBNICATE", 12);
        assert_eq!(err.to_string(), "Unknown opcode 'FROBNICATE' at line 12");
    }

    #[test]
    fn test_vm_error_converts() {
        let err: AbsintError = VirtualMachineError::stack_underflow("POP_TOP", 1, 0).into();
        assert!(err.is_fatal_vm_error());
        assert!(err.to_string().contains("needed 1, available 0"));
    }

    #[test]
    fn test_helpers_pick_variant() {
        assert!(AbsintError::unknown_opcode("X", 1).is_fatal_vm_error());
        assert!(AbsintError::stack_underflow("POP_TOP", 1, 0).is_fatal_vm_error());
        let err = AbsintError::config("bad preset");
        assert!(!err.is_fatal_vm_error());
        assert_eq!(err.to_string(), "Configuration error: inconsistent config: bad preset");
    }

    #[test]
    fn test_at_opcode_rewrites_stack_errors() {
        let err = VirtualMachineError::stack_underflow("pop", 2, 1).at_opcode("BINARY_ADD");
        assert!(err.to_string().starts_with("Stack underflow in BINARY_ADD"));
        let other = VirtualMachineError::invalid_bytecode("x").at_opcode("NOP");
        assert_eq!(other, VirtualMachineError::InvalidBytecode("x".into()));
    }
}
