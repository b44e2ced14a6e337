//! Code objects: the decoded instruction stream handed to the engine.
//!
//! A producer compiles source into [`CodeObject`]s whose instructions are
//! already split into basic blocks with resolved jump targets. Everything is
//! serde-serialisable so bytecode can travel as JSON.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use super::opcode::Opcode;
use crate::errors::{VirtualMachineError, VmResult};

/// `co_flags` bits the engine looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CodeFlags(pub u32);

impl CodeFlags {
    pub const OPTIMIZED: u32 = 0x0001;
    pub const NEWLOCALS: u32 = 0x0002;
    pub const VARARGS: u32 = 0x0004;
    pub const VARKEYWORDS: u32 = 0x0008;
    pub const NESTED: u32 = 0x0010;
    pub const GENERATOR: u32 = 0x0020;
    pub const COROUTINE: u32 = 0x0080;
    pub const ITERABLE_COROUTINE: u32 = 0x0100;
    pub const ASYNC_GENERATOR: u32 = 0x0200;

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn with(self, bit: u32) -> Self {
        Self(self.0 | bit)
    }
}

/// Compile-time constant from `co_consts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
    Tuple(Vec<Constant>),
    Code(Rc<CodeObject>),
}

impl Constant {
    /// Python-level repr, used for trace symbols and messages
    pub fn repr(&self) -> String {
        match self {
            Constant::None => "None".to_string(),
            Constant::Bool(true) => "True".to_string(),
            Constant::Bool(false) => "False".to_string(),
            Constant::Int(i) => i.to_string(),
            Constant::Float(f) => format!("{f:?}"),
            Constant::Str(s) => format!("{s:?}"),
            Constant::Bytes(b) => format!("b{:?}", String::from_utf8_lossy(b)),
            Constant::Ellipsis => "Ellipsis".to_string(),
            Constant::Tuple(items) => {
                let inner: Vec<String> = items.iter().map(Constant::repr).collect();
                if inner.len() == 1 {
                    format!("({},)", inner[0])
                } else {
                    format!("({})", inner.join(", "))
                }
            }
            Constant::Code(code) => format!("<code {}>", code.name),
        }
    }
}

/// One decoded instruction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// Position in the code object's linear instruction order
    pub index: usize,
    pub mnemonic: String,
    /// Raw integer argument (const index, name index, argc, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<u32>,
    /// Pretty argument: the resolved name for name-carrying opcodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argval: Option<String>,
    /// Instruction index of the jump destination
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<usize>,
    pub line: u32,
}

impl Instruction {
    /// Decode the mnemonic; unknown mnemonics are fatal
    pub fn opcode(&self) -> VmResult<Opcode> {
        Opcode::from_mnemonic(&self.mnemonic)
            .ok_or_else(|| VirtualMachineError::unknown_opcode(&self.mnemonic, self.line))
    }

    /// Index of the fall-through successor
    pub fn next(&self) -> usize {
        self.index + 1
    }

    pub fn arg_or_zero(&self) -> u32 {
        self.arg.unwrap_or(0)
    }

    pub fn require_arg(&self) -> VmResult<u32> {
        self.arg.ok_or_else(|| VirtualMachineError::MissingArgument {
            opcode: self.mnemonic.clone(),
            index: self.index,
        })
    }

    pub fn require_target(&self) -> VmResult<usize> {
        self.target.ok_or_else(|| VirtualMachineError::MissingArgument {
            opcode: self.mnemonic.clone(),
            index: self.index,
        })
    }
}

/// Straight-line run of instructions with a single entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicBlock {
    pub id: usize,
    pub instructions: Vec<Instruction>,
}

impl BasicBlock {
    pub fn first(&self) -> Option<&Instruction> {
        self.instructions.first()
    }
}

/// A compiled function, class body or module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeObject {
    pub name: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub first_line: u32,
    #[serde(default)]
    pub argcount: u32,
    #[serde(default)]
    pub posonlyargcount: u32,
    #[serde(default)]
    pub kwonlyargcount: u32,
    #[serde(default)]
    pub varnames: Vec<String>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub cellvars: Vec<String>,
    #[serde(default)]
    pub freevars: Vec<String>,
    #[serde(default)]
    pub consts: Vec<Constant>,
    #[serde(default)]
    pub flags: CodeFlags,
    /// Blocks in execution order
    pub blocks: Vec<BasicBlock>,
}

impl CodeObject {
    /// All instructions in linear order
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.blocks.iter().flat_map(|b| b.instructions.iter())
    }

    pub fn instruction(&self, index: usize) -> Option<&Instruction> {
        self.instructions().find(|op| op.index == index)
    }

    pub fn is_generator(&self) -> bool {
        self.flags.contains(CodeFlags::GENERATOR)
    }

    pub fn is_coroutine(&self) -> bool {
        self.flags.contains(CodeFlags::COROUTINE)
            || self.flags.contains(CodeFlags::ITERABLE_COROUTINE)
    }

    pub fn is_async_generator(&self) -> bool {
        self.flags.contains(CodeFlags::ASYNC_GENERATOR)
    }

    pub fn has_varargs(&self) -> bool {
        self.flags.contains(CodeFlags::VARARGS)
    }

    pub fn has_varkeywords(&self) -> bool {
        self.flags.contains(CodeFlags::VARKEYWORDS)
    }

    /// Positional parameter names (including positional-only)
    pub fn positional_params(&self) -> &[String] {
        let end = (self.argcount as usize).min(self.varnames.len());
        &self.varnames[..end]
    }

    /// Keyword-only parameter names
    pub fn kwonly_params(&self) -> &[String] {
        let start = (self.argcount as usize).min(self.varnames.len());
        let end = (start + self.kwonlyargcount as usize).min(self.varnames.len());
        &self.varnames[start..end]
    }

    /// Name of the `*args` parameter, if any
    pub fn varargs_name(&self) -> Option<&str> {
        if !self.has_varargs() {
            return None;
        }
        let idx = (self.argcount + self.kwonlyargcount) as usize;
        self.varnames.get(idx).map(String::as_str)
    }

    /// Name of the `**kwargs` parameter, if any
    pub fn varkeywords_name(&self) -> Option<&str> {
        if !self.has_varkeywords() {
            return None;
        }
        let mut idx = (self.argcount + self.kwonlyargcount) as usize;
        if self.has_varargs() {
            idx += 1;
        }
        self.varnames.get(idx).map(String::as_str)
    }

    /// Cell slots: cellvars first, then freevars
    pub fn cell_names(&self) -> impl Iterator<Item = &String> {
        self.cellvars.iter().chain(self.freevars.iter())
    }

    pub fn last_line(&self) -> u32 {
        self.instructions()
            .map(|op| op.line)
            .max()
            .unwrap_or(self.first_line)
    }

    /// Check structural invariants the frame runner relies on:
    /// consecutive indices, and jump targets landing on block entries.
    pub fn validate(&self) -> VmResult<()> {
        let mut expected = 0usize;
        let mut block_starts = rustc_hash::FxHashSet::default();
        for block in &self.blocks {
            if let Some(first) = block.first() {
                block_starts.insert(first.index);
            }
            for op in &block.instructions {
                if op.index != expected {
                    return Err(VirtualMachineError::invalid_bytecode(format!(
                        "{}: instruction {} found where {} was expected",
                        self.name, op.index, expected
                    )));
                }
                expected += 1;
            }
        }
        for op in self.instructions() {
            if let Some(target) = op.target {
                if !block_starts.contains(&target) {
                    return Err(VirtualMachineError::invalid_bytecode(format!(
                        "{}: {} at {} jumps into the middle of a block ({})",
                        self.name, op.mnemonic, op.index, target
                    )));
                }
            }
        }
        for constant in &self.consts {
            if let Constant::Code(inner) = constant {
                inner.validate()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(index: usize, mnemonic: &str, target: Option<usize>) -> Instruction {
        Instruction {
            index,
            mnemonic: mnemonic.to_string(),
            arg: None,
            argval: None,
            target,
            line: 1,
        }
    }

    fn code(blocks: Vec<Vec<Instruction>>) -> CodeObject {
        CodeObject {
            name: "<module>".to_string(),
            filename: String::new(),
            first_line: 1,
            argcount: 0,
            posonlyargcount: 0,
            kwonlyargcount: 0,
            varnames: vec![],
            names: vec![],
            cellvars: vec![],
            freevars: vec![],
            consts: vec![],
            flags: CodeFlags::default(),
            blocks: blocks
                .into_iter()
                .enumerate()
                .map(|(id, instructions)| BasicBlock { id, instructions })
                .collect(),
        }
    }

    #[test]
    fn test_validate_accepts_block_targets() {
        let c = code(vec![
            vec![op(0, "JUMP_FORWARD", Some(1))],
            vec![op(1, "RETURN_VALUE", None)],
        ]);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_mid_block_target() {
        let c = code(vec![vec![
            op(0, "NOP", None),
            op(1, "JUMP_ABSOLUTE", Some(0)),
            op(2, "RETURN_VALUE", None),
        ]]);
        let c2 = code(vec![vec![op(0, "JUMP_ABSOLUTE", Some(1)), op(1, "NOP", None)]]);
        assert!(c.validate().is_ok());
        assert!(c2.validate().is_err());
    }

    #[test]
    fn test_unknown_mnemonic_is_fatal() {
        let err = op(0, "NOT_AN_OPCODE", None).opcode().unwrap_err();
        assert!(matches!(err, VirtualMachineError::UnknownOpcode { .. }));
    }

    #[test]
    fn test_param_slices() {
        let mut c = code(vec![]);
        c.varnames = ["a", "b", "k", "args", "kw", "local"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        c.argcount = 2;
        c.kwonlyargcount = 1;
        c.flags = CodeFlags::default()
            .with(CodeFlags::VARARGS)
            .with(CodeFlags::VARKEYWORDS);
        assert_eq!(c.positional_params(), &["a".to_string(), "b".to_string()]);
        assert_eq!(c.kwonly_params(), &["k".to_string()]);
        assert_eq!(c.varargs_name(), Some("args"));
        assert_eq!(c.varkeywords_name(), Some("kw"));
    }

    #[test]
    fn test_constant_repr() {
        assert_eq!(Constant::Tuple(vec![Constant::Int(1)]).repr(), "(1,)");
        assert_eq!(Constant::Str("a".into()).repr(), "\"a\"");
        assert_eq!(Constant::None.repr(), "None");
    }
}
