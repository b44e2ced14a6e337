//! Label-based builder for [`CodeObject`]s.
//!
//! Producers that already have decoded instructions build `CodeObject`s
//! directly; the assembler is for hand-written streams (tests, benches,
//! synthesized helpers). Jumps reference [`Label`]s, which are resolved to
//! instruction indices and used to split the stream into basic blocks.

use std::fmt;
use std::rc::Rc;

use super::bytecode::{BasicBlock, CodeFlags, CodeObject, Constant, Instruction};
use super::opcode::Opcode;

/// A jump destination that is placed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Label(usize);

/// Assembling failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    /// A label was referenced but never placed
    UnresolvedLabel(usize),
    /// A mnemonic outside the instruction set
    UnknownMnemonic(String),
    /// A deref op names neither a cellvar nor a freevar
    UnknownCell(String),
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnresolvedLabel(l) => write!(f, "label {l} was referenced but never placed"),
            Self::UnknownMnemonic(m) => write!(f, "unknown mnemonic '{m}'"),
            Self::UnknownCell(n) => write!(f, "'{n}' is not a cell or free variable"),
        }
    }
}

impl std::error::Error for AsmError {}

#[derive(Debug, Clone)]
struct PendingOp {
    mnemonic: String,
    arg: Option<u32>,
    argval: Option<String>,
    target: Option<Label>,
    line: u32,
}

/// Instruction stream builder
#[derive(Debug, Clone)]
pub struct Assembler {
    code: CodeObject,
    ops: Vec<PendingOp>,
    labels: Vec<Option<usize>>,
    line: u32,
}

impl Assembler {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            code: CodeObject {
                name: name.into(),
                filename: "<assembled>".to_string(),
                first_line: 1,
                argcount: 0,
                posonlyargcount: 0,
                kwonlyargcount: 0,
                varnames: Vec::new(),
                names: Vec::new(),
                cellvars: Vec::new(),
                freevars: Vec::new(),
                consts: Vec::new(),
                flags: CodeFlags(CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS),
                blocks: Vec::new(),
            },
            ops: Vec::new(),
            labels: Vec::new(),
            line: 1,
        }
    }

    /// Module-level code (names live in a dict, not fast locals)
    pub fn module() -> Self {
        let mut asm = Self::new("<module>");
        asm.code.flags = CodeFlags::default();
        asm
    }

    /// Builder: positional parameters
    pub fn with_args(mut self, names: &[&str]) -> Self {
        self.code.argcount = names.len() as u32;
        for name in names {
            self.varname(name);
        }
        self
    }

    /// Builder: keyword-only parameters (declare after `with_args`)
    pub fn with_kwonly_args(mut self, names: &[&str]) -> Self {
        self.code.kwonlyargcount = names.len() as u32;
        for name in names {
            self.varname(name);
        }
        self
    }

    /// Builder: `*args` parameter (declare after positional/kw-only)
    pub fn with_varargs(mut self, name: &str) -> Self {
        self.code.flags = self.code.flags.with(CodeFlags::VARARGS);
        self.varname(name);
        self
    }

    /// Builder: `**kwargs` parameter (declare last)
    pub fn with_varkeywords(mut self, name: &str) -> Self {
        self.code.flags = self.code.flags.with(CodeFlags::VARKEYWORDS);
        self.varname(name);
        self
    }

    pub fn with_cellvars(mut self, names: &[&str]) -> Self {
        self.code.cellvars = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_freevars(mut self, names: &[&str]) -> Self {
        self.code.freevars = names.iter().map(|s| s.to_string()).collect();
        self.code.flags = self.code.flags.with(CodeFlags::NESTED);
        self
    }

    pub fn with_flags(mut self, bits: u32) -> Self {
        self.code.flags = self.code.flags.with(bits);
        self
    }

    pub fn with_first_line(mut self, line: u32) -> Self {
        self.code.first_line = line;
        self.line = line;
        self
    }

    pub fn with_filename(mut self, filename: &str) -> Self {
        self.code.filename = filename.to_string();
        self
    }

    /// Set the source line for subsequent instructions
    pub fn line(&mut self, line: u32) -> &mut Self {
        self.line = line;
        self
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Bind a label to the next emitted instruction
    pub fn place(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.ops.len());
        self
    }

    /// Emit an instruction without argument
    pub fn op(&mut self, mnemonic: &str) -> &mut Self {
        self.push(mnemonic, None, None, None)
    }

    /// Emit an instruction with an integer argument
    pub fn op_arg(&mut self, mnemonic: &str, arg: u32) -> &mut Self {
        self.push(mnemonic, Some(arg), None, None)
    }

    /// Emit an instruction with a textual argument (e.g. COMPARE_OP "==")
    pub fn op_argval(&mut self, mnemonic: &str, arg: u32, argval: &str) -> &mut Self {
        self.push(mnemonic, Some(arg), Some(argval.to_string()), None)
    }

    /// Emit a jump to a label
    pub fn jump(&mut self, mnemonic: &str, label: Label) -> &mut Self {
        self.push(mnemonic, None, None, Some(label))
    }

    /// Emit a jump that also carries an integer argument
    pub fn jump_arg(&mut self, mnemonic: &str, arg: u32, label: Label) -> &mut Self {
        self.push(mnemonic, Some(arg), None, Some(label))
    }

    /// LOAD_CONST, interning the constant
    pub fn load_const(&mut self, constant: Constant) -> &mut Self {
        let idx = self.constant(constant);
        self.push("LOAD_CONST", Some(idx), None, None)
    }

    /// LOAD_CONST of a nested code object
    pub fn load_code(&mut self, code: CodeObject) -> &mut Self {
        self.load_const(Constant::Code(Rc::new(code)))
    }

    /// KW_NAMES with the names interned as a tuple constant
    pub fn kw_names(&mut self, names: &[&str]) -> &mut Self {
        let tuple = Constant::Tuple(names.iter().map(|n| Constant::Str(n.to_string())).collect());
        let idx = self.constant(tuple);
        self.push("KW_NAMES", Some(idx), None, None)
    }

    /// Emit a name-carrying instruction; the name lands in the right table
    pub fn op_name(&mut self, mnemonic: &str, name: &str) -> &mut Self {
        let idx = match mnemonic {
            "LOAD_FAST" | "STORE_FAST" | "DELETE_FAST" => self.varname(name),
            "LOAD_DEREF" | "STORE_DEREF" | "DELETE_DEREF" | "LOAD_CLOSURE"
            | "LOAD_CLASSDEREF" => match self.code.cell_names().position(|n| n == name) {
                Some(i) => i as u32,
                None => {
                    // Resolved at finish() so the error surfaces as AsmError
                    u32::MAX
                }
            },
            _ => self.name(name),
        };
        self.push(mnemonic, Some(idx), Some(name.to_string()), None)
    }

    fn push(
        &mut self,
        mnemonic: &str,
        arg: Option<u32>,
        argval: Option<String>,
        target: Option<Label>,
    ) -> &mut Self {
        self.ops.push(PendingOp {
            mnemonic: mnemonic.to_string(),
            arg,
            argval,
            target,
            line: self.line,
        });
        self
    }

    fn constant(&mut self, constant: Constant) -> u32 {
        if let Some(pos) = self.code.consts.iter().position(|c| *c == constant) {
            return pos as u32;
        }
        self.code.consts.push(constant);
        (self.code.consts.len() - 1) as u32
    }

    fn varname(&mut self, name: &str) -> u32 {
        if let Some(pos) = self.code.varnames.iter().position(|n| n == name) {
            return pos as u32;
        }
        self.code.varnames.push(name.to_string());
        (self.code.varnames.len() - 1) as u32
    }

    fn name(&mut self, name: &str) -> u32 {
        if let Some(pos) = self.code.names.iter().position(|n| n == name) {
            return pos as u32;
        }
        self.code.names.push(name.to_string());
        (self.code.names.len() - 1) as u32
    }

    /// Resolve labels and split into basic blocks
    pub fn finish(self) -> Result<CodeObject, AsmError> {
        let Assembler {
            mut code,
            ops,
            labels,
            ..
        } = self;

        let mut instructions = Vec::with_capacity(ops.len());
        let mut starts = vec![false; ops.len() + 1];
        if !ops.is_empty() {
            starts[0] = true;
        }
        for (index, pending) in ops.into_iter().enumerate() {
            let opcode = Opcode::from_mnemonic(&pending.mnemonic)
                .ok_or_else(|| AsmError::UnknownMnemonic(pending.mnemonic.clone()))?;
            if pending.arg == Some(u32::MAX) {
                return Err(AsmError::UnknownCell(pending.argval.unwrap_or_default()));
            }
            let target = match pending.target {
                Some(label) => {
                    let resolved = labels[label.0].ok_or(AsmError::UnresolvedLabel(label.0))?;
                    starts[resolved] = true;
                    Some(resolved)
                }
                None => None,
            };
            if opcode.ends_block() {
                starts[index + 1] = true;
            }
            instructions.push(Instruction {
                index,
                mnemonic: pending.mnemonic,
                arg: pending.arg,
                argval: pending.argval,
                target,
                line: pending.line,
            });
        }

        let mut blocks: Vec<BasicBlock> = Vec::new();
        for op in instructions {
            if starts[op.index] || blocks.is_empty() {
                blocks.push(BasicBlock {
                    id: blocks.len(),
                    instructions: Vec::new(),
                });
            }
            if let Some(block) = blocks.last_mut() {
                block.instructions.push(op);
            }
        }
        code.blocks = blocks;
        Ok(code)
    }
}
