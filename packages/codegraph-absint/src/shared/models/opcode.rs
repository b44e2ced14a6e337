//! The instruction set understood by the engine.
//!
//! CPython 3.8 - 3.11 flavoured; see `Opcode::has_jump` / `carries_on` for
//! the block-splitting properties the frame runner depends on.

define_opcodes! {
    // Stack manipulation
    Nop => "NOP",
    PopTop => "POP_TOP",
    RotTwo => "ROT_TWO",
    RotThree => "ROT_THREE",
    RotFour => "ROT_FOUR",
    RotN => "ROT_N",
    DupTop => "DUP_TOP",
    DupTopTwo => "DUP_TOP_TWO",
    Copy => "COPY",
    Swap => "SWAP",
    PushNull => "PUSH_NULL",
    // Constants and names
    LoadConst => "LOAD_CONST",
    LoadName => "LOAD_NAME",
    StoreName => "STORE_NAME",
    DeleteName => "DELETE_NAME",
    LoadFast => "LOAD_FAST",
    StoreFast => "STORE_FAST",
    DeleteFast => "DELETE_FAST",
    LoadGlobal => "LOAD_GLOBAL",
    StoreGlobal => "STORE_GLOBAL",
    DeleteGlobal => "DELETE_GLOBAL",
    LoadDeref => "LOAD_DEREF",
    StoreDeref => "STORE_DEREF",
    DeleteDeref => "DELETE_DEREF",
    LoadClosure => "LOAD_CLOSURE",
    LoadClassderef => "LOAD_CLASSDEREF",
    LoadAssertionError => "LOAD_ASSERTION_ERROR",
    LoadBuildClass => "LOAD_BUILD_CLASS",
    SetupAnnotations => "SETUP_ANNOTATIONS",
    // Operators
    UnaryPositive => "UNARY_POSITIVE",
    UnaryNegative => "UNARY_NEGATIVE",
    UnaryNot => "UNARY_NOT",
    UnaryInvert => "UNARY_INVERT",
    BinaryAdd => "BINARY_ADD",
    BinarySubtract => "BINARY_SUBTRACT",
    BinaryMultiply => "BINARY_MULTIPLY",
    BinaryMatrixMultiply => "BINARY_MATRIX_MULTIPLY",
    BinaryTrueDivide => "BINARY_TRUE_DIVIDE",
    BinaryFloorDivide => "BINARY_FLOOR_DIVIDE",
    BinaryModulo => "BINARY_MODULO",
    BinaryPower => "BINARY_POWER",
    BinaryLshift => "BINARY_LSHIFT",
    BinaryRshift => "BINARY_RSHIFT",
    BinaryAnd => "BINARY_AND",
    BinaryOr => "BINARY_OR",
    BinaryXor => "BINARY_XOR",
    InplaceAdd => "INPLACE_ADD",
    InplaceSubtract => "INPLACE_SUBTRACT",
    InplaceMultiply => "INPLACE_MULTIPLY",
    InplaceMatrixMultiply => "INPLACE_MATRIX_MULTIPLY",
    InplaceTrueDivide => "INPLACE_TRUE_DIVIDE",
    InplaceFloorDivide => "INPLACE_FLOOR_DIVIDE",
    InplaceModulo => "INPLACE_MODULO",
    InplacePower => "INPLACE_POWER",
    InplaceLshift => "INPLACE_LSHIFT",
    InplaceRshift => "INPLACE_RSHIFT",
    InplaceAnd => "INPLACE_AND",
    InplaceOr => "INPLACE_OR",
    InplaceXor => "INPLACE_XOR",
    BinaryOp => "BINARY_OP",
    CompareOp => "COMPARE_OP",
    IsOp => "IS_OP",
    ContainsOp => "CONTAINS_OP",
    // Containers
    BuildTuple => "BUILD_TUPLE",
    BuildList => "BUILD_LIST",
    BuildSet => "BUILD_SET",
    BuildMap => "BUILD_MAP",
    BuildConstKeyMap => "BUILD_CONST_KEY_MAP",
    BuildString => "BUILD_STRING",
    BuildSlice => "BUILD_SLICE",
    ListAppend => "LIST_APPEND",
    SetAdd => "SET_ADD",
    MapAdd => "MAP_ADD",
    ListExtend => "LIST_EXTEND",
    SetUpdate => "SET_UPDATE",
    DictUpdate => "DICT_UPDATE",
    DictMerge => "DICT_MERGE",
    ListToTuple => "LIST_TO_TUPLE",
    UnpackSequence => "UNPACK_SEQUENCE",
    UnpackEx => "UNPACK_EX",
    BinarySubscr => "BINARY_SUBSCR",
    StoreSubscr => "STORE_SUBSCR",
    DeleteSubscr => "DELETE_SUBSCR",
    FormatValue => "FORMAT_VALUE",
    // Attributes
    LoadAttr => "LOAD_ATTR",
    StoreAttr => "STORE_ATTR",
    DeleteAttr => "DELETE_ATTR",
    LoadMethod => "LOAD_METHOD",
    // Calls
    CallFunction => "CALL_FUNCTION",
    CallFunctionKw => "CALL_FUNCTION_KW",
    CallFunctionEx => "CALL_FUNCTION_EX",
    CallMethod => "CALL_METHOD",
    Precall => "PRECALL",
    Call => "CALL",
    KwNames => "KW_NAMES",
    MakeFunction => "MAKE_FUNCTION",
    ReturnValue => "RETURN_VALUE",
    // Control flow
    JumpForward => "JUMP_FORWARD",
    JumpAbsolute => "JUMP_ABSOLUTE",
    JumpBackward => "JUMP_BACKWARD",
    PopJumpIfTrue => "POP_JUMP_IF_TRUE",
    PopJumpIfFalse => "POP_JUMP_IF_FALSE",
    PopJumpIfNone => "POP_JUMP_IF_NONE",
    PopJumpIfNotNone => "POP_JUMP_IF_NOT_NONE",
    JumpIfTrueOrPop => "JUMP_IF_TRUE_OR_POP",
    JumpIfFalseOrPop => "JUMP_IF_FALSE_OR_POP",
    GetIter => "GET_ITER",
    ForIter => "FOR_ITER",
    SetupLoop => "SETUP_LOOP",
    BreakLoop => "BREAK_LOOP",
    ContinueLoop => "CONTINUE_LOOP",
    PopBlock => "POP_BLOCK",
    // Exceptions
    SetupExcept => "SETUP_EXCEPT",
    SetupFinally => "SETUP_FINALLY",
    BeginFinally => "BEGIN_FINALLY",
    EndFinally => "END_FINALLY",
    PopFinally => "POP_FINALLY",
    CallFinally => "CALL_FINALLY",
    PopExcept => "POP_EXCEPT",
    Reraise => "RERAISE",
    RaiseVarargs => "RAISE_VARARGS",
    CheckExcMatch => "CHECK_EXC_MATCH",
    JumpIfNotExcMatch => "JUMP_IF_NOT_EXC_MATCH",
    // With statements
    SetupWith => "SETUP_WITH",
    BeforeWith => "BEFORE_WITH",
    SetupAsyncWith => "SETUP_ASYNC_WITH",
    BeforeAsyncWith => "BEFORE_ASYNC_WITH",
    WithCleanupStart => "WITH_CLEANUP_START",
    WithCleanupFinish => "WITH_CLEANUP_FINISH",
    // Generators and coroutines
    YieldValue => "YIELD_VALUE",
    YieldFrom => "YIELD_FROM",
    GetAwaitable => "GET_AWAITABLE",
    GetAiter => "GET_AITER",
    GetAnext => "GET_ANEXT",
    GetYieldFromIter => "GET_YIELD_FROM_ITER",
    EndAsyncFor => "END_ASYNC_FOR",
    ReturnGenerator => "RETURN_GENERATOR",
    GenStart => "GEN_START",
    // Imports
    ImportName => "IMPORT_NAME",
    ImportFrom => "IMPORT_FROM",
    ImportStar => "IMPORT_STAR",
    // Pattern matching
    GetLen => "GET_LEN",
    MatchMapping => "MATCH_MAPPING",
    MatchSequence => "MATCH_SEQUENCE",
    MatchKeys => "MATCH_KEYS",
    MatchClass => "MATCH_CLASS",
    CopyDictWithoutKeys => "COPY_DICT_WITHOUT_KEYS",
    // Misc
    PrintExpr => "PRINT_EXPR",
    ExtendedArg => "EXTENDED_ARG",
    Cache => "CACHE",
    Resume => "RESUME",
}

impl Opcode {
    /// Instruction carries a jump target (conditional or not)
    pub fn has_jump(self) -> bool {
        matches!(
            self,
            Opcode::JumpForward
                | Opcode::JumpAbsolute
                | Opcode::JumpBackward
                | Opcode::PopJumpIfTrue
                | Opcode::PopJumpIfFalse
                | Opcode::PopJumpIfNone
                | Opcode::PopJumpIfNotNone
                | Opcode::JumpIfTrueOrPop
                | Opcode::JumpIfFalseOrPop
                | Opcode::ForIter
                | Opcode::SetupLoop
                | Opcode::ContinueLoop
                | Opcode::SetupExcept
                | Opcode::SetupFinally
                | Opcode::CallFinally
                | Opcode::SetupWith
                | Opcode::SetupAsyncWith
                | Opcode::JumpIfNotExcMatch
        )
    }

    /// Control may fall through to the next instruction
    pub fn carries_on(self) -> bool {
        !matches!(
            self,
            Opcode::JumpForward
                | Opcode::JumpAbsolute
                | Opcode::JumpBackward
                | Opcode::ReturnValue
                | Opcode::RaiseVarargs
                | Opcode::Reraise
                | Opcode::BreakLoop
                | Opcode::ContinueLoop
        )
    }

    /// Starts a block that records an exception/finally handler
    pub fn is_setup_handler(self) -> bool {
        matches!(
            self,
            Opcode::SetupExcept
                | Opcode::SetupFinally
                | Opcode::SetupWith
                | Opcode::SetupAsyncWith
        )
    }

    /// Ends the current basic block when assembling
    pub fn ends_block(self) -> bool {
        self.has_jump() || !self.carries_on()
    }
}

impl std::str::FromStr for Opcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Opcode::from_mnemonic(s).ok_or_else(|| format!("unknown opcode '{s}'"))
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
