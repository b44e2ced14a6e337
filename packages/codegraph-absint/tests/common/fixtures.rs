//! Test fixture generators
//!
//! Function bodies shared by several integration tests, assembled the way
//! a CPython 3.9 compiler would lay them out.

use codegraph_absint::shared::models::{CaseInfo, Label, MatchStatement};
use codegraph_absint::{Assembler, CodeObject, Constant};

/// def name(cond):
///     if cond: y = 1
///     else: y = "a"
///     return y
pub fn fixture_branching_function(name: &str) -> CodeObject {
    let mut asm = Assembler::new(name).with_args(&["cond"]);
    let (otherwise, end) = (asm.label(), asm.label());
    asm.op_name("LOAD_FAST", "cond")
        .jump("POP_JUMP_IF_FALSE", otherwise)
        .load_const(Constant::Int(1))
        .op_name("STORE_FAST", "y")
        .jump("JUMP_FORWARD", end)
        .place(otherwise)
        .load_const(Constant::Str("a".into()))
        .op_name("STORE_FAST", "y")
        .place(end)
        .op_name("LOAD_FAST", "y")
        .op("RETURN_VALUE");
    asm.finish().expect("function assembles")
}

/// def name(n): return callee(n)
pub fn fixture_forwarding_function(name: &str, callee: &str) -> CodeObject {
    let mut asm = Assembler::new(name).with_args(&["n"]);
    asm.op_name("LOAD_GLOBAL", callee)
        .op_name("LOAD_FAST", "n")
        .op_arg("CALL_FUNCTION", 1)
        .op("RETURN_VALUE");
    asm.finish().expect("function assembles")
}

/// Emit `for i in (1, 2): try: break` with `pushes` constants left on the
/// operand stack inside the `try`, followed by `after = 0`
pub fn emit_break_in_try(asm: &mut Assembler, pushes: usize) {
    let (end, after, handler) = (asm.label(), asm.label(), asm.label());
    asm.jump("SETUP_LOOP", end)
        .load_const(Constant::Tuple(vec![Constant::Int(1), Constant::Int(2)]))
        .op("GET_ITER")
        .jump("FOR_ITER", after)
        .op_name("STORE_NAME", "i")
        .jump("SETUP_FINALLY", handler);
    for n in 0..pushes {
        asm.load_const(Constant::Int(n as i64));
    }
    asm.op("BREAK_LOOP")
        .place(handler)
        .op("RERAISE")
        .place(after)
        .op("POP_BLOCK")
        .place(end)
        .load_const(Constant::Int(0))
        .op_name("STORE_NAME", "after");
}

/// Emit `for i in (1, 2): try: continue` with `pushes` constants left on
/// the stack inside the try body, then `after = 0`
pub fn emit_continue_in_try(asm: &mut Assembler, pushes: usize) {
    let (end, head, after, handler) = (asm.label(), asm.label(), asm.label(), asm.label());
    asm.jump("SETUP_LOOP", end)
        .load_const(Constant::Tuple(vec![Constant::Int(1), Constant::Int(2)]))
        .op("GET_ITER")
        .place(head)
        .jump("FOR_ITER", after)
        .op_name("STORE_NAME", "i")
        .jump("SETUP_FINALLY", handler);
    for n in 0..pushes {
        asm.load_const(Constant::Int(n as i64));
    }
    asm.jump("CONTINUE_LOOP", head)
        .place(handler)
        .op("RERAISE")
        .place(after)
        .op("POP_BLOCK")
        .place(end)
        .load_const(Constant::Int(0))
        .op_name("STORE_NAME", "after");
}

/// Emit `name = <class built from body>` via `__build_class__`
pub fn emit_class(asm: &mut Assembler, name: &str, body: CodeObject) {
    asm.op("LOAD_BUILD_CLASS")
        .load_code(body)
        .load_const(Constant::Str(name.into()))
        .op_arg("MAKE_FUNCTION", 0)
        .load_const(Constant::Str(name.into()))
        .op_arg("CALL_FUNCTION", 2)
        .op_name("STORE_NAME", name);
}

/// Class body of a context manager whose `__exit__` returns `exit_result`
///
///     def __enter__(self): return self
///     def __exit__(self, t, v, tb): return <exit_result>
pub fn fixture_context_manager_body(name: &str, exit_result: Constant) -> CodeObject {
    let mut enter = Assembler::new("__enter__").with_args(&["self"]);
    enter.op_name("LOAD_FAST", "self").op("RETURN_VALUE");
    let mut exit = Assembler::new("__exit__").with_args(&["self", "t", "v", "tb"]);
    exit.load_const(exit_result).op("RETURN_VALUE");

    let mut body = Assembler::new(name);
    body.load_code(enter.finish().expect("__enter__ assembles"))
        .load_const(Constant::Str(format!("{name}.__enter__")))
        .op_arg("MAKE_FUNCTION", 0)
        .op_name("STORE_NAME", "__enter__")
        .load_code(exit.finish().expect("__exit__ assembles"))
        .load_const(Constant::Str(format!("{name}.__exit__")))
        .op_arg("MAKE_FUNCTION", 0)
        .op_name("STORE_NAME", "__exit__")
        .load_const(Constant::None)
        .op("RETURN_VALUE");
    body.finish().expect("class body assembles")
}

/// Emit `with manager: raise ValueError()` followed by `after = 1`
pub fn emit_raise_in_with(asm: &mut Assembler, manager: &str) {
    let cleanup = asm.label();
    asm.op_name("LOAD_NAME", manager)
        .op_arg("CALL_FUNCTION", 0)
        .jump("SETUP_WITH", cleanup)
        .op("POP_TOP")
        .op_name("LOAD_NAME", "ValueError")
        .op_arg("RAISE_VARARGS", 1)
        .op("POP_BLOCK")
        .op("BEGIN_FINALLY")
        .place(cleanup)
        .op("WITH_CLEANUP_START")
        .op("WITH_CLEANUP_FINISH")
        .op("END_FINALLY")
        .load_const(Constant::Int(1))
        .op_name("STORE_NAME", "after");
}

/// Class body starting at `first_line`:
///
///     y: int
///     x: str = "a"
pub fn fixture_record_body(name: &str, first_line: u32) -> CodeObject {
    let mut body = Assembler::new(name).with_first_line(first_line);
    body.op("SETUP_ANNOTATIONS")
        .op_name("LOAD_NAME", "int")
        .op_name("LOAD_NAME", "__annotations__")
        .load_const(Constant::Str("y".into()))
        .op("STORE_SUBSCR")
        .load_const(Constant::Str("a".into()))
        .op_name("STORE_NAME", "x")
        .op_name("LOAD_NAME", "str")
        .op_name("LOAD_NAME", "__annotations__")
        .load_const(Constant::Str("x".into()))
        .op("STORE_SUBSCR")
        .load_const(Constant::None)
        .op("RETURN_VALUE");
    body.finish().expect("class body assembles")
}

/// def name():
///     [v = 1]              when `store_first`
///     def inner(): return v
///     r = inner()
///     [v = 1]              otherwise
///     return r
pub fn fixture_closure(name: &str, store_first: bool) -> CodeObject {
    let mut inner = Assembler::new("inner").with_freevars(&["v"]);
    inner.op_name("LOAD_DEREF", "v").op("RETURN_VALUE");

    let mut asm = Assembler::new(name).with_cellvars(&["v"]);
    if store_first {
        asm.load_const(Constant::Int(1)).op_name("STORE_DEREF", "v");
    }
    asm.op_name("LOAD_CLOSURE", "v")
        .op_arg("BUILD_TUPLE", 1)
        .load_code(inner.finish().expect("inner assembles"))
        .load_const(Constant::Str(format!("{name}.<locals>.inner")))
        .op_arg("MAKE_FUNCTION", 8)
        .op_arg("CALL_FUNCTION", 0)
        .op_name("STORE_FAST", "r");
    if !store_first {
        asm.load_const(Constant::Int(1)).op_name("STORE_DEREF", "v");
    }
    asm.op_name("LOAD_FAST", "r").op("RETURN_VALUE");
    asm.finish().expect("function assembles")
}

/// def name():
///     <scope names> = 1, one store each
///     return None
pub fn fixture_storing_function(name: &str, stores: &[&str]) -> CodeObject {
    let mut asm = Assembler::new(name);
    for store in stores {
        asm.load_const(Constant::Int(1)).op_name("STORE_FAST", store);
    }
    asm.load_const(Constant::None).op("RETURN_VALUE");
    asm.finish().expect("function assembles")
}

/// def name():
///     x                    (module global, read and dropped)
///     y = None
///     return y
pub fn fixture_global_reader(name: &str) -> CodeObject {
    let mut asm = Assembler::new(name);
    asm.op_name("LOAD_GLOBAL", "x")
        .op("POP_TOP")
        .load_const(Constant::None)
        .op_name("STORE_FAST", "y")
        .op_name("LOAD_FAST", "y")
        .op("RETURN_VALUE");
    asm.finish().expect("function assembles")
}

/// One `case <class>(): <target> = subject` arm of a class-pattern chain
pub fn emit_class_case(asm: &mut Assembler, line: u32, class: &str, subject: &str, target: &str, end: Label) {
    let next = asm.label();
    asm.line(line)
        .op_arg("COPY", 1)
        .op_name("LOAD_NAME", class)
        .load_const(Constant::Tuple(vec![]))
        .op_arg("MATCH_CLASS", 0)
        .jump("POP_JUMP_IF_NONE", next)
        .op("POP_TOP")
        .op_name("LOAD_NAME", subject)
        .op_name("STORE_NAME", target)
        .jump("JUMP_FORWARD", end)
        .place(next);
}

/// `match subject:` with one class case per `(class, target)` pair,
/// cases on consecutive lines starting at `first_line`
pub fn emit_class_match(asm: &mut Assembler, subject: &str, cases: &[(&str, &str)], first_line: u32) {
    let end = asm.label();
    asm.line(first_line - 1).op_name("LOAD_NAME", subject);
    for (i, (class, target)) in cases.iter().enumerate() {
        emit_class_case(asm, first_line + i as u32, class, subject, target, end);
    }
    asm.op("POP_TOP").place(end);
}

/// Director metadata for a match whose cases start at `first_line`
pub fn fixture_match_statement(first_line: u32, cases: usize) -> MatchStatement {
    MatchStatement {
        start: first_line - 1,
        end: first_line + cases as u32,
        cases: (0..cases as u32)
            .map(|i| CaseInfo {
                line: first_line + i,
                is_wildcard: false,
                has_guard: false,
            })
            .collect(),
    }
}
