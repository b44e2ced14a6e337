//! End-to-end scenarios over `run_program`
//!
//! Each test assembles a small module, runs the whole engine and checks the
//! provenance graph, the module's names or the queued diagnostics.

mod common;

use codegraph_absint::features::abstract_values::Literal;
use codegraph_absint::{AnalysisConfig, Constant, Director, ErrorKind, ModuleSpec, StaticImporter};
use common::*;
use pretty_assertions::assert_eq;

// ═══════════════════════════════════════════════════════════════════════════
// Branches and provenance
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_branch_values_are_mutually_exclusive() {
    let result = ModuleBuilder::new()
        .function("f", fixture_branching_function("f"))
        .analyze();

    let (y, node) = last_trace(&result, "LOAD_FAST", "y");
    let one = binding_with_literal(&result, y, &Literal::Int(1));
    let text = binding_with_literal(&result, y, &Literal::Str("a".into()));
    assert!(result.program.has_combination(node, &[one]));
    assert!(result.program.has_combination(node, &[text]));
    assert!(!result.program.has_combination(node, &[one, text]));
}

#[test]
fn test_constant_argument_prunes_branch() {
    let result = ModuleBuilder::new()
        .function("f", fixture_branching_function("f"))
        .call("r", "f", vec![Constant::Bool(true)])
        .analyze();
    assert_global_type(&result, "r", "int");
    assert_no_diagnostics(&result);
}

#[test]
fn test_binding_gated_by_condition() {
    // if flag: c = True else: c = False
    // if c: y = 1
    let result = ModuleBuilder::new()
        .if_else("flag", ("c", Constant::Bool(true)), ("c", Constant::Bool(false)))
        .raw(|asm| {
            let skip = asm.label();
            asm.op_name("LOAD_NAME", "c")
                .jump("POP_JUMP_IF_FALSE", skip)
                .load_const(Constant::Int(1))
                .op_name("STORE_NAME", "y")
                .place(skip);
        })
        .analyze();

    let c = global_var(&result, "c");
    let y = global_var(&result, "y");
    let is_true = binding_with_literal(&result, c, &Literal::Bool(true));
    let is_false = binding_with_literal(&result, c, &Literal::Bool(false));
    let one = binding_with_literal(&result, y, &Literal::Int(1));
    let exit = result.return_node;
    assert!(result.program.has_combination(exit, &[one, is_true]));
    assert!(!result.program.has_combination(exit, &[one, is_false]));
}

#[test]
fn test_if_else_join_is_union() {
    let result = ModuleBuilder::new()
        .if_else("flag", ("v", Constant::Int(1)), ("v", Constant::Str("a".into())))
        .analyze();
    assert_global_options(&result, "v", &["int", "str"]);
    assert_single_diagnostic(&result, ErrorKind::NameError, "Name 'flag' is not defined");
}

// ═══════════════════════════════════════════════════════════════════════════
// Exceptions and loops
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_finally_always_runs() {
    // try: raise ValueError() finally: x = 1
    let result = ModuleBuilder::new()
        .raw(|asm| {
            let finally = asm.label();
            asm.jump("SETUP_FINALLY", finally)
                .op_name("LOAD_NAME", "ValueError")
                .op_arg("CALL_FUNCTION", 0)
                .op_arg("RAISE_VARARGS", 1)
                .op("POP_BLOCK")
                .op("BEGIN_FINALLY")
                .place(finally)
                .load_const(Constant::Int(1))
                .op_name("STORE_NAME", "x")
                .op("END_FINALLY");
        })
        .analyze();

    let x = global_var(&result, "x");
    let one = binding_with_literal(&result, x, &Literal::Int(1));
    assert!(result.program.has_combination(result.return_node, &[one]));

    let (raised, _) = first_trace(&result, "RAISE_VARARGS");
    let exc = result.program.bindings(raised)[0];
    assert!(result.program.has_combination(result.return_node, &[one, exc]));
}

#[test]
fn test_break_inside_try_unwinds_to_loop_depth() {
    let result = ModuleBuilder::new()
        .raw(|asm| emit_break_in_try(asm, 2))
        .analyze();
    assert_global_type(&result, "after", "int");
    assert_global_type(&result, "i", "int");
    assert_no_diagnostics(&result);
}

#[test]
fn test_continue_inside_try_unwinds_to_loop_depth() {
    let result = ModuleBuilder::new()
        .raw(|asm| emit_continue_in_try(asm, 2))
        .analyze();
    assert_global_type(&result, "after", "int");
    assert_global_type(&result, "i", "int");
    assert_no_diagnostics(&result);
}

#[test]
fn test_suppressing_exit_resumes_after_with() {
    let result = ModuleBuilder::new()
        .raw(|asm| {
            emit_class(asm, "Quiet", fixture_context_manager_body("Quiet", Constant::Bool(true)));
            emit_raise_in_with(asm, "Quiet");
        })
        .analyze();
    assert_global_type(&result, "after", "int");
}

#[test]
fn test_plain_exit_lets_exception_escape_with() {
    let result = ModuleBuilder::new()
        .raw(|asm| {
            emit_class(asm, "Loud", fixture_context_manager_body("Loud", Constant::None));
            emit_raise_in_with(asm, "Loud");
        })
        .analyze();
    assert!(result.global_type("after").is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// Calls
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_direct_recursion_terminates_with_any() {
    let result = ModuleBuilder::new()
        .function("f", fixture_forwarding_function("f", "f"))
        .call("r", "f", vec![Constant::Int(1)])
        .analyze();
    assert_global_type(&result, "r", "Any");
    assert_no_diagnostics(&result);
}

#[test]
fn test_mutual_recursion_terminates_with_any() {
    let result = ModuleBuilder::new()
        .function("g", fixture_forwarding_function("g", "h"))
        .function("h", fixture_forwarding_function("h", "g"))
        .call("r", "g", vec![Constant::Int(1)])
        .analyze();
    assert_global_type(&result, "r", "Any");
}

fn call_chain(config: AnalysisConfig) -> codegraph_absint::AnalysisResult {
    // c0 -> c1 -> ... -> c9, c9 returns its argument
    let mut builder = ModuleBuilder::new().with_config(config);
    for i in 0..9 {
        builder = builder.function(
            &format!("c{i}"),
            fixture_forwarding_function(&format!("c{i}"), &format!("c{}", i + 1)),
        );
    }
    let mut last = codegraph_absint::Assembler::new("c9").with_args(&["n"]);
    last.op_name("LOAD_FAST", "n").op("RETURN_VALUE");
    builder
        .function("c9", last.finish().unwrap())
        .call("r", "c0", vec![Constant::Int(1)])
        .analyze()
}

#[test]
fn test_call_depth_limit_gives_any() {
    assert_global_type(&call_chain(AnalysisConfig::default()), "r", "int");
    assert_global_type(&call_chain(AnalysisConfig::default().max_call_depth(3)), "r", "Any");
}

#[test]
fn test_diagnostic_carries_call_stack() {
    let mut body = codegraph_absint::Assembler::new("f").with_first_line(5);
    body.line(6)
        .op_name("LOAD_GLOBAL", "missing")
        .op("RETURN_VALUE");
    let result = ModuleBuilder::new()
        .function("f", body.finish().unwrap())
        .line(9)
        .call("r", "f", vec![])
        .analyze();

    assert_eq!(result.diagnostics.len(), 1);
    let frames: Vec<(&str, u32)> = result.diagnostics[0]
        .stack
        .iter()
        .map(|f| (f.name.as_str(), f.line))
        .collect();
    assert_eq!(frames, vec![("<module>", 9), ("f", 6)]);
}

#[test]
fn test_imported_class_instantiates() {
    let importer = StaticImporter::new().with_module(ModuleSpec::new("shapes").class("Circle", &[]));
    let result = ModuleBuilder::new()
        .raw(|asm| {
            asm.load_const(Constant::Int(0))
                .load_const(Constant::Tuple(vec![Constant::Str("Circle".into())]))
                .op_name("IMPORT_NAME", "shapes")
                .op_name("IMPORT_FROM", "Circle")
                .op_name("STORE_NAME", "Circle")
                .op("POP_TOP");
        })
        .instantiate("c", "Circle")
        .analyze_with(&importer);
    assert_global_type(&result, "c", "Circle");
    assert_no_diagnostics(&result);
}

#[test]
fn test_closure_reads_enclosing_cell() {
    let result = ModuleBuilder::new()
        .function("outer", fixture_closure("outer", true))
        .call("r", "outer", vec![])
        .analyze();
    assert_global_type(&result, "r", "int");
    assert_no_diagnostics(&result);
}

#[test]
fn test_cell_read_before_store_sees_later_value() {
    let result = ModuleBuilder::new()
        .function("outer", fixture_closure("outer", false))
        .call("r", "outer", vec![])
        .analyze();
    let (read, _) = last_trace(&result, "LOAD_DEREF", "v");
    let resolved = result
        .program
        .data(read)
        .into_iter()
        .any(|v| result.values.literal(v) == Some(&Literal::Int(1)));
    assert!(resolved, "late cell read never received the stored value");
}

// ═══════════════════════════════════════════════════════════════════════════
// None filtering
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_uncalled_function_drops_unreachable_none() {
    let result = ModuleBuilder::new()
        .if_else("flag", ("x", Constant::None), ("x", Constant::Int(1)))
        .function("f", fixture_global_reader("f"))
        .analyze();

    let (x, node) = last_trace(&result, "LOAD_GLOBAL", "x");
    assert_eq!(options_at(&result, x, node), vec!["int"]);
    // None created inside the function itself stays
    let (y, node) = last_trace(&result, "LOAD_FAST", "y");
    assert_eq!(options_at(&result, y, node), vec!["None"]);
}

#[test]
fn test_called_function_keeps_none() {
    let result = ModuleBuilder::new()
        .if_else("flag", ("x", Constant::None), ("x", Constant::Int(1)))
        .function("f", fixture_global_reader("f"))
        .call("r", "f", vec![])
        .analyze();

    let (x, node) = last_trace(&result, "LOAD_GLOBAL", "x");
    assert_eq!(options_at(&result, x, node), vec!["None", "int"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// Locals and annotations
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_dataclass_fields_follow_declaration_order() {
    // @dataclass
    // class P:
    //     y: int
    //     x: str = "a"
    // p = P(1)
    // q = P()
    let director = Director::new().decorators(3, &["dataclass"]);
    let result = ModuleBuilder::new()
        .with_director(director)
        .raw(|asm| emit_class(asm, "P", fixture_record_body("P", 3)))
        .call("p", "P", vec![Constant::Int(1)])
        .call("q", "P", vec![])
        .analyze();

    let ops: Vec<(&str, bool)> = result.local_ops["P"]
        .iter()
        .map(|op| (op.name.as_str(), op.is_annotate()))
        .collect();
    assert_eq!(ops, vec![("y", true), ("x", false), ("x", true)]);
    assert_eq!(result.diagnostics.len(), 1);
    assert_single_diagnostic(
        &result,
        ErrorKind::MissingParameter,
        "Missing parameter 'y' in call to function P.__init__",
    );
}

#[test]
fn test_local_tables_hold_latest_run_of_scope() {
    // Two functions whose code objects share the name `init`
    let result = ModuleBuilder::new()
        .function("first", fixture_storing_function("init", &["a", "b"]))
        .function("second", fixture_storing_function("init", &["c"]))
        .call("r1", "first", vec![])
        .call("r2", "second", vec![])
        .call("r3", "second", vec![])
        .analyze();

    let names: Vec<&str> = result.local_ops["init"]
        .iter()
        .map(|op| op.name.as_str())
        .collect();
    assert_eq!(names, vec!["c"]);
}

// ═══════════════════════════════════════════════════════════════════════════
// Pattern matching
// ═══════════════════════════════════════════════════════════════════════════

/// class A; class B; x = A() if flag else B(); match x: <cases>
fn match_module(cases: &[(&str, &str)], config: AnalysisConfig) -> codegraph_absint::AnalysisResult {
    let director = Director::new().match_statement(fixture_match_statement(11, cases.len()));
    let cases = cases.to_vec();
    ModuleBuilder::new()
        .with_director(director)
        .with_config(config)
        .class("A")
        .class("B")
        .raw(|asm| {
            let (otherwise, end) = (asm.label(), asm.label());
            asm.op_name("LOAD_NAME", "flag")
                .jump("POP_JUMP_IF_FALSE", otherwise)
                .op_name("LOAD_NAME", "A")
                .op_arg("CALL_FUNCTION", 0)
                .op_name("STORE_NAME", "x")
                .jump("JUMP_FORWARD", end)
                .place(otherwise)
                .op_name("LOAD_NAME", "B")
                .op_arg("CALL_FUNCTION", 0)
                .op_name("STORE_NAME", "x")
                .place(end);
            emit_class_match(asm, "x", &cases, 11);
        })
        .analyze()
}

#[test]
fn test_match_narrows_each_case() {
    let result = match_module(&[("A", "in_a"), ("B", "in_b")], AnalysisConfig::default());
    assert_global_type(&result, "in_a", "A");
    assert_global_type(&result, "in_b", "B");
    assert_global_options(&result, "x", &["A", "B"]);
    assert!(!result.diagnostics.iter().any(|d| d.kind == ErrorKind::IncompleteMatch));
}

#[test]
fn test_match_missing_case_is_reported() {
    let result = match_module(&[("A", "in_a")], AnalysisConfig::default());
    assert_single_diagnostic(
        &result,
        ErrorKind::IncompleteMatch,
        "The match is missing the following cases: B",
    );
}

#[test]
fn test_match_redundant_case_is_reported() {
    let result = match_module(
        &[("A", "first"), ("A", "second"), ("B", "third")],
        AnalysisConfig::default(),
    );
    assert_single_diagnostic(
        &result,
        ErrorKind::RedundantMatch,
        "This case has already been covered: A.",
    );
}

#[test]
fn test_match_checks_respect_frame_bound() {
    let config = AnalysisConfig::default().exhaustive_match_frames(0);
    let result = match_module(&[("A", "in_a")], config);
    assert!(!result.diagnostics.iter().any(|d| d.kind == ErrorKind::IncompleteMatch));
}
