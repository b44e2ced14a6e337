//! Property-based tests for the engine
//!
//! Invariants that should hold for ALL generated programs:
//! - Stack balance: balanced push/pop sequences never underflow and leave
//!   nothing behind
//! - Determinism: two runs over the same input build identical graphs
//! - Block unwind: a `break` or `continue` inside a `try` unwinds to the
//!   loop's depth

mod common;

use codegraph_absint::{AnalysisResult, Assembler, Constant};
use common::*;
use proptest::prelude::*;

fn constant_strategy() -> impl Strategy<Value = Constant> {
    prop_oneof![
        Just(Constant::None),
        any::<bool>().prop_map(Constant::Bool),
        (-1000i64..1000).prop_map(Constant::Int),
        "[a-z]{0,6}".prop_map(Constant::Str),
    ]
}

/// Push/pop sequence that never pops an empty stack and ends empty
fn emit_balanced(asm: &mut Assembler, steps: &[(bool, Constant)]) {
    let mut depth = 0usize;
    for (push, constant) in steps {
        if *push || depth == 0 {
            asm.load_const(constant.clone());
            depth += 1;
        } else {
            asm.op("POP_TOP");
            depth -= 1;
        }
    }
    for _ in 0..depth {
        asm.op("POP_TOP");
    }
}

/// Everything observable about a run, in a comparable form
fn fingerprint(result: &AnalysisResult) -> (Vec<String>, Vec<Vec<u32>>, Vec<(String, usize)>, Vec<String>) {
    let nodes = result.program.nodes().map(|n| n.name.clone()).collect();
    let bindings = result
        .globals
        .values()
        .map(|var| {
            result
                .program
                .bindings(*var)
                .iter()
                .map(|b| result.program.binding_data(*b).index() as u32)
                .collect()
        })
        .collect();
    let traces = result
        .traces
        .iter()
        .map(|t| (t.opcode.clone(), t.node.index()))
        .collect();
    let diagnostics = result.diagnostics.iter().map(|d| d.message.clone()).collect();
    (nodes, bindings, traces, diagnostics)
}

proptest! {
    #[test]
    fn prop_balanced_stack_sequences_run_clean(
        steps in prop::collection::vec((any::<bool>(), constant_strategy()), 0..40)
    ) {
        let result = ModuleBuilder::new()
            .raw(|asm| emit_balanced(asm, &steps))
            .analyze();
        prop_assert!(result.diagnostics.is_empty());
        let pops = result.opcode_counts.get("POP_TOP").copied().unwrap_or(0);
        let loads = result.opcode_counts.get("LOAD_CONST").copied().unwrap_or(0);
        // The closing `return None` loads one constant and pops nothing.
        prop_assert_eq!(loads, pops + 1);
    }

    #[test]
    fn prop_runs_are_deterministic(
        first in constant_strategy(),
        second in constant_strategy(),
        steps in prop::collection::vec((any::<bool>(), constant_strategy()), 0..20)
    ) {
        let build = || {
            ModuleBuilder::new()
                .if_else("flag", ("v", first.clone()), ("v", second.clone()))
                .raw(|asm| emit_balanced(asm, &steps))
                .function("f", fixture_branching_function("f"))
                .call("r", "f", vec![first.clone()])
                .analyze()
        };
        prop_assert_eq!(fingerprint(&build()), fingerprint(&build()));
    }

    #[test]
    fn prop_break_in_try_restores_loop_depth(pushes in 0usize..6) {
        let result = ModuleBuilder::new()
            .raw(|asm| emit_break_in_try(asm, pushes))
            .analyze();
        prop_assert_eq!(result.global_type("after").map(|t| t.to_string()), Some("int".to_string()));
    }

    #[test]
    fn prop_continue_in_try_restores_loop_depth(pushes in 0usize..6) {
        let result = ModuleBuilder::new()
            .raw(|asm| emit_continue_in_try(asm, pushes))
            .analyze();
        prop_assert_eq!(result.global_type("after").map(|t| t.to_string()), Some("int".to_string()));
    }
}
