//! Custom assertions for test verification
//!
//! This module provides domain-specific assertions for codegraph-absint testing.

use codegraph_absint::features::abstract_values::Literal;
use codegraph_absint::{AnalysisResult, BindingId, CfgNodeId, ErrorKind, VariableId};

/// Assert that the run queued no diagnostics
pub fn assert_no_diagnostics(result: &AnalysisResult) {
    assert!(
        result.diagnostics.is_empty(),
        "Expected no diagnostics, got: {:?}",
        result
            .diagnostics
            .iter()
            .map(|d| (d.kind, &d.message))
            .collect::<Vec<_>>()
    );
}

/// Assert that exactly one diagnostic of `kind` was queued, with `message`
pub fn assert_single_diagnostic(result: &AnalysisResult, kind: ErrorKind, message: &str) {
    let found: Vec<&str> = result
        .diagnostics
        .iter()
        .filter(|d| d.kind == kind)
        .map(|d| d.message.as_str())
        .collect();
    assert_eq!(found, vec![message], "diagnostics of kind {kind:?}");
}

/// Assert the rendered type of a module-level name at the end of the run
pub fn assert_global_type(result: &AnalysisResult, name: &str, expected: &str) {
    let ty = result
        .global_type(name)
        .unwrap_or_else(|| panic!("global '{name}' is not defined"));
    assert_eq!(ty.to_string(), expected, "type of global '{name}'");
}

/// Module-level variable for `name`
pub fn global_var(result: &AnalysisResult, name: &str) -> VariableId {
    *result
        .globals
        .get(name)
        .unwrap_or_else(|| panic!("global '{name}' is not defined"))
}

/// The binding of `var` whose value is the literal `literal`
pub fn binding_with_literal(result: &AnalysisResult, var: VariableId, literal: &Literal) -> BindingId {
    result
        .program
        .bindings(var)
        .iter()
        .copied()
        .find(|b| result.values.literal(result.program.binding_data(*b)) == Some(literal))
        .unwrap_or_else(|| panic!("no binding with literal {literal:?}"))
}

/// The trace record of the last `opcode` executed for `symbol`
pub fn last_trace(result: &AnalysisResult, opcode: &str, symbol: &str) -> (VariableId, CfgNodeId) {
    let trace = result
        .traces
        .iter()
        .rev()
        .find(|t| t.opcode == opcode && t.symbol.as_deref() == Some(symbol))
        .unwrap_or_else(|| panic!("no {opcode} trace for '{symbol}'"));
    (trace.data[0], trace.node)
}

/// The trace record of the first `opcode` executed
pub fn first_trace(result: &AnalysisResult, opcode: &str) -> (VariableId, CfgNodeId) {
    let trace = result
        .traces
        .iter()
        .find(|t| t.opcode == opcode)
        .unwrap_or_else(|| panic!("no {opcode} trace"));
    (trace.data[0], trace.node)
}

/// Sorted union options of `var` as seen at `node`
pub fn options_at(result: &AnalysisResult, var: VariableId, node: CfgNodeId) -> Vec<String> {
    let mut options: Vec<String> = result
        .variable_type(var, node)
        .options()
        .iter()
        .map(|t| t.to_string())
        .collect();
    options.sort();
    options
}

/// Assert the set of union options of a module-level name, ignoring order
pub fn assert_global_options(result: &AnalysisResult, name: &str, expected: &[&str]) {
    let ty = result
        .global_type(name)
        .unwrap_or_else(|| panic!("global '{name}' is not defined"));
    let mut options: Vec<String> = ty.options().iter().map(|t| t.to_string()).collect();
    options.sort();
    let mut expected: Vec<String> = expected.iter().map(|s| s.to_string()).collect();
    expected.sort();
    assert_eq!(options, expected, "options of global '{name}'");
}
