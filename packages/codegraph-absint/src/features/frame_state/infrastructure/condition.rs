//! Branch conditions
//!
//! A conditional jump splits the CFG in two. Each side gets a node whose
//! condition binding can only hold together with the bindings of the tested
//! variable that are compatible with that side's truth value.

use crate::features::abstract_values::{compatible_with, ValueStore};
use crate::features::typegraph::{BindingId, CfgNodeId, Program, ValueId, VariableId};

/// Outcome of restricting a variable to one truth value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    /// No binding can take the branch
    Unsatisfiable,
    /// Every binding can take the branch
    Unrestricted,
    /// Only some can; the binding encodes which
    Condition(BindingId),
}

/// Build the condition under which `var` is truthy (`branch == true`) or falsy at `node`
pub fn restrict_condition(
    program: &mut Program,
    values: &ValueStore,
    node: CfgNodeId,
    var: VariableId,
    branch: bool,
    marker: ValueId,
) -> Restriction {
    restrict_by(program, node, var, marker, |v| compatible_with(values, v, branch))
}

/// Restrict `var` to the bindings whose value passes `keep`
pub fn restrict_by(
    program: &mut Program,
    node: CfgNodeId,
    var: VariableId,
    marker: ValueId,
    keep: impl Fn(ValueId) -> bool,
) -> Restriction {
    let mut bindings = program.filter(var, node);
    if bindings.is_empty() {
        bindings = program.bindings(var).to_vec();
    }
    let mut dnf: Vec<BindingId> = Vec::new();
    let mut restricted = false;
    for b in bindings {
        if keep(program.binding_data(b)) {
            dnf.push(b);
        } else {
            restricted = true;
        }
    }
    if dnf.is_empty() {
        return Restriction::Unsatisfiable;
    }
    if !restricted {
        return Restriction::Unrestricted;
    }
    let sets: Vec<Vec<BindingId>> = dnf.into_iter().map(|b| vec![b]).collect();
    Restriction::Condition(new_condition(program, node, &sets, marker))
}

pub fn new_condition(
    program: &mut Program,
    node: CfgNodeId,
    dnf: &[Vec<BindingId>],
    marker: ValueId,
) -> BindingId {
    let var = program.new_variable();
    let binding = program.add_bare_binding(var, marker);
    for set in dnf {
        program.add_origin(binding, node, set.iter().copied());
    }
    binding
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::abstract_values::Converter;
    use crate::shared::models::Constant;

    #[test]
    fn test_restriction_kinds() {
        let mut values = ValueStore::new();
        let mut program = Program::new();
        let root = program.new_cfg_node("root", None);
        let mut conv = Converter::new(&mut values, &mut program, root);
        let marker = conv.well_known.true_;
        let none = conv.well_known.none;
        let one = conv.constant(&mut values, &mut program, &Constant::Int(1));

        let n = program.connect_new(root, "n", None);
        let var = program.new_variable_with(&[none, one], &[], n);

        assert!(matches!(
            restrict_condition(&mut program, &values, n, var, true, marker),
            Restriction::Condition(_)
        ));

        let only_none = program.new_variable_with(&[none], &[], n);
        assert_eq!(
            restrict_condition(&mut program, &values, n, only_none, true, marker),
            Restriction::Unsatisfiable
        );
        assert_eq!(
            restrict_condition(&mut program, &values, n, only_none, false, marker),
            Restriction::Unrestricted
        );
    }

    #[test]
    fn test_condition_excludes_incompatible_binding() {
        let mut values = ValueStore::new();
        let mut program = Program::new();
        let root = program.new_cfg_node("root", None);
        let mut conv = Converter::new(&mut values, &mut program, root);
        let marker = conv.well_known.true_;
        let none = conv.well_known.none;
        let one = conv.constant(&mut values, &mut program, &Constant::Int(1));
        let var = program.new_variable();
        let b_none = program.add_binding(var, none, [], root);
        let b_one = program.add_binding(var, one, [], root);

        let restriction = restrict_condition(&mut program, &values, root, var, true, marker);
        let Restriction::Condition(cond) = restriction else {
            panic!("expected a condition");
        };
        let taken = program.connect_new(root, "taken", Some(cond));
        assert!(program.has_combination(taken, &[b_one]));
        assert!(!program.has_combination(taken, &[b_none]));
    }
}
