//! Operators
//!
//! Binary operators are evaluated per pair of visible bindings. User classes
//! go through their dunder methods; builtin classes use a fixed result
//! table. Constant operands are folded where the result is known.

use crate::errors::VmResult;
use crate::features::abstract_values::{compatible_with, AbstractValue, Literal};
use crate::features::diagnostics::ErrorKind;
use crate::features::typegraph::{BindingId, CfgNodeId, ValueId, VariableId};
use crate::features::vm::domain::CallArgs;
use crate::features::vm::infrastructure::context::VirtualMachine;

/// `BINARY_OP` argument to operator symbol; 13 and up are the in-place forms
pub(crate) const BINARY_OP_SYMBOLS: [&str; 13] = [
    "+", "&", "//", "<<", "@", "*", "%", "|", "**", ">>", "-", "/", "^",
];

/// Comparison selected by `COMPARE_OP`, `IS_OP` or `CONTAINS_OP`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Comparison {
    Lt,
    Le,
    Eq,
    Ne,
    Gt,
    Ge,
    In,
    NotIn,
    Is,
    IsNot,
    ExceptionMatch,
}

impl Comparison {
    /// `COMPARE_OP` argument, as in `dis.cmp_op`
    pub(crate) fn from_arg(arg: u32) -> Option<Self> {
        Some(match arg {
            0 => Comparison::Lt,
            1 => Comparison::Le,
            2 => Comparison::Eq,
            3 => Comparison::Ne,
            4 => Comparison::Gt,
            5 => Comparison::Ge,
            6 => Comparison::In,
            7 => Comparison::NotIn,
            8 => Comparison::Is,
            9 => Comparison::IsNot,
            10 => Comparison::ExceptionMatch,
            _ => return None,
        })
    }

    pub(crate) fn from_symbol(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "<" => Comparison::Lt,
            "<=" => Comparison::Le,
            "==" => Comparison::Eq,
            "!=" => Comparison::Ne,
            ">" => Comparison::Gt,
            ">=" => Comparison::Ge,
            "in" => Comparison::In,
            "not in" => Comparison::NotIn,
            "is" => Comparison::Is,
            "is not" => Comparison::IsNot,
            "exception match" => Comparison::ExceptionMatch,
            _ => return None,
        })
    }

    pub(crate) fn symbol(self) -> &'static str {
        match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::In => "in",
            Comparison::NotIn => "not in",
            Comparison::Is => "is",
            Comparison::IsNot => "is not",
            Comparison::ExceptionMatch => "exception match",
        }
    }

    fn dunder(self) -> Option<&'static str> {
        match self {
            Comparison::Lt => Some("__lt__"),
            Comparison::Le => Some("__le__"),
            Comparison::Eq => Some("__eq__"),
            Comparison::Ne => Some("__ne__"),
            Comparison::Gt => Some("__gt__"),
            Comparison::Ge => Some("__ge__"),
            _ => None,
        }
    }

    fn is_ordering(self) -> bool {
        matches!(
            self,
            Comparison::Lt | Comparison::Le | Comparison::Gt | Comparison::Ge
        )
    }
}

fn dunder_for(symbol: &str) -> Option<(&'static str, &'static str, &'static str)> {
    Some(match symbol {
        "+" => ("__add__", "__radd__", "__iadd__"),
        "-" => ("__sub__", "__rsub__", "__isub__"),
        "*" => ("__mul__", "__rmul__", "__imul__"),
        "@" => ("__matmul__", "__rmatmul__", "__imatmul__"),
        "/" => ("__truediv__", "__rtruediv__", "__itruediv__"),
        "//" => ("__floordiv__", "__rfloordiv__", "__ifloordiv__"),
        "%" => ("__mod__", "__rmod__", "__imod__"),
        "**" => ("__pow__", "__rpow__", "__ipow__"),
        "<<" => ("__lshift__", "__rlshift__", "__ilshift__"),
        ">>" => ("__rshift__", "__rrshift__", "__irshift__"),
        "&" => ("__and__", "__rand__", "__iand__"),
        "|" => ("__or__", "__ror__", "__ior__"),
        "^" => ("__xor__", "__rxor__", "__ixor__"),
        _ => return None,
    })
}

/// Result of a builtin binary operation, by class name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinResult {
    Class(&'static str),
    Unsupported,
    Unknown,
}

fn numeric_rank(class: &str) -> Option<u8> {
    match class {
        "bool" => Some(0),
        "int" => Some(1),
        "float" => Some(2),
        _ => None,
    }
}

fn is_sequence(class: &str) -> bool {
    matches!(class, "str" | "bytes" | "list" | "tuple")
}

/// Result class of `left <symbol> right` for builtin operand classes
fn builtin_binary(symbol: &str, left: &str, right: &str) -> BuiltinResult {
    use BuiltinResult::*;
    if let (Some(l), Some(r)) = (numeric_rank(left), numeric_rank(right)) {
        return match symbol {
            "@" => Unsupported,
            "&" | "|" | "^" | "<<" | ">>" if l == 2 || r == 2 => Unsupported,
            "&" | "|" | "^" if l == 0 && r == 0 => Class("bool"),
            "&" | "|" | "^" | "<<" | ">>" => Class("int"),
            "/" => Class("float"),
            _ if l.max(r) == 2 => Class("float"),
            _ => Class("int"),
        };
    }
    match (symbol, left, right) {
        ("+", l, r) if is_sequence(l) && l == r => Class(static_name(l)),
        ("*", l, r) if is_sequence(l) && matches!(r, "int" | "bool") => Class(static_name(l)),
        ("*", l, r) if is_sequence(r) && matches!(l, "int" | "bool") => Class(static_name(r)),
        ("%", "str", _) => Class("str"),
        ("%", "bytes", _) => Class("bytes"),
        ("|" | "&" | "-" | "^", "set", "set") => Class("set"),
        ("|", "dict", "dict") => Class("dict"),
        _ => Unsupported,
    }
}

fn static_name(class: &str) -> &'static str {
    match class {
        "str" => "str",
        "bytes" => "bytes",
        "list" => "list",
        _ => "tuple",
    }
}

fn fold_int(symbol: &str, l: i64, r: i64) -> Option<i64> {
    match symbol {
        "+" => l.checked_add(r),
        "-" => l.checked_sub(r),
        "*" => l.checked_mul(r),
        "//" if r != 0 => Some(l.div_euclid(r)),
        "%" if r != 0 => Some(l.rem_euclid(r)),
        "&" => Some(l & r),
        "|" => Some(l | r),
        "^" => Some(l ^ r),
        _ => None,
    }
}

impl VirtualMachine<'_> {
    pub(crate) fn visible_bindings(&self, var: VariableId, node: CfgNodeId) -> Vec<BindingId> {
        let visible = self.ctx.program.filter(var, node);
        if visible.is_empty() {
            self.bindings(var)
        } else {
            visible
        }
    }

    /// Class whose operators apply to `value`; `None` for anything that is
    /// not a plain instance
    fn operand_class(&self, value: ValueId) -> Option<ValueId> {
        match self.value(value) {
            AbstractValue::Instance(i) => Some(i.class),
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Binary operators
    // ═══════════════════════════════════════════════════════════════════

    /// `left <symbol> right`, in place when `inplace`
    pub(crate) fn binary_operator(
        &mut self,
        node: CfgNodeId,
        symbol: &str,
        inplace: bool,
        left: VariableId,
        right: VariableId,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let result = self.ctx.program.new_variable();
        let mut exits = Vec::new();
        let mut reported = false;
        for lb in self.visible_bindings(left, node) {
            for rb in self.visible_bindings(right, node) {
                let (exit, value) =
                    self.binary_pair(node, symbol, inplace, lb, rb, &mut reported)?;
                self.ctx
                    .program
                    .paste_variable(result, value, Some(exit), &[lb, rb]);
                exits.push(exit);
            }
        }
        let exit = self.join_nodes(&exits);
        if self.ctx.program.variable(result).is_empty() {
            return Ok((exit, self.unsolvable(exit)));
        }
        Ok((exit, self.widen(result, exit)))
    }

    fn binary_pair(
        &mut self,
        node: CfgNodeId,
        symbol: &str,
        inplace: bool,
        lb: BindingId,
        rb: BindingId,
        reported: &mut bool,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let l = self.ctx.program.binding_data(lb);
        let r = self.ctx.program.binding_data(rb);

        // `int | None` and friends build annotations at runtime
        if symbol == "|"
            && (matches!(self.value(l), AbstractValue::Class(_) | AbstractValue::TypingForm(_)))
        {
            return Ok((node, self.unsolvable(node)));
        }
        let (Some(lc), Some(rc)) = (self.operand_class(l), self.operand_class(r)) else {
            return Ok((node, self.unsolvable(node)));
        };

        if let Some(folded) = self.fold_constants(symbol, l, r) {
            return Ok((node, self.new_var(&[folded], &[], node)));
        }

        let l_builtin = self.is_builtin_class(lc);
        let r_builtin = self.is_builtin_class(rc);
        if l_builtin && r_builtin {
            let left_name = self.ctx.values.class_name(lc).to_string();
            let right_name = self.ctx.values.class_name(rc).to_string();
            return Ok(match builtin_binary(symbol, &left_name, &right_name) {
                BuiltinResult::Class(name) => match self.ctx.converter.builtin_class(name) {
                    Some(class) => (node, self.instance_var(class, node)),
                    None => (node, self.unsolvable(node)),
                },
                BuiltinResult::Unknown => (node, self.unsolvable(node)),
                BuiltinResult::Unsupported => {
                    if !*reported {
                        *reported = true;
                        let l_desc = self.ctx.values.describe(l);
                        let r_desc = self.ctx.values.describe(r);
                        self.report(
                            ErrorKind::UnsupportedOperands,
                            format!(
                                "unsupported operand type(s) for {symbol}: '{l_desc}' and '{r_desc}'"
                            ),
                        );
                    }
                    (node, self.unsolvable(node))
                }
            });
        }

        let Some((forward, reflected, in_place)) = dunder_for(symbol) else {
            return Ok((node, self.unsolvable(node)));
        };
        let mut candidates = Vec::new();
        if inplace {
            candidates.push((lc, in_place, l, lb, r, rb));
        }
        candidates.push((lc, forward, l, lb, r, rb));
        candidates.push((rc, reflected, r, rb, l, lb));
        for (class, dunder, receiver, receiver_b, other, other_b) in candidates {
            if let Some((_, method)) = self.ctx.values.lookup_in_mro(class, dunder) {
                let recv = self.new_var(&[receiver], &[receiver_b], node);
                let arg = self.new_var(&[other], &[other_b], node);
                return self.untraced(|vm| vm.call_function(node, method, &CallArgs::new(vec![recv, arg])));
            }
        }
        if !*reported && !self.ctx.values.mro_is_opaque(lc) && !self.ctx.values.mro_is_opaque(rc) {
            *reported = true;
            let l_desc = self.ctx.values.describe(l);
            let r_desc = self.ctx.values.describe(r);
            self.report(
                ErrorKind::UnsupportedOperands,
                format!("unsupported operand type(s) for {symbol}: '{l_desc}' and '{r_desc}'"),
            );
        }
        Ok((node, self.unsolvable(node)))
    }

    fn fold_constants(&mut self, symbol: &str, l: ValueId, r: ValueId) -> Option<ValueId> {
        let left = self.ctx.values.literal(l)?.clone();
        let right = self.ctx.values.literal(r)?.clone();
        match (left, right) {
            (Literal::Int(a), Literal::Int(b)) => {
                let folded = fold_int(symbol, a, b)?;
                Some(self.ctx.converter.int_constant(&mut self.ctx.values, folded))
            }
            (Literal::Str(a), Literal::Str(b)) if symbol == "+" => {
                let joined = format!("{a}{b}");
                Some(self.ctx.converter.str_constant(&mut self.ctx.values, &joined))
            }
            _ => None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Unary operators
    // ═══════════════════════════════════════════════════════════════════

    /// `-x`, `+x`, `~x` through `dunder`
    pub(crate) fn unary_operator(
        &mut self,
        node: CfgNodeId,
        dunder: &str,
        operand: VariableId,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let result = self.ctx.program.new_variable();
        let mut exits = Vec::new();
        for b in self.visible_bindings(operand, node) {
            let value = self.ctx.program.binding_data(b);
            let (exit, var) = self.unary_one(node, dunder, value, b)?;
            self.ctx.program.paste_variable(result, var, Some(exit), &[b]);
            exits.push(exit);
        }
        let exit = self.join_nodes(&exits);
        if self.ctx.program.variable(result).is_empty() {
            return Ok((exit, self.unsolvable(exit)));
        }
        Ok((exit, result))
    }

    fn unary_one(
        &mut self,
        node: CfgNodeId,
        dunder: &str,
        value: ValueId,
        binding: BindingId,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        if let Some(Literal::Int(i)) = self.ctx.values.literal(value).cloned() {
            let folded = match dunder {
                "__neg__" => i.checked_neg(),
                "__pos__" => Some(i),
                "__invert__" => Some(!i),
                _ => None,
            };
            if let Some(folded) = folded {
                let c = self.ctx.converter.int_constant(&mut self.ctx.values, folded);
                return Ok((node, self.new_var(&[c], &[], node)));
            }
        }
        let Some(class) = self.operand_class(value) else {
            return Ok((node, self.unsolvable(node)));
        };
        let classes = self.ctx.converter.classes;
        if class == classes.bool || class == classes.int {
            return Ok((node, self.instance_var(classes.int, node)));
        }
        if class == classes.float && dunder != "__invert__" {
            return Ok((node, self.instance_var(classes.float, node)));
        }
        match self.ctx.values.lookup_in_mro(class, dunder) {
            Some((_, method)) => {
                let recv = self.new_var(&[value], &[binding], node);
                self.untraced(|vm| vm.call_function(node, method, &CallArgs::new(vec![recv])))
            }
            None if self.ctx.values.mro_is_opaque(class) && !self.is_builtin_class(class) => {
                Ok((node, self.unsolvable(node)))
            }
            None => {
                let described = self.ctx.values.describe(value);
                self.report(
                    ErrorKind::UnsupportedOperands,
                    format!("unsupported operand type for unary {dunder}: '{described}'"),
                );
                Ok((node, self.unsolvable(node)))
            }
        }
    }

    /// `not x`: a literal where every binding agrees
    pub(crate) fn unary_not(&mut self, node: CfgNodeId, operand: VariableId) -> VariableId {
        let result = self.ctx.program.new_variable();
        let bool_class = self.ctx.converter.classes.bool;
        for b in self.visible_bindings(operand, node) {
            let value = self.ctx.program.binding_data(b);
            let can_true = compatible_with(&self.ctx.values, value, true);
            let can_false = compatible_with(&self.ctx.values, value, false);
            let data = match (can_true, can_false) {
                (true, false) => self.ctx.converter.bool_constant(false),
                (false, true) => self.ctx.converter.bool_constant(true),
                _ => self
                    .ctx
                    .converter
                    .instance_of(&mut self.ctx.values, bool_class),
            };
            self.ctx.program.add_binding(result, data, [b], node);
        }
        if self.ctx.program.variable(result).is_empty() {
            return self.instance_var(bool_class, node);
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════
    // Comparisons
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn compare(
        &mut self,
        node: CfgNodeId,
        cmp: Comparison,
        left: VariableId,
        right: VariableId,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let result = self.ctx.program.new_variable();
        let mut exits = Vec::new();
        let mut reported = false;
        for lb in self.visible_bindings(left, node) {
            for rb in self.visible_bindings(right, node) {
                let (exit, var) = self.compare_pair(node, cmp, lb, rb, &mut reported)?;
                self.ctx
                    .program
                    .paste_variable(result, var, Some(exit), &[lb, rb]);
                exits.push(exit);
            }
        }
        let exit = self.join_nodes(&exits);
        if self.ctx.program.variable(result).is_empty() {
            let bool_class = self.ctx.converter.classes.bool;
            return Ok((exit, self.instance_var(bool_class, exit)));
        }
        Ok((exit, self.widen(result, exit)))
    }

    fn compare_pair(
        &mut self,
        node: CfgNodeId,
        cmp: Comparison,
        lb: BindingId,
        rb: BindingId,
        reported: &mut bool,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let l = self.ctx.program.binding_data(lb);
        let r = self.ctx.program.binding_data(rb);
        let answer = match cmp {
            Comparison::Is | Comparison::IsNot => {
                self.identity(l, r).map(|same| same == (cmp == Comparison::Is))
            }
            Comparison::Eq | Comparison::Ne => {
                self.equality(l, r).map(|same| same == (cmp == Comparison::Eq))
            }
            Comparison::ExceptionMatch => self.exception_matches(l, r),
            Comparison::In | Comparison::NotIn => None,
            _ => self.ordering(cmp, l, r, reported),
        };
        if let Some(answer) = answer {
            let value = self.ctx.converter.bool_constant(answer);
            return Ok((node, self.new_var(&[value], &[], node)));
        }

        if let (Some(dunder), Some(lc)) = (cmp.dunder(), self.operand_class(l)) {
            if !self.is_builtin_class(lc) {
                if let Some((_, method)) = self.ctx.values.lookup_in_mro(lc, dunder) {
                    let recv = self.new_var(&[l], &[lb], node);
                    let arg = self.new_var(&[r], &[rb], node);
                    return self.untraced(|vm| {
                        vm.call_function(node, method, &CallArgs::new(vec![recv, arg]))
                    });
                }
            }
        }
        let bool_class = self.ctx.converter.classes.bool;
        Ok((node, self.instance_var(bool_class, node)))
    }

    /// `is`: known only for singletons and distinct literal classes
    fn identity(&self, l: ValueId, r: ValueId) -> Option<bool> {
        let l_none = self.ctx.values.is_none(l);
        let r_none = self.ctx.values.is_none(r);
        if l_none || r_none {
            if l_none && r_none {
                return Some(true);
            }
            let other = if l_none { r } else { l };
            return match self.value(other) {
                AbstractValue::Instance(_)
                | AbstractValue::Class(_)
                | AbstractValue::Function(_)
                | AbstractValue::Module(_) => Some(false),
                _ => None,
            };
        }
        match (self.ctx.values.literal(l), self.ctx.values.literal(r)) {
            (Some(Literal::Bool(a)), Some(Literal::Bool(b))) => Some(a == b),
            _ if matches!(self.value(l), AbstractValue::Class(_)) && l == r => Some(true),
            _ => None,
        }
    }

    fn equality(&self, l: ValueId, r: ValueId) -> Option<bool> {
        let (left, right) = (self.ctx.values.literal(l)?, self.ctx.values.literal(r)?);
        match (left, right) {
            (Literal::Int(a), Literal::Float(b)) | (Literal::Float(b), Literal::Int(a)) => {
                Some((*a as f64) == *b)
            }
            (Literal::Bool(a), Literal::Int(b)) | (Literal::Int(b), Literal::Bool(a)) => {
                Some(i64::from(*a) == *b)
            }
            (a, b) if std::mem::discriminant(a) == std::mem::discriminant(b) => Some(a == b),
            _ => Some(false),
        }
    }

    fn ordering(
        &mut self,
        cmp: Comparison,
        l: ValueId,
        r: ValueId,
        reported: &mut bool,
    ) -> Option<bool> {
        if let (Some(left), Some(right)) = (self.ctx.values.literal(l), self.ctx.values.literal(r)) {
            let ord = match (left, right) {
                (Literal::Int(a), Literal::Int(b)) => Some(a.cmp(b)),
                (Literal::Str(a), Literal::Str(b)) => Some(a.cmp(b)),
                (Literal::Float(a), Literal::Float(b)) => a.partial_cmp(b),
                _ => None,
            };
            if let Some(ord) = ord {
                return Some(match cmp {
                    Comparison::Lt => ord.is_lt(),
                    Comparison::Le => ord.is_le(),
                    Comparison::Gt => ord.is_gt(),
                    _ => ord.is_ge(),
                });
            }
        }
        let (Some(lc), Some(rc)) = (self.operand_class(l), self.operand_class(r)) else {
            return None;
        };
        if !cmp.is_ordering() || !self.is_builtin_class(lc) || !self.is_builtin_class(rc) {
            return None;
        }
        let left_name = self.ctx.values.class_name(lc).to_string();
        let right_name = self.ctx.values.class_name(rc).to_string();
        let comparable = left_name == right_name
            || (numeric_rank(&left_name).is_some() && numeric_rank(&right_name).is_some());
        if !comparable && !*reported {
            *reported = true;
            let l_desc = self.ctx.values.describe(l);
            let r_desc = self.ctx.values.describe(r);
            self.report(
                ErrorKind::UnsupportedOperands,
                format!(
                    "unsupported operand type(s) for {}: '{l_desc}' and '{r_desc}'",
                    cmp.symbol()
                ),
            );
        }
        None
    }

    /// Does the raised value `exc` match the handler class (or tuple of classes) `target`?
    fn exception_matches(&self, exc: ValueId, target: ValueId) -> Option<bool> {
        let exc_class = match self.value(exc) {
            AbstractValue::Instance(i) => i.class,
            AbstractValue::Class(_) => exc,
            _ => return None,
        };
        let mut targets = Vec::new();
        match self.value(target) {
            AbstractValue::Class(_) => targets.push(target),
            AbstractValue::Instance(i) => {
                for element in i.elements.clone()? {
                    for value in self.data(element) {
                        if !matches!(self.value(value), AbstractValue::Class(_)) {
                            return None;
                        }
                        targets.push(value);
                    }
                }
            }
            _ => return None,
        }
        if targets.iter().any(|t| self.ctx.values.is_subclass(exc_class, *t)) {
            return Some(true);
        }
        if self.ctx.values.mro_is_opaque(exc_class) && !self.is_builtin_class(exc_class) {
            return None;
        }
        Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::features::imports::NullImporter;
    use crate::features::vm::infrastructure::context::AnalysisContext;
    use crate::shared::models::Director;

    fn run(f: impl FnOnce(&mut VirtualMachine<'_>)) {
        let director = Director::new();
        let importer = NullImporter;
        let ctx = AnalysisContext::new(AnalysisConfig::default(), &director, &importer);
        let mut vm = VirtualMachine::new(ctx);
        f(&mut vm);
    }

    #[test]
    fn test_builtin_result_table() {
        assert_eq!(builtin_binary("/", "int", "int"), BuiltinResult::Class("float"));
        assert_eq!(builtin_binary("+", "int", "float"), BuiltinResult::Class("float"));
        assert_eq!(builtin_binary("&", "bool", "bool"), BuiltinResult::Class("bool"));
        assert_eq!(builtin_binary("&", "float", "int"), BuiltinResult::Unsupported);
        assert_eq!(builtin_binary("*", "int", "str"), BuiltinResult::Class("str"));
        assert_eq!(builtin_binary("+", "str", "int"), BuiltinResult::Unsupported);
        assert_eq!(builtin_binary("|", "dict", "dict"), BuiltinResult::Class("dict"));
    }

    #[test]
    fn test_binary_op_symbols() {
        assert_eq!(BINARY_OP_SYMBOLS[0], "+");
        assert_eq!(BINARY_OP_SYMBOLS[10], "-");
        assert_eq!(BINARY_OP_SYMBOLS[13 - 13], "+");
        assert_eq!(Comparison::from_symbol("not in"), Some(Comparison::NotIn));
        assert_eq!(Comparison::from_arg(10), Some(Comparison::ExceptionMatch));
    }

    #[test]
    fn test_constant_folding_and_error() {
        run(|vm| {
            let root = vm.ctx.root;
            let two = vm.ctx.converter.int_constant(&mut vm.ctx.values, 2);
            let three = vm.ctx.converter.int_constant(&mut vm.ctx.values, 3);
            let a = vm.new_var(&[two], &[], root);
            let b = vm.new_var(&[three], &[], root);
            let (_, sum) = vm.binary_operator(root, "+", false, a, b).unwrap();
            let five = vm.ctx.converter.int_constant(&mut vm.ctx.values, 5);
            assert_eq!(vm.data(sum), vec![five]);

            let s = vm.ctx.converter.str_constant(&mut vm.ctx.values, "a");
            let sv = vm.new_var(&[s], &[], root);
            let int_class = vm.ctx.converter.classes.int;
            let iv = vm.instance_var(int_class, root);
            vm.binary_operator(root, "+", false, sv, iv).unwrap();
            let diag = &vm.ctx.errorlog.diagnostics()[0];
            assert_eq!(diag.kind, ErrorKind::UnsupportedOperands);
            assert_eq!(diag.message, "unsupported operand type(s) for +: 'str' and 'int'");
        });
    }

    #[test]
    fn test_comparisons_fold() {
        run(|vm| {
            let root = vm.ctx.root;
            let none = vm.none_var(root);
            let none2 = vm.none_var(root);
            let (_, is) = vm.compare(root, Comparison::Is, none, none2).unwrap();
            assert_eq!(vm.data(is), vec![vm.ctx.converter.well_known.true_]);

            let one = vm.ctx.converter.int_constant(&mut vm.ctx.values, 1);
            let two = vm.ctx.converter.int_constant(&mut vm.ctx.values, 2);
            let a = vm.new_var(&[one], &[], root);
            let b = vm.new_var(&[two], &[], root);
            let (_, lt) = vm.compare(root, Comparison::Lt, a, b).unwrap();
            assert_eq!(vm.data(lt), vec![vm.ctx.converter.well_known.true_]);
        });
    }

    #[test]
    fn test_not_of_literals() {
        run(|vm| {
            let root = vm.ctx.root;
            let none = vm.none_var(root);
            let result = vm.unary_not(root, none);
            assert_eq!(vm.data(result), vec![vm.ctx.converter.well_known.true_]);
        });
    }
}
