//! Structural pattern matching
//!
//! `MATCH_CLASS` decides per subject binding whether it is an instance of
//! the pattern class and leaves a [`Narrowing`] for the conditional jump
//! that follows; the jump rebinds the subject's name on both sides. Case
//! coverage is tracked per statement and frame, and only for the outermost
//! frames (`exhaustive_match_frames`).

use crate::errors::VmResult;
use crate::features::abstract_values::{AbstractValue, Instance, Literal};
use crate::features::diagnostics::ErrorKind;
use crate::features::frame_state::FrameState;
use crate::features::typegraph::{CfgNodeId, ValueId, VariableId};
use crate::features::vm::domain::Narrowing;
use crate::features::vm::infrastructure::branch_tracker::CaseCoverage;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::shared::models::Instruction;

impl VirtualMachine<'_> {
    /// Stack `[subject, cls, names]` becomes `[attributes or None]`
    pub(crate) fn op_match_class(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let count = op.arg_or_zero() as usize;
        let (state, _names) = state.pop()?;
        let (state, operands) = state.popn(2)?;
        let (subject, cls) = (operands[0], operands[1]);
        let node = state.node;

        let classes: Vec<ValueId> = self
            .data(cls)
            .into_iter()
            .filter(|v| matches!(self.value(*v), AbstractValue::Class(_)))
            .collect();
        let known_classes = !classes.is_empty() && classes.len() == self.data(cls).len();

        let result = self.ctx.program.new_variable();
        let matched = self.ctx.program.new_variable();
        let unmatched = self.ctx.program.new_variable();
        let none = self.ctx.converter.well_known.none;
        for binding in self.visible_bindings(subject, node) {
            let value = self.ctx.program.binding_data(binding);
            let verdict = if known_classes {
                self.class_pattern_matches(value, &classes)
            } else {
                None
            };
            if verdict != Some(false) {
                let attributes: Vec<VariableId> =
                    (0..count).map(|_| self.unsolvable(node)).collect();
                let tuple = self.ctx.converter.new_tuple(&mut self.ctx.values, attributes);
                self.ctx.program.add_binding(result, tuple, [binding], node);
                for narrowed in self.narrowed_values(value, &classes, verdict) {
                    self.ctx.program.add_binding(matched, narrowed, [binding], node);
                }
            }
            if verdict != Some(true) {
                self.ctx.program.add_binding(result, none, [binding], node);
                self.ctx.program.add_binding(unmatched, value, [binding], node);
            }
        }

        if known_classes {
            self.check_redundant_case(op.line, &classes)?;
        }
        self.ctx.pending_narrowing = Some(Narrowing {
            name: self.ctx.var_names.get(&subject).cloned(),
            success: result,
            matched,
            unmatched,
        });
        self.trace(None, &[subject, cls, result]);
        Ok(state.push(result))
    }

    /// `Some(true)` when `value` is an instance of one of `classes`,
    /// `Some(false)` when it cannot be, `None` when it may be
    fn class_pattern_matches(&self, value: ValueId, classes: &[ValueId]) -> Option<bool> {
        let mut verdict = Some(false);
        for class in classes {
            match self.instance_check(value, *class) {
                Some(true) => return Some(true),
                Some(false) => {}
                None => verdict = None,
            }
        }
        verdict
    }

    fn instance_check(&self, value: ValueId, class: ValueId) -> Option<bool> {
        if class == self.ctx.converter.classes.object {
            return Some(true);
        }
        match self.value(value) {
            AbstractValue::Instance(i) => {
                let values = &self.ctx.values;
                if values.is_subclass(i.class, class) {
                    Some(true)
                } else if values.is_subclass(class, i.class) {
                    // A subclass instance may be behind the declared class.
                    None
                } else if values.mro_is_opaque(i.class) && !self.is_builtin_class(i.class) {
                    None
                } else {
                    Some(false)
                }
            }
            AbstractValue::Unsolvable => None,
            AbstractValue::Class(_) => Some(class == self.ctx.converter.classes.type_),
            _ => Some(false),
        }
    }

    /// What the subject is inside the case body: itself when it is known
    /// to match, instances of the pattern classes when it only may
    fn narrowed_values(&mut self, value: ValueId, classes: &[ValueId], verdict: Option<bool>) -> Vec<ValueId> {
        if verdict == Some(true) || classes.is_empty() {
            return vec![value];
        }
        if let AbstractValue::Instance(i) = self.value(value) {
            let class = i.class;
            if classes.iter().any(|c| self.ctx.values.is_subclass(class, *c)) {
                return vec![value];
            }
        }
        classes
            .iter()
            .map(|c| self.ctx.converter.instance_of(&mut self.ctx.values, *c))
            .collect()
    }

    /// Whether pattern checks of the current frame are tracked
    fn tracks_coverage(&self) -> bool {
        self.ctx.frames.len() <= self.ctx.config.exhaustive_match_frames
    }

    fn check_redundant_case(&mut self, line: u32, classes: &[ValueId]) -> VmResult<()> {
        if !self.tracks_coverage() {
            return Ok(());
        }
        let director = self.ctx.director;
        let Some((statement, stmt)) = director.match_for_case_line(line) else {
            return Ok(());
        };
        if stmt.case_at(line).is_some_and(|c| c.has_guard) {
            return Ok(());
        }
        let frame = self.frame()?.start_node;
        for class in classes {
            if self.ctx.branch_tracker.cover(statement, frame, *class) == CaseCoverage::Redundant {
                let name = self.ctx.values.class_name(*class).to_string();
                self.report(
                    ErrorKind::RedundantMatch,
                    format!("This case has already been covered: {name}."),
                );
            }
        }
        Ok(())
    }

    /// Failure side of the last case of a `match` without a catch-all:
    /// whatever can still reach it was not handled
    pub(crate) fn report_incomplete_match(
        &mut self,
        line: u32,
        unmatched: VariableId,
        node: CfgNodeId,
    ) -> VmResult<()> {
        if !self.tracks_coverage() {
            return Ok(());
        }
        let director = self.ctx.director;
        let Some((statement, stmt)) = director.match_for_case_line(line) else {
            return Ok(());
        };
        let is_last = stmt.cases.last().is_some_and(|c| c.line == line && !c.has_guard);
        if !is_last || stmt.has_wildcard() {
            return Ok(());
        }
        let frame = self.frame()?.start_node;
        if !self.ctx.branch_tracker.finish(statement, frame) {
            return Ok(());
        }
        let covered = self.ctx.branch_tracker.covered(statement, frame).to_vec();
        let mut missing: Vec<String> = Vec::new();
        for value in self.ctx.program.filtered_data(unmatched, node) {
            let name = match self.value(value) {
                AbstractValue::Instance(i)
                    if covered.iter().any(|c| self.ctx.values.is_subclass(i.class, *c)) =>
                {
                    continue
                }
                AbstractValue::Instance(i) => self.ctx.values.class_name(i.class).to_string(),
                // Nothing is known about the subject; no complaint.
                AbstractValue::Unsolvable => return Ok(()),
                _ => self.ctx.values.describe(value),
            };
            if !missing.contains(&name) {
                missing.push(name);
            }
        }
        if missing.is_empty() {
            return Ok(());
        }
        self.report(
            ErrorKind::IncompleteMatch,
            format!(
                "The match is missing the following cases: {}",
                missing.join(", ")
            ),
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Mapping and sequence patterns
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_get_len(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let subject = state.top()?;
        let mut lengths = Vec::new();
        for value in self.data(subject) {
            let len = match self.value(value) {
                AbstractValue::Instance(Instance {
                    elements: Some(elements),
                    ..
                }) => Some(elements.len()),
                _ => None,
            };
            let length = match len.and_then(|n| i64::try_from(n).ok()) {
                Some(n) => self.ctx.converter.int_constant(&mut self.ctx.values, n),
                None => {
                    let int = self.ctx.converter.classes.int;
                    self.ctx.converter.instance_of(&mut self.ctx.values, int)
                }
            };
            if !lengths.contains(&length) {
                lengths.push(length);
            }
        }
        let var = self.new_var(&lengths, &[], state.node);
        Ok(state.push(var))
    }

    pub(crate) fn op_match_mapping(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let dict = self.ctx.converter.classes.dict;
        self.push_kind_test(state, &[dict], &[])
    }

    /// `str`, `bytes` and mappings are not sequences for matching
    pub(crate) fn op_match_sequence(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let classes = self.ctx.converter.classes;
        self.push_kind_test(
            state,
            &[classes.list, classes.tuple],
            &[classes.str, classes.bytes, classes.dict],
        )
    }

    /// Push whether the top value is an instance of one of `yes`; instances
    /// of `no` and other builtin values never are
    fn push_kind_test(&mut self, state: FrameState, yes: &[ValueId], no: &[ValueId]) -> VmResult<FrameState> {
        let subject = state.top()?;
        let mut answers: Vec<ValueId> = Vec::new();
        for value in self.data(subject) {
            let verdict = match self.value(value) {
                AbstractValue::Instance(i) => {
                    let values = &self.ctx.values;
                    if yes.iter().any(|c| values.is_subclass(i.class, *c)) {
                        Some(true)
                    } else if no.iter().any(|c| values.is_subclass(i.class, *c))
                        || self.is_builtin_class(i.class)
                    {
                        Some(false)
                    } else {
                        None
                    }
                }
                AbstractValue::Unsolvable => None,
                _ => Some(false),
            };
            let options = match verdict {
                Some(b) => vec![b],
                None => vec![true, false],
            };
            for b in options {
                let answer = self.ctx.converter.bool_constant(b);
                if !answers.contains(&answer) {
                    answers.push(answer);
                }
            }
        }
        let var = self.new_var(&answers, &[], state.node);
        Ok(state.push(var))
    }

    /// Stack `[subject, keys]`: pushes the values for `keys` or `None`
    pub(crate) fn op_match_keys(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let keys = state.top()?;
        let subject = state.peek(2)?;
        let node = state.node;
        let wanted = self.key_names(keys);
        let mut options: Vec<ValueId> = Vec::new();
        let mut may_miss = false;
        for value in self.data(subject) {
            let found: Option<Vec<VariableId>> = match &wanted {
                Some(names) => names
                    .iter()
                    .map(|name| self.ctx.values.member(value, name))
                    .collect(),
                None => None,
            };
            let elements = match found {
                Some(vars) => vars,
                None => {
                    may_miss = true;
                    let n = wanted.as_ref().map_or(0, Vec::len);
                    (0..n).map(|_| self.unsolvable(node)).collect()
                }
            };
            options.push(self.ctx.converter.new_tuple(&mut self.ctx.values, elements));
        }
        if may_miss || options.is_empty() {
            options.push(self.ctx.converter.well_known.none);
        }
        let var = self.new_var(&options, &[], node);
        Ok(state.push(var))
    }

    /// String literals of a constant key tuple
    fn key_names(&self, keys: VariableId) -> Option<Vec<String>> {
        let data = self.data(keys);
        let [tuple] = data.as_slice() else {
            return None;
        };
        let AbstractValue::Instance(Instance {
            elements: Some(elements),
            ..
        }) = self.value(*tuple)
        else {
            return None;
        };
        elements
            .iter()
            .map(|e| match self.data(*e).as_slice() {
                [v] => match self.ctx.values.literal(*v) {
                    Some(Literal::Str(s)) => Some(s.clone()),
                    _ => None,
                },
                _ => None,
            })
            .collect()
    }

    /// Stack `[subject, keys]` becomes `[subject, rest]`
    pub(crate) fn op_copy_dict_without_keys(
        &mut self,
        state: FrameState,
        _op: &Instruction,
    ) -> VmResult<FrameState> {
        let (state, _keys) = state.pop()?;
        let rest = self.ctx.converter.new_dict(&mut self.ctx.values);
        let var = self.new_var(&[rest], &[], state.node);
        Ok(state.push(var))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{class_names, global_data, run_module, run_straight, with_frame};
    use crate::features::abstract_values::Literal;
    use crate::features::diagnostics::ErrorKind;
    use crate::shared::models::{Assembler, CaseInfo, Constant, Director, MatchStatement};

    fn empty_class(name: &str) -> Assembler {
        let mut body = Assembler::new(name);
        body.op_name("LOAD_NAME", "__name__")
            .op_name("STORE_NAME", "__module__")
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        body
    }

    /// class <name>: pass
    fn define_class(asm: &mut Assembler, name: &str) {
        asm.op("LOAD_BUILD_CLASS")
            .load_code(empty_class(name).finish().unwrap())
            .load_const(Constant::Str(name.into()))
            .op_arg("MAKE_FUNCTION", 0)
            .load_const(Constant::Str(name.into()))
            .op_arg("CALL_FUNCTION", 2)
            .op_name("STORE_NAME", name);
    }

    /// x = A() if flag else B()
    fn union_subject(asm: &mut Assembler) {
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
    }

    /// case <class>(): <target> = x
    fn class_case(asm: &mut Assembler, line: u32, class: &str, target: &str, end: crate::shared::models::Label) {
        let next = asm.label();
        asm.line(line)
            .op_arg("COPY", 1)
            .op_name("LOAD_NAME", class)
            .load_const(Constant::Tuple(vec![]))
            .op_arg("MATCH_CLASS", 0)
            .jump("POP_JUMP_IF_NONE", next)
            .op("POP_TOP")
            .op_name("LOAD_NAME", "x")
            .op_name("STORE_NAME", target)
            .jump("JUMP_FORWARD", end)
            .place(next);
    }

    fn match_program(cases: &[(&str, &str)], first_line: u32) -> Assembler {
        let mut asm = Assembler::module();
        asm.line(1);
        define_class(&mut asm, "A");
        define_class(&mut asm, "B");
        union_subject(&mut asm);
        let end = asm.label();
        asm.line(first_line - 1).op_name("LOAD_NAME", "x");
        for (i, (class, target)) in cases.iter().enumerate() {
            class_case(&mut asm, first_line + i as u32, class, target, end);
        }
        asm.op("POP_TOP")
            .place(end)
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        asm
    }

    fn statement(lines: &[u32]) -> MatchStatement {
        MatchStatement {
            start: lines[0] - 1,
            end: lines[lines.len() - 1] + 1,
            cases: lines
                .iter()
                .map(|line| CaseInfo {
                    line: *line,
                    is_wildcard: false,
                    has_guard: false,
                })
                .collect(),
        }
    }

    #[test]
    fn test_case_body_sees_narrowed_subject() {
        let director = Director::new().match_statement(statement(&[11, 12]));
        let asm = match_program(&[("A", "in_a"), ("B", "in_b")], 11);
        run_module(&director, asm, |vm, globals, exit| {
            assert_eq!(class_names(vm, &global_data(vm, globals, "in_a", exit)), vec!["A"]);
            assert_eq!(class_names(vm, &global_data(vm, globals, "in_b", exit)), vec!["B"]);
            assert_eq!(class_names(vm, &global_data(vm, globals, "x", exit)), vec!["A", "B"]);
            assert!(!vm.ctx.errorlog.has_kind(ErrorKind::IncompleteMatch));
            assert!(!vm.ctx.errorlog.has_kind(ErrorKind::RedundantMatch));
        });
    }

    #[test]
    fn test_missing_case_is_reported() {
        let director = Director::new().match_statement(statement(&[11]));
        let asm = match_program(&[("A", "in_a")], 11);
        run_module(&director, asm, |vm, _, _| {
            let missing: Vec<_> = vm.ctx.errorlog.of_kind(ErrorKind::IncompleteMatch).collect();
            assert_eq!(missing.len(), 1);
            assert_eq!(missing[0].message, "The match is missing the following cases: B");
        });
    }

    #[test]
    fn test_repeated_class_is_redundant() {
        let director = Director::new().match_statement(statement(&[11, 12, 13]));
        let asm = match_program(&[("A", "first"), ("A", "second"), ("B", "third")], 11);
        run_module(&director, asm, |vm, _, _| {
            let redundant: Vec<_> = vm.ctx.errorlog.of_kind(ErrorKind::RedundantMatch).collect();
            assert_eq!(redundant.len(), 1);
            assert_eq!(redundant[0].message, "This case has already been covered: A.");
        });
    }

    #[test]
    fn test_sequence_and_length_tests() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.load_const(Constant::Tuple(vec![Constant::Int(1), Constant::Int(2)]))
            .op("MATCH_SEQUENCE")
            .op("POP_TOP")
            .op("MATCH_MAPPING")
            .op("POP_TOP")
            .op("GET_LEN");
        with_frame(&director, asm, |vm, state| {
            let state = run_straight(vm, state);
            let len = vm.data(state.top().unwrap());
            assert_eq!(vm.ctx.values.literal(len[0]), Some(&Literal::Int(2)));
            assert_eq!(state.depth(), 2);
        });
    }
}
