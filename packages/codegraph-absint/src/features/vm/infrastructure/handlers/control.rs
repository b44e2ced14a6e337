//! Jumps, conditional branches and loops

use crate::errors::VmResult;
use crate::features::abstract_values::{AbstractValue, Generator, GeneratorKind};
use crate::features::frame_state::{
    restrict_by, restrict_condition, Block, BlockKind, FrameState, Restriction, Why,
};
use crate::features::typegraph::{BindingId, CfgNodeId, VariableId};
use crate::features::vm::domain::Narrowing;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::shared::models::Instruction;

/// What a conditional jump tests its operand for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BranchTest {
    /// Jump when the truthiness equals the flag
    Truthy(bool),
    /// Jump when "is None" equals the flag
    IsNone(bool),
}

impl BranchTest {
    fn negate(self) -> Self {
        match self {
            BranchTest::Truthy(b) => BranchTest::Truthy(!b),
            BranchTest::IsNone(b) => BranchTest::IsNone(!b),
        }
    }

    /// Does the side this test selects count as a pattern success
    fn is_success(self) -> bool {
        match self {
            BranchTest::Truthy(b) => b,
            BranchTest::IsNone(b) => !b,
        }
    }
}

fn condition_of(restriction: Restriction) -> Option<BindingId> {
    match restriction {
        Restriction::Condition(b) => Some(b),
        _ => None,
    }
}

impl VirtualMachine<'_> {
    pub(crate) fn op_jump(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        self.store_jump(op.require_target()?, state.clone())?;
        Ok(state.set_why(Why::Never))
    }

    pub(crate) fn op_pop_jump_if(
        &mut self,
        state: FrameState,
        op: &Instruction,
        jump_if: bool,
    ) -> VmResult<FrameState> {
        let (state, var) = state.pop()?;
        self.branch(state, op, var, BranchTest::Truthy(jump_if))
    }

    pub(crate) fn op_pop_jump_if_none(
        &mut self,
        state: FrameState,
        op: &Instruction,
        jump_if_none: bool,
    ) -> VmResult<FrameState> {
        let (state, var) = state.pop()?;
        self.branch(state, op, var, BranchTest::IsNone(jump_if_none))
    }

    /// `and`/`or`: the jump keeps the operand on the stack
    pub(crate) fn op_jump_if_or_pop(
        &mut self,
        state: FrameState,
        op: &Instruction,
        jump_if: bool,
    ) -> VmResult<FrameState> {
        let var = state.top()?;
        let target = op.require_target()?;
        let jump = self.restrict(state.node, var, BranchTest::Truthy(jump_if));
        if jump != Restriction::Unsatisfiable {
            self.store_conditional_jump(target, state.clone(), condition_of(jump))?;
        }
        let fall = self.restrict(state.node, var, BranchTest::Truthy(!jump_if));
        let state = state.pop_and_discard()?;
        if fall == Restriction::Unsatisfiable {
            return Ok(state.set_why(Why::Never));
        }
        Ok(state.forward_cfg_node(&mut self.ctx.program, "NoJump", condition_of(fall)))
    }

    fn restrict(&mut self, node: CfgNodeId, var: VariableId, test: BranchTest) -> Restriction {
        let marker = self.ctx.converter.well_known.true_;
        let values = &self.ctx.values;
        match test {
            BranchTest::Truthy(branch) => {
                restrict_condition(&mut self.ctx.program, values, node, var, branch, marker)
            }
            BranchTest::IsNone(none) => {
                restrict_by(&mut self.ctx.program, node, var, marker, |v| {
                    values.is_none(v) == none
                })
            }
        }
    }

    /// Split the CFG on `var`: the jump side is queued for the target, the
    /// fall-through side is returned. A pending pattern narrowing for `var`
    /// rebinds the subject's name on each side.
    pub(super) fn branch(
        &mut self,
        state: FrameState,
        op: &Instruction,
        var: VariableId,
        test: BranchTest,
    ) -> VmResult<FrameState> {
        let target = op.require_target()?;
        let narrowing = self
            .ctx
            .pending_narrowing
            .take()
            .filter(|n| n.success == var);

        let jump = self.restrict(state.node, var, test);
        if jump != Restriction::Unsatisfiable {
            match &narrowing {
                Some(n) => {
                    let side = self.narrow(state.clone(), jump, n, test.is_success())?;
                    self.check_unmatched(op, n, test.is_success(), side.node)?;
                    self.store_jump(target, side)?;
                }
                None => self.store_conditional_jump(target, state.clone(), condition_of(jump))?,
            }
        }

        let fall_test = test.negate();
        let fall = self.restrict(state.node, var, fall_test);
        if fall == Restriction::Unsatisfiable {
            return Ok(state.set_why(Why::Never));
        }
        match &narrowing {
            Some(n) => {
                let side = self.narrow(state, fall, n, fall_test.is_success())?;
                self.check_unmatched(op, n, fall_test.is_success(), side.node)?;
                Ok(side)
            }
            None => Ok(state.forward_cfg_node(&mut self.ctx.program, "NoJump", condition_of(fall))),
        }
    }

    /// Continue `state` on one side of a pattern test with the subject's
    /// name rebound to the values that side admits
    fn narrow(
        &mut self,
        state: FrameState,
        restriction: Restriction,
        narrowing: &Narrowing,
        success: bool,
    ) -> VmResult<FrameState> {
        let state = state.forward_cfg_node(
            &mut self.ctx.program,
            "Narrow",
            condition_of(restriction),
        );
        let value = if success {
            narrowing.matched
        } else {
            narrowing.unmatched
        };
        let Some(name) = &narrowing.name else {
            return Ok(state);
        };
        let frame = self.frame()?;
        let (locals, globals) = (frame.f_locals, frame.f_globals);
        let ns = if self.ctx.values.member(locals, name).is_some() {
            Some(locals)
        } else if self.ctx.values.member(globals, name).is_some() {
            Some(globals)
        } else {
            None
        };
        if let Some(ns) = ns {
            if !self.ctx.program.data(value).is_empty() {
                self.assign_member(ns, name, value, state.node);
            }
        }
        Ok(state)
    }

    /// Failure side of a pattern test: the last case of an exhaustive
    /// `match` must leave nothing unmatched
    fn check_unmatched(
        &mut self,
        op: &Instruction,
        narrowing: &Narrowing,
        success: bool,
        node: CfgNodeId,
    ) -> VmResult<()> {
        if success {
            return Ok(());
        }
        self.report_incomplete_match(op.line, narrowing.unmatched, node)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Loops
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_get_iter(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, iterable) = state.pop()?;
        let (node, element) = self.iteration_element(state.node, iterable)?;
        let returned = self.none_var(node);
        let iterator = self.ctx.values.add(AbstractValue::Generator(Generator {
            kind: GeneratorKind::Generator,
            yielded: element,
            returned,
        }));
        let var = self.new_var(&[iterator], &[], node);
        self.trace(None, &[iterable, var]);
        Ok(state.change_cfg_node(node).push(var))
    }

    /// The jump (exhaustion) drops the iterator; the fall-through pushes
    /// the next element
    pub(crate) fn op_for_iter(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let target = op.require_target()?;
        let iterator = state.top()?;
        self.store_jump(target, state.clone().pop_and_discard()?)?;

        let empty = self.ctx.converter.well_known.empty;
        let mut elements = Vec::new();
        let mut opaque = false;
        for value in self.data(iterator) {
            match self.value(value) {
                AbstractValue::Generator(g) => elements.push(g.yielded),
                _ => opaque = true,
            }
        }
        if opaque {
            let (_, element) = self.iteration_element(state.node, iterator)?;
            elements.push(element);
        }
        let element = self.ctx.program.new_variable();
        for source in elements {
            self.ctx
                .program
                .paste_variable(element, source, Some(state.node), &[]);
        }
        let data = self.data(element);
        if data.iter().all(|v| *v == empty) {
            // Nothing to iterate over: the body never runs.
            return Ok(state.set_why(Why::Never));
        }
        self.trace(None, &[iterator, element]);
        Ok(state.push(element))
    }

    pub(crate) fn op_setup_loop(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let target = op.require_target()?;
        let level = state.depth();
        Ok(state.push_block(Block::new(BlockKind::Loop, target, level, op.index)))
    }

    /// Leave the innermost loop, discarding the blocks opened inside it
    pub(crate) fn op_break_loop(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let mut state = state;
        loop {
            let (rest, block) = state.pop_block()?;
            state = rest;
            if block.kind == BlockKind::Loop {
                let exit = state.clone().truncate(block.level);
                self.store_jump(block.target, exit)?;
                return Ok(state.set_why(Why::Never));
            }
        }
    }

    /// Jump to the loop header, unwinding the blocks opened inside the loop
    pub(crate) fn op_continue_loop(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let target = op.require_target()?;
        let mut resumed = state.clone();
        while resumed.blocks.last().is_some_and(|b| b.kind != BlockKind::Loop) {
            resumed = resumed.unwind_block()?.0;
        }
        self.store_jump(target, resumed)?;
        Ok(state.set_why(Why::Never))
    }

    pub(crate) fn op_pop_block(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        Ok(state.pop_block()?.0)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{class_names, global_data, run_module};
    use crate::features::abstract_values::Literal;
    use crate::shared::models::{Assembler, Constant, Director};

    #[test]
    fn test_if_else_joins_both_branches() {
        // x = 1 if flag else "a", with `flag` unknown
        let director = Director::new();
        let mut asm = Assembler::module();
        let (otherwise, end) = (asm.label(), asm.label());
        asm.op_name("LOAD_NAME", "flag")
            .jump("POP_JUMP_IF_FALSE", otherwise)
            .load_const(Constant::Int(1))
            .op_name("STORE_NAME", "x")
            .jump("JUMP_FORWARD", end)
            .place(otherwise)
            .load_const(Constant::Str("a".into()))
            .op_name("STORE_NAME", "x")
            .place(end)
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        run_module(&director, asm, |vm, globals, exit| {
            let data = global_data(vm, globals, "x", exit);
            assert_eq!(class_names(vm, &data), vec!["int", "str"]);
        });
    }

    #[test]
    fn test_constant_condition_prunes_dead_branch() {
        let director = Director::new();
        let mut asm = Assembler::module();
        let (otherwise, end) = (asm.label(), asm.label());
        asm.load_const(Constant::Bool(true))
            .jump("POP_JUMP_IF_FALSE", otherwise)
            .load_const(Constant::Int(1))
            .op_name("STORE_NAME", "x")
            .jump("JUMP_FORWARD", end)
            .place(otherwise)
            .load_const(Constant::Str("a".into()))
            .op_name("STORE_NAME", "x")
            .place(end)
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        run_module(&director, asm, |vm, globals, exit| {
            let data = global_data(vm, globals, "x", exit);
            assert_eq!(class_names(vm, &data), vec!["int"]);
        });
    }

    #[test]
    fn test_for_loop_binds_elements() {
        // for v in (1, 2): last = v
        let director = Director::new();
        let mut asm = Assembler::module();
        let (head, done) = (asm.label(), asm.label());
        asm.load_const(Constant::Tuple(vec![Constant::Int(1), Constant::Int(2)]))
            .op("GET_ITER")
            .place(head)
            .jump("FOR_ITER", done)
            .op_name("STORE_NAME", "last")
            .jump("JUMP_ABSOLUTE", head)
            .place(done)
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        run_module(&director, asm, |vm, globals, exit| {
            let data = global_data(vm, globals, "last", exit);
            let mut ints: Vec<_> = data
                .iter()
                .filter_map(|v| match vm.ctx.values.literal(*v) {
                    Some(Literal::Int(i)) => Some(*i),
                    _ => None,
                })
                .collect();
            ints.sort();
            assert_eq!(ints, vec![1, 2]);
        });
    }

    #[test]
    fn test_loop_over_empty_tuple_skips_body() {
        let director = Director::new();
        let mut asm = Assembler::module();
        let (head, done) = (asm.label(), asm.label());
        asm.load_const(Constant::Tuple(vec![]))
            .op("GET_ITER")
            .place(head)
            .jump("FOR_ITER", done)
            .op_name("STORE_NAME", "v")
            .jump("JUMP_ABSOLUTE", head)
            .place(done)
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        run_module(&director, asm, |vm, globals, _| {
            assert!(vm.ctx.values.member(globals, "v").is_none());
        });
    }

    #[test]
    fn test_break_leaves_loop_block() {
        // while True: x = 1; break
        let director = Director::new();
        let mut asm = Assembler::module();
        let (head, after) = (asm.label(), asm.label());
        asm.jump("SETUP_LOOP", after)
            .place(head)
            .load_const(Constant::Int(1))
            .op_name("STORE_NAME", "x")
            .op("BREAK_LOOP")
            .jump("JUMP_ABSOLUTE", head)
            .place(after)
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        run_module(&director, asm, |vm, globals, exit| {
            let data = global_data(vm, globals, "x", exit);
            assert_eq!(class_names(vm, &data), vec!["int"]);
            assert!(vm.ctx.errorlog.is_empty());
        });
    }

    #[test]
    fn test_or_keeps_left_operand_on_jump() {
        // y = 0 or "s"
        let director = Director::new();
        let mut asm = Assembler::module();
        let end = asm.label();
        asm.load_const(Constant::Int(0))
            .jump("JUMP_IF_TRUE_OR_POP", end)
            .load_const(Constant::Str("s".into()))
            .place(end)
            .op_name("STORE_NAME", "y")
            .load_const(Constant::None)
            .op("RETURN_VALUE");
        run_module(&director, asm, |vm, globals, exit| {
            let data = global_data(vm, globals, "y", exit);
            assert_eq!(class_names(vm, &data), vec!["str"]);
        });
    }
}
