//! try/except/finally and `with`
//!
//! Every handler entry sees one exception item on top of the stack. The
//! entry state is queued when the protected region opens, so anything in
//! the body may raise; an explicit `raise` additionally merges the raised
//! value in. A `finally` entry reached normally sees `None` instead.

use crate::errors::VmResult;
use crate::features::abstract_values::{compatible_with, AbstractValue};
use crate::features::frame_state::{Block, BlockKind, FrameState, Why};
use crate::features::typegraph::{CfgNodeId, ValueId, VariableId};
use crate::features::vm::domain::CallArgs;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::features::vm::infrastructure::handlers::control::BranchTest;
use crate::features::vm::infrastructure::operators::Comparison;
use crate::shared::models::Instruction;

impl VirtualMachine<'_> {
    pub(crate) fn op_setup_except(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        self.setup_handler(state, op, BlockKind::SetupExcept)
    }

    pub(crate) fn op_setup_finally(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        self.setup_handler(state, op, BlockKind::Finally)
    }

    fn setup_handler(
        &mut self,
        state: FrameState,
        op: &Instruction,
        kind: BlockKind,
    ) -> VmResult<FrameState> {
        let target = op.require_target()?;
        let level = state.depth();
        let exc = self.abstract_exception(state.node);
        self.store_jump(target, state.clone().push(exc))?;
        Ok(state.push_block(Block::new(kind, target, level, op.index)))
    }

    /// The exception a region may raise without saying which
    fn abstract_exception(&mut self, node: CfgNodeId) -> VariableId {
        self.unsolvable(node)
    }

    /// Transfer `exc` to the innermost handler; without one the frame is
    /// left with `why`
    fn unwind_exception(
        &mut self,
        state: FrameState,
        exc: VariableId,
        why: Why,
    ) -> VmResult<FrameState> {
        let Some(index) = state.blocks.iter().rposition(Block::handles_exceptions) else {
            return Ok(state.set_why(why));
        };
        let block = state.blocks[index];
        let mut handler = state.clone().truncate(block.level);
        handler.blocks.truncate(index);
        self.merge_jump(block.target, handler.push(exc))?;
        Ok(state.set_why(Why::Never))
    }

    pub(crate) fn op_raise_varargs(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let (state, exc, why) = match op.arg_or_zero() {
            0 => {
                let exc = self.abstract_exception(state.node);
                (state, exc, Why::Reraise)
            }
            1 => {
                let (state, exc) = state.pop()?;
                (state, exc, Why::Exception)
            }
            _ => {
                let (state, operands) = state.popn(2)?;
                (state, operands[0], Why::Exception)
            }
        };
        let raised = self.raised_value(exc, state.node);
        self.trace(None, &[raised]);
        self.unwind_exception(state, raised, why)
    }

    /// `raise C` raises an instance of `C`
    fn raised_value(&mut self, exc: VariableId, node: CfgNodeId) -> VariableId {
        let mut values = Vec::new();
        for value in self.data(exc) {
            if matches!(self.value(value), AbstractValue::Class(_)) {
                values.push(self.ctx.converter.instance_of(&mut self.ctx.values, value));
            } else {
                values.push(value);
            }
        }
        self.new_var(&values, &[], node)
    }

    pub(crate) fn op_reraise(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, exc) = state.pop()?;
        self.unwind_exception(state, exc, Why::Reraise)
    }

    pub(crate) fn op_begin_finally(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let none = self.none_var(state.node);
        Ok(state.push(none))
    }

    /// Pops the item the `finally` body was entered with: `None` carries
    /// on, an exception propagates, both do both
    pub(crate) fn op_end_finally(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, item) = state.pop()?;
        let data: Vec<ValueId> = self
            .visible_bindings(item, state.node)
            .into_iter()
            .map(|b| self.ctx.program.binding_data(b))
            .collect();
        let normal = data.iter().any(|v| self.ctx.values.is_none(*v));
        let raising = data.iter().any(|v| !self.ctx.values.is_none(*v));
        if !raising {
            return Ok(state);
        }
        if !normal {
            return self.unwind_exception(state, item, Why::Reraise);
        }
        let unwound = self.unwind_exception(state.clone(), item, Why::Reraise)?;
        if unwound.why == Some(Why::Reraise) {
            let node = unwound.node;
            self.frame_mut()?.side_exits.push(node);
        }
        Ok(state)
    }

    /// Run the `finally` body with a `None` item, then carry on here
    pub(crate) fn op_call_finally(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let target = op.require_target()?;
        let none = self.none_var(state.node);
        self.store_jump(target, state.clone().push(none))?;
        Ok(state)
    }

    /// Discard the `finally` item, keeping the top value when the argument
    /// says so
    pub(crate) fn op_pop_finally(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        if op.arg_or_zero() == 0 {
            return state.pop_and_discard();
        }
        let (state, top) = state.pop()?;
        Ok(state.pop_and_discard()?.push(top))
    }

    pub(crate) fn op_pop_except(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        state.pop_and_discard()
    }

    /// `[exc, cls]` becomes `[exc, matched]`
    pub(crate) fn op_check_exc_match(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, cls) = state.pop()?;
        let exc = state.top()?;
        let (node, matched) = self.compare(state.node, Comparison::ExceptionMatch, exc, cls)?;
        Ok(state.change_cfg_node(node).push(matched))
    }

    /// Pops `[exc, cls]`; inside the handler the exception item left below
    /// is narrowed to instances of `cls`
    pub(crate) fn op_jump_if_not_exc_match(
        &mut self,
        state: FrameState,
        op: &Instruction,
    ) -> VmResult<FrameState> {
        let (state, operands) = state.popn(2)?;
        let (exc, cls) = (operands[0], operands[1]);
        let (node, matched) = self.compare(state.node, Comparison::ExceptionMatch, exc, cls)?;
        let state = self.branch(state.change_cfg_node(node), op, matched, BranchTest::Truthy(false))?;
        if state.why.is_some() || state.depth() == 0 {
            return Ok(state);
        }
        let caught = self.caught_instances(cls, state.node);
        if self.data(caught).is_empty() {
            return Ok(state);
        }
        state.set(1, caught)
    }

    /// Instances of the class (or tuple of classes) an `except` names
    fn caught_instances(&mut self, cls: VariableId, node: CfgNodeId) -> VariableId {
        let mut classes = Vec::new();
        for value in self.data(cls) {
            match self.value(value) {
                AbstractValue::Class(_) => classes.push(value),
                AbstractValue::Instance(i) => {
                    for element in i.elements.clone().unwrap_or_default() {
                        classes.extend(
                            self.data(element)
                                .into_iter()
                                .filter(|v| matches!(self.value(*v), AbstractValue::Class(_))),
                        );
                    }
                }
                _ => {}
            }
        }
        let instances: Vec<ValueId> = classes
            .into_iter()
            .map(|c| self.ctx.converter.instance_of(&mut self.ctx.values, c))
            .collect();
        self.new_var(&instances, &[], node)
    }

    // ═══════════════════════════════════════════════════════════════════
    // with / async with
    // ═══════════════════════════════════════════════════════════════════

    /// Pushes `__exit__`, opens the cleanup block and pushes the result of
    /// `__enter__`
    pub(crate) fn op_setup_with(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let target = op.require_target()?;
        let (state, result) = self.enter_context(state, false)?;
        let level = state.depth();
        let exc = self.abstract_exception(state.node);
        self.store_jump(target, state.clone().push(exc))?;
        Ok(state
            .push_block(Block::new(BlockKind::Finally, target, level, op.index))
            .push(result))
    }

    /// 3.11 form: no block, the exception table covers the body
    pub(crate) fn op_before_with(
        &mut self,
        state: FrameState,
        _op: &Instruction,
        is_async: bool,
    ) -> VmResult<FrameState> {
        let (state, result) = self.enter_context(state, is_async)?;
        Ok(state.push(result))
    }

    /// Stack `[exit, awaited enter result]`: opens the cleanup block below
    /// the result
    pub(crate) fn op_setup_async_with(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let target = op.require_target()?;
        let (below, result) = state.pop()?;
        let level = below.depth();
        let exc = self.abstract_exception(below.node);
        self.store_jump(target, below.clone().push(exc))?;
        Ok(below
            .push_block(Block::new(BlockKind::Finally, target, level, op.index))
            .push(result))
    }

    /// Pops the context manager, pushes its exit method; returns the
    /// state and the result of entering
    fn enter_context(&mut self, state: FrameState, is_async: bool) -> VmResult<(FrameState, VariableId)> {
        let (enter, exit) = if is_async {
            ("__aenter__", "__aexit__")
        } else {
            ("__enter__", "__exit__")
        };
        let (state, manager) = state.pop()?;
        let exit_method = self.load_attribute(state.node, manager, exit);
        let enter_method = self.load_attribute(state.node, manager, enter);
        let (node, result) = self.call_function(state.node, enter_method, &CallArgs::default())?;
        self.trace(Some(enter.to_string()), &[manager, result]);
        Ok((state.change_cfg_node(node).push(exit_method), result))
    }

    /// `[exit, item]` becomes `[item, exit(...)]`
    pub(crate) fn op_with_cleanup_start(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, operands) = state.popn(2)?;
        let (exit, item) = (operands[0], operands[1]);
        let node = state.node;
        let args: Vec<VariableId> = (0..3).map(|_| self.unsolvable(node)).collect();
        let (node, result) = self.call_function(node, exit, &CallArgs::new(args))?;
        Ok(state.change_cfg_node(node).push(item).push(result))
    }

    /// A truthy `__exit__` result may swallow the exception: the item
    /// `END_FINALLY` sees then also holds `None`
    pub(crate) fn op_with_cleanup_finish(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, operands) = state.popn(2)?;
        let (item, result) = (operands[0], operands[1]);
        let values = &self.ctx.values;
        let may_suppress = self
            .data(result)
            .into_iter()
            .any(|v| compatible_with(values, v, true));
        if !may_suppress {
            return Ok(state.push(item));
        }
        let none = self.none_var(state.node);
        let merged = self.ctx.program.new_variable();
        self.ctx.program.paste_variable(merged, item, None, &[]);
        self.ctx.program.paste_variable(merged, none, None, &[]);
        Ok(state.push(merged))
    }
}
