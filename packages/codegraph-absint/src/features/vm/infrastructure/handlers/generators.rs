//! Generators and coroutines
//!
//! Nothing suspends: a yield records its value in the frame's yield
//! variable and execution carries on with an unknown sent value.

use crate::errors::VmResult;
use crate::features::abstract_values::{AbstractValue, Generator, GeneratorKind};
use crate::features::frame_state::FrameState;
use crate::features::typegraph::ValueId;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::shared::models::Instruction;

impl VirtualMachine<'_> {
    pub(crate) fn op_yield_value(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, value) = state.pop()?;
        if let Some(yield_var) = self.frame()?.yield_var {
            self.ctx
                .program
                .paste_variable(yield_var, value, Some(state.node), &[]);
        }
        let sent = self.unsolvable(state.node);
        Ok(state.push(sent))
    }

    /// `[iterable, sent]`: delegates to a generator (its values are yielded
    /// here too) or awaits a coroutine; pushes what the delegate returns
    pub(crate) fn op_yield_from(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, operands) = state.popn(2)?;
        let delegate = operands[0];
        let yield_var = self.frame()?.yield_var;
        let result = self.ctx.program.new_variable();
        let mut opaque = false;
        for value in self.data(delegate) {
            let Some(g) = self.generator(value) else {
                opaque = true;
                continue;
            };
            self.ctx
                .program
                .paste_variable(result, g.returned, Some(state.node), &[]);
            if let (Some(yield_var), GeneratorKind::Generator) = (yield_var, g.kind) {
                self.ctx
                    .program
                    .paste_variable(yield_var, g.yielded, Some(state.node), &[]);
            }
        }
        if opaque || self.data(result).is_empty() {
            let unsolvable = self.ctx.converter.well_known.unsolvable;
            self.ctx.program.add_binding(result, unsolvable, [], state.node);
        }
        self.trace(None, &[delegate, result]);
        Ok(state.push(result))
    }

    /// Pushes an awaitable for the next element of the async iterator on top
    pub(crate) fn op_get_anext(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let aiter = state.top()?;
        let mut awaitables = Vec::new();
        for value in self.data(aiter) {
            let awaitable = match self.generator(value) {
                Some(g) if g.kind == GeneratorKind::AsyncGenerator => {
                    let yielded = self.ctx.program.new_variable();
                    self.ctx.values.add(AbstractValue::Generator(Generator {
                        kind: GeneratorKind::Coroutine,
                        yielded,
                        returned: g.yielded,
                    }))
                }
                _ => self.ctx.converter.well_known.unsolvable,
            };
            awaitables.push(awaitable);
        }
        if awaitables.is_empty() {
            awaitables.push(self.ctx.converter.well_known.unsolvable);
        }
        let var = self.new_var(&awaitables, &[], state.node);
        Ok(state.push(var))
    }

    fn generator(&self, value: ValueId) -> Option<Generator> {
        match self.value(value) {
            AbstractValue::Generator(g) => Some(*g),
            _ => None,
        }
    }

    /// Generators are their own iterators; anything else goes through
    /// `GET_ITER`
    pub(crate) fn op_get_yield_from_iter(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let iterable = state.top()?;
        let all_generators = self
            .data(iterable)
            .into_iter()
            .all(|v| matches!(self.value(v), AbstractValue::Generator(_)));
        if all_generators {
            return Ok(state);
        }
        self.op_get_iter(state, op)
    }

    /// Pops the iterator and the exception item that ended the loop
    pub(crate) fn op_end_async_for(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        Ok(state.popn(2)?.0)
    }

    /// 3.11 generator prologue; the value is popped right away
    pub(crate) fn op_return_generator(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let none = self.none_var(state.node);
        Ok(state.push(none))
    }
}
