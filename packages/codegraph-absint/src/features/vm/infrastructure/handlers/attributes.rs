//! Attribute opcodes

use crate::errors::VmResult;
use crate::features::frame_state::FrameState;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::features::vm::infrastructure::names::NameTable;
use crate::shared::models::Instruction;

impl VirtualMachine<'_> {
    pub(crate) fn op_load_attr(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let attr = self.name_arg(op, NameTable::Names)?;
        let (state, obj) = state.pop()?;
        let value = self.load_attribute(state.node, obj, &attr);
        self.trace(Some(attr), &[obj, value]);
        Ok(state.push(value))
    }

    /// Stack: `[value, obj]`
    pub(crate) fn op_store_attr(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let attr = self.name_arg(op, NameTable::Names)?;
        let (state, operands) = state.popn(2)?;
        let (value, obj) = (operands[0], operands[1]);
        self.store_attribute(state.node, obj, &attr, value);
        self.trace(Some(attr), &[obj, value]);
        Ok(state)
    }

    pub(crate) fn op_delete_attr(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let attr = self.name_arg(op, NameTable::Names)?;
        let (state, obj) = state.pop()?;
        self.delete_attribute(state.node, obj, &attr);
        Ok(state)
    }

    /// Leaves `[NULL, method]` for `CALL_METHOD`; the method is already
    /// bound to the receiver
    pub(crate) fn op_load_method(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let attr = self.name_arg(op, NameTable::Names)?;
        let (state, obj) = state.pop()?;
        let method = self.load_attribute(state.node, obj, &attr);
        let null = self.ctx.converter.well_known.null;
        let marker = self.new_var(&[null], &[], state.node);
        self.trace(Some(attr), &[obj, method]);
        Ok(state.push(marker).push(method))
    }
}
