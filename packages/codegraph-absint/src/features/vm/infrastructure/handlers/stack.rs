//! Stack manipulation

use crate::errors::VmResult;
use crate::features::frame_state::FrameState;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::shared::models::Instruction;

impl VirtualMachine<'_> {
    pub(crate) fn op_pop_top(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        state.pop_and_discard()
    }

    pub(crate) fn op_rot_two(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        state.rotate(2)
    }

    pub(crate) fn op_rot_three(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        state.rotate(3)
    }

    pub(crate) fn op_rot_four(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        state.rotate(4)
    }

    pub(crate) fn op_rot_n(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        state.rotate(n)
    }

    pub(crate) fn op_dup_top(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let top = state.top()?;
        Ok(state.push(top))
    }

    pub(crate) fn op_dup_top_two(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let second = state.peek(2)?;
        let top = state.peek(1)?;
        Ok(state.push(second).push(top))
    }

    /// `COPY n`: push the n-th item (1 = top)
    pub(crate) fn op_copy(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        let item = state.peek(n)?;
        Ok(state.push(item))
    }

    pub(crate) fn op_swap(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        state.swap(n)
    }

    pub(crate) fn op_push_null(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let null = self.ctx.converter.well_known.null;
        let var = self.new_var(&[null], &[], state.node);
        Ok(state.push(var))
    }

    pub(crate) fn op_print_expr(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        state.pop_and_discard()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::with_frame;
    use crate::features::typegraph::VariableId;
    use crate::shared::models::{Assembler, Director, Instruction, Opcode};

    fn instruction(mnemonic: &str, arg: Option<u32>) -> Instruction {
        Instruction {
            index: 0,
            mnemonic: mnemonic.to_string(),
            arg,
            argval: None,
            target: None,
            line: 1,
        }
    }

    #[test]
    fn test_rotations_and_copies() {
        let director = Director::new();
        with_frame(&director, Assembler::module(), |vm, state| {
            let a = VariableId(100);
            let b = VariableId(101);
            let c = VariableId(102);
            let state = state.push(a).push(b).push(c);

            let rotated = vm
                .run_instruction(state.clone(), &instruction("ROT_THREE", None), Opcode::RotThree)
                .unwrap();
            assert_eq!(rotated.stack, vec![c, a, b]);

            let copied = vm
                .run_instruction(state.clone(), &instruction("COPY", Some(3)), Opcode::Copy)
                .unwrap();
            assert_eq!(copied.stack, vec![a, b, c, a]);

            let dup = vm
                .run_instruction(state, &instruction("DUP_TOP_TWO", None), Opcode::DupTopTwo)
                .unwrap();
            assert_eq!(dup.stack, vec![a, b, c, b, c]);
        });
    }

    #[test]
    fn test_push_null_then_pop_is_balanced() {
        let director = Director::new();
        with_frame(&director, Assembler::module(), |vm, state| {
            let state = vm
                .run_instruction(state, &instruction("PUSH_NULL", None), Opcode::PushNull)
                .unwrap();
            assert_eq!(state.depth(), 1);
            let state = vm
                .run_instruction(state, &instruction("POP_TOP", None), Opcode::PopTop)
                .unwrap();
            assert_eq!(state.depth(), 0);
        });
    }
}
