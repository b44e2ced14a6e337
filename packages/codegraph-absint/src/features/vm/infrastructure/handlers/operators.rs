//! Unary, binary and comparison opcodes

use crate::errors::{VirtualMachineError, VmResult};
use crate::features::frame_state::FrameState;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::features::vm::infrastructure::operators::{Comparison, BINARY_OP_SYMBOLS};
use crate::shared::models::Instruction;

impl VirtualMachine<'_> {
    pub(crate) fn op_unary(
        &mut self,
        state: FrameState,
        _op: &Instruction,
        dunder: &str,
    ) -> VmResult<FrameState> {
        let (state, operand) = state.pop()?;
        let (node, result) = self.unary_operator(state.node, dunder, operand)?;
        self.trace(Some(dunder.to_string()), &[operand, result]);
        Ok(state.change_cfg_node(node).push(result))
    }

    pub(crate) fn op_unary_not(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, operand) = state.pop()?;
        let result = self.unary_not(state.node, operand);
        Ok(state.push(result))
    }

    pub(crate) fn op_binary(
        &mut self,
        state: FrameState,
        _op: &Instruction,
        symbol: &str,
        inplace: bool,
    ) -> VmResult<FrameState> {
        let (state, operands) = state.popn(2)?;
        let (left, right) = (operands[0], operands[1]);
        let (node, result) = self.binary_operator(state.node, symbol, inplace, left, right)?;
        self.trace(Some(symbol.to_string()), &[left, right, result]);
        Ok(state.change_cfg_node(node).push(result))
    }

    /// 3.11 `BINARY_OP`: the argument selects the operator
    pub(crate) fn op_binary_op(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let arg = op.require_arg()? as usize;
        let count = BINARY_OP_SYMBOLS.len();
        let (symbol, inplace) = match arg {
            a if a < count => (BINARY_OP_SYMBOLS[a], false),
            a if a < 2 * count => (BINARY_OP_SYMBOLS[a - count], true),
            a => {
                return Err(VirtualMachineError::invalid_bytecode(format!(
                    "BINARY_OP argument {a} out of range"
                )))
            }
        };
        self.op_binary(state, op, symbol, inplace)
    }

    pub(crate) fn op_compare_op(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let cmp = op
            .argval
            .as_deref()
            .and_then(Comparison::from_symbol)
            .or_else(|| op.arg.and_then(Comparison::from_arg))
            .ok_or_else(|| {
                VirtualMachineError::invalid_bytecode(format!(
                    "unknown comparison {:?}",
                    op.argval.as_deref().map_or_else(|| op.arg_or_zero().to_string(), str::to_string)
                ))
            })?;
        self.comparison(state, cmp)
    }

    pub(crate) fn op_is_op(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let cmp = if op.arg_or_zero() == 0 {
            Comparison::Is
        } else {
            Comparison::IsNot
        };
        self.comparison(state, cmp)
    }

    pub(crate) fn op_contains_op(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let cmp = if op.arg_or_zero() == 0 {
            Comparison::In
        } else {
            Comparison::NotIn
        };
        self.comparison(state, cmp)
    }

    fn comparison(&mut self, state: FrameState, cmp: Comparison) -> VmResult<FrameState> {
        let (state, operands) = state.popn(2)?;
        let (left, right) = (operands[0], operands[1]);
        let (node, result) = self.compare(state.node, cmp, left, right)?;
        self.trace(Some(cmp.symbol().to_string()), &[left, right, result]);
        Ok(state.change_cfg_node(node).push(result))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run_straight, with_frame};
    use crate::features::abstract_values::Literal;
    use crate::features::diagnostics::ErrorKind;
    use crate::shared::models::{Assembler, Constant, Director};

    #[test]
    fn test_binary_op_folds_ints() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.load_const(Constant::Int(2))
            .load_const(Constant::Int(5))
            .op_arg("BINARY_OP", 5);
        with_frame(&director, asm, |vm, state| {
            let state = run_straight(vm, state);
            let data = vm.data(state.top().unwrap());
            assert_eq!(vm.ctx.values.literal(data[0]), Some(&Literal::Int(10)));
        });
    }

    #[test]
    fn test_inplace_binary_op_range() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.load_const(Constant::Int(7))
            .load_const(Constant::Int(2))
            .op_arg("BINARY_OP", 23);
        with_frame(&director, asm, |vm, state| {
            let state = run_straight(vm, state);
            let data = vm.data(state.top().unwrap());
            assert_eq!(vm.ctx.values.literal(data[0]), Some(&Literal::Int(5)));
        });
    }

    #[test]
    fn test_str_plus_int_is_reported() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.load_const(Constant::Str("a".into()))
            .load_const(Constant::Int(1))
            .op("BINARY_ADD");
        with_frame(&director, asm, |vm, state| {
            run_straight(vm, state);
            assert!(vm.ctx.errorlog.has_kind(ErrorKind::UnsupportedOperands));
        });
    }

    #[test]
    fn test_is_none_folds() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.load_const(Constant::None)
            .load_const(Constant::None)
            .op_arg("IS_OP", 1);
        with_frame(&director, asm, |vm, state| {
            let state = run_straight(vm, state);
            let data = vm.data(state.top().unwrap());
            assert_eq!(vm.ctx.values.literal(data[0]), Some(&Literal::Bool(false)));
        });
    }

    #[test]
    fn test_compare_op_by_symbol() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.load_const(Constant::Int(1))
            .load_const(Constant::Int(2))
            .op_argval("COMPARE_OP", 0, "<");
        with_frame(&director, asm, |vm, state| {
            let state = run_straight(vm, state);
            let data = vm.data(state.top().unwrap());
            assert_eq!(vm.ctx.values.literal(data[0]), Some(&Literal::Bool(true)));
        });
    }
}
