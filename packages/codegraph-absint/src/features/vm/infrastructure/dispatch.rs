//! Instruction dispatch
//!
//! One exhaustive `match` over [`Opcode`]. Adding an opcode to the table in
//! `shared::models::opcode` without a handler here is a compile error;
//! mnemonics outside the table never get this far (decoding them fails
//! with `UnknownOpcode`).

use crate::errors::VmResult;
use crate::features::frame_state::FrameState;
use crate::features::vm::domain::OpcodeTrace;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::shared::models::{Instruction, Opcode};

impl VirtualMachine<'_> {
    /// Execute one instruction and record its trace
    pub(crate) fn run_instruction(
        &mut self,
        state: FrameState,
        op: &Instruction,
        opcode: Opcode,
    ) -> VmResult<FrameState> {
        *self
            .ctx
            .opcode_counts
            .entry(op.mnemonic.clone())
            .or_insert(0) += 1;
        vm_trace!(
            opcode = %opcode,
            index = op.index,
            line = op.line,
            depth = state.depth(),
            "Executing"
        );

        // Nested frames run inside CALL handlers; keep the outer draft aside.
        let outer = std::mem::take(&mut self.ctx.current_trace);
        let result = self
            .dispatch(state, op, opcode)
            .map_err(|e| e.at_opcode(&op.mnemonic));
        let draft = std::mem::replace(&mut self.ctx.current_trace, outer);
        let state = result?;

        if self.ctx.config.trace_opcodes && self.ctx.trace_suppressed == 0 {
            self.ctx.traces.push(OpcodeTrace {
                index: op.index,
                line: op.line,
                opcode: op.mnemonic.clone(),
                symbol: draft.symbol,
                data: draft.data,
                node: state.node,
            });
        }
        Ok(state)
    }

    fn dispatch(
        &mut self,
        state: FrameState,
        op: &Instruction,
        opcode: Opcode,
    ) -> VmResult<FrameState> {
        match opcode {
            // Stack manipulation
            Opcode::Nop | Opcode::ExtendedArg | Opcode::Cache | Opcode::Resume => Ok(state),
            Opcode::PopTop => self.op_pop_top(state, op),
            Opcode::RotTwo => self.op_rot_two(state, op),
            Opcode::RotThree => self.op_rot_three(state, op),
            Opcode::RotFour => self.op_rot_four(state, op),
            Opcode::RotN => self.op_rot_n(state, op),
            Opcode::DupTop => self.op_dup_top(state, op),
            Opcode::DupTopTwo => self.op_dup_top_two(state, op),
            Opcode::Copy => self.op_copy(state, op),
            Opcode::Swap => self.op_swap(state, op),
            Opcode::PushNull => self.op_push_null(state, op),
            Opcode::PrintExpr => self.op_print_expr(state, op),

            // Constants and names
            Opcode::LoadConst => self.op_load_const(state, op),
            Opcode::LoadName => self.op_load_name(state, op),
            Opcode::StoreName => self.op_store_name(state, op),
            Opcode::DeleteName => self.op_delete_name(state, op),
            Opcode::LoadFast => self.op_load_fast(state, op),
            Opcode::StoreFast => self.op_store_fast(state, op),
            Opcode::DeleteFast => self.op_delete_fast(state, op),
            Opcode::LoadGlobal => self.op_load_global(state, op),
            Opcode::StoreGlobal => self.op_store_global(state, op),
            Opcode::DeleteGlobal => self.op_delete_global(state, op),
            Opcode::LoadDeref => self.op_load_deref(state, op),
            Opcode::StoreDeref => self.op_store_deref(state, op),
            Opcode::DeleteDeref => self.op_delete_deref(state, op),
            Opcode::LoadClosure => self.op_load_closure(state, op),
            Opcode::LoadClassderef => self.op_load_classderef(state, op),
            Opcode::LoadAssertionError => self.op_load_assertion_error(state, op),
            Opcode::LoadBuildClass => self.op_load_build_class(state, op),
            Opcode::SetupAnnotations => self.op_setup_annotations(state, op),

            // Operators
            Opcode::UnaryPositive => self.op_unary(state, op, "__pos__"),
            Opcode::UnaryNegative => self.op_unary(state, op, "__neg__"),
            Opcode::UnaryInvert => self.op_unary(state, op, "__invert__"),
            Opcode::UnaryNot => self.op_unary_not(state, op),
            Opcode::BinaryAdd => self.op_binary(state, op, "+", false),
            Opcode::BinarySubtract => self.op_binary(state, op, "-", false),
            Opcode::BinaryMultiply => self.op_binary(state, op, "*", false),
            Opcode::BinaryMatrixMultiply => self.op_binary(state, op, "@", false),
            Opcode::BinaryTrueDivide => self.op_binary(state, op, "/", false),
            Opcode::BinaryFloorDivide => self.op_binary(state, op, "//", false),
            Opcode::BinaryModulo => self.op_binary(state, op, "%", false),
            Opcode::BinaryPower => self.op_binary(state, op, "**", false),
            Opcode::BinaryLshift => self.op_binary(state, op, "<<", false),
            Opcode::BinaryRshift => self.op_binary(state, op, ">>", false),
            Opcode::BinaryAnd => self.op_binary(state, op, "&", false),
            Opcode::BinaryOr => self.op_binary(state, op, "|", false),
            Opcode::BinaryXor => self.op_binary(state, op, "^", false),
            Opcode::InplaceAdd => self.op_binary(state, op, "+", true),
            Opcode::InplaceSubtract => self.op_binary(state, op, "-", true),
            Opcode::InplaceMultiply => self.op_binary(state, op, "*", true),
            Opcode::InplaceMatrixMultiply => self.op_binary(state, op, "@", true),
            Opcode::InplaceTrueDivide => self.op_binary(state, op, "/", true),
            Opcode::InplaceFloorDivide => self.op_binary(state, op, "//", true),
            Opcode::InplaceModulo => self.op_binary(state, op, "%", true),
            Opcode::InplacePower => self.op_binary(state, op, "**", true),
            Opcode::InplaceLshift => self.op_binary(state, op, "<<", true),
            Opcode::InplaceRshift => self.op_binary(state, op, ">>", true),
            Opcode::InplaceAnd => self.op_binary(state, op, "&", true),
            Opcode::InplaceOr => self.op_binary(state, op, "|", true),
            Opcode::InplaceXor => self.op_binary(state, op, "^", true),
            Opcode::BinaryOp => self.op_binary_op(state, op),
            Opcode::CompareOp => self.op_compare_op(state, op),
            Opcode::IsOp => self.op_is_op(state, op),
            Opcode::ContainsOp => self.op_contains_op(state, op),

            // Containers
            Opcode::BuildTuple => self.op_build_tuple(state, op),
            Opcode::BuildList => self.op_build_list(state, op),
            Opcode::BuildSet => self.op_build_set(state, op),
            Opcode::BuildMap => self.op_build_map(state, op),
            Opcode::BuildConstKeyMap => self.op_build_const_key_map(state, op),
            Opcode::BuildString => self.op_build_string(state, op),
            Opcode::BuildSlice => self.op_build_slice(state, op),
            Opcode::ListAppend => self.op_list_append(state, op),
            Opcode::SetAdd => self.op_set_add(state, op),
            Opcode::MapAdd => self.op_map_add(state, op),
            Opcode::ListExtend => self.op_list_extend(state, op),
            Opcode::SetUpdate => self.op_set_update(state, op),
            Opcode::DictUpdate | Opcode::DictMerge => self.op_dict_update(state, op),
            Opcode::ListToTuple => self.op_list_to_tuple(state, op),
            Opcode::UnpackSequence => self.op_unpack_sequence(state, op),
            Opcode::UnpackEx => self.op_unpack_ex(state, op),
            Opcode::BinarySubscr => self.op_binary_subscr(state, op),
            Opcode::StoreSubscr => self.op_store_subscr(state, op),
            Opcode::DeleteSubscr => self.op_delete_subscr(state, op),
            Opcode::FormatValue => self.op_format_value(state, op),

            // Attributes
            Opcode::LoadAttr => self.op_load_attr(state, op),
            Opcode::StoreAttr => self.op_store_attr(state, op),
            Opcode::DeleteAttr => self.op_delete_attr(state, op),
            Opcode::LoadMethod => self.op_load_method(state, op),

            // Calls
            Opcode::CallFunction => self.op_call_function(state, op),
            Opcode::CallFunctionKw => self.op_call_function_kw(state, op),
            Opcode::CallFunctionEx => self.op_call_function_ex(state, op),
            Opcode::CallMethod | Opcode::Call => self.op_call_method(state, op),
            Opcode::Precall => Ok(state),
            Opcode::KwNames => self.op_kw_names(state, op),
            Opcode::MakeFunction => self.op_make_function(state, op),
            Opcode::ReturnValue => self.op_return_value(state, op),

            // Control flow
            Opcode::JumpForward | Opcode::JumpAbsolute | Opcode::JumpBackward => {
                self.op_jump(state, op)
            }
            Opcode::PopJumpIfTrue => self.op_pop_jump_if(state, op, true),
            Opcode::PopJumpIfFalse => self.op_pop_jump_if(state, op, false),
            Opcode::PopJumpIfNone => self.op_pop_jump_if_none(state, op, true),
            Opcode::PopJumpIfNotNone => self.op_pop_jump_if_none(state, op, false),
            Opcode::JumpIfTrueOrPop => self.op_jump_if_or_pop(state, op, true),
            Opcode::JumpIfFalseOrPop => self.op_jump_if_or_pop(state, op, false),
            Opcode::GetIter => self.op_get_iter(state, op),
            Opcode::ForIter => self.op_for_iter(state, op),
            Opcode::SetupLoop => self.op_setup_loop(state, op),
            Opcode::BreakLoop => self.op_break_loop(state, op),
            Opcode::ContinueLoop => self.op_continue_loop(state, op),
            Opcode::PopBlock => self.op_pop_block(state, op),

            // Exceptions
            Opcode::SetupExcept => self.op_setup_except(state, op),
            Opcode::SetupFinally => self.op_setup_finally(state, op),
            Opcode::BeginFinally => self.op_begin_finally(state, op),
            Opcode::EndFinally => self.op_end_finally(state, op),
            Opcode::PopFinally => self.op_pop_finally(state, op),
            Opcode::CallFinally => self.op_call_finally(state, op),
            Opcode::PopExcept => self.op_pop_except(state, op),
            Opcode::Reraise => self.op_reraise(state, op),
            Opcode::RaiseVarargs => self.op_raise_varargs(state, op),
            Opcode::CheckExcMatch => self.op_check_exc_match(state, op),
            Opcode::JumpIfNotExcMatch => self.op_jump_if_not_exc_match(state, op),

            // With statements
            Opcode::SetupWith => self.op_setup_with(state, op),
            Opcode::SetupAsyncWith => self.op_setup_async_with(state, op),
            Opcode::BeforeWith => self.op_before_with(state, op, false),
            Opcode::BeforeAsyncWith => self.op_before_with(state, op, true),
            Opcode::WithCleanupStart => self.op_with_cleanup_start(state, op),
            Opcode::WithCleanupFinish => self.op_with_cleanup_finish(state, op),

            // Generators and coroutines
            Opcode::YieldValue => self.op_yield_value(state, op),
            Opcode::YieldFrom => self.op_yield_from(state, op),
            Opcode::GetAwaitable | Opcode::GetAiter => Ok(state),
            Opcode::GetAnext => self.op_get_anext(state, op),
            Opcode::GetYieldFromIter => self.op_get_yield_from_iter(state, op),
            Opcode::EndAsyncFor => self.op_end_async_for(state, op),
            Opcode::ReturnGenerator => self.op_return_generator(state, op),
            Opcode::GenStart => Ok(state),

            // Imports
            Opcode::ImportName => self.op_import_name(state, op),
            Opcode::ImportFrom => self.op_import_from(state, op),
            Opcode::ImportStar => self.op_import_star(state, op),

            // Pattern matching
            Opcode::GetLen => self.op_get_len(state, op),
            Opcode::MatchMapping => self.op_match_mapping(state, op),
            Opcode::MatchSequence => self.op_match_sequence(state, op),
            Opcode::MatchKeys => self.op_match_keys(state, op),
            Opcode::MatchClass => self.op_match_class(state, op),
            Opcode::CopyDictWithoutKeys => self.op_copy_dict_without_keys(state, op),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::errors::VirtualMachineError;
    use crate::features::imports::NullImporter;
    use crate::features::vm::infrastructure::context::AnalysisContext;
    use crate::shared::models::Director;

    #[test]
    fn test_every_opcode_decodes_to_itself() {
        for opcode in Opcode::ALL {
            assert_eq!(Opcode::from_mnemonic(opcode.mnemonic()), Some(*opcode));
        }
    }

    #[test]
    fn test_unknown_mnemonic_is_fatal() {
        let op = Instruction {
            index: 0,
            mnemonic: "FROBNICATE".to_string(),
            arg: None,
            argval: None,
            target: None,
            line: 3,
        };
        assert_eq!(
            op.opcode(),
            Err(VirtualMachineError::unknown_opcode("FROBNICATE", 3))
        );
    }

    #[test]
    fn test_underflow_is_attributed_to_instruction() {
        let director = Director::new();
        let importer = NullImporter;
        let ctx = AnalysisContext::new(AnalysisConfig::default(), &director, &importer);
        let mut vm = VirtualMachine::new(ctx);
        let op = Instruction {
            index: 0,
            mnemonic: "POP_TOP".to_string(),
            arg: None,
            argval: None,
            target: None,
            line: 1,
        };
        let state = FrameState::new(vm.ctx.root);
        let err = vm.run_instruction(state, &op, Opcode::PopTop).unwrap_err();
        assert_eq!(err, VirtualMachineError::stack_underflow("POP_TOP", 1, 0));
        assert_eq!(vm.ctx.opcode_counts.get("POP_TOP"), Some(&1));
    }
}
