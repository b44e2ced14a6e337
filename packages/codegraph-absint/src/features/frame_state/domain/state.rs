//! The per-instruction evaluation state
//!
//! A [`FrameState`] is threaded by value through the handlers: every
//! operation consumes the state and returns the updated one. Popping past
//! the bottom of either stack is a dispatcher bug and surfaces as a fatal
//! [`VirtualMachineError`].

use super::block::{Block, BlockKind, Why};
use crate::errors::{VirtualMachineError, VmResult};
use crate::features::typegraph::{BindingId, CfgNodeId, Program, VariableId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameState {
    pub stack: Vec<VariableId>,
    pub blocks: Vec<Block>,
    pub node: CfgNodeId,
    pub why: Option<Why>,
}

impl FrameState {
    pub fn new(node: CfgNodeId) -> Self {
        Self {
            stack: Vec::new(),
            blocks: Vec::new(),
            node,
            why: None,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Operand stack
    // ═══════════════════════════════════════════════════════════════════

    pub fn push(mut self, var: VariableId) -> Self {
        self.stack.push(var);
        self
    }

    pub fn push_all(mut self, vars: impl IntoIterator<Item = VariableId>) -> Self {
        self.stack.extend(vars);
        self
    }

    pub fn pop(mut self) -> VmResult<(Self, VariableId)> {
        match self.stack.pop() {
            Some(var) => Ok((self, var)),
            None => Err(VirtualMachineError::stack_underflow("pop", 1, 0)),
        }
    }

    pub fn pop_and_discard(self) -> VmResult<Self> {
        self.pop().map(|(state, _)| state)
    }

    /// Pop `n` values, returned bottom-most first
    pub fn popn(mut self, n: usize) -> VmResult<(Self, Vec<VariableId>)> {
        if n > self.stack.len() {
            return Err(VirtualMachineError::stack_underflow("popn", n, self.stack.len()));
        }
        let split = self.stack.len() - n;
        let values = self.stack.split_off(split);
        Ok((self, values))
    }

    /// The `n`-th value from the top (`peek(1)` is the top)
    pub fn peek(&self, n: usize) -> VmResult<VariableId> {
        if n == 0 || n > self.stack.len() {
            return Err(VirtualMachineError::stack_underflow("peek", n, self.stack.len()));
        }
        Ok(self.stack[self.stack.len() - n])
    }

    pub fn top(&self) -> VmResult<VariableId> {
        self.peek(1)
    }

    /// Replace the `n`-th value from the top
    pub fn set(mut self, n: usize, var: VariableId) -> VmResult<Self> {
        if n == 0 || n > self.stack.len() {
            return Err(VirtualMachineError::stack_underflow("set", n, self.stack.len()));
        }
        let idx = self.stack.len() - n;
        self.stack[idx] = var;
        Ok(self)
    }

    /// Swap the top with the `n`-th value from the top
    pub fn swap(mut self, n: usize) -> VmResult<Self> {
        if n == 0 || n > self.stack.len() {
            return Err(VirtualMachineError::stack_underflow("swap", n, self.stack.len()));
        }
        let len = self.stack.len();
        self.stack.swap(len - 1, len - n);
        Ok(self)
    }

    /// Move the top value down to position `n` (ROT_TWO is `rotate(2)`)
    pub fn rotate(mut self, n: usize) -> VmResult<Self> {
        if n > self.stack.len() {
            return Err(VirtualMachineError::stack_underflow("rotate", n, self.stack.len()));
        }
        if n < 2 {
            return Ok(self);
        }
        let len = self.stack.len();
        self.stack[len - n..].rotate_right(1);
        Ok(self)
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Drop values above `level`
    pub fn truncate(mut self, level: usize) -> Self {
        self.stack.truncate(level);
        self
    }

    // ═══════════════════════════════════════════════════════════════════
    // Block stack
    // ═══════════════════════════════════════════════════════════════════

    pub fn push_block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    /// Pop a block; the operand stack is not touched
    pub fn pop_block(mut self) -> VmResult<(Self, Block)> {
        match self.blocks.pop() {
            Some(block) => Ok((self, block)),
            None => Err(VirtualMachineError::BlockUnderflow {
                opcode: "pop_block".to_string(),
            }),
        }
    }

    /// Pop a block and unwind the operand stack to its recorded level
    pub fn unwind_block(self) -> VmResult<(Self, Block)> {
        let (state, block) = self.pop_block()?;
        Ok((state.truncate(block.level), block))
    }

    /// Innermost block of the given kind, counted from the top
    pub fn innermost(&self, kind: BlockKind) -> Option<(usize, &Block)> {
        self.blocks
            .iter()
            .enumerate()
            .rev()
            .find(|(_, b)| b.kind == kind)
    }

    pub fn has_block(&self, kind: BlockKind) -> bool {
        self.blocks.iter().any(|b| b.kind == kind)
    }

    // ═══════════════════════════════════════════════════════════════════
    // CFG position and exit reason
    // ═══════════════════════════════════════════════════════════════════

    pub fn set_why(mut self, why: Why) -> Self {
        self.why = Some(why);
        self
    }

    pub fn clear_why(mut self) -> Self {
        self.why = None;
        self
    }

    pub fn change_cfg_node(mut self, node: CfgNodeId) -> Self {
        self.node = node;
        self
    }

    /// Continue at a fresh node connected from the current one
    pub fn forward_cfg_node(
        mut self,
        program: &mut Program,
        name: &str,
        condition: Option<BindingId>,
    ) -> Self {
        self.node = program.connect_new(self.node, name, condition);
        self
    }

    /// Merge this state into the one already recorded for a target.
    ///
    /// Stack slots holding different variables are unified by pasting this
    /// state's bindings into the recorded variables; the current node gets an
    /// edge to the recorded node.
    pub fn merge_into(
        self,
        other: Option<FrameState>,
        program: &mut Program,
        target: usize,
    ) -> VmResult<FrameState> {
        let Some(other) = other else {
            return Ok(self);
        };
        if self.stack.len() != other.stack.len() {
            return Err(VirtualMachineError::StackMismatch {
                target,
                expected: other.stack.len(),
                found: self.stack.len(),
            });
        }
        for (mine, theirs) in self.stack.iter().zip(other.stack.iter()) {
            if mine != theirs {
                program.paste_variable(*theirs, *mine, None, &[]);
            }
        }
        if self.node == other.node {
            return Ok(self);
        }
        program.connect_to(self.node, other.node);
        Ok(FrameState {
            stack: other.stack,
            blocks: self.blocks,
            node: other.node,
            why: self.why,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(depth: u32) -> FrameState {
        let mut program = Program::new();
        let node = program.new_cfg_node("start", None);
        FrameState::new(node).push_all((0..depth).map(VariableId))
    }

    #[test]
    fn test_push_pop_order() {
        let state = state_with(3);
        let (state, top) = state.pop().unwrap();
        assert_eq!(top, VariableId(2));
        let (state, rest) = state.popn(2).unwrap();
        assert_eq!(rest, vec![VariableId(0), VariableId(1)]);
        assert!(state.pop().is_err());
    }

    #[test]
    fn test_underflow_is_fatal() {
        let state = state_with(1);
        let err = state.popn(2).unwrap_err();
        assert!(matches!(
            err,
            VirtualMachineError::StackUnderflow { needed: 2, available: 1, .. }
        ));
    }

    #[test]
    fn test_peek_rotate_swap() {
        let state = state_with(3);
        assert_eq!(state.peek(1).unwrap(), VariableId(2));
        assert_eq!(state.peek(3).unwrap(), VariableId(0));
        assert!(state.peek(4).is_err());

        let rotated = state.clone().rotate(3).unwrap();
        assert_eq!(rotated.stack, vec![VariableId(2), VariableId(0), VariableId(1)]);

        let swapped = state.swap(2).unwrap();
        assert_eq!(swapped.stack, vec![VariableId(0), VariableId(2), VariableId(1)]);
    }

    #[test]
    fn test_unwind_block_restores_level() {
        let state = state_with(1)
            .push_block(Block::new(BlockKind::Loop, 10, 1, 0))
            .push(VariableId(5))
            .push(VariableId(6));
        let (state, block) = state.unwind_block().unwrap();
        assert_eq!(block.kind, BlockKind::Loop);
        assert_eq!(state.depth(), 1);
        assert!(state.pop_block().is_err());
    }

    #[test]
    fn test_merge_pastes_and_connects() {
        let mut program = Program::new();
        let a = program.new_cfg_node("a", None);
        let b = program.new_cfg_node("b", None);
        let v1 = program.new_variable();
        let v2 = program.new_variable();
        program.add_binding(v1, crate::features::typegraph::ValueId(1), [], a);

        let recorded = FrameState::new(b).push(v2);
        let merged = FrameState::new(a)
            .push(v1)
            .merge_into(Some(recorded), &mut program, 7)
            .unwrap();
        assert_eq!(merged.node, b);
        assert_eq!(merged.stack, vec![v2]);
        assert_eq!(program.bindings(v2).len(), 1);
        assert_eq!(program.predecessors(b), vec![a]);
    }

    #[test]
    fn test_merge_depth_mismatch() {
        let mut program = Program::new();
        let a = program.new_cfg_node("a", None);
        let err = FrameState::new(a)
            .push(VariableId(0))
            .merge_into(Some(FrameState::new(a)), &mut program, 3)
            .unwrap_err();
        assert!(matches!(err, VirtualMachineError::StackMismatch { target: 3, .. }));
    }
}
