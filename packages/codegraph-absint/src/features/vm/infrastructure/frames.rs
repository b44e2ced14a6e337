//! Frame creation and the per-frame block loop
//!
//! A frame is run block by block in instruction order. Each block starts
//! from the state recorded for its first instruction; blocks nobody jumped
//! or fell into are skipped. Loops are analyzed in a single pass: the state
//! a backward jump carries is merged into the (already executed) header,
//! which only adds the back edge to the CFG.

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::errors::VmResult;
use crate::features::abstract_values::{AbstractValue, Namespace};
use crate::features::frame_state::{Frame, FrameState, Why};
use crate::features::typegraph::{BindingId, CfgNodeId, ValueId, VariableId};
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::features::vm::infrastructure::finally_tracker::FinallyStateTracker;
use crate::shared::models::CodeObject;

/// Result of trying to enter a new frame
#[derive(Debug)]
pub enum FrameOutcome {
    Ready(Box<Frame>),
    /// The code is already running further up the stack
    Recursion,
    /// `max_call_depth` frames are already open
    MaxDepth,
}

/// What a new frame runs and where its names live
#[derive(Debug, Clone)]
pub(crate) struct FrameSetup<'f> {
    pub code: Rc<CodeObject>,
    pub globals: ValueId,
    /// Namespace for the frame's locals; a fresh one when `None`
    pub locals: Option<ValueId>,
    /// Already-mapped parameters
    pub params: IndexMap<String, VariableId>,
    /// Cells for the code's freevars
    pub closure: &'f [VariableId],
    pub func: Option<ValueId>,
}

impl<'f> FrameSetup<'f> {
    pub(crate) fn new(code: Rc<CodeObject>, globals: ValueId) -> Self {
        Self {
            code,
            globals,
            locals: None,
            params: IndexMap::new(),
            closure: &[],
            func: None,
        }
    }

    pub(crate) fn locals(mut self, ns: ValueId) -> Self {
        self.locals = Some(ns);
        self
    }

    pub(crate) fn params(mut self, params: IndexMap<String, VariableId>) -> Self {
        self.params = params;
        self
    }

    pub(crate) fn closure(mut self, closure: &'f [VariableId]) -> Self {
        self.closure = closure;
        self
    }

    pub(crate) fn func(mut self, func: ValueId) -> Self {
        self.func = Some(func);
        self
    }
}

impl VirtualMachine<'_> {
    // ═══════════════════════════════════════════════════════════════════
    // Frame lifecycle
    // ═══════════════════════════════════════════════════════════════════

    /// Build the activation record for `setup`, entered from `node`
    pub(crate) fn make_frame(&mut self, node: CfgNodeId, setup: FrameSetup<'_>) -> FrameOutcome {
        if self
            .ctx
            .frames
            .iter()
            .any(|f| Rc::ptr_eq(&f.code, &setup.code))
        {
            debug!(frame = %setup.code.name, "Recursive call, not entering frame");
            return FrameOutcome::Recursion;
        }
        if self.ctx.frames.len() >= self.ctx.config.max_call_depth {
            debug!(
                frame = %setup.code.name,
                depth = self.ctx.frames.len(),
                "Maximum call depth reached"
            );
            return FrameOutcome::MaxDepth;
        }

        let code = setup.code;
        let start = self.ctx.program.connect_new(node, code.name.clone(), None);
        let is_module = setup.locals == Some(setup.globals);
        let locals = match setup.locals {
            Some(ns) => ns,
            None => self
                .ctx
                .values
                .add(AbstractValue::Namespace(Namespace::new(code.name.clone()))),
        };

        for (name, var) in &setup.params {
            let assigned = self.ctx.program.assign_to_new_variable(*var, start);
            self.ctx.values.set_member(locals, name, assigned);
        }

        let mut cells = Vec::with_capacity(code.cellvars.len() + code.freevars.len());
        for name in &code.cellvars {
            let cell = match self.ctx.values.member(locals, name) {
                Some(param) if setup.params.contains_key(name) => param,
                _ => self.ctx.program.new_variable(),
            };
            cells.push(cell);
        }
        for i in 0..code.freevars.len() {
            let cell = match setup.closure.get(i) {
                Some(cell) => *cell,
                None => self.ctx.program.new_variable(),
            };
            cells.push(cell);
        }

        let first_arg = code
            .positional_params()
            .first()
            .and_then(|name| self.ctx.values.member(locals, name));
        let yield_var = (code.is_generator() || code.is_coroutine() || code.is_async_generator())
            .then(|| self.ctx.program.new_variable());
        let return_var = self.ctx.program.new_variable();
        let builtins = self.ctx.converter.builtins_module();

        let mut frame = Frame::new(code, setup.globals, locals, builtins, return_var, start);
        frame.cells = cells;
        frame.first_arg = first_arg;
        frame.yield_var = yield_var;
        frame.func = setup.func;
        frame.is_module = is_module;
        FrameOutcome::Ready(Box::new(frame))
    }

    /// Run `frame` to completion; returns the exit node and the return value
    pub(crate) fn run_frame(
        &mut self,
        frame: Frame,
        node: CfgNodeId,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let code = frame.code.clone();
        let return_var = frame.return_var;
        debug!(
            frame = %code.name,
            depth = self.ctx.frames.len() + 1,
            "Entering frame"
        );
        if !frame.is_module {
            self.ctx.tracker.reset_scope(&code.name);
        }
        self.ctx.frames.push(frame);
        let outcome = self.run_blocks(&code);
        let finished = self.ctx.frames.pop();
        let (mut return_nodes, can_return) = outcome?;
        if let Some(finished) = finished {
            return_nodes.extend(finished.side_exits);
        }

        if return_nodes.is_empty() {
            debug!(frame = %code.name, "Frame has no exit");
            let unsolvable = self.ctx.converter.well_known.unsolvable;
            self.ctx.program.add_binding(return_var, unsolvable, [], node);
            return Ok((node, return_var));
        }
        let exit = self.join_nodes(&return_nodes);
        if !can_return {
            let empty = self.ctx.converter.well_known.empty;
            self.ctx.program.add_binding(return_var, empty, [], exit);
        }
        debug!(frame = %code.name, exits = return_nodes.len(), "Leaving frame");
        Ok((exit, return_var))
    }

    /// Execute every reachable block; returns the exit nodes and whether
    /// any of them returns normally
    fn run_blocks(&mut self, code: &CodeObject) -> VmResult<(Vec<CfgNodeId>, bool)> {
        let Some(entry) = code.blocks.iter().find_map(|b| b.first()) else {
            return Ok((Vec::new(), false));
        };
        let start = self.frame()?.start_node;
        self.frame_mut()?
            .states
            .insert(entry.index, FrameState::new(start));

        let mut tracker = FinallyStateTracker::new();
        let mut return_nodes: Vec<CfgNodeId> = Vec::new();
        let mut can_return = false;

        for block in &code.blocks {
            let Some(first) = block.first() else {
                continue;
            };
            let Some(mut state) = self.frame()?.states.get(&first.index).cloned() else {
                debug!(frame = %code.name, block = block.id, "Skipping unreachable block");
                continue;
            };
            self.frame_mut()?.current_block = block.id;

            let mut last = first;
            for op in &block.instructions {
                last = op;
                self.frame_mut()?.current_line = op.line;
                let opcode = op.opcode()?;
                state = self.run_instruction(state, op, opcode)?;
                if let Some(why) = tracker.process(opcode, op.index, &state) {
                    state = state.set_why(why);
                }
                if state.why.is_some() {
                    break;
                }
            }

            match state.why {
                Some(why) => {
                    if FinallyStateTracker::check_early_exit(&state) {
                        self.drop_block_targets(block.id)?;
                    }
                    if why != Why::Never {
                        can_return |= why.can_return();
                        return_nodes.push(state.node);
                    }
                }
                None => {
                    if last.opcode()?.carries_on() {
                        let state =
                            state.forward_cfg_node(&mut self.ctx.program, "NewBlock", None);
                        self.merge_state(last.next(), state)?;
                    }
                }
            }
        }
        Ok((return_nodes, can_return))
    }

    /// Forget the states a block queued before leaving the frame abnormally
    fn drop_block_targets(&mut self, block: usize) -> VmResult<()> {
        let frame = self.frame_mut()?;
        if let Some(targets) = frame.targets.remove(&block) {
            for target in targets {
                frame.states.remove(&target);
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Jumps
    // ═══════════════════════════════════════════════════════════════════

    /// Queue `state` for the instruction at `target` and remember the jump
    pub(crate) fn store_jump(&mut self, target: usize, state: FrameState) -> VmResult<()> {
        self.store_conditional_jump(target, state, None)
    }

    /// [`store_jump`](Self::store_jump) through a node that only holds
    /// under `condition`
    pub(crate) fn store_conditional_jump(
        &mut self,
        target: usize,
        state: FrameState,
        condition: Option<BindingId>,
    ) -> VmResult<()> {
        let frame = self.frame_mut()?;
        let block = frame.current_block;
        frame.record_target(block, target);
        let state = state.forward_cfg_node(&mut self.ctx.program, "Jump", condition);
        self.merge_state(target, state)
    }

    /// Queue `state` for `target` through a fresh node without recording
    /// the jump (exception unwinding)
    pub(crate) fn merge_jump(&mut self, target: usize, state: FrameState) -> VmResult<()> {
        let state = state.forward_cfg_node(&mut self.ctx.program, "Jump", None);
        self.merge_state(target, state)
    }

    fn merge_state(&mut self, target: usize, state: FrameState) -> VmResult<()> {
        let existing = self.frame_mut()?.states.remove(&target);
        let merged = state.merge_into(existing, &mut self.ctx.program, target)?;
        self.frame_mut()?.states.insert(target, merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::features::imports::NullImporter;
    use crate::features::vm::infrastructure::context::AnalysisContext;
    use crate::shared::models::{Assembler, Constant, Director};

    fn module(asm: Assembler) -> Rc<CodeObject> {
        Rc::new(asm.finish().unwrap())
    }

    fn enter(vm: &mut VirtualMachine<'_>, code: Rc<CodeObject>) -> Frame {
        let globals = vm
            .ctx
            .values
            .add(AbstractValue::Module(Namespace::new("__main__")));
        let root = vm.ctx.root;
        match vm.make_frame(root, FrameSetup::new(code, globals).locals(globals)) {
            FrameOutcome::Ready(frame) => *frame,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_module_frame_returns_value() {
        let mut asm = Assembler::module();
        asm.load_const(Constant::Int(7)).op("RETURN_VALUE");
        let code = module(asm);

        let director = Director::new();
        let importer = NullImporter;
        let ctx = AnalysisContext::new(AnalysisConfig::default(), &director, &importer);
        let mut vm = VirtualMachine::new(ctx);
        let frame = enter(&mut vm, code);
        assert!(frame.is_module);

        let root = vm.ctx.root;
        let (node, ret) = vm.run_frame(frame, root).unwrap();
        assert_ne!(node, root);
        let data = vm.data(ret);
        assert_eq!(data.len(), 1);
        assert_eq!(vm.ctx.values.class_of(data[0]), Some(vm.ctx.converter.classes.int));
        assert!(vm.ctx.frames.is_empty());
    }

    #[test]
    fn test_recursion_and_depth_limits() {
        let mut asm = Assembler::module();
        asm.load_const(Constant::None).op("RETURN_VALUE");
        let code = module(asm);

        let director = Director::new();
        let importer = NullImporter;
        let config = AnalysisConfig::default().max_call_depth(1);
        let ctx = AnalysisContext::new(config, &director, &importer);
        let mut vm = VirtualMachine::new(ctx);
        let frame = enter(&mut vm, code.clone());
        vm.ctx.frames.push(frame);

        let globals = vm.frame().unwrap().f_globals;
        let root = vm.ctx.root;
        assert!(matches!(
            vm.make_frame(root, FrameSetup::new(code, globals)),
            FrameOutcome::Recursion
        ));
        let other = module(Assembler::new("other"));
        assert!(matches!(
            vm.make_frame(root, FrameSetup::new(other, globals)),
            FrameOutcome::MaxDepth
        ));
    }

    #[test]
    fn test_frame_without_exit_returns_unsolvable() {
        let mut asm = Assembler::module();
        let top = asm.label();
        asm.place(top).op("NOP").jump("JUMP_ABSOLUTE", top);
        let code = module(asm);

        let director = Director::new();
        let importer = NullImporter;
        let ctx = AnalysisContext::new(AnalysisConfig::default(), &director, &importer);
        let mut vm = VirtualMachine::new(ctx);
        let frame = enter(&mut vm, code);
        let root = vm.ctx.root;
        let (node, ret) = vm.run_frame(frame, root).unwrap();
        assert_eq!(node, root);
        assert_eq!(vm.data(ret), vec![vm.ctx.converter.well_known.unsolvable]);
    }
}
