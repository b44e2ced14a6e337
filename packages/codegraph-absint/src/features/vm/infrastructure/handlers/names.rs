//! Constants, names and closure cells

use crate::errors::{VirtualMachineError, VmResult};
use crate::features::abstract_values::{AbstractValue, Instance};
use crate::features::diagnostics::ErrorKind;
use crate::features::frame_state::{FrameState, LookupResult};
use crate::features::typegraph::ValueId;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::features::vm::infrastructure::names::NameTable;
use crate::shared::models::{Constant, Instruction};

/// Which namespace a store or delete addresses
#[derive(Debug, Clone, Copy)]
enum Scope {
    Locals,
    Globals,
}

impl VirtualMachine<'_> {
    pub(crate) fn op_load_const(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let index = op.require_arg()? as usize;
        let constant: Constant = self
            .frame()?
            .code
            .consts
            .get(index)
            .cloned()
            .ok_or_else(|| VirtualMachineError::invalid_bytecode(format!("no constant {index}")))?;
        let value = self
            .ctx
            .converter
            .constant(&mut self.ctx.values, &mut self.ctx.program, &constant);
        let var = self.new_var(&[value], &[], state.node);
        self.trace(Some(constant.repr()), &[var]);
        Ok(state.push(var))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Names
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_load_name(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Names)?;
        self.load_named(state, &name, true)
    }

    pub(crate) fn op_load_global(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Names)?;
        self.load_named(state, &name, false)
    }

    fn load_named(&mut self, state: FrameState, name: &str, with_locals: bool) -> VmResult<FrameState> {
        let var = match self.lookup_name(name, state.node, with_locals)? {
            LookupResult::Found(var) | LookupResult::Deferred(var) => var,
            LookupResult::NotFound => {
                self.report(ErrorKind::NameError, format!("Name '{name}' is not defined"));
                self.unsolvable(state.node)
            }
        };
        self.trace(Some(name.to_string()), &[var]);
        Ok(state.push(var))
    }

    pub(crate) fn op_load_fast(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Varnames)?;
        let locals = self.frame()?.f_locals;
        let var = match self.load_from(locals, &name, state.node)? {
            LookupResult::Found(var) | LookupResult::Deferred(var) => var,
            LookupResult::NotFound => {
                self.report(
                    ErrorKind::NameError,
                    format!("Local variable '{name}' is referenced before assignment"),
                );
                self.unsolvable(state.node)
            }
        };
        self.trace(Some(name), &[var]);
        Ok(state.push(var))
    }

    pub(crate) fn op_store_name(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Names)?;
        self.store_named(state, op, &name, Scope::Locals)
    }

    pub(crate) fn op_store_fast(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Varnames)?;
        self.store_named(state, op, &name, Scope::Locals)
    }

    pub(crate) fn op_store_global(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Names)?;
        self.store_named(state, op, &name, Scope::Globals)
    }

    fn store_named(
        &mut self,
        state: FrameState,
        op: &Instruction,
        name: &str,
        scope: Scope,
    ) -> VmResult<FrameState> {
        let (state, value) = state.pop()?;
        let ns = self.scope_namespace(scope)?;
        let stored = self.store_name(ns, name, value, op, state.node)?;
        self.trace(Some(name.to_string()), &[stored]);
        Ok(state)
    }

    pub(crate) fn op_delete_name(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Names)?;
        self.delete_named(state, &name, Scope::Locals)
    }

    pub(crate) fn op_delete_fast(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Varnames)?;
        self.delete_named(state, &name, Scope::Locals)
    }

    pub(crate) fn op_delete_global(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Names)?;
        self.delete_named(state, &name, Scope::Globals)
    }

    fn delete_named(&mut self, state: FrameState, name: &str, scope: Scope) -> VmResult<FrameState> {
        let ns = self.scope_namespace(scope)?;
        if !self.delete_member(ns, name, state.node) {
            self.report(ErrorKind::NameError, format!("Name '{name}' is not defined"));
        }
        Ok(state)
    }

    fn scope_namespace(&self, scope: Scope) -> VmResult<ValueId> {
        let frame = self.frame()?;
        Ok(match scope {
            Scope::Locals => frame.f_locals,
            Scope::Globals => frame.f_globals,
        })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Cells
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_load_deref(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let slot = self.cell_slot(op)?;
        let cell = self.frame()?.cells[slot];
        let var = self.load_cell(cell, state.node);
        if let Ok(name) = self.name_arg(op, NameTable::Cells) {
            self.ctx.var_names.insert(var, name.clone());
            self.trace(Some(name), &[var]);
        }
        Ok(state.push(var))
    }

    pub(crate) fn op_store_deref(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let (state, value) = state.pop()?;
        let slot = self.cell_slot(op)?;
        let cell = self.frame()?.cells[slot];
        self.ctx
            .program
            .paste_variable(cell, value, Some(state.node), &[]);
        // Reads that happened before the first store see the value too.
        let waiting: Vec<_> = self
            .ctx
            .late_cells
            .iter()
            .filter(|l| l.cell == cell)
            .map(|l| l.placeholder)
            .collect();
        for placeholder in waiting {
            self.ctx.program.paste_variable(placeholder, value, None, &[]);
        }
        Ok(state)
    }

    pub(crate) fn op_delete_deref(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let slot = self.cell_slot(op)?;
        let cell = self.frame()?.cells[slot];
        let deleted = self.ctx.converter.well_known.deleted;
        self.ctx.program.add_binding(cell, deleted, [], state.node);
        Ok(state)
    }

    /// Push the cell itself (building a closure tuple)
    pub(crate) fn op_load_closure(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let slot = self.cell_slot(op)?;
        let cell = self.frame()?.cells[slot];
        Ok(state.push(cell))
    }

    /// Class bodies check their own namespace before the enclosing cell
    pub(crate) fn op_load_classderef(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Cells)?;
        let locals = self.frame()?.f_locals;
        if let LookupResult::Found(var) = self.load_from(locals, &name, state.node)? {
            return Ok(state.push(var));
        }
        self.op_load_deref(state, op)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Special loads
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_load_assertion_error(
        &mut self,
        state: FrameState,
        _op: &Instruction,
    ) -> VmResult<FrameState> {
        let class = self.ctx.converter.classes.assertion_error;
        let var = self.new_var(&[class], &[], state.node);
        Ok(state.push(var))
    }

    pub(crate) fn op_load_build_class(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let build_class = self.ctx.converter.well_known.build_class;
        let var = self.new_var(&[build_class], &[], state.node);
        Ok(state.push(var))
    }

    /// Give the namespace an `__annotations__` dict whose string-keyed
    /// stores record variable annotations
    pub(crate) fn op_setup_annotations(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let locals = self.frame()?.f_locals;
        if self.ctx.values.member(locals, "__annotations__").is_some() {
            return Ok(state);
        }
        let dict = self.ctx.values.add(AbstractValue::Instance(Instance {
            annotations_dict: true,
            ..Instance::of(self.ctx.converter.classes.dict)
        }));
        let var = self.new_var(&[dict], &[], state.node);
        self.assign_member(locals, "__annotations__", var, state.node);
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{run_straight, with_frame};
    use crate::features::diagnostics::ErrorKind;
    use crate::shared::models::{Assembler, Constant, Director};

    #[test]
    fn test_store_then_load_name() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.load_const(Constant::Int(3))
            .op_name("STORE_NAME", "x")
            .op_name("LOAD_NAME", "x");
        with_frame(&director, asm, |vm, state| {
            let state = run_straight(vm, state);
            let top = state.top().unwrap();
            let data = vm.data(top);
            assert_eq!(data.len(), 1);
            assert_eq!(vm.ctx.values.class_of(data[0]), Some(vm.ctx.converter.classes.int));
            assert!(vm.ctx.errorlog.is_empty());
        });
    }

    #[test]
    fn test_undefined_name_reports_and_pushes_unsolvable() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.op_name("LOAD_NAME", "undefined_thing");
        with_frame(&director, asm, |vm, state| {
            let state = run_straight(vm, state);
            let top = state.top().unwrap();
            assert_eq!(vm.data(top), vec![vm.ctx.converter.well_known.unsolvable]);
            let diag = &vm.ctx.errorlog.diagnostics()[0];
            assert_eq!(diag.kind, ErrorKind::NameError);
            assert_eq!(diag.message, "Name 'undefined_thing' is not defined");
        });
    }

    #[test]
    fn test_delete_then_load_is_a_name_error() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.load_const(Constant::Int(1))
            .op_name("STORE_NAME", "x")
            .op_name("DELETE_NAME", "x")
            .op_name("LOAD_NAME", "x");
        with_frame(&director, asm, |vm, state| {
            run_straight(vm, state);
            assert_eq!(vm.ctx.errorlog.of_kind(ErrorKind::NameError).count(), 1);
        });
    }

    #[test]
    fn test_builtins_are_visible() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.op_name("LOAD_GLOBAL", "len");
        with_frame(&director, asm, |vm, state| {
            run_straight(vm, state);
            assert!(vm.ctx.errorlog.is_empty());
        });
    }

    #[test]
    fn test_setup_annotations_creates_dict() {
        let director = Director::new();
        let mut asm = Assembler::module();
        asm.op("SETUP_ANNOTATIONS");
        with_frame(&director, asm, |vm, state| {
            run_straight(vm, state);
            let locals = vm.frame().unwrap().f_locals;
            assert!(vm.ctx.values.member(locals, "__annotations__").is_some());
        });
    }
}
