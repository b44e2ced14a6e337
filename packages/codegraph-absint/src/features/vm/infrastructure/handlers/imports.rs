//! Import opcodes

use tracing::debug;

use crate::errors::VmResult;
use crate::features::abstract_values::{AbstractValue, Literal};
use crate::features::diagnostics::ErrorKind;
use crate::features::frame_state::FrameState;
use crate::features::typegraph::{ValueId, VariableId};
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::features::vm::infrastructure::names::NameTable;
use crate::shared::models::Instruction;

impl VirtualMachine<'_> {
    /// Module value for `name`: overlays first, then modules already
    /// loaded, then the importer
    fn import_module(&mut self, name: &str, level: u32) -> Option<ValueId> {
        if let Some(module) = self.ctx.converter.overlay(name) {
            return Some(module);
        }
        if let Some(module) = self.ctx.loader.get(name) {
            return Some(module);
        }
        let importer = self.ctx.importer;
        let spec = importer.import_module(name, level)?;
        Some(self.ctx.loader.load(
            &spec,
            importer,
            &mut self.ctx.values,
            &mut self.ctx.program,
            &mut self.ctx.converter,
        ))
    }

    /// Stack `[level, fromlist]`; `import a.b` binds the top package
    pub(crate) fn op_import_name(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Names)?;
        let (state, operands) = state.popn(2)?;
        let (level_var, fromlist) = (operands[0], operands[1]);
        let level = self
            .data(level_var)
            .into_iter()
            .find_map(|v| match self.ctx.values.literal(v) {
                Some(Literal::Int(i)) => u32::try_from(*i).ok(),
                _ => None,
            })
            .unwrap_or(0);
        let has_fromlist = self
            .data(fromlist)
            .into_iter()
            .any(|v| !self.ctx.values.is_none(v));

        let Some(module) = self.import_module(&name, level) else {
            debug!(module = %name, level, "Import failed");
            self.report(ErrorKind::ImportError, format!("Can't find module '{name}'."));
            let var = self.unsolvable(state.node);
            return Ok(state.push(var));
        };
        let bound = match name.split_once('.') {
            Some((top, _)) if !has_fromlist => self
                .import_module(top, level)
                .unwrap_or(self.ctx.converter.well_known.unsolvable),
            _ => module,
        };
        let var = self.new_var(&[bound], &[], state.node);
        self.trace(Some(name), &[var]);
        Ok(state.push(var))
    }

    /// Leaves the module on the stack and pushes the member
    pub(crate) fn op_import_from(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let name = self.name_arg(op, NameTable::Names)?;
        let module = state.top()?;
        let result = self.ctx.program.new_variable();
        for value in self.data(module) {
            match self.imported_member(value, &name) {
                Some(member) => {
                    self.ctx
                        .program
                        .paste_variable(result, member, Some(state.node), &[]);
                }
                None => {
                    if let AbstractValue::Module(ns) = self.value(value) {
                        let module_name = ns.name.clone();
                        self.report(
                            ErrorKind::ImportError,
                            format!("Cannot import name '{name}' from '{module_name}'"),
                        );
                    }
                    let unsolvable = self.ctx.converter.well_known.unsolvable;
                    self.ctx.program.add_binding(result, unsolvable, [], state.node);
                }
            }
        }
        if self.data(result).is_empty() {
            let unsolvable = self.ctx.converter.well_known.unsolvable;
            self.ctx.program.add_binding(result, unsolvable, [], state.node);
        }
        self.trace(Some(name), &[result]);
        Ok(state.push(result))
    }

    /// `name` from a module value, falling back to the submodule
    /// `module.name`
    fn imported_member(&mut self, module: ValueId, name: &str) -> Option<VariableId> {
        let AbstractValue::Module(ns) = self.value(module) else {
            return None;
        };
        if let Some(member) = ns.members.get(name) {
            return Some(*member);
        }
        let qualified = format!("{}.{name}", ns.name);
        let submodule = self.import_module(&qualified, 0)?;
        let root = self.ctx.converter.root();
        Some(self.new_var(&[submodule], &[], root))
    }

    /// Copies the public members into the current namespace
    pub(crate) fn op_import_star(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, module) = state.pop()?;
        let locals = self.frame()?.f_locals;
        for value in self.data(module) {
            let Some(members) = self.ctx.values.members(value) else {
                continue;
            };
            let public: Vec<(String, VariableId)> = members
                .iter()
                .filter(|(name, _)| !name.starts_with('_'))
                .map(|(name, var)| (name.clone(), *var))
                .collect();
            for (name, var) in public {
                self.assign_member(locals, &name, var, state.node);
            }
        }
        Ok(state)
    }
}
