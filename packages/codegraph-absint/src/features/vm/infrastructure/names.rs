//! Name resolution and storage
//!
//! Loads walk locals, globals and builtins in that order and copy the
//! bindings visible at the current node into a fresh variable. Stores
//! rebind the namespace variable at the current node, so older bindings
//! stay in the graph but become invisible past it.

use tracing::debug;

use crate::errors::{VirtualMachineError, VmResult};
use crate::features::abstract_values::{AbstractValue, Annotation, LateKind, TypeRenderer};
use crate::features::annotations::{parse_type_expr, LateAnnotation};
use crate::features::diagnostics::{Diagnostic, ErrorKind};
use crate::features::frame_state::LookupResult;
use crate::features::typegraph::{BindingId, CfgNodeId, ProvenanceWalker, ValueId, VariableId};
use crate::features::vm::infrastructure::context::{LateCell, VirtualMachine};
use crate::shared::models::Instruction;

/// Table an instruction's name argument indexes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NameTable {
    Names,
    Varnames,
    Cells,
}

/// `_private` names are never looked up in builtins
fn is_private(name: &str) -> bool {
    name.starts_with('_') && !name.starts_with("__")
}

impl VirtualMachine<'_> {
    // ═══════════════════════════════════════════════════════════════════
    // Arguments
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn name_arg(&self, op: &Instruction, table: NameTable) -> VmResult<String> {
        if let Some(name) = &op.argval {
            return Ok(name.clone());
        }
        let index = op.require_arg()? as usize;
        let code = &self.frame()?.code;
        let name = match table {
            NameTable::Names => code.names.get(index).cloned(),
            NameTable::Varnames => code.varnames.get(index).cloned(),
            NameTable::Cells => code.cell_names().nth(index).cloned(),
        };
        name.ok_or_else(|| VirtualMachineError::MissingArgument {
            opcode: op.mnemonic.clone(),
            index: op.index,
        })
    }

    /// Cell slot an instruction addresses
    pub(crate) fn cell_slot(&self, op: &Instruction) -> VmResult<usize> {
        let frame = self.frame()?;
        let slot = match (op.arg, &op.argval) {
            (Some(arg), _) => Some(arg as usize),
            (None, Some(name)) => frame.cell_index(name),
            (None, None) => None,
        };
        slot.filter(|s| *s < frame.cells.len())
            .ok_or_else(|| VirtualMachineError::MissingArgument {
                opcode: op.mnemonic.clone(),
                index: op.index,
            })
    }

    // ═══════════════════════════════════════════════════════════════════
    // Loads
    // ═══════════════════════════════════════════════════════════════════

    /// Tiered lookup. `with_locals == false` starts at globals (LOAD_GLOBAL).
    pub(crate) fn lookup_name(
        &mut self,
        name: &str,
        node: CfgNodeId,
        with_locals: bool,
    ) -> VmResult<LookupResult> {
        let frame = self.frame()?;
        let (locals, globals, builtins) = (frame.f_locals, frame.f_globals, frame.f_builtins);

        let mut result = LookupResult::NotFound;
        if with_locals {
            result = self.load_from(locals, name, node)?;
        }
        if !with_locals || locals != globals {
            result = result.or_else(|| self.load_from_or_miss(globals, name, node));
        }
        if !is_private(name) {
            result = result.or_else(|| self.load_from_or_miss(builtins, name, node));
        }
        if result == LookupResult::NotFound && self.ctx.late_expr.is_some() {
            let placeholder = self.late_placeholder(name, node);
            return Ok(LookupResult::Deferred(placeholder));
        }
        Ok(result)
    }

    fn load_from_or_miss(&mut self, ns: ValueId, name: &str, node: CfgNodeId) -> LookupResult {
        self.load_from(ns, name, node)
            .unwrap_or(LookupResult::NotFound)
    }

    /// Copy the visible, non-deleted bindings of `ns.name`
    pub(crate) fn load_from(
        &mut self,
        ns: ValueId,
        name: &str,
        node: CfgNodeId,
    ) -> VmResult<LookupResult> {
        let Some(member) = self.ctx.values.member(ns, name) else {
            return Ok(LookupResult::NotFound);
        };
        let deleted = self.ctx.converter.well_known.deleted;
        let mut visible = self.ctx.program.filter(member, node);
        visible.retain(|b| self.ctx.program.binding_data(*b) != deleted);
        if visible.is_empty() {
            return Ok(LookupResult::NotFound);
        }

        let kept = self.filter_none_bindings(visible, node)?;
        let var = self.ctx.program.new_variable();
        for b in &kept {
            self.ctx.program.paste_binding(var, *b, Some(node), &[]);
        }
        if kept.is_empty() {
            let unsolvable = self.ctx.converter.well_known.unsolvable;
            self.ctx.program.add_binding(var, unsolvable, [], node);
        }
        self.ctx.var_names.insert(var, name.to_string());
        Ok(LookupResult::Found(var))
    }

    /// Drop `None` bindings that only exist because of a path the current
    /// frame cannot have taken.
    ///
    /// Applies while uncalled functions are analyzed: a global initialised
    /// to `None` at module level and rebound later would otherwise make
    /// every use inside such a function look optional.
    fn filter_none_bindings(
        &self,
        bindings: Vec<BindingId>,
        node: CfgNodeId,
    ) -> VmResult<Vec<BindingId>> {
        let frame = self.frame()?;
        if !self.ctx.config.strict_none_filtering || !self.ctx.analyzing || frame.is_module {
            return Ok(bindings);
        }
        let start = frame.start_node;
        let program = &self.ctx.program;
        let values = &self.ctx.values;
        let walker = ProvenanceWalker::new(program);
        let kept = bindings
            .into_iter()
            .filter(|b| {
                if !values.is_none(program.binding_data(*b)) {
                    return true;
                }
                let origins =
                    walker.creation_nodes(*b, |x| values.is_none(program.binding_data(x)));
                let strict = origins.is_empty()
                    || origins.iter().any(|n| program.is_reachable(start, *n));
                if !strict {
                    debug!(node = %node, binding = %b, "Dropping non-strict None binding");
                }
                strict
            })
            .collect();
        Ok(kept)
    }

    /// Read a closure cell
    pub(crate) fn load_cell(&mut self, cell: VariableId, node: CfgNodeId) -> VariableId {
        let mut bindings = self.ctx.program.filter(cell, node);
        if bindings.is_empty() {
            bindings = self.bindings(cell);
        }
        if bindings.is_empty() {
            if let Some(late) = self.ctx.late_cells.iter().find(|l| l.cell == cell) {
                return late.placeholder;
            }
            let id = self.ctx.late_cells.len();
            let value = self.ctx.values.add(AbstractValue::Late {
                id,
                kind: LateKind::CellRead,
            });
            let placeholder = self.new_var(&[value], &[], node);
            self.ctx.late_cells.push(LateCell { cell, placeholder });
            return placeholder;
        }
        let var = self.ctx.program.new_variable();
        for b in bindings {
            self.ctx.program.paste_binding(var, b, Some(node), &[]);
        }
        var
    }

    // ═══════════════════════════════════════════════════════════════════
    // Stores
    // ═══════════════════════════════════════════════════════════════════

    /// Bind `name` in namespace `ns`, applying any annotation the director
    /// knows for this line
    pub(crate) fn store_name(
        &mut self,
        ns: ValueId,
        name: &str,
        value: VariableId,
        op: &Instruction,
        node: CfgNodeId,
    ) -> VmResult<VariableId> {
        let scope = self.frame()?.code.name.clone();
        let annotation = self.annotation_for_store(op.line, name, node);

        self.check_final_reassignment(&scope, name, op.index);
        if let Some(annotation) = &annotation {
            self.ctx
                .tracker
                .record_annotate(&scope, name, annotation.clone());
        }
        let declared = self
            .ctx
            .tracker
            .local(&scope, name)
            .and_then(|l| l.typ.clone());
        if let Some(declared) = declared {
            self.check_annotation_mismatch(name, &declared, value, node);
        }

        let stored = match &annotation {
            Some(annotation) => self.annotated_value(annotation, value, node),
            None => value,
        };
        let var = self.assign_member(ns, name, stored, node);
        self.ctx.tracker.record_assign(&scope, name, var, op.index);
        if self.frame()?.is_module {
            self.resolve_late_annotations(name, node);
        }
        Ok(var)
    }

    /// Rebind `ns.name` to `value` at `node`; returns the member variable
    pub(crate) fn assign_member(
        &mut self,
        ns: ValueId,
        name: &str,
        value: VariableId,
        node: CfgNodeId,
    ) -> VariableId {
        let var = match self.ctx.values.member(ns, name) {
            Some(existing) => {
                self.ctx
                    .program
                    .paste_variable(existing, value, Some(node), &[]);
                existing
            }
            None => {
                let fresh = self.ctx.program.assign_to_new_variable(value, node);
                self.ctx.values.set_member(ns, name, fresh);
                fresh
            }
        };
        let widened = self.widen(var, node);
        if widened != var {
            self.ctx.values.set_member(ns, name, widened);
        }
        widened
    }

    /// Mark `ns.name` deleted; false if it was never bound
    pub(crate) fn delete_member(&mut self, ns: ValueId, name: &str, node: CfgNodeId) -> bool {
        let Some(member) = self.ctx.values.member(ns, name) else {
            return false;
        };
        let deleted = self.ctx.converter.well_known.deleted;
        self.ctx.program.add_binding(member, deleted, [], node);
        true
    }

    fn annotation_for_store(
        &mut self,
        line: u32,
        name: &str,
        node: CfgNodeId,
    ) -> Option<Annotation> {
        let director = self.ctx.director;
        let text = director
            .annotation_at(line, name)
            .or_else(|| director.type_comment_at(line))?;
        Some(self.annotation_from_text(text, node))
    }

    fn annotated_value(
        &mut self,
        annotation: &Annotation,
        value: VariableId,
        node: CfgNodeId,
    ) -> VariableId {
        let inner = match annotation {
            Annotation::Final(None) => return value,
            other => other.inner().cloned().unwrap_or(Annotation::Any),
        };
        let inner = self.resolve_late(inner);
        let data = self
            .ctx
            .converter
            .instantiate(&mut self.ctx.values, &inner);
        self.new_var(&data, &[], node)
    }

    fn check_final_reassignment(&mut self, scope: &str, name: &str, op_index: usize) {
        let reassigned = self.ctx.tracker.local(scope, name).map_or(false, |l| {
            l.is_final && l.last_update_op.map_or(false, |last| last != op_index)
        });
        if reassigned {
            self.report(
                ErrorKind::AssigningToFinal,
                format!("Assigning to '{name}', which was annotated as Final"),
            );
        }
    }

    fn check_annotation_mismatch(
        &mut self,
        name: &str,
        declared: &Annotation,
        value: VariableId,
        node: CfgNodeId,
    ) {
        let Some(inner) = declared.inner() else {
            return;
        };
        let inner = self.resolve_late(inner.clone());
        if matches!(inner, Annotation::Any | Annotation::Late(_)) {
            return;
        }
        let mut data = self.ctx.program.filtered_data(value, node);
        if data.is_empty() {
            data = self.data(value);
        }
        if data.iter().all(|v| self.value_matches(*v, &inner)) {
            return;
        }
        let renderer = TypeRenderer::new(&self.ctx.values, &self.ctx.program);
        let details = format!(
            "Annotation: {}\nAssignment: {}",
            renderer.annotation(&inner),
            renderer.union_of(&data)
        );
        self.ctx.report_with_details(
            ErrorKind::AnnotationTypeMismatch,
            format!("Type annotation for {name} does not match type of assignment"),
            details,
        );
    }

    // ═══════════════════════════════════════════════════════════════════
    // Forward references
    // ═══════════════════════════════════════════════════════════════════

    fn late_placeholder(&mut self, name: &str, node: CfgNodeId) -> VariableId {
        let id = self.ctx.late_annotations.len();
        let value = self.ctx.values.add(AbstractValue::Late {
            id,
            kind: LateKind::Annotation,
        });
        let var = self.new_var(&[value], &[], node);
        let expr = self
            .ctx
            .late_expr
            .clone()
            .unwrap_or_else(|| name.to_string());
        debug!(name, expr = %expr, "Deferring forward reference");
        let stack = self.ctx.stack_frames();
        self.ctx.late_annotations.push(LateAnnotation {
            id,
            expr,
            missing: name.to_string(),
            stack,
            resolved: None,
            var,
        });
        var
    }

    /// Retry the forward references waiting for `name`
    fn resolve_late_annotations(&mut self, name: &str, node: CfgNodeId) {
        let waiting: Vec<usize> = self
            .ctx
            .late_annotations
            .iter()
            .filter(|l| !l.is_resolved() && l.missing == name)
            .map(|l| l.id)
            .collect();
        for id in waiting {
            let expr = self.ctx.late_annotations[id].expr.clone();
            let Ok(parsed) = parse_type_expr(&expr) else {
                continue;
            };
            let still_missing = parsed
                .names()
                .into_iter()
                .filter_map(|n| n.split('.').next())
                .find(|head| !self.is_defined_globally(head))
                .map(str::to_string);
            if let Some(missing) = still_missing {
                self.ctx.late_annotations[id].missing = missing;
                continue;
            }
            let previous = self.ctx.late_expr.replace(expr.clone());
            let annotation = self.annotation_from_expr(&parsed, node);
            self.ctx.late_expr = previous;

            let value = self
                .ctx
                .values
                .add(AbstractValue::Annotation(annotation.clone()));
            let late = &mut self.ctx.late_annotations[id];
            late.resolved = Some(annotation);
            let var = late.var;
            self.ctx.program.add_binding(var, value, [], node);
            debug!(expr = %expr, "Resolved forward reference");
        }
    }

    fn is_defined_globally(&self, name: &str) -> bool {
        let Ok(frame) = self.frame() else {
            return false;
        };
        self.ctx.values.member(frame.f_globals, name).is_some()
            || self.ctx.values.member(frame.f_builtins, name).is_some()
    }

    /// Report every forward reference that never resolved
    pub(crate) fn flush_late_annotations(&mut self) {
        let unresolved: Vec<(String, Vec<_>)> = self
            .ctx
            .late_annotations
            .iter()
            .filter(|l| !l.is_resolved())
            .map(|l| (l.missing.clone(), l.stack.clone()))
            .collect();
        for (missing, stack) in unresolved {
            let diagnostic = Diagnostic::new(
                stack,
                ErrorKind::NameError,
                format!("Name '{missing}' is not defined"),
            );
            self.ctx.errorlog.add(diagnostic, self.ctx.director);
        }
    }
}
