//! Container displays, unpacking and subscripts
//!
//! Tuple and list displays keep one variable per position, so unpacking
//! and constant indexing stay precise. Anything that changes a list's size
//! drops the per-position view.

use crate::errors::VmResult;
use crate::features::abstract_values::{AbstractValue, Annotation, Literal};
use crate::features::diagnostics::ErrorKind;
use crate::features::frame_state::FrameState;
use crate::features::typegraph::{BindingId, CfgNodeId, ValueId, VariableId};
use crate::features::vm::domain::CallArgs;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::shared::models::Instruction;

impl VirtualMachine<'_> {
    // ═══════════════════════════════════════════════════════════════════
    // Displays
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_build_tuple(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        let (state, elements) = state.popn(n)?;
        let tuple = self.ctx.converter.new_tuple(&mut self.ctx.values, elements);
        let var = self.new_var(&[tuple], &[], state.node);
        Ok(state.push(var))
    }

    pub(crate) fn op_build_list(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        let (state, elements) = state.popn(n)?;
        let list = self.ctx.converter.new_list(&mut self.ctx.values, elements);
        let var = self.new_var(&[list], &[], state.node);
        Ok(state.push(var))
    }

    pub(crate) fn op_build_set(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        let (state, _) = state.popn(n)?;
        let var = self.instance_var(self.ctx.converter.classes.set, state.node);
        Ok(state.push(var))
    }

    pub(crate) fn op_build_map(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        let (state, items) = state.popn(2 * n)?;
        let dict = self.ctx.converter.new_dict(&mut self.ctx.values);
        for pair in items.chunks(2) {
            self.record_dict_key(dict, pair[0], pair[1]);
        }
        let var = self.new_var(&[dict], &[], state.node);
        Ok(state.push(var))
    }

    pub(crate) fn op_build_const_key_map(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        let (state, keys) = state.pop()?;
        let (state, values) = state.popn(n)?;
        let dict = self.ctx.converter.new_dict(&mut self.ctx.values);
        if let Some(keys) = self.sequence_elements(keys) {
            for (key, value) in keys.into_iter().zip(values) {
                self.record_dict_key(dict, key, value);
            }
        }
        let var = self.new_var(&[dict], &[], state.node);
        Ok(state.push(var))
    }

    /// String keys known at this point become dict members
    fn record_dict_key(&mut self, dict: ValueId, key: VariableId, value: VariableId) {
        if let [single] = self.data(key).as_slice() {
            if let Some(name) = self.ctx.values.str_literal(*single).map(str::to_string) {
                self.ctx.values.set_member(dict, &name, value);
            }
        }
    }

    /// f-string pieces; folded when every piece is a known string
    pub(crate) fn op_build_string(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        let (state, pieces) = state.popn(n)?;
        let mut folded = String::new();
        let mut known = true;
        for piece in &pieces {
            match self.data(*piece).as_slice() {
                [single] => match self.ctx.values.str_literal(*single) {
                    Some(s) => folded.push_str(s),
                    None => known = false,
                },
                _ => known = false,
            }
        }
        let var = if known {
            let value = self.ctx.converter.str_constant(&mut self.ctx.values, &folded);
            self.new_var(&[value], &[], state.node)
        } else {
            self.instance_var(self.ctx.converter.classes.str, state.node)
        };
        Ok(state.push(var))
    }

    pub(crate) fn op_build_slice(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        let (state, _) = state.popn(n)?;
        let var = self.instance_var(self.ctx.converter.classes.slice, state.node);
        Ok(state.push(var))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Comprehension and display updates
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_list_append(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let (state, _) = state.pop()?;
        self.forget_elements(state, op.require_arg()? as usize)
    }

    pub(crate) fn op_set_add(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        state.pop_and_discard()
    }

    pub(crate) fn op_map_add(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, _) = state.popn(2)?;
        Ok(state)
    }

    /// `[*a, *b]` and list displays of constants: concatenate what is known
    pub(crate) fn op_list_extend(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let (state, iterable) = state.pop()?;
        let slot = op.require_arg()? as usize;
        let list = state.peek(slot)?;
        match (self.sequence_elements(list), self.sequence_elements(iterable)) {
            (Some(mut elements), Some(extra)) => {
                elements.extend(extra);
                let value = self.ctx.converter.new_list(&mut self.ctx.values, elements);
                let var = self.new_var(&[value], &[], state.node);
                state.set(slot, var)
            }
            _ => {
                let var = self.instance_var(self.ctx.converter.classes.list, state.node);
                state.set(slot, var)
            }
        }
    }

    pub(crate) fn op_set_update(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        state.pop_and_discard()
    }

    pub(crate) fn op_dict_update(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        state.pop_and_discard()
    }

    pub(crate) fn op_list_to_tuple(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, list) = state.pop()?;
        let var = match self.sequence_elements(list) {
            Some(elements) => {
                let tuple = self.ctx.converter.new_tuple(&mut self.ctx.values, elements);
                self.new_var(&[tuple], &[], state.node)
            }
            None => self.instance_var(self.ctx.converter.classes.tuple, state.node),
        };
        Ok(state.push(var))
    }

    /// Replace the container at `slot` by one of unknown length
    fn forget_elements(&mut self, state: FrameState, slot: usize) -> VmResult<FrameState> {
        let container = state.peek(slot)?;
        let Some(class) = self
            .data(container)
            .first()
            .and_then(|v| self.ctx.values.instance(*v))
            .filter(|i| i.elements.is_some())
            .map(|i| i.class)
        else {
            return Ok(state);
        };
        let var = self.instance_var(class, state.node);
        state.set(slot, var)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Unpacking
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_unpack_sequence(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let n = op.require_arg()? as usize;
        let (state, seq) = state.pop()?;
        if let Some(elements) = self.sequence_elements(seq) {
            if elements.len() == n {
                return Ok(state.push_all(elements.into_iter().rev()));
            }
            self.report(
                ErrorKind::BadUnpacking,
                format!("Cannot unpack {} values into {n} variables", elements.len()),
            );
            let node = state.node;
            let filler: Vec<VariableId> = (0..n).map(|_| self.unsolvable(node)).collect();
            return Ok(state.push_all(filler));
        }
        let (node, element) = self.iteration_element(state.node, seq)?;
        Ok(state
            .change_cfg_node(node)
            .push_all(std::iter::repeat(element).take(n)))
    }

    /// `a, *rest, b = seq`: low byte counts the targets before the star,
    /// the high byte those after it
    pub(crate) fn op_unpack_ex(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let arg = op.require_arg()? as usize;
        let (before, after) = (arg & 0xFF, arg >> 8);
        let (state, seq) = state.pop()?;
        let node = state.node;

        if let Some(elements) = self.sequence_elements(seq) {
            if elements.len() >= before + after {
                let middle = elements[before..elements.len() - after].to_vec();
                let rest = self.ctx.converter.new_list(&mut self.ctx.values, middle);
                let rest = self.new_var(&[rest], &[], node);
                let tail = elements[elements.len() - after..].iter().rev().copied();
                let head = elements[..before].iter().rev().copied();
                return Ok(state.push_all(tail).push(rest).push_all(head));
            }
            self.report(
                ErrorKind::BadUnpacking,
                format!(
                    "Cannot unpack {} values into {} variables",
                    elements.len(),
                    before + after + 1
                ),
            );
        }
        let (node, element) = self.iteration_element(node, seq)?;
        let rest = self.instance_var(self.ctx.converter.classes.list, node);
        Ok(state
            .change_cfg_node(node)
            .push_all(std::iter::repeat(element).take(after))
            .push(rest)
            .push_all(std::iter::repeat(element).take(before)))
    }

    /// What iterating over `var` produces; reports values that cannot be
    /// iterated at all
    pub(crate) fn iteration_element(
        &mut self,
        node: CfgNodeId,
        var: VariableId,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let result = self.ctx.program.new_variable();
        let mut exits = vec![node];
        let mut reported = false;
        for b in self.visible_bindings(var, node) {
            let value = self.ctx.program.binding_data(b);
            let (exit, element) = self.element_of(node, value, b, &mut reported)?;
            self.ctx
                .program
                .paste_variable(result, element, Some(exit), &[b]);
            exits.push(exit);
        }
        let exit = self.join_nodes(&exits);
        if self.ctx.program.variable(result).is_empty() {
            return Ok((exit, self.unsolvable(exit)));
        }
        Ok((exit, self.widen(result, exit)))
    }

    fn element_of(
        &mut self,
        node: CfgNodeId,
        value: ValueId,
        binding: BindingId,
        reported: &mut bool,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let classes = self.ctx.converter.classes;
        let instance = match self.value(value) {
            AbstractValue::Generator(g) => return Ok((node, g.yielded)),
            AbstractValue::Instance(i) => i.clone(),
            AbstractValue::Class(_) | AbstractValue::Function(_) | AbstractValue::Module(_) => {
                self.report_not_iterable(value, reported);
                return Ok((node, self.unsolvable(node)));
            }
            _ => return Ok((node, self.unsolvable(node))),
        };
        if let Some(elements) = instance.elements {
            let merged = self.ctx.program.new_variable();
            for element in elements {
                self.ctx
                    .program
                    .paste_variable(merged, element, Some(node), &[binding]);
            }
            if self.ctx.program.variable(merged).is_empty() {
                // Empty display: the loop body never runs
                let empty = self.ctx.converter.well_known.empty;
                self.ctx.program.add_binding(merged, empty, [binding], node);
            }
            return Ok((node, merged));
        }
        let class = instance.class;
        if class == classes.str {
            return Ok((node, self.instance_var(classes.str, node)));
        }
        if class == classes.bytes || class == classes.range {
            return Ok((node, self.instance_var(classes.int, node)));
        }
        if matches!(instance.literal, Some(Literal::None))
            || class == classes.int
            || class == classes.float
            || class == classes.bool
        {
            self.report_not_iterable(value, reported);
            return Ok((node, self.unsolvable(node)));
        }
        if !self.is_builtin_class(class) {
            if let Some((_, method)) = self.ctx.values.lookup_in_mro(class, "__iter__") {
                let receiver = self.new_var(&[value], &[binding], node);
                let (exit, iterator) = self.untraced(|vm| {
                    vm.call_function(node, method, &CallArgs::new(vec![receiver]))
                })?;
                return self.iterator_next(exit, iterator);
            }
        }
        Ok((node, self.unsolvable(node)))
    }

    /// Values an iterator returned by `__iter__` produces
    fn iterator_next(&mut self, node: CfgNodeId, iterator: VariableId) -> VmResult<(CfgNodeId, VariableId)> {
        let result = self.ctx.program.new_variable();
        let mut exits = vec![node];
        for b in self.visible_bindings(iterator, node) {
            let value = self.ctx.program.binding_data(b);
            match self.value(value).clone() {
                AbstractValue::Generator(g) => {
                    self.ctx
                        .program
                        .paste_variable(result, g.yielded, Some(node), &[b]);
                }
                AbstractValue::Instance(i) if !self.is_builtin_class(i.class) => {
                    let Some((_, next)) = self.ctx.values.lookup_in_mro(i.class, "__next__") else {
                        continue;
                    };
                    let receiver = self.new_var(&[value], &[b], node);
                    let (exit, item) = self.untraced(|vm| {
                        vm.call_function(node, next, &CallArgs::new(vec![receiver]))
                    })?;
                    self.ctx.program.paste_variable(result, item, Some(exit), &[b]);
                    exits.push(exit);
                }
                _ => {}
            }
        }
        let exit = self.join_nodes(&exits);
        if self.ctx.program.variable(result).is_empty() {
            return Ok((exit, self.unsolvable(exit)));
        }
        Ok((exit, result))
    }

    fn report_not_iterable(&mut self, value: ValueId, reported: &mut bool) {
        if *reported {
            return;
        }
        *reported = true;
        let described = self.ctx.values.describe(value);
        self.report(
            ErrorKind::NotIterable,
            format!("'{described}' object is not iterable"),
        );
    }

    // ═══════════════════════════════════════════════════════════════════
    // Subscripts
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn op_binary_subscr(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, operands) = state.popn(2)?;
        let (obj, index) = (operands[0], operands[1]);
        let node = state.node;
        let result = self.ctx.program.new_variable();
        let mut exits = vec![node];
        for b in self.visible_bindings(obj, node) {
            let value = self.ctx.program.binding_data(b);
            let (exit, item) = self.subscript_one(node, value, b, index)?;
            self.ctx.program.paste_variable(result, item, Some(exit), &[b]);
            exits.push(exit);
        }
        let exit = self.join_nodes(&exits);
        let result = if self.ctx.program.variable(result).is_empty() {
            self.unsolvable(exit)
        } else {
            self.widen(result, exit)
        };
        self.trace(Some("[]".to_string()), &[obj, index, result]);
        Ok(state.change_cfg_node(exit).push(result))
    }

    fn subscript_one(
        &mut self,
        node: CfgNodeId,
        value: ValueId,
        binding: BindingId,
        index: VariableId,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        match self.value(value).clone() {
            AbstractValue::TypingForm(_) | AbstractValue::Class(_) => {
                let params = self.annotation_params(index, node);
                let annotation = self.subscript_annotation(value, params);
                let id = self.ctx.values.add(AbstractValue::Annotation(annotation));
                Ok((node, self.new_var(&[id], &[binding], node)))
            }
            AbstractValue::Instance(instance) => {
                if let Some(elements) = &instance.elements {
                    if let Some(Literal::Int(i)) = self.single_literal(index) {
                        let len = elements.len() as i64;
                        let at = if i < 0 { len + i } else { i };
                        if (0..len).contains(&at) {
                            return Ok((node, elements[at as usize]));
                        }
                        return Ok((node, self.unsolvable(node)));
                    }
                }
                if instance.class == self.ctx.converter.classes.dict {
                    if let Some(Literal::Str(key)) = self.single_literal(index) {
                        if let Some(member) = instance.members.get(&key) {
                            return Ok((node, *member));
                        }
                    }
                    return Ok((node, self.unsolvable(node)));
                }
                if instance.class == self.ctx.converter.classes.str {
                    return Ok((node, self.instance_var(instance.class, node)));
                }
                if !self.is_builtin_class(instance.class) {
                    if let Some((_, method)) =
                        self.ctx.values.lookup_in_mro(instance.class, "__getitem__")
                    {
                        let receiver = self.new_var(&[value], &[binding], node);
                        return self.untraced(|vm| {
                            vm.call_function(node, method, &CallArgs::new(vec![receiver, index]))
                        });
                    }
                }
                Ok((node, self.unsolvable(node)))
            }
            _ => Ok((node, self.unsolvable(node))),
        }
    }

    /// Parameters of `base[...]`: a tuple index gives several
    fn annotation_params(&mut self, index: VariableId, node: CfgNodeId) -> Vec<Annotation> {
        match self.sequence_elements(index) {
            Some(elements) => elements
                .into_iter()
                .map(|e| self.annotation_of_var(e, node))
                .collect(),
            None => vec![self.annotation_of_var(index, node)],
        }
    }

    fn single_literal(&self, var: VariableId) -> Option<Literal> {
        match self.data(var).as_slice() {
            [single] => self.ctx.values.literal(*single).cloned(),
            _ => None,
        }
    }

    /// `obj[index] = value`; stores into `__annotations__` record the
    /// annotation of a bare `x: T` in a class body or module
    pub(crate) fn op_store_subscr(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, operands) = state.popn(3)?;
        let (value, obj, index) = (operands[0], operands[1], operands[2]);
        let node = state.node;
        let key = match self.single_literal(index) {
            Some(Literal::Str(key)) => Some(key),
            _ => None,
        };
        let mut exits = vec![node];
        for target in self.data(obj) {
            let Some(instance) = self.ctx.values.instance(target).cloned() else {
                continue;
            };
            if instance.annotations_dict {
                if let Some(key) = &key {
                    let annotation = self.annotation_of_var(value, node);
                    let scope = self.frame()?.code.name.clone();
                    self.ctx.tracker.record_annotate(&scope, key, annotation);
                    self.ctx.values.set_member(target, key, value);
                }
                continue;
            }
            if !self.is_builtin_class(instance.class) {
                if let Some((_, method)) =
                    self.ctx.values.lookup_in_mro(instance.class, "__setitem__")
                {
                    let receiver = self.new_var(&[target], &[], node);
                    let (exit, _) = self.untraced(|vm| {
                        vm.call_function(node, method, &CallArgs::new(vec![receiver, index, value]))
                    })?;
                    exits.push(exit);
                }
            }
        }
        let exit = self.join_nodes(&exits);
        Ok(state.change_cfg_node(exit))
    }

    pub(crate) fn op_delete_subscr(&mut self, state: FrameState, _op: &Instruction) -> VmResult<FrameState> {
        let (state, _) = state.popn(2)?;
        Ok(state)
    }

    /// `FORMAT_VALUE`: flag bit 4 means a format spec is on the stack
    pub(crate) fn op_format_value(&mut self, state: FrameState, op: &Instruction) -> VmResult<FrameState> {
        let flags = op.arg_or_zero();
        let state = if flags & 0x04 != 0 {
            state.pop_and_discard()?
        } else {
            state
        };
        let (state, value) = state.pop()?;
        let var = match self.single_literal(value) {
            Some(Literal::Str(s)) if flags & 0x03 == 0 => {
                let folded = self.ctx.converter.str_constant(&mut self.ctx.values, &s);
                self.new_var(&[folded], &[], state.node)
            }
            _ => self.instance_var(self.ctx.converter.classes.str, state.node),
        };
        Ok(state.push(var))
    }
}
