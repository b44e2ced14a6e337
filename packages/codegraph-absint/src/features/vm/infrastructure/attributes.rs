//! Attribute access
//!
//! Lookups run per binding of the object. A miss is reported only when no
//! binding had the attribute, so `x.attr` on `A | B` where only `B` has it
//! stays silent.

use crate::features::abstract_values::AbstractValue;
use crate::features::diagnostics::ErrorKind;
use crate::features::typegraph::{BindingId, CfgNodeId, ValueId, VariableId};
use crate::features::vm::infrastructure::context::VirtualMachine;

/// Result of looking an attribute up on one value
enum AttrLookup {
    Found(VariableId),
    /// The member table is incomplete; the miss is not an error
    Unknown,
    Missing,
}

impl VirtualMachine<'_> {
    // ═══════════════════════════════════════════════════════════════════
    // Loads
    // ═══════════════════════════════════════════════════════════════════

    /// `obj.attr` over every visible binding of `obj`
    pub(crate) fn load_attribute(
        &mut self,
        node: CfgNodeId,
        obj: VariableId,
        attr: &str,
    ) -> VariableId {
        let mut bindings = self.ctx.program.filter(obj, node);
        if bindings.is_empty() {
            bindings = self.bindings(obj);
        }
        let result = self.ctx.program.new_variable();
        let mut missing: Vec<ValueId> = Vec::new();
        let mut found_any = false;
        for b in bindings {
            let value = self.ctx.program.binding_data(b);
            match self.attribute_of(node, value, b, attr) {
                AttrLookup::Found(var) => {
                    found_any = true;
                    self.ctx.program.paste_variable(result, var, Some(node), &[b]);
                }
                AttrLookup::Unknown => {
                    let unsolvable = self.ctx.converter.well_known.unsolvable;
                    self.ctx.program.add_binding(result, unsolvable, [b], node);
                    found_any = true;
                }
                AttrLookup::Missing => missing.push(value),
            }
        }
        if !missing.is_empty() && !found_any {
            self.report_missing_attribute(missing[0], attr);
        }
        if self.ctx.program.variable(result).is_empty() {
            return self.unsolvable(node);
        }
        self.widen(result, node)
    }

    fn attribute_of(
        &mut self,
        node: CfgNodeId,
        value: ValueId,
        binding: BindingId,
        attr: &str,
    ) -> AttrLookup {
        match self.value(value) {
            AbstractValue::Module(_) | AbstractValue::Namespace(_) => {
                match self.ctx.values.member(value, attr) {
                    Some(var) => AttrLookup::Found(var),
                    None => AttrLookup::Missing,
                }
            }
            AbstractValue::Class(class) => {
                let opaque = class.opaque;
                match self.ctx.values.lookup_in_mro(value, attr) {
                    Some((_, var)) => AttrLookup::Found(var),
                    None if attr == "__name__" => {
                        AttrLookup::Found(self.instance_var(self.ctx.converter.classes.str, node))
                    }
                    None if opaque || self.ctx.values.mro_is_opaque(value) => AttrLookup::Unknown,
                    None => AttrLookup::Missing,
                }
            }
            AbstractValue::Instance(instance) => {
                let class = instance.class;
                let own = instance.members.get(attr).copied();
                if attr == "__class__" {
                    return AttrLookup::Found(self.new_var(&[class], &[binding], node));
                }
                if let Some(var) = own {
                    return AttrLookup::Found(var);
                }
                match self.ctx.values.lookup_in_mro(class, attr) {
                    Some((_, var)) => AttrLookup::Found(self.bind_methods(var, value, binding, node)),
                    None if self.ctx.values.mro_is_opaque(class) || self.ctx.analyzing => {
                        AttrLookup::Unknown
                    }
                    None => AttrLookup::Missing,
                }
            }
            AbstractValue::Generator(_) | AbstractValue::BoundMethod { .. } => AttrLookup::Unknown,
            AbstractValue::Function(f) => match attr {
                "__name__" | "__qualname__" => {
                    let name = f.name.clone();
                    let s = self.ctx.converter.str_constant(&mut self.ctx.values, &name);
                    AttrLookup::Found(self.new_var(&[s], &[], node))
                }
                _ => AttrLookup::Unknown,
            },
            _ => AttrLookup::Unknown,
        }
    }

    /// Functions found on the class become methods bound to `receiver`
    fn bind_methods(
        &mut self,
        var: VariableId,
        receiver: ValueId,
        binding: BindingId,
        node: CfgNodeId,
    ) -> VariableId {
        let needs_binding = self
            .data(var)
            .iter()
            .any(|v| matches!(self.value(*v), AbstractValue::Function(_) | AbstractValue::Builtin(_)));
        if !needs_binding {
            return var;
        }
        let receiver_var = self.new_var(&[receiver], &[binding], node);
        let result = self.ctx.program.new_variable();
        for b in self.bindings(var) {
            let value = self.ctx.program.binding_data(b);
            let bound = match self.value(value) {
                AbstractValue::Function(_) | AbstractValue::Builtin(_) => {
                    self.ctx.values.add(AbstractValue::BoundMethod {
                        receiver: receiver_var,
                        function: value,
                    })
                }
                _ => value,
            };
            self.ctx.program.add_binding(result, bound, [b], node);
        }
        result
    }

    fn report_missing_attribute(&mut self, value: ValueId, attr: &str) {
        let message = match self.value(value) {
            AbstractValue::Module(ns) => format!("No attribute '{attr}' on module '{}'", ns.name),
            AbstractValue::Instance(_) if self.ctx.values.is_none(value) => {
                format!("No attribute '{attr}' on None")
            }
            _ => format!(
                "No attribute '{attr}' on {}",
                self.ctx.values.describe(value)
            ),
        };
        self.report(ErrorKind::AttributeError, message);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Stores and deletes
    // ═══════════════════════════════════════════════════════════════════

    /// `obj.attr = value`
    pub(crate) fn store_attribute(
        &mut self,
        node: CfgNodeId,
        obj: VariableId,
        attr: &str,
        value: VariableId,
    ) {
        for target in self.data(obj) {
            if !self.accepts_members(target) {
                continue;
            }
            self.assign_member(target, attr, value, node);
        }
    }

    /// `del obj.attr`
    pub(crate) fn delete_attribute(&mut self, node: CfgNodeId, obj: VariableId, attr: &str) {
        for target in self.data(obj) {
            if !self.accepts_members(target) {
                continue;
            }
            if !self.delete_member(target, attr, node) {
                let described = self.ctx.values.describe(target);
                self.report(
                    ErrorKind::AttributeError,
                    format!("No attribute '{attr}' on {described}"),
                );
            }
        }
    }

    /// Shared instances of builtin classes and opaque values keep no members
    fn accepts_members(&self, value: ValueId) -> bool {
        match self.value(value) {
            AbstractValue::Instance(i) => {
                i.literal.is_none() && self.ctx.values.class(i.class).map_or(false, |c| !c.opaque)
            }
            AbstractValue::Class(c) => !c.opaque,
            AbstractValue::Module(_) | AbstractValue::Namespace(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::features::abstract_values::{Class, Namespace};
    use crate::features::imports::NullImporter;
    use crate::features::vm::infrastructure::context::AnalysisContext;
    use crate::shared::models::Director;
    use indexmap::IndexMap;

    fn run(f: impl FnOnce(&mut VirtualMachine<'_>)) {
        let director = Director::new();
        let importer = NullImporter;
        let ctx = AnalysisContext::new(AnalysisConfig::default(), &director, &importer);
        let mut vm = VirtualMachine::new(ctx);
        f(&mut vm);
    }

    fn user_class(vm: &mut VirtualMachine<'_>, name: &str) -> ValueId {
        let object = vm.ctx.converter.classes.object;
        let class = vm.ctx.values.add(AbstractValue::Class(Class {
            name: name.to_string(),
            bases: vec![object],
            mro: Vec::new(),
            members: IndexMap::new(),
            opaque: false,
            decorators: Vec::new(),
            fields: Vec::new(),
        }));
        vm.ctx.values.class_mut(class).unwrap().mro = vec![class, object];
        class
    }

    #[test]
    fn test_instance_attribute_round_trip() {
        run(|vm| {
            let root = vm.ctx.root;
            let class = user_class(vm, "A");
            let obj = vm.instance_var(class, root);
            let one = vm.ctx.converter.int_constant(&mut vm.ctx.values, 1);
            let value = vm.new_var(&[one], &[], root);
            vm.store_attribute(root, obj, "x", value);
            let loaded = vm.load_attribute(root, obj, "x");
            assert_eq!(vm.data(loaded), vec![one]);
            assert!(vm.ctx.errorlog.is_empty());
        });
    }

    #[test]
    fn test_missing_attribute_reported_once_for_all_bindings() {
        run(|vm| {
            let root = vm.ctx.root;
            let class = user_class(vm, "A");
            let obj = vm.instance_var(class, root);
            vm.load_attribute(root, obj, "nope");
            assert_eq!(vm.ctx.errorlog.of_kind(ErrorKind::AttributeError).count(), 1);
        });
    }

    #[test]
    fn test_partial_miss_is_silent() {
        run(|vm| {
            let root = vm.ctx.root;
            let a = user_class(vm, "A");
            let b = user_class(vm, "B");
            let ia = vm.ctx.converter.instance_of(&mut vm.ctx.values, a);
            let ib = vm.ctx.converter.instance_of(&mut vm.ctx.values, b);
            let one = vm.ctx.converter.int_constant(&mut vm.ctx.values, 1);
            let member = vm.new_var(&[one], &[], root);
            vm.ctx.values.set_member(ib, "x", member);
            let obj = vm.new_var(&[ia, ib], &[], root);
            let loaded = vm.load_attribute(root, obj, "x");
            assert!(vm.data(loaded).contains(&one));
            assert!(vm.ctx.errorlog.is_empty());
        });
    }

    #[test]
    fn test_builtin_methods_bind_receiver() {
        run(|vm| {
            let root = vm.ctx.root;
            let s = vm.ctx.converter.str_constant(&mut vm.ctx.values, "a");
            let obj = vm.new_var(&[s], &[], root);
            let method = vm.load_attribute(root, obj, "upper");
            let data = vm.data(method);
            assert!(matches!(vm.value(data[0]), AbstractValue::BoundMethod { .. }));
        });
    }

    #[test]
    fn test_module_miss_names_module() {
        run(|vm| {
            let root = vm.ctx.root;
            let module = vm
                .ctx
                .values
                .add(AbstractValue::Module(Namespace::new("m")));
            let obj = vm.new_var(&[module], &[], root);
            vm.load_attribute(root, obj, "missing");
            let diag = vm.ctx.errorlog.diagnostics()[0].clone();
            assert_eq!(diag.message, "No attribute 'missing' on module 'm'");
        });
    }
}
