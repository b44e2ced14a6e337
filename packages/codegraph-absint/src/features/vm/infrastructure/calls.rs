//! Calling abstract values
//!
//! A call site is evaluated once per binding of the callee. Each binding's
//! result is pasted into one result variable with the callee binding as an
//! extra source, so later filtering can tell which callee produced which
//! value.

use indexmap::IndexMap;
use tracing::debug;

use crate::errors::VmResult;
use crate::features::abstract_values::{
    compute_mro, AbstractValue, Annotation, BuiltinFunction, BuiltinReturn, Class, Field, Generator,
    GeneratorKind, InterpreterFunction, Namespace,
};
use crate::features::diagnostics::ErrorKind;
use crate::features::typegraph::{CfgNodeId, ValueId, VariableId};
use crate::features::vm::domain::CallArgs;
use crate::features::vm::infrastructure::context::VirtualMachine;
use crate::features::vm::infrastructure::frames::{FrameOutcome, FrameSetup};

/// What calling a value means, read off the arena before dispatching
enum Callee {
    Function(Box<InterpreterFunction>),
    Bound { receiver: VariableId, function: ValueId },
    Class,
    BuildClass,
    Builtin(BuiltinFunction),
    Instance(ValueId),
    Unknown,
    NotCallable,
}

impl VirtualMachine<'_> {
    // ═══════════════════════════════════════════════════════════════════
    // Call sites
    // ═══════════════════════════════════════════════════════════════════

    /// Call every visible binding of `funcv`; returns the join node and the
    /// merged result
    pub(crate) fn call_function(
        &mut self,
        node: CfgNodeId,
        funcv: VariableId,
        args: &CallArgs,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let mut bindings = self.ctx.program.filter(funcv, node);
        if bindings.is_empty() {
            bindings = self.bindings(funcv);
        }
        let result = self.ctx.program.new_variable();
        let mut nodes = Vec::with_capacity(bindings.len());
        for funcb in bindings {
            let func = self.ctx.program.binding_data(funcb);
            let (exit, ret) = self.call_value(node, func, args)?;
            self.ctx
                .program
                .paste_variable(result, ret, Some(exit), &[funcb]);
            nodes.push(exit);
        }
        if nodes.is_empty() {
            return Ok((node, self.unsolvable(node)));
        }
        let exit = self.join_nodes(&nodes);
        let result = self.widen(result, exit);
        Ok((exit, result))
    }

    fn callee(&self, func: ValueId) -> Callee {
        match self.value(func) {
            AbstractValue::Function(f) => Callee::Function(Box::new(f.clone())),
            AbstractValue::BoundMethod { receiver, function } => Callee::Bound {
                receiver: *receiver,
                function: *function,
            },
            AbstractValue::Class(_) => Callee::Class,
            AbstractValue::BuildClass => Callee::BuildClass,
            AbstractValue::Builtin(b) => Callee::Builtin(b.clone()),
            AbstractValue::Instance(i) => Callee::Instance(i.class),
            AbstractValue::Unsolvable
            | AbstractValue::Empty
            | AbstractValue::Late { .. }
            | AbstractValue::TypingForm(_)
            | AbstractValue::Annotation(_) => Callee::Unknown,
            _ => Callee::NotCallable,
        }
    }

    /// Call one abstract value
    pub(crate) fn call_value(
        &mut self,
        node: CfgNodeId,
        func: ValueId,
        args: &CallArgs,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        match self.callee(func) {
            Callee::Function(f) => self.call_interpreter_function(node, func, &f, args),
            Callee::Bound { receiver, function } => {
                self.call_value(node, function, &args.prepend(receiver))
            }
            Callee::Class => self.instantiate_class(node, func, args),
            Callee::BuildClass => self.build_class(node, args),
            Callee::Builtin(builtin) => Ok((node, self.call_builtin(node, &builtin, args))),
            Callee::Instance(class) => match self.ctx.values.lookup_in_mro(class, "__call__") {
                Some((_, method)) => {
                    let receiver = self.new_var(&[func], &[], node);
                    self.untraced(|vm| vm.call_function(node, method, &args.prepend(receiver)))
                }
                None if self.ctx.values.mro_is_opaque(class) => Ok((node, self.unsolvable(node))),
                None => Ok((node, self.not_callable(func, node))),
            },
            Callee::Unknown => Ok((node, self.unsolvable(node))),
            Callee::NotCallable => Ok((node, self.not_callable(func, node))),
        }
    }

    fn not_callable(&mut self, func: ValueId, node: CfgNodeId) -> VariableId {
        let described = self.ctx.values.describe(func);
        self.report(
            ErrorKind::NotCallable,
            format!("'{described}' object is not callable"),
        );
        self.unsolvable(node)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Interpreter functions
    // ═══════════════════════════════════════════════════════════════════

    fn call_interpreter_function(
        &mut self,
        node: CfgNodeId,
        func_id: ValueId,
        func: &InterpreterFunction,
        args: &CallArgs,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        self.ctx.called_functions.insert(func_id);
        let Some(params) = self.map_args(func, args, node) else {
            return Ok((node, self.unsolvable(node)));
        };
        let returns = self.return_annotation(func, node);
        let setup = FrameSetup::new(func.code.clone(), func.globals)
            .params(params)
            .closure(&func.closure)
            .func(func_id);
        let mut frame = match self.make_frame(node, setup) {
            FrameOutcome::Ready(frame) => *frame,
            FrameOutcome::Recursion | FrameOutcome::MaxDepth => {
                let result = match &returns {
                    Some(annotation) => self.instances_of(annotation, node),
                    None => self.unsolvable(node),
                };
                return Ok((node, result));
            }
        };
        frame.allowed_returns = returns.clone();
        let yield_var = frame.yield_var;
        let code = func.code.clone();
        let (exit, ret) = self.run_frame(frame, node)?;

        if let Some(yielded) = yield_var {
            let kind = if code.is_async_generator() {
                GeneratorKind::AsyncGenerator
            } else if code.is_coroutine() {
                GeneratorKind::Coroutine
            } else {
                GeneratorKind::Generator
            };
            let generator = self.ctx.values.add(AbstractValue::Generator(Generator {
                kind,
                yielded,
                returned: ret,
            }));
            return Ok((exit, self.new_var(&[generator], &[], exit)));
        }
        match &returns {
            Some(annotation) => Ok((exit, self.instances_of(annotation, exit))),
            None => Ok((exit, ret)),
        }
    }

    /// Declared return type, if it resolved to something usable
    fn return_annotation(&mut self, func: &InterpreterFunction, node: CfgNodeId) -> Option<Annotation> {
        let var = *func.annotations.get("return")?;
        let annotation = self.annotation_of_var(var, node);
        match self.resolve_late(annotation) {
            Annotation::Late(_) => None,
            resolved => Some(resolved),
        }
    }

    pub(crate) fn instances_of(&mut self, annotation: &Annotation, node: CfgNodeId) -> VariableId {
        let resolved = self.resolve_late(annotation.clone());
        let data = self
            .ctx
            .converter
            .instantiate(&mut self.ctx.values, &resolved);
        self.new_var(&data, &[], node)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Classes
    // ═══════════════════════════════════════════════════════════════════

    fn instantiate_class(
        &mut self,
        node: CfgNodeId,
        class: ValueId,
        args: &CallArgs,
    ) -> VmResult<(CfgNodeId, VariableId)> {
        let classes = self.ctx.converter.classes;
        if class == classes.type_ && args.posargs.len() == 1 && args.namedargs.is_empty() {
            return Ok((node, self.type_of(args.posargs[0], node)));
        }

        let instance = self.ctx.converter.instance_of(&mut self.ctx.values, class);
        let var = self.new_var(&[instance], &[], node);

        let (dataclass, fields, name) = match self.ctx.values.class(class) {
            Some(c) => (c.is_dataclass(), c.fields.clone(), c.name.clone()),
            None => return Ok((node, var)),
        };
        if dataclass {
            self.init_dataclass(instance, &name, &fields, args, node);
            return Ok((node, var));
        }

        match self.ctx.values.lookup_in_mro(class, "__init__") {
            Some((_, init)) => {
                let (exit, _) =
                    self.untraced(|vm| vm.call_function(node, init, &args.prepend(var)))?;
                Ok((exit, var))
            }
            None => Ok((node, var)),
        }
    }

    /// `type(x)`: the classes of x's instances
    fn type_of(&mut self, var: VariableId, node: CfgNodeId) -> VariableId {
        let result = self.ctx.program.new_variable();
        for b in self.bindings(var) {
            let value = self.ctx.program.binding_data(b);
            let class = match self.ctx.values.class_of(value) {
                Some(class) => class,
                None => self.ctx.converter.well_known.unsolvable,
            };
            self.ctx.program.add_binding(result, class, [b], node);
        }
        if self.ctx.program.variable(result).is_empty() {
            return self.unsolvable(node);
        }
        result
    }

    /// Generated `__init__` of a record-like class: check the call against
    /// the declared fields and store the given values
    fn init_dataclass(
        &mut self,
        instance: ValueId,
        name: &str,
        fields: &[Field],
        args: &CallArgs,
        node: CfgNodeId,
    ) {
        let function = format!("{name}.__init__");
        if args.has_unknown_length() {
            return;
        }
        if args.posargs.len() > fields.len() {
            self.report(
                ErrorKind::WrongArgCount,
                format!(
                    "Function {function} expects {} arg(s), got {}",
                    fields.len(),
                    args.posargs.len()
                ),
            );
            return;
        }
        let mut given: IndexMap<String, VariableId> = IndexMap::new();
        for (field, var) in fields.iter().zip(args.posargs.iter()) {
            given.insert(field.name.clone(), *var);
        }
        for (key, var) in &args.namedargs {
            if !fields.iter().any(|f| &f.name == key) {
                self.report(
                    ErrorKind::WrongKeywordArgs,
                    format!("Invalid keyword argument {key} to function {function}"),
                );
                return;
            }
            if given.insert(key.clone(), *var).is_some() {
                self.report(
                    ErrorKind::DuplicateKeyword,
                    format!("Function {function} got multiple values for keyword argument '{key}'"),
                );
                return;
            }
        }
        if let Some(missing) = fields
            .iter()
            .find(|f| !f.has_default && !given.contains_key(&f.name))
        {
            self.report(
                ErrorKind::MissingParameter,
                format!("Missing parameter '{}' in call to function {function}", missing.name),
            );
            return;
        }
        for (field, var) in given {
            let member = self.ctx.program.assign_to_new_variable(var, node);
            self.ctx.values.set_member(instance, &field, member);
        }
    }

    /// `__build_class__(body, name, *bases)`
    fn build_class(&mut self, node: CfgNodeId, args: &CallArgs) -> VmResult<(CfgNodeId, VariableId)> {
        let (Some(&body_var), Some(&name_var)) = (args.posargs.first(), args.posargs.get(1)) else {
            return Ok((node, self.unsolvable(node)));
        };
        let name = self
            .data(name_var)
            .iter()
            .find_map(|v| self.ctx.values.str_literal(*v).map(str::to_string))
            .unwrap_or_else(|| "<class>".to_string());
        let body = self.data(body_var).into_iter().find_map(|v| match self.value(v) {
            AbstractValue::Function(f) => Some((v, f.clone())),
            _ => None,
        });
        let Some((body_id, body)) = body else {
            return Ok((node, self.unsolvable(node)));
        };

        let mut bases = Vec::new();
        let mut opaque = false;
        for base_var in &args.posargs[2..] {
            for value in self.data(*base_var) {
                match self.value(value) {
                    AbstractValue::Class(_) => {
                        if !bases.contains(&value) {
                            bases.push(value);
                        }
                    }
                    _ => opaque = true,
                }
            }
        }
        if bases.is_empty() {
            bases.push(self.ctx.converter.classes.object);
        }

        // Run the body with a fresh namespace as locals
        let ns = self
            .ctx
            .values
            .add(AbstractValue::Namespace(Namespace::new(name.clone())));
        let setup = FrameSetup::new(body.code.clone(), body.globals)
            .locals(ns)
            .closure(&body.closure)
            .func(body_id);
        let exit = match self.make_frame(node, setup) {
            FrameOutcome::Ready(frame) => self.run_frame(*frame, node)?.0,
            FrameOutcome::Recursion | FrameOutcome::MaxDepth => {
                opaque = true;
                node
            }
        };

        let members = self.ctx.values.members(ns).cloned().unwrap_or_default();
        let decorators = self.ctx.director.decorators_at(body.code.first_line).to_vec();
        let fields = self.ctx.tracker.fields(&body.code.name);
        let class = self.ctx.values.add(AbstractValue::Class(Class {
            name: name.clone(),
            bases: bases.clone(),
            mro: Vec::new(),
            members,
            opaque,
            decorators,
            fields,
        }));
        let mro = match compute_mro(&self.ctx.values, class, &bases) {
            Ok(mro) => mro,
            Err(e) => {
                self.report(ErrorKind::MroError, e.to_string());
                vec![class, self.ctx.converter.classes.object]
            }
        };
        if let Some(c) = self.ctx.values.class_mut(class) {
            c.mro = mro;
        }
        debug!(class = %name, bases = bases.len(), "Built class");
        Ok((exit, self.new_var(&[class], &[], exit)))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Builtins
    // ═══════════════════════════════════════════════════════════════════

    fn call_builtin(
        &mut self,
        node: CfgNodeId,
        builtin: &BuiltinFunction,
        args: &CallArgs,
    ) -> VariableId {
        if builtin.name == "isinstance" {
            if let [obj, classinfo] = args.posargs.as_slice() {
                return self.call_isinstance(node, *obj, *classinfo);
            }
        }
        match builtin.returns {
            BuiltinReturn::Instance(class) => self.instance_var(class, node),
            BuiltinReturn::NoneValue => self.none_var(node),
            BuiltinReturn::FirstArg => match args.posargs.first() {
                Some(first) => {
                    let var = self.ctx.program.new_variable();
                    self.ctx.program.paste_variable(var, *first, Some(node), &[]);
                    var
                }
                None => self.unsolvable(node),
            },
            BuiltinReturn::Unsolvable => self.unsolvable(node),
        }
    }

    /// Per-binding literal results, so a branch on the result narrows `obj`
    fn call_isinstance(&mut self, node: CfgNodeId, obj: VariableId, classinfo: VariableId) -> VariableId {
        let mut targets = Vec::new();
        for value in self.data(classinfo) {
            match self.sequence_elements_of(value) {
                Some(elements) => {
                    for element in elements {
                        targets.extend(self.data(element));
                    }
                }
                None => targets.push(value),
            }
        }
        let known = targets
            .iter()
            .all(|t| matches!(self.value(*t), AbstractValue::Class(_)));

        let mut bindings = self.ctx.program.filter(obj, node);
        if bindings.is_empty() {
            bindings = self.bindings(obj);
        }
        let bool_class = self.ctx.converter.classes.bool;
        let result = self.ctx.program.new_variable();
        for b in bindings {
            let value = self.ctx.program.binding_data(b);
            let answer = match self.ctx.values.class_of(value) {
                Some(class) if known => self.isinstance_answer(class, &targets),
                _ => None,
            };
            let data = match answer {
                Some(answer) => self.ctx.converter.bool_constant(answer),
                None => self.ctx.converter.instance_of(&mut self.ctx.values, bool_class),
            };
            self.ctx.program.add_binding(result, data, [b], node);
        }
        if self.ctx.program.variable(result).is_empty() {
            return self.instance_var(bool_class, node);
        }
        result
    }

    /// `None` when an imported class could still subclass one of `targets`
    fn isinstance_answer(&self, class: ValueId, targets: &[ValueId]) -> Option<bool> {
        if targets.iter().any(|t| self.ctx.values.is_subclass(class, *t)) {
            return Some(true);
        }
        if self.ctx.values.mro_is_opaque(class) && !self.is_builtin_class(class) {
            return None;
        }
        Some(false)
    }

    fn sequence_elements_of(&self, value: ValueId) -> Option<Vec<VariableId>> {
        self.ctx.values.instance(value).and_then(|i| i.elements.clone())
    }

    pub(crate) fn is_builtin_class(&self, class: ValueId) -> bool {
        let name = self.ctx.values.class_name(class);
        self.ctx.converter.builtin_class(name) == Some(class)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Functions nothing called
    // ═══════════════════════════════════════════════════════════════════

    /// Call the module's functions and methods that the module body never
    /// reached, with parameters taken from their annotations
    pub(crate) fn analyze_uncalled(&mut self, globals: ValueId, node: CfgNodeId) -> VmResult<CfgNodeId> {
        let mut targets: Vec<(ValueId, Option<ValueId>)> = Vec::new();
        let members: Vec<VariableId> = self
            .ctx
            .values
            .members(globals)
            .map(|m| m.values().copied().collect())
            .unwrap_or_default();
        for var in members {
            for value in self.data(var) {
                match self.value(value) {
                    AbstractValue::Function(_) => targets.push((value, None)),
                    AbstractValue::Class(class) if !class.opaque => {
                        let methods: Vec<VariableId> = class.members.values().copied().collect();
                        for method in methods {
                            for m in self.data(method) {
                                if matches!(self.value(m), AbstractValue::Function(_)) {
                                    targets.push((m, Some(value)));
                                }
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let previous = std::mem::replace(&mut self.ctx.analyzing, true);
        let mut node = node;
        let mut seen = Vec::new();
        let mut receivers: IndexMap<ValueId, VariableId> = IndexMap::new();
        for (func, class) in targets {
            if seen.contains(&func) || self.ctx.called_functions.contains(&func) {
                continue;
            }
            seen.push(func);
            let Some(f) = self.ctx.values.function(func).cloned() else {
                continue;
            };
            debug!(function = %f.name, "Analyzing uncalled function");

            let mut posargs = Vec::new();
            for (i, param) in f.code.positional_params().iter().enumerate() {
                let var = match class {
                    Some(class) if i == 0 => match receivers.get(&class) {
                        Some(receiver) => *receiver,
                        None => {
                            let (exit, receiver) = self.stand_in_instance(class, node)?;
                            node = exit;
                            receivers.insert(class, receiver);
                            receiver
                        }
                    },
                    _ => self.param_value(&f, param, node),
                };
                posargs.push(var);
            }
            let mut args = CallArgs::new(posargs);
            for param in f.code.kwonly_params() {
                let var = self.param_value(&f, param, node);
                args = args.with_named(param.clone(), var);
            }
            let (exit, _) = self.call_value(node, func, &args)?;
            node = exit;
        }
        self.ctx.analyzing = previous;
        Ok(node)
    }

    /// An instance initialised through `__init__` with unknown arguments
    fn stand_in_instance(&mut self, class: ValueId, node: CfgNodeId) -> VmResult<(CfgNodeId, VariableId)> {
        let unknown = self.unsolvable(node);
        let args = CallArgs::default().with_starargs(unknown);
        self.instantiate_class(node, class, &args)
    }

    fn param_value(&mut self, func: &InterpreterFunction, param: &str, node: CfgNodeId) -> VariableId {
        match func.annotations.get(param).copied() {
            Some(var) => {
                let annotation = self.annotation_of_var(var, node);
                self.instances_of(&annotation, node)
            }
            None => self.unsolvable(node),
        }
    }
}
