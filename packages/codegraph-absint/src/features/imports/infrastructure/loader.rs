//! Turning module descriptions into abstract module values

use indexmap::IndexMap;
use tracing::debug;

use crate::features::abstract_values::{
    compute_mro, AbstractValue, BuiltinFunction, BuiltinReturn, Class, Converter, Namespace,
    ValueStore,
};
use crate::features::imports::domain::{MemberSpec, ModuleSpec};
use crate::features::imports::ports::Importer;
use crate::features::typegraph::{Program, ValueId};

/// Cache of loaded modules, by absolute name
#[derive(Debug, Default)]
pub struct ModuleLoader {
    loaded: IndexMap<String, ValueId>,
}

impl ModuleLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<ValueId> {
        self.loaded.get(name).copied()
    }

    pub fn insert(&mut self, name: &str, module: ValueId) {
        self.loaded.insert(name.to_string(), module);
    }

    pub fn loaded(&self) -> impl Iterator<Item = (&str, ValueId)> {
        self.loaded.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Module value for `spec`; loading the same name twice returns the
    /// first value
    pub fn load(
        &mut self,
        spec: &ModuleSpec,
        importer: &dyn Importer,
        values: &mut ValueStore,
        program: &mut Program,
        converter: &mut Converter,
    ) -> ValueId {
        if let Some(existing) = self.get(&spec.name) {
            return existing;
        }
        let module = values.add(AbstractValue::Module(Namespace::new(spec.name.clone())));
        self.insert(&spec.name, module);
        debug!(module = %spec.name, members = spec.members.len(), "Loading module");

        let root = converter.root();
        let mut local_classes: IndexMap<String, ValueId> = IndexMap::new();
        for (name, member) in &spec.members {
            let value = match member {
                MemberSpec::Class {
                    bases,
                    methods,
                    attributes,
                } => {
                    let class = self.load_class(
                        name,
                        bases,
                        methods,
                        attributes,
                        &local_classes,
                        values,
                        program,
                        converter,
                    );
                    local_classes.insert(name.clone(), class);
                    class
                }
                MemberSpec::Function { returns } => {
                    let returns = resolve_return(returns, &local_classes, converter);
                    values.add(AbstractValue::Builtin(BuiltinFunction {
                        name: format!("{}.{}", spec.name, name),
                        returns,
                    }))
                }
                MemberSpec::Constant { class } => {
                    instance_for(class, &local_classes, values, converter)
                }
                MemberSpec::Submodule { module: target } => match self.get(target) {
                    Some(m) => m,
                    None => match importer.import_module(target, 0) {
                        Some(sub) => self.load(&sub, importer, values, program, converter),
                        None => converter.well_known.unsolvable,
                    },
                },
            };
            let var = program.new_variable_with(&[value], &[], root);
            values.set_member(module, name, var);
        }
        module
    }

    #[allow(clippy::too_many_arguments)]
    fn load_class(
        &self,
        name: &str,
        bases: &[String],
        methods: &[(String, String)],
        attributes: &[(String, String)],
        local_classes: &IndexMap<String, ValueId>,
        values: &mut ValueStore,
        program: &mut Program,
        converter: &mut Converter,
    ) -> ValueId {
        let root = converter.root();
        let mut base_ids: Vec<ValueId> = bases
            .iter()
            .filter_map(|b| local_classes.get(b).copied().or_else(|| converter.builtin_class(b)))
            .collect();
        if base_ids.is_empty() {
            base_ids.push(converter.classes.object);
        }
        let class = values.add(AbstractValue::Class(Class {
            name: name.to_string(),
            bases: base_ids.clone(),
            mro: Vec::new(),
            members: IndexMap::new(),
            opaque: true,
            decorators: Vec::new(),
            fields: Vec::new(),
        }));
        let mro = compute_mro(values, class, &base_ids).unwrap_or_else(|_| vec![class]);
        if let Some(c) = values.class_mut(class) {
            c.mro = mro;
        }
        for (method, returns) in methods {
            // A method may return the class being built
            let returns = if returns == name {
                BuiltinReturn::Instance(class)
            } else {
                resolve_return(returns, local_classes, converter)
            };
            let f = values.add(AbstractValue::Builtin(BuiltinFunction {
                name: format!("{name}.{method}"),
                returns,
            }));
            let var = program.new_variable_with(&[f], &[], root);
            values.set_member(class, method, var);
        }
        for (attribute, class_name) in attributes {
            let value = if class_name == name {
                converter.instance_of(values, class)
            } else {
                instance_for(class_name, local_classes, values, converter)
            };
            let var = program.new_variable_with(&[value], &[], root);
            values.set_member(class, attribute, var);
        }
        class
    }
}

fn resolve_return(
    name: &str,
    local_classes: &IndexMap<String, ValueId>,
    converter: &Converter,
) -> BuiltinReturn {
    match name {
        "None" => BuiltinReturn::NoneValue,
        "Any" | "" => BuiltinReturn::Unsolvable,
        other => match local_classes
            .get(other)
            .copied()
            .or_else(|| converter.builtin_class(other))
        {
            Some(class) => BuiltinReturn::Instance(class),
            None => BuiltinReturn::Unsolvable,
        },
    }
}

fn instance_for(
    name: &str,
    local_classes: &IndexMap<String, ValueId>,
    values: &mut ValueStore,
    converter: &mut Converter,
) -> ValueId {
    match resolve_return(name, local_classes, converter) {
        BuiltinReturn::Instance(class) => converter.instance_of(values, class),
        BuiltinReturn::NoneValue => converter.well_known.none,
        _ => converter.well_known.unsolvable,
    }
}
