//! Constant conversion and the builtin world
//!
//! The [`Converter`] owns the values every analysis starts with: singleton
//! markers, the builtin classes and functions, and the `typing` /
//! `dataclasses` overlay modules. It also interns constants, so loading the
//! same literal twice yields the same value id.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use super::mro::compute_mro;
use super::store::ValueStore;
use crate::features::abstract_values::domain::{
    AbstractValue, Annotation, BuiltinFunction, BuiltinReturn, Class, Instance, Literal,
    Namespace, TypingForm,
};
use crate::features::typegraph::{CfgNodeId, Program, ValueId, VariableId};
use crate::shared::models::Constant;

/// Singleton values
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub unsolvable: ValueId,
    pub empty: ValueId,
    pub deleted: ValueId,
    pub null: ValueId,
    pub none: ValueId,
    pub true_: ValueId,
    pub false_: ValueId,
    pub ellipsis: ValueId,
    pub build_class: ValueId,
}

/// Builtin classes the engine refers to directly
#[derive(Debug, Clone, Copy)]
pub struct BuiltinClasses {
    pub object: ValueId,
    pub type_: ValueId,
    pub none_type: ValueId,
    pub bool: ValueId,
    pub int: ValueId,
    pub float: ValueId,
    pub str: ValueId,
    pub bytes: ValueId,
    pub list: ValueId,
    pub tuple: ValueId,
    pub dict: ValueId,
    pub set: ValueId,
    pub range: ValueId,
    pub slice: ValueId,
    pub ellipsis: ValueId,
    pub base_exception: ValueId,
    pub exception: ValueId,
    pub assertion_error: ValueId,
}

/// Return of a builtin function or method, by class name
#[derive(Debug, Clone, Copy)]
enum Ret {
    Class(&'static str),
    NoneValue,
    FirstArg,
    Unsolvable,
}

/// (class, bases, methods)
type ClassRow = (&'static str, &'static [&'static str], &'static [(&'static str, Ret)]);

const CLASS_TABLE: &[ClassRow] = &[
    ("object", &[], &[]),
    ("type", &["object"], &[]),
    ("NoneType", &["object"], &[]),
    ("int", &["object"], &[("bit_length", Ret::Class("int")), ("to_bytes", Ret::Class("bytes"))]),
    ("bool", &["int"], &[]),
    ("float", &["object"], &[("is_integer", Ret::Class("bool"))]),
    (
        "str",
        &["object"],
        &[
            ("upper", Ret::Class("str")),
            ("lower", Ret::Class("str")),
            ("strip", Ret::Class("str")),
            ("format", Ret::Class("str")),
            ("join", Ret::Class("str")),
            ("replace", Ret::Class("str")),
            ("split", Ret::Class("list")),
            ("startswith", Ret::Class("bool")),
            ("endswith", Ret::Class("bool")),
            ("encode", Ret::Class("bytes")),
            ("find", Ret::Class("int")),
        ],
    ),
    ("bytes", &["object"], &[("decode", Ret::Class("str"))]),
    (
        "list",
        &["object"],
        &[
            ("append", Ret::NoneValue),
            ("extend", Ret::NoneValue),
            ("insert", Ret::NoneValue),
            ("sort", Ret::NoneValue),
            ("pop", Ret::Unsolvable),
            ("copy", Ret::Class("list")),
            ("index", Ret::Class("int")),
            ("count", Ret::Class("int")),
        ],
    ),
    ("tuple", &["object"], &[("index", Ret::Class("int")), ("count", Ret::Class("int"))]),
    (
        "dict",
        &["object"],
        &[
            ("get", Ret::Unsolvable),
            ("keys", Ret::Unsolvable),
            ("values", Ret::Unsolvable),
            ("items", Ret::Unsolvable),
            ("pop", Ret::Unsolvable),
            ("update", Ret::NoneValue),
            ("setdefault", Ret::Unsolvable),
            ("copy", Ret::Class("dict")),
        ],
    ),
    ("set", &["object"], &[("add", Ret::NoneValue), ("discard", Ret::NoneValue)]),
    ("range", &["object"], &[]),
    ("slice", &["object"], &[]),
    ("ellipsis", &["object"], &[]),
    ("BaseException", &["object"], &[("with_traceback", Ret::FirstArg)]),
    ("Exception", &["BaseException"], &[]),
    ("StopIteration", &["Exception"], &[]),
    ("ArithmeticError", &["Exception"], &[]),
    ("ZeroDivisionError", &["ArithmeticError"], &[]),
    ("AssertionError", &["Exception"], &[]),
    ("AttributeError", &["Exception"], &[]),
    ("ImportError", &["Exception"], &[]),
    ("LookupError", &["Exception"], &[]),
    ("IndexError", &["LookupError"], &[]),
    ("KeyError", &["LookupError"], &[]),
    ("NameError", &["Exception"], &[]),
    ("OSError", &["Exception"], &[]),
    ("RuntimeError", &["Exception"], &[]),
    ("NotImplementedError", &["RuntimeError"], &[]),
    ("TypeError", &["Exception"], &[]),
    ("ValueError", &["Exception"], &[]),
];

const FUNCTION_TABLE: &[(&str, Ret)] = &[
    ("len", Ret::Class("int")),
    ("isinstance", Ret::Class("bool")),
    ("issubclass", Ret::Class("bool")),
    ("callable", Ret::Class("bool")),
    ("hasattr", Ret::Class("bool")),
    ("getattr", Ret::Unsolvable),
    ("setattr", Ret::NoneValue),
    ("print", Ret::NoneValue),
    ("repr", Ret::Class("str")),
    ("format", Ret::Class("str")),
    ("input", Ret::Class("str")),
    ("hash", Ret::Class("int")),
    ("id", Ret::Class("int")),
    ("round", Ret::Class("int")),
    ("abs", Ret::FirstArg),
    ("sorted", Ret::Class("list")),
    ("iter", Ret::Unsolvable),
    ("next", Ret::Unsolvable),
    ("min", Ret::Unsolvable),
    ("max", Ret::Unsolvable),
    ("sum", Ret::Unsolvable),
    ("enumerate", Ret::Unsolvable),
    ("zip", Ret::Unsolvable),
    ("map", Ret::Unsolvable),
    ("filter", Ret::Unsolvable),
    ("open", Ret::Unsolvable),
    ("super", Ret::Unsolvable),
    ("vars", Ret::Class("dict")),
    ("staticmethod", Ret::FirstArg),
    ("classmethod", Ret::FirstArg),
    ("property", Ret::Unsolvable),
];

/// Owner of the initial values and the constant cache
#[derive(Debug)]
pub struct Converter {
    pub well_known: WellKnown,
    pub classes: BuiltinClasses,
    builtins: ValueId,
    overlays: IndexMap<&'static str, ValueId>,
    classes_by_name: FxHashMap<String, ValueId>,
    constant_cache: FxHashMap<(&'static str, String), ValueId>,
    /// Shared member-less instances of opaque classes
    plain_instances: FxHashMap<ValueId, ValueId>,
    root: CfgNodeId,
}

impl Converter {
    /// Install the builtin world; module-level variables are created at `root`
    pub fn new(values: &mut ValueStore, program: &mut Program, root: CfgNodeId) -> Self {
        let unsolvable = values.add(AbstractValue::Unsolvable);
        let empty = values.add(AbstractValue::Empty);
        let deleted = values.add(AbstractValue::Deleted);
        let null = values.add(AbstractValue::Null);
        let build_class = values.add(AbstractValue::BuildClass);

        let mut classes_by_name: FxHashMap<String, ValueId> = FxHashMap::default();
        let mut builtin_members: IndexMap<String, VariableId> = IndexMap::new();
        for (name, bases, _) in CLASS_TABLE {
            let base_ids: Vec<ValueId> = bases
                .iter()
                .filter_map(|b| classes_by_name.get(*b).copied())
                .collect();
            let id = values.add(AbstractValue::Class(Class {
                name: name.to_string(),
                bases: base_ids.clone(),
                mro: Vec::new(),
                members: IndexMap::new(),
                // `None` has a closed member table, so misses on it are errors
                opaque: *name != "object" && *name != "NoneType",
                decorators: Vec::new(),
                fields: Vec::new(),
            }));
            let mro = compute_mro(values, id, &base_ids).unwrap_or_else(|_| vec![id]);
            if let Some(class) = values.class_mut(id) {
                class.mro = mro;
            }
            classes_by_name.insert(name.to_string(), id);
            if *name != "NoneType" && *name != "ellipsis" {
                let var = program.new_variable_with(&[id], &[], root);
                builtin_members.insert(name.to_string(), var);
            }
        }

        let class = |name: &str| classes_by_name.get(name).copied().unwrap_or(unsolvable);
        let classes = BuiltinClasses {
            object: class("object"),
            type_: class("type"),
            none_type: class("NoneType"),
            bool: class("bool"),
            int: class("int"),
            float: class("float"),
            str: class("str"),
            bytes: class("bytes"),
            list: class("list"),
            tuple: class("tuple"),
            dict: class("dict"),
            set: class("set"),
            range: class("range"),
            slice: class("slice"),
            ellipsis: class("ellipsis"),
            base_exception: class("BaseException"),
            exception: class("Exception"),
            assertion_error: class("AssertionError"),
        };

        let none = values.add(AbstractValue::Instance(
            Instance::of(classes.none_type).with_literal(Literal::None),
        ));
        let true_ = values.add(AbstractValue::Instance(
            Instance::of(classes.bool).with_literal(Literal::Bool(true)),
        ));
        let false_ = values.add(AbstractValue::Instance(
            Instance::of(classes.bool).with_literal(Literal::Bool(false)),
        ));
        let ellipsis = values.add(AbstractValue::Instance(
            Instance::of(classes.ellipsis).with_literal(Literal::Ellipsis),
        ));

        let mut converter = Self {
            well_known: WellKnown {
                unsolvable,
                empty,
                deleted,
                null,
                none,
                true_,
                false_,
                ellipsis,
                build_class,
            },
            classes,
            builtins: unsolvable,
            overlays: IndexMap::new(),
            classes_by_name,
            constant_cache: FxHashMap::default(),
            plain_instances: FxHashMap::default(),
            root,
        };

        // Builtin methods
        for (name, _, methods) in CLASS_TABLE {
            let Some(class_id) = converter.classes_by_name.get(*name).copied() else {
                continue;
            };
            for (method, ret) in methods.iter() {
                let f = converter.builtin_function(values, &format!("{name}.{method}"), *ret);
                let var = program.new_variable_with(&[f], &[], root);
                values.set_member(class_id, method, var);
            }
        }

        for (name, ret) in FUNCTION_TABLE {
            let f = converter.builtin_function(values, name, *ret);
            let var = program.new_variable_with(&[f], &[], root);
            builtin_members.insert(name.to_string(), var);
        }
        for (name, value) in [
            ("None", none),
            ("True", true_),
            ("False", false_),
            ("Ellipsis", ellipsis),
            ("__build_class__", build_class),
            ("NotImplemented", unsolvable),
        ] {
            let var = program.new_variable_with(&[value], &[], root);
            builtin_members.insert(name.to_string(), var);
        }
        converter.builtins = values.add(AbstractValue::Module(Namespace {
            name: "builtins".to_string(),
            members: builtin_members,
        }));
        converter.overlays.insert("builtins", converter.builtins);

        // typing
        let mut typing_members = IndexMap::new();
        for form in TypingForm::ALL {
            let value = values.add(AbstractValue::TypingForm(*form));
            let var = program.new_variable_with(&[value], &[], root);
            typing_members.insert(form.name().to_string(), var);
        }
        let false_var = program.new_variable_with(&[false_], &[], root);
        typing_members.insert("TYPE_CHECKING".to_string(), false_var);
        let cast = converter.builtin_function(values, "typing.cast", Ret::Unsolvable);
        let cast_var = program.new_variable_with(&[cast], &[], root);
        typing_members.insert("cast".to_string(), cast_var);
        let typing = values.add(AbstractValue::Module(Namespace {
            name: "typing".to_string(),
            members: typing_members,
        }));
        converter.overlays.insert("typing", typing);

        // dataclasses
        let mut dc_members = IndexMap::new();
        let dataclass = converter.builtin_function(values, "dataclasses.dataclass", Ret::FirstArg);
        let field = converter.builtin_function(values, "dataclasses.field", Ret::Unsolvable);
        for (name, value) in [("dataclass", dataclass), ("field", field)] {
            let var = program.new_variable_with(&[value], &[], root);
            dc_members.insert(name.to_string(), var);
        }
        let dataclasses = values.add(AbstractValue::Module(Namespace {
            name: "dataclasses".to_string(),
            members: dc_members,
        }));
        converter.overlays.insert("dataclasses", dataclasses);

        converter
    }

    fn builtin_function(&self, values: &mut ValueStore, name: &str, ret: Ret) -> ValueId {
        let returns = match ret {
            Ret::Class(class) => match self.classes_by_name.get(class) {
                Some(id) => BuiltinReturn::Instance(*id),
                None => BuiltinReturn::Unsolvable,
            },
            Ret::NoneValue => BuiltinReturn::NoneValue,
            Ret::FirstArg => BuiltinReturn::FirstArg,
            Ret::Unsolvable => BuiltinReturn::Unsolvable,
        };
        values.add(AbstractValue::Builtin(BuiltinFunction {
            name: name.to_string(),
            returns,
        }))
    }

    pub fn builtins_module(&self) -> ValueId {
        self.builtins
    }

    /// Module served without consulting the importer
    pub fn overlay(&self, name: &str) -> Option<ValueId> {
        self.overlays.get(name).copied()
    }

    pub fn builtin_class(&self, name: &str) -> Option<ValueId> {
        self.classes_by_name.get(name).copied()
    }

    /// Node the builtin variables and constant elements live at
    pub fn root(&self) -> CfgNodeId {
        self.root
    }

    // ═══════════════════════════════════════════════════════════════════
    // Constants
    // ═══════════════════════════════════════════════════════════════════

    pub fn bool_constant(&self, value: bool) -> ValueId {
        if value {
            self.well_known.true_
        } else {
            self.well_known.false_
        }
    }

    fn cached_literal(
        &mut self,
        values: &mut ValueStore,
        tag: &'static str,
        class: ValueId,
        literal: Literal,
    ) -> ValueId {
        let key = (tag, literal.repr());
        if let Some(id) = self.constant_cache.get(&key) {
            return *id;
        }
        let id = values.add(AbstractValue::Instance(Instance::of(class).with_literal(literal)));
        self.constant_cache.insert(key, id);
        id
    }

    pub fn str_constant(&mut self, values: &mut ValueStore, s: &str) -> ValueId {
        let class = self.classes.str;
        self.cached_literal(values, "str", class, Literal::Str(s.to_string()))
    }

    pub fn int_constant(&mut self, values: &mut ValueStore, i: i64) -> ValueId {
        let class = self.classes.int;
        self.cached_literal(values, "int", class, Literal::Int(i))
    }

    /// Abstract value of a `co_consts` entry
    pub fn constant(
        &mut self,
        values: &mut ValueStore,
        program: &mut Program,
        constant: &Constant,
    ) -> ValueId {
        match constant {
            Constant::None => self.well_known.none,
            Constant::Bool(b) => self.bool_constant(*b),
            Constant::Ellipsis => self.well_known.ellipsis,
            Constant::Int(i) => self.int_constant(values, *i),
            Constant::Float(f) => {
                let class = self.classes.float;
                self.cached_literal(values, "float", class, Literal::Float(*f))
            }
            Constant::Str(s) => self.str_constant(values, s),
            Constant::Bytes(b) => {
                let class = self.classes.bytes;
                self.cached_literal(values, "bytes", class, Literal::Bytes(b.clone()))
            }
            Constant::Tuple(items) => {
                let key = ("tuple", constant.repr());
                if let Some(id) = self.constant_cache.get(&key) {
                    return *id;
                }
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    let value = self.constant(values, program, item);
                    elements.push(program.new_variable_with(&[value], &[], self.root));
                }
                let id = self.new_tuple(values, elements);
                self.constant_cache.insert(key, id);
                id
            }
            Constant::Code(code) => values.add(AbstractValue::Code(code.clone())),
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Instances
    // ═══════════════════════════════════════════════════════════════════

    /// An instance of `class`; opaque classes share one member-less instance
    pub fn instance_of(&mut self, values: &mut ValueStore, class: ValueId) -> ValueId {
        if class == self.classes.none_type {
            return self.well_known.none;
        }
        let opaque = match values.class(class) {
            Some(c) => c.opaque,
            None => return self.well_known.unsolvable,
        };
        if opaque {
            if let Some(id) = self.plain_instances.get(&class) {
                return *id;
            }
            let id = values.add(AbstractValue::Instance(Instance::of(class)));
            self.plain_instances.insert(class, id);
            return id;
        }
        values.add(AbstractValue::Instance(Instance::of(class)))
    }

    pub fn new_tuple(&self, values: &mut ValueStore, elements: Vec<VariableId>) -> ValueId {
        values.add(AbstractValue::Instance(
            Instance::of(self.classes.tuple).with_elements(elements),
        ))
    }

    pub fn new_list(&self, values: &mut ValueStore, elements: Vec<VariableId>) -> ValueId {
        values.add(AbstractValue::Instance(
            Instance::of(self.classes.list).with_elements(elements),
        ))
    }

    pub fn new_dict(&self, values: &mut ValueStore) -> ValueId {
        values.add(AbstractValue::Instance(Instance::of(self.classes.dict)))
    }

    /// Values an annotation promises: one instance per union member
    pub fn instantiate(&mut self, values: &mut ValueStore, annotation: &Annotation) -> Vec<ValueId> {
        match annotation {
            Annotation::Any | Annotation::Callable | Annotation::Late(_) => {
                vec![self.well_known.unsolvable]
            }
            Annotation::NoneType => vec![self.well_known.none],
            Annotation::Class(class) => vec![self.instance_of(values, *class)],
            Annotation::Generic { base, .. } => vec![self.instance_of(values, *base)],
            Annotation::Union(options) => {
                let mut out = Vec::new();
                for option in options {
                    for v in self.instantiate(values, option) {
                        if !out.contains(&v) {
                            out.push(v);
                        }
                    }
                }
                out
            }
            Annotation::Final(Some(inner)) | Annotation::ClassVar(inner) => {
                self.instantiate(values, inner)
            }
            Annotation::Final(None) => vec![self.well_known.unsolvable],
        }
    }
}
