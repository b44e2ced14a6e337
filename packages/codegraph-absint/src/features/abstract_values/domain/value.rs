//! Abstract values
//!
//! Every value lives in the [`ValueStore`](crate::features::abstract_values::ValueStore)
//! arena and is addressed by a [`ValueId`]. Values that contain other values
//! (tuple elements, members, closure cells) hold [`VariableId`]s, so a value
//! can be "a tuple whose first element is `int | str`".

use std::rc::Rc;

use indexmap::IndexMap;

use crate::features::typegraph::{ValueId, VariableId};
use crate::shared::models::CodeObject;

/// Concrete Python constant carried by an instance
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Ellipsis,
}

impl Literal {
    pub fn repr(&self) -> String {
        match self {
            Literal::None => "None".to_string(),
            Literal::Bool(true) => "True".to_string(),
            Literal::Bool(false) => "False".to_string(),
            Literal::Int(i) => i.to_string(),
            Literal::Float(f) => format!("{f:?}"),
            Literal::Str(s) => format!("{s:?}"),
            Literal::Bytes(b) => format!("b{:?}", String::from_utf8_lossy(b)),
            Literal::Ellipsis => "Ellipsis".to_string(),
        }
    }
}

/// Instance of a class
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub class: ValueId,
    pub literal: Option<Literal>,
    /// Per-position element variables of a tuple or list display
    pub elements: Option<Vec<VariableId>>,
    pub members: IndexMap<String, VariableId>,
    /// The `__annotations__` dict of a class body or module
    pub annotations_dict: bool,
}

impl Instance {
    pub fn of(class: ValueId) -> Self {
        Self {
            class,
            literal: None,
            elements: None,
            members: IndexMap::new(),
            annotations_dict: false,
        }
    }

    pub fn with_literal(mut self, literal: Literal) -> Self {
        self.literal = Some(literal);
        self
    }

    pub fn with_elements(mut self, elements: Vec<VariableId>) -> Self {
        self.elements = Some(elements);
        self
    }
}

/// A class, built in or created by `__build_class__`
#[derive(Debug, Clone, PartialEq)]
pub struct Class {
    pub name: String,
    pub bases: Vec<ValueId>,
    /// C3 linearization, the class itself first
    pub mro: Vec<ValueId>,
    pub members: IndexMap<String, VariableId>,
    /// Member table is incomplete (builtin or imported); attribute misses
    /// are not errors
    pub opaque: bool,
    pub decorators: Vec<String>,
    /// Annotated fields in declaration order (record-like classes)
    pub fields: Vec<Field>,
}

impl Class {
    pub fn is_dataclass(&self) -> bool {
        self.decorators
            .iter()
            .any(|d| d == "dataclass" || d.ends_with(".dataclass"))
    }
}

/// A declared field of a record-like class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub has_default: bool,
}

/// A function defined in analyzed code
#[derive(Debug, Clone, PartialEq)]
pub struct InterpreterFunction {
    pub name: String,
    pub code: Rc<CodeObject>,
    /// Namespace value of the defining module
    pub globals: ValueId,
    pub defaults: Vec<VariableId>,
    pub kw_defaults: IndexMap<String, VariableId>,
    /// Cells for the code's freevars, in order
    pub closure: Vec<VariableId>,
    pub annotations: IndexMap<String, VariableId>,
}

/// Result class of a builtin function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinReturn {
    /// An instance of the given class
    Instance(ValueId),
    /// The `None` constant
    NoneValue,
    /// The first positional argument, unchanged (identity decorators)
    FirstArg,
    Unsolvable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinFunction {
    pub name: String,
    pub returns: BuiltinReturn,
}

/// A module or a namespace dict (locals, globals)
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    pub name: String,
    pub members: IndexMap<String, VariableId>,
}

impl Namespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    Generator,
    Coroutine,
    AsyncGenerator,
}

/// A generator or coroutine object; resuming is never simulated, the
/// yielded and returned values are accumulated instead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Generator {
    pub kind: GeneratorKind,
    pub yielded: VariableId,
    pub returned: VariableId,
}

/// Unsubscripted special forms from `typing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypingForm {
    Any,
    Union,
    Optional,
    List,
    Dict,
    Tuple,
    Set,
    Final,
    ClassVar,
    Callable,
    Type,
}

impl TypingForm {
    pub const ALL: &'static [TypingForm] = &[
        TypingForm::Any,
        TypingForm::Union,
        TypingForm::Optional,
        TypingForm::List,
        TypingForm::Dict,
        TypingForm::Tuple,
        TypingForm::Set,
        TypingForm::Final,
        TypingForm::ClassVar,
        TypingForm::Callable,
        TypingForm::Type,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TypingForm::Any => "Any",
            TypingForm::Union => "Union",
            TypingForm::Optional => "Optional",
            TypingForm::List => "List",
            TypingForm::Dict => "Dict",
            TypingForm::Tuple => "Tuple",
            TypingForm::Set => "Set",
            TypingForm::Final => "Final",
            TypingForm::ClassVar => "ClassVar",
            TypingForm::Callable => "Callable",
            TypingForm::Type => "Type",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TypingForm::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Builtin container class name a generic alias stands for
    pub fn container(self) -> Option<&'static str> {
        match self {
            TypingForm::List => Some("list"),
            TypingForm::Dict => Some("dict"),
            TypingForm::Tuple => Some("tuple"),
            TypingForm::Set => Some("set"),
            TypingForm::Type => Some("type"),
            _ => None,
        }
    }
}

/// A resolved type annotation
#[derive(Debug, Clone, PartialEq)]
pub enum Annotation {
    Any,
    NoneType,
    Class(ValueId),
    Union(Vec<Annotation>),
    Generic { base: ValueId, params: Vec<Annotation> },
    Callable,
    Final(Option<Box<Annotation>>),
    ClassVar(Box<Annotation>),
    /// Forward reference that could not be resolved yet
    Late(usize),
}

impl Annotation {
    /// Build a union, flattening nested unions and dropping duplicates
    pub fn union(options: Vec<Annotation>) -> Annotation {
        let mut flat: Vec<Annotation> = Vec::new();
        for option in options {
            let members = match option {
                Annotation::Union(inner) => inner,
                other => vec![other],
            };
            for m in members {
                if !flat.contains(&m) {
                    flat.push(m);
                }
            }
        }
        match flat.len() {
            1 => flat.remove(0),
            _ => Annotation::Union(flat),
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Annotation::Final(_))
    }

    /// Strip `Final[...]` / `ClassVar[...]`
    pub fn inner(&self) -> Option<&Annotation> {
        match self {
            Annotation::Final(inner) => inner.as_deref(),
            Annotation::ClassVar(inner) => Some(inner),
            other => Some(other),
        }
    }
}

/// Why a value is a late placeholder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LateKind {
    /// A type expression naming something not defined yet
    Annotation,
    /// A closure cell read before the defining scope wrote it
    CellRead,
}

/// Every kind of abstract value the engine manipulates
#[derive(Debug, Clone, PartialEq)]
pub enum AbstractValue {
    /// Anything; the result of every approximation
    Unsolvable,
    /// No value ("never"): the result of a call that never returns
    Empty,
    /// The value of a deleted name
    Deleted,
    /// `PUSH_NULL` marker
    Null,
    Instance(Instance),
    Class(Class),
    Function(InterpreterFunction),
    BoundMethod { receiver: VariableId, function: ValueId },
    Builtin(BuiltinFunction),
    Module(Namespace),
    Namespace(Namespace),
    Generator(Generator),
    /// A code constant before `MAKE_FUNCTION`
    Code(Rc<CodeObject>),
    /// `__build_class__`
    BuildClass,
    TypingForm(TypingForm),
    Annotation(Annotation),
    /// Placeholder resolved once its name is defined
    Late { id: usize, kind: LateKind },
}

impl AbstractValue {
    /// Short name for logs and messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            AbstractValue::Unsolvable => "unsolvable",
            AbstractValue::Empty => "empty",
            AbstractValue::Deleted => "deleted",
            AbstractValue::Null => "null",
            AbstractValue::Instance(_) => "instance",
            AbstractValue::Class(_) => "class",
            AbstractValue::Function(_) => "function",
            AbstractValue::BoundMethod { .. } => "bound method",
            AbstractValue::Builtin(_) => "builtin function",
            AbstractValue::Module(_) => "module",
            AbstractValue::Namespace(_) => "namespace",
            AbstractValue::Generator(_) => "generator",
            AbstractValue::Code(_) => "code",
            AbstractValue::BuildClass => "__build_class__",
            AbstractValue::TypingForm(_) => "typing form",
            AbstractValue::Annotation(_) => "annotation",
            AbstractValue::Late { .. } => "late annotation",
        }
    }

    pub fn members(&self) -> Option<&IndexMap<String, VariableId>> {
        match self {
            AbstractValue::Instance(i) => Some(&i.members),
            AbstractValue::Class(c) => Some(&c.members),
            AbstractValue::Module(ns) | AbstractValue::Namespace(ns) => Some(&ns.members),
            _ => None,
        }
    }

    pub fn members_mut(&mut self) -> Option<&mut IndexMap<String, VariableId>> {
        match self {
            AbstractValue::Instance(i) => Some(&mut i.members),
            AbstractValue::Class(c) => Some(&mut c.members),
            AbstractValue::Module(ns) | AbstractValue::Namespace(ns) => Some(&mut ns.members),
            _ => None,
        }
    }

    pub fn is_unsolvable(&self) -> bool {
        matches!(self, AbstractValue::Unsolvable)
    }
}
