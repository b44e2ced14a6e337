//! Abstract values
//!
//! Hexagonal Architecture:
//! - domain: the value kinds, annotations and the rendered [`Type`]
//! - infrastructure: the value arena, the builtin world, MRO and truthiness
//!
//! Values are immutable once created, except for member tables (instance
//! attributes, class bodies, module namespaces), which point at variables
//! and grow as the program stores into them.

pub mod domain;
pub mod infrastructure;

pub use domain::{
    AbstractValue, Annotation, BuiltinFunction, BuiltinReturn, Class, Field, Generator,
    GeneratorKind, Instance, InterpreterFunction, LateKind, Literal, Namespace, Type, TypeKind,
    TypingForm,
};
pub use infrastructure::{
    compatible_with, compute_mro, BuiltinClasses, Converter, MroError, TypeRenderer, ValueStore,
    WellKnown,
};
