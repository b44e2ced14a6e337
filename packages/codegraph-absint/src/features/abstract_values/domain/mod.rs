mod types;
mod value;

pub use types::{Type, TypeKind};
pub use value::{
    AbstractValue, Annotation, BuiltinFunction, BuiltinReturn, Class, Field, Generator,
    GeneratorKind, Instance, InterpreterFunction, LateKind, Literal, Namespace, TypingForm,
};
