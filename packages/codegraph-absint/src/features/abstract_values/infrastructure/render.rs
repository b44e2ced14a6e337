//! Rendering values and annotations as [`Type`]s

use crate::features::abstract_values::domain::{AbstractValue, Annotation, GeneratorKind, Type};
use crate::features::abstract_values::infrastructure::ValueStore;
use crate::features::typegraph::{Program, ValueId, VariableId};

/// Depth at which nested containers render as `Any`
const MAX_RENDER_DEPTH: usize = 4;

pub struct TypeRenderer<'a> {
    values: &'a ValueStore,
    program: &'a Program,
}

impl<'a> TypeRenderer<'a> {
    pub fn new(values: &'a ValueStore, program: &'a Program) -> Self {
        Self { values, program }
    }

    /// Union of the types of the given values
    pub fn union_of(&self, data: &[ValueId]) -> Type {
        self.union_at(data, 0)
    }

    /// Union over every binding of a variable, unfiltered
    pub fn variable(&self, var: VariableId) -> Type {
        self.variable_at(var, 0)
    }

    pub fn value(&self, value: ValueId) -> Type {
        self.value_at(value, 0)
    }

    fn union_at(&self, data: &[ValueId], depth: usize) -> Type {
        Type::union(data.iter().map(|v| self.value_at(*v, depth)).collect())
    }

    fn variable_at(&self, var: VariableId, depth: usize) -> Type {
        if depth > MAX_RENDER_DEPTH {
            return Type::any();
        }
        self.union_at(&self.program.data(var), depth + 1)
    }

    fn value_at(&self, value: ValueId, depth: usize) -> Type {
        match self.values.get(value) {
            AbstractValue::Unsolvable | AbstractValue::Late { .. } => Type::any(),
            AbstractValue::Empty | AbstractValue::Deleted | AbstractValue::Null => Type::never(),
            AbstractValue::Instance(instance) => {
                if self.values.is_none(value) {
                    return Type::none();
                }
                let name = self.values.class_name(instance.class).to_string();
                match &instance.elements {
                    Some(elements) if name == "tuple" => Type::generic(
                        name,
                        elements.iter().map(|e| self.variable_at(*e, depth)).collect(),
                    ),
                    Some(elements) if !elements.is_empty() => {
                        let params: Vec<Type> =
                            elements.iter().map(|e| self.variable_at(*e, depth)).collect();
                        Type::generic(name, vec![Type::union(params)])
                    }
                    _ => Type::simple(name),
                }
            }
            AbstractValue::Class(class) => Type::class_object(class.name.clone()),
            AbstractValue::Function(f) => Type::callable(
                f.code.positional_params().iter().map(|_| Type::any()).collect(),
                Type::any(),
            ),
            AbstractValue::BoundMethod { .. }
            | AbstractValue::Builtin(_)
            | AbstractValue::BuildClass => Type::callable(Vec::new(), Type::any()),
            AbstractValue::Module(m) => Type::module(m.name.clone()),
            AbstractValue::Namespace(_) => Type::simple("dict"),
            AbstractValue::Generator(g) => {
                let base = match g.kind {
                    GeneratorKind::Generator => "Generator",
                    GeneratorKind::Coroutine => "Coroutine",
                    GeneratorKind::AsyncGenerator => "AsyncGenerator",
                };
                Type::generic(
                    base,
                    vec![self.variable_at(g.yielded, depth), self.variable_at(g.returned, depth)],
                )
            }
            AbstractValue::Code(_) => Type::simple("code"),
            AbstractValue::TypingForm(form) => Type::simple(form.name()),
            AbstractValue::Annotation(a) => Type::class_object(self.annotation(a).to_string()),
        }
    }

    /// The declared type an annotation stands for
    pub fn annotation(&self, annotation: &Annotation) -> Type {
        match annotation {
            Annotation::Any | Annotation::Late(_) => Type::any(),
            Annotation::NoneType => Type::none(),
            Annotation::Class(c) => Type::simple(self.values.class_name(*c)),
            Annotation::Union(options) => {
                Type::union(options.iter().map(|o| self.annotation(o)).collect())
            }
            Annotation::Generic { base, params } => Type::generic(
                self.values.class_name(*base),
                params.iter().map(|p| self.annotation(p)).collect(),
            ),
            Annotation::Callable => Type::callable(Vec::new(), Type::any()),
            Annotation::Final(Some(inner)) | Annotation::ClassVar(inner) => self.annotation(inner),
            Annotation::Final(None) => Type::any(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::abstract_values::infrastructure::Converter;
    use crate::shared::models::Constant;

    #[test]
    fn test_render_constants_and_union() {
        let mut values = ValueStore::new();
        let mut program = Program::new();
        let root = program.new_cfg_node("root", None);
        let mut conv = Converter::new(&mut values, &mut program, root);
        let one = conv.constant(&mut values, &mut program, &Constant::Int(1));
        let a = conv.constant(&mut values, &mut program, &Constant::Str("a".into()));
        let t = conv.constant(
            &mut values,
            &mut program,
            &Constant::Tuple(vec![Constant::Int(1), Constant::None]),
        );

        let r = TypeRenderer::new(&values, &program);
        assert_eq!(r.union_of(&[one, a]).to_string(), "int | str");
        assert_eq!(r.value(t).to_string(), "tuple[int, None]");
        assert_eq!(r.value(conv.classes.int).to_string(), "type[int]");
        assert_eq!(r.union_of(&[]).to_string(), "Never");
    }

    #[test]
    fn test_render_annotation() {
        let mut values = ValueStore::new();
        let mut program = Program::new();
        let root = program.new_cfg_node("root", None);
        let conv = Converter::new(&mut values, &mut program, root);
        let r = TypeRenderer::new(&values, &program);
        let ann = Annotation::Generic {
            base: conv.classes.dict,
            params: vec![Annotation::Class(conv.classes.str), Annotation::Any],
        };
        assert_eq!(r.annotation(&ann).to_string(), "dict[str, Any]");
        let opt = Annotation::union(vec![Annotation::Class(conv.classes.int), Annotation::NoneType]);
        assert_eq!(r.annotation(&opt).to_string(), "int | None");
    }
}
