//! Turning values into annotations
//!
//! Annotations arrive either as values (the `__annotations__` of a function,
//! the operand of a subscript on a `typing` form) or as text from the
//! director (variable annotations, type comments, quoted forward references).
//! Both end up as [`Annotation`]s. Names a text annotation refers to that do
//! not exist yet become late placeholders, resolved once the module binds
//! them.

use crate::features::abstract_values::{AbstractValue, Annotation, LateKind, TypingForm};
use crate::features::annotations::{parse_type_expr, TypeExpr};
use crate::features::diagnostics::ErrorKind;
use crate::features::typegraph::{CfgNodeId, ValueId, VariableId};
use crate::features::vm::infrastructure::context::VirtualMachine;

/// What a value means in annotation position, computed before reporting
enum AnnotationShape {
    Ready(Annotation),
    Text(String),
    Unparameterized(TypingForm),
    NotAType(String),
}

impl VirtualMachine<'_> {
    // ═══════════════════════════════════════════════════════════════════
    // Text
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn annotation_from_text(&mut self, text: &str, node: CfgNodeId) -> Annotation {
        let parsed = match parse_type_expr(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                self.report(
                    ErrorKind::InvalidAnnotation,
                    format!("Invalid type annotation '{text}': {e}"),
                );
                return Annotation::Any;
            }
        };
        let previous = self.ctx.late_expr.replace(text.to_string());
        let annotation = self.annotation_from_expr(&parsed, node);
        self.ctx.late_expr = previous;
        annotation
    }

    pub(crate) fn annotation_from_expr(&mut self, expr: &TypeExpr, node: CfgNodeId) -> Annotation {
        match expr {
            TypeExpr::Name(name) => match self.resolve_dotted(name, node) {
                Some(var) => self.annotation_of_var(var, node),
                None => Annotation::Any,
            },
            TypeExpr::Subscript { base, args } => {
                let Some(var) = self.resolve_dotted(base, node) else {
                    return Annotation::Any;
                };
                let mut params = Vec::with_capacity(args.len());
                for arg in args {
                    params.push(self.annotation_from_expr(arg, node));
                }
                let mut options = Vec::new();
                for base in self.data(var) {
                    options.push(self.subscript_annotation(base, params.clone()));
                }
                union_or_any(options)
            }
            TypeExpr::Union(items) => {
                let mut options = Vec::with_capacity(items.len());
                for item in items {
                    options.push(self.annotation_from_expr(item, node));
                }
                union_or_any(options)
            }
            TypeExpr::List(_) | TypeExpr::Ellipsis => Annotation::Any,
        }
    }

    /// Look up `a.b.c`: the head through the usual tiers, the rest as members
    fn resolve_dotted(&mut self, dotted: &str, node: CfgNodeId) -> Option<VariableId> {
        let mut parts = dotted.split('.');
        let head = parts.next()?;
        let found = self
            .lookup_name(head, node, true)
            .ok()
            .and_then(|r| r.variable());
        let Some(mut var) = found else {
            self.report(ErrorKind::NameError, format!("Name '{head}' is not defined"));
            return None;
        };
        for attr in parts {
            let data = self.data(var);
            if data
                .iter()
                .any(|v| matches!(self.value(*v), AbstractValue::Late { .. } | AbstractValue::Unsolvable))
            {
                return Some(var);
            }
            let members: Vec<VariableId> = data
                .iter()
                .filter_map(|v| self.ctx.values.member(*v, attr))
                .collect();
            match members.as_slice() {
                [] => {
                    self.report(
                        ErrorKind::NameError,
                        format!("Name '{dotted}' is not defined"),
                    );
                    return None;
                }
                [single] => var = *single,
                many => {
                    let joined = self.ctx.program.new_variable();
                    for m in many {
                        self.ctx.program.paste_variable(joined, *m, None, &[]);
                    }
                    var = joined;
                }
            }
        }
        Some(var)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Values
    // ═══════════════════════════════════════════════════════════════════

    pub(crate) fn annotation_of_var(&mut self, var: VariableId, node: CfgNodeId) -> Annotation {
        let mut data = self.ctx.program.filtered_data(var, node);
        if data.is_empty() {
            data = self.data(var);
        }
        let mut options = Vec::with_capacity(data.len());
        for value in data {
            options.push(self.annotation_of_value(value, node));
        }
        union_or_any(options)
    }

    pub(crate) fn annotation_of_value(&mut self, value: ValueId, node: CfgNodeId) -> Annotation {
        match self.annotation_shape(value) {
            AnnotationShape::Ready(annotation) => annotation,
            AnnotationShape::Text(text) => self.annotation_from_text(&text, node),
            AnnotationShape::Unparameterized(form) => {
                self.report(
                    ErrorKind::InvalidAnnotation,
                    format!("Invalid type annotation '{}': Must be parameterized", form.name()),
                );
                Annotation::Any
            }
            AnnotationShape::NotAType(described) => {
                self.report(
                    ErrorKind::InvalidAnnotation,
                    format!("Invalid type annotation '{described}': Not a type"),
                );
                Annotation::Any
            }
        }
    }

    fn annotation_shape(&self, value: ValueId) -> AnnotationShape {
        let classes = self.ctx.converter.classes;
        if value == classes.none_type || self.ctx.values.is_none(value) {
            return AnnotationShape::Ready(Annotation::NoneType);
        }
        if let Some(text) = self.ctx.values.str_literal(value) {
            return AnnotationShape::Text(text.to_string());
        }
        let annotation = match self.value(value) {
            AbstractValue::Class(_) => Annotation::Class(value),
            AbstractValue::Annotation(annotation) => annotation.clone(),
            AbstractValue::Late {
                id,
                kind: LateKind::Annotation,
            } => Annotation::Late(*id),
            AbstractValue::Unsolvable | AbstractValue::Late { .. } => Annotation::Any,
            AbstractValue::TypingForm(form) => match form {
                TypingForm::Any => Annotation::Any,
                TypingForm::Callable => Annotation::Callable,
                TypingForm::Final => Annotation::Final(None),
                TypingForm::Type => Annotation::Class(classes.type_),
                TypingForm::Union | TypingForm::Optional | TypingForm::ClassVar => {
                    return AnnotationShape::Unparameterized(*form);
                }
                container => match self.container_class(*container) {
                    Some(class) => Annotation::Class(class),
                    None => Annotation::Any,
                },
            },
            _ => return AnnotationShape::NotAType(self.ctx.values.describe(value)),
        };
        AnnotationShape::Ready(annotation)
    }

    fn container_class(&self, form: TypingForm) -> Option<ValueId> {
        form.container()
            .and_then(|name| self.ctx.converter.builtin_class(name))
    }

    /// `base[params]`
    pub(crate) fn subscript_annotation(
        &mut self,
        base: ValueId,
        params: Vec<Annotation>,
    ) -> Annotation {
        let first = || params.first().cloned().unwrap_or(Annotation::Any);
        match self.value(base) {
            AbstractValue::TypingForm(form) => match form {
                TypingForm::Union => union_or_any(params),
                TypingForm::Optional => {
                    let mut options = params;
                    options.push(Annotation::NoneType);
                    Annotation::union(options)
                }
                TypingForm::Final => Annotation::Final(Some(Box::new(first()))),
                TypingForm::ClassVar => Annotation::ClassVar(Box::new(first())),
                TypingForm::Callable => Annotation::Callable,
                TypingForm::Any => Annotation::Any,
                TypingForm::Type => Annotation::Class(self.ctx.converter.classes.type_),
                container => match self.container_class(*container) {
                    Some(class) => Annotation::Generic {
                        base: class,
                        params,
                    },
                    None => Annotation::Any,
                },
            },
            AbstractValue::Class(_) => Annotation::Generic { base, params },
            AbstractValue::Late { id, .. } => Annotation::Late(*id),
            AbstractValue::Unsolvable => Annotation::Any,
            _ => {
                let described = self.ctx.values.describe(base);
                self.report(
                    ErrorKind::InvalidAnnotation,
                    format!("Invalid type annotation '{described}': Not a generic type"),
                );
                Annotation::Any
            }
        }
    }

    /// Replace resolved forward references by what they resolved to
    pub(crate) fn resolve_late(&self, annotation: Annotation) -> Annotation {
        match annotation {
            Annotation::Late(id) => match self
                .ctx
                .late_annotations
                .get(id)
                .and_then(|l| l.resolved.clone())
            {
                Some(resolved) => self.resolve_late(resolved),
                None => Annotation::Late(id),
            },
            Annotation::Union(options) => Annotation::union(
                options.into_iter().map(|o| self.resolve_late(o)).collect(),
            ),
            Annotation::Generic { base, params } => Annotation::Generic {
                base,
                params: params.into_iter().map(|p| self.resolve_late(p)).collect(),
            },
            Annotation::Final(Some(inner)) => {
                Annotation::Final(Some(Box::new(self.resolve_late(*inner))))
            }
            Annotation::ClassVar(inner) => Annotation::ClassVar(Box::new(self.resolve_late(*inner))),
            other => other,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Matching
    // ═══════════════════════════════════════════════════════════════════

    /// Could `value` be an instance of what `annotation` describes?
    pub(crate) fn value_matches(&self, value: ValueId, annotation: &Annotation) -> bool {
        match annotation {
            Annotation::Any | Annotation::Late(_) | Annotation::Callable | Annotation::Final(None) => {
                true
            }
            Annotation::NoneType => {
                self.ctx.values.is_none(value)
                    || matches!(self.value(value), AbstractValue::Unsolvable | AbstractValue::Late { .. })
            }
            Annotation::Class(class) | Annotation::Generic { base: class, .. } => {
                self.matches_class(value, *class)
            }
            Annotation::Union(options) => options.iter().any(|o| self.value_matches(value, o)),
            Annotation::Final(Some(inner)) | Annotation::ClassVar(inner) => {
                self.value_matches(value, inner)
            }
        }
    }

    fn matches_class(&self, value: ValueId, class: ValueId) -> bool {
        let classes = self.ctx.converter.classes;
        let values = &self.ctx.values;
        if class == classes.object {
            return true;
        }
        match values.get(value) {
            AbstractValue::Unsolvable | AbstractValue::Late { .. } | AbstractValue::Empty => true,
            AbstractValue::Instance(instance) => {
                let actual = instance.class;
                values.is_subclass(actual, class)
                    || (class == classes.float && values.is_subclass(actual, classes.int))
                    || (values.mro_is_opaque(actual) && values.class(actual).map_or(true, |c| !c.opaque))
            }
            AbstractValue::Class(_) => class == classes.type_,
            _ => false,
        }
    }
}

fn union_or_any(options: Vec<Annotation>) -> Annotation {
    if options.is_empty() {
        Annotation::Any
    } else {
        Annotation::union(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalysisConfig;
    use crate::features::abstract_values::Namespace;
    use crate::features::imports::NullImporter;
    use crate::features::vm::infrastructure::context::AnalysisContext;
    use crate::features::vm::infrastructure::frames::{FrameOutcome, FrameSetup};
    use crate::shared::models::{Assembler, Director};
    use std::rc::Rc;

    fn with_vm(f: impl FnOnce(&mut VirtualMachine<'_>, CfgNodeId)) {
        let director = Director::new();
        let importer = NullImporter;
        let ctx = AnalysisContext::new(AnalysisConfig::default(), &director, &importer);
        let mut vm = VirtualMachine::new(ctx);
        let globals = vm
            .ctx
            .values
            .add(AbstractValue::Module(Namespace::new("__main__")));
        let typing = vm.ctx.converter.overlay("typing").unwrap();
        let root = vm.ctx.root;
        let typing_var = vm.new_var(&[typing], &[], root);
        vm.ctx.values.set_member(globals, "typing", typing_var);
        let code = Rc::new(Assembler::module().finish().unwrap());
        let FrameOutcome::Ready(frame) =
            vm.make_frame(root, FrameSetup::new(code, globals).locals(globals))
        else {
            panic!("frame not created");
        };
        let start = frame.start_node;
        vm.ctx.frames.push(*frame);
        f(&mut vm, start);
    }

    #[test]
    fn test_text_annotations() {
        with_vm(|vm, node| {
            let classes = vm.ctx.converter.classes;
            assert_eq!(vm.annotation_from_text("int", node), Annotation::Class(classes.int));
            assert_eq!(
                vm.annotation_from_text("typing.Optional[int]", node),
                Annotation::Union(vec![Annotation::Class(classes.int), Annotation::NoneType])
            );
            assert_eq!(
                vm.annotation_from_text("typing.List[str]", node),
                Annotation::Generic {
                    base: classes.list,
                    params: vec![Annotation::Class(classes.str)]
                }
            );
            assert_eq!(
                vm.annotation_from_text("typing.Final", node),
                Annotation::Final(None)
            );
            assert_eq!(
                vm.annotation_from_text("int | None", node),
                Annotation::Union(vec![Annotation::Class(classes.int), Annotation::NoneType])
            );
            assert!(vm.ctx.errorlog.is_empty());
        });
    }

    #[test]
    fn test_bare_union_is_invalid() {
        with_vm(|vm, node| {
            assert_eq!(vm.annotation_from_text("typing.Union", node), Annotation::Any);
            assert!(vm.ctx.errorlog.has_kind(ErrorKind::InvalidAnnotation));
        });
    }

    #[test]
    fn test_value_matching() {
        with_vm(|vm, _| {
            let classes = vm.ctx.converter.classes;
            let one = vm.ctx.converter.int_constant(&mut vm.ctx.values, 1);
            let text = vm.ctx.converter.str_constant(&mut vm.ctx.values, "a");
            let float = Annotation::Class(classes.float);
            assert!(vm.value_matches(one, &float));
            assert!(!vm.value_matches(text, &float));
            let optional = Annotation::union(vec![Annotation::Class(classes.str), Annotation::NoneType]);
            assert!(vm.value_matches(vm.ctx.converter.well_known.none, &optional));
            assert!(vm.value_matches(text, &optional));
            assert!(vm.value_matches(vm.ctx.converter.well_known.unsolvable, &float));
        });
    }
}
