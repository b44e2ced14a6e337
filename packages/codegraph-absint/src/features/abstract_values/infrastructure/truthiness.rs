//! Truthiness of abstract values

use crate::features::abstract_values::domain::{AbstractValue, Literal};
use crate::features::abstract_values::infrastructure::ValueStore;
use crate::features::typegraph::ValueId;

/// Could `value` evaluate to `branch` in a boolean context?
pub fn compatible_with(store: &ValueStore, value: ValueId, branch: bool) -> bool {
    match store.get(value) {
        AbstractValue::Instance(instance) => {
            if let Some(literal) = &instance.literal {
                return match literal {
                    Literal::None => !branch,
                    Literal::Bool(b) => *b == branch,
                    Literal::Int(i) => (*i != 0) == branch,
                    Literal::Float(f) => (*f != 0.0) == branch,
                    Literal::Str(s) => !s.is_empty() == branch,
                    Literal::Bytes(b) => !b.is_empty() == branch,
                    Literal::Ellipsis => branch,
                };
            }
            // A tuple's length is fixed; other containers can change size
            let is_tuple = store.class(instance.class).map_or(false, |c| c.name == "tuple");
            match &instance.elements {
                Some(elements) if is_tuple => !elements.is_empty() == branch,
                _ => true,
            }
        }
        AbstractValue::Class(_)
        | AbstractValue::Function(_)
        | AbstractValue::BoundMethod { .. }
        | AbstractValue::Builtin(_)
        | AbstractValue::Module(_)
        | AbstractValue::Code(_)
        | AbstractValue::Generator(_)
        | AbstractValue::BuildClass
        | AbstractValue::TypingForm(_)
        | AbstractValue::Annotation(_) => branch,
        AbstractValue::Unsolvable
        | AbstractValue::Empty
        | AbstractValue::Deleted
        | AbstractValue::Null
        | AbstractValue::Namespace(_)
        | AbstractValue::Late { .. } => true,
    }
}
