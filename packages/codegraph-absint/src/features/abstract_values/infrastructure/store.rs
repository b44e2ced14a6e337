//! The value arena

use indexmap::IndexMap;

use crate::features::abstract_values::domain::{
    AbstractValue, Class, Instance, InterpreterFunction, Literal,
};
use crate::features::typegraph::{ValueId, VariableId};

/// Owner of every abstract value of one analysis run
#[derive(Debug, Default)]
pub struct ValueStore {
    values: Vec<AbstractValue>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, value: AbstractValue) -> ValueId {
        let id = ValueId::from_index(self.values.len());
        self.values.push(value);
        id
    }

    pub fn get(&self, id: ValueId) -> &AbstractValue {
        &self.values[id.index()]
    }

    pub fn get_mut(&mut self, id: ValueId) -> &mut AbstractValue {
        &mut self.values[id.index()]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ValueId, &AbstractValue)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| (ValueId::from_index(i), v))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Typed accessors
    // ═══════════════════════════════════════════════════════════════════

    pub fn class(&self, id: ValueId) -> Option<&Class> {
        match self.get(id) {
            AbstractValue::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn class_mut(&mut self, id: ValueId) -> Option<&mut Class> {
        match self.get_mut(id) {
            AbstractValue::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn instance(&self, id: ValueId) -> Option<&Instance> {
        match self.get(id) {
            AbstractValue::Instance(i) => Some(i),
            _ => None,
        }
    }

    pub fn function(&self, id: ValueId) -> Option<&InterpreterFunction> {
        match self.get(id) {
            AbstractValue::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn literal(&self, id: ValueId) -> Option<&Literal> {
        self.instance(id)?.literal.as_ref()
    }

    pub fn is_none(&self, id: ValueId) -> bool {
        matches!(self.literal(id), Some(Literal::None))
    }

    pub fn str_literal(&self, id: ValueId) -> Option<&str> {
        match self.literal(id)? {
            Literal::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Class an instance was created from
    pub fn class_of(&self, id: ValueId) -> Option<ValueId> {
        self.instance(id).map(|i| i.class)
    }

    pub fn class_name(&self, class: ValueId) -> &str {
        self.class(class).map_or("?", |c| c.name.as_str())
    }

    /// Human name of any value, for messages
    pub fn describe(&self, id: ValueId) -> String {
        match self.get(id) {
            AbstractValue::Instance(i) => match &i.literal {
                Some(Literal::None) => "None".to_string(),
                _ => self.class_name(i.class).to_string(),
            },
            AbstractValue::Class(c) => format!("type[{}]", c.name),
            AbstractValue::Function(f) => format!("function {}", f.name),
            AbstractValue::Builtin(b) => format!("builtin {}", b.name),
            AbstractValue::Module(m) => format!("module {}", m.name),
            other => other.kind_name().to_string(),
        }
    }

    /// Is `class` (or one of its MRO entries) the class `target`?
    pub fn is_subclass(&self, class: ValueId, target: ValueId) -> bool {
        if class == target {
            return true;
        }
        self.class(class)
            .map_or(false, |c| c.mro.iter().any(|m| *m == target))
    }

    /// Own members of an instance, class, module or namespace
    pub fn members(&self, id: ValueId) -> Option<&IndexMap<String, VariableId>> {
        self.get(id).members()
    }

    pub fn member(&self, id: ValueId, name: &str) -> Option<VariableId> {
        self.members(id)?.get(name).copied()
    }

    pub fn set_member(&mut self, id: ValueId, name: &str, var: VariableId) -> bool {
        match self.get_mut(id).members_mut() {
            Some(members) => {
                members.insert(name.to_string(), var);
                true
            }
            None => false,
        }
    }

    /// First class in the MRO of `class` defining `name`, with the member
    pub fn lookup_in_mro(&self, class: ValueId, name: &str) -> Option<(ValueId, VariableId)> {
        let mro = match self.class(class) {
            Some(c) if !c.mro.is_empty() => c.mro.clone(),
            Some(_) => vec![class],
            None => return None,
        };
        mro.into_iter()
            .find_map(|base| self.member(base, name).map(|var| (base, var)))
    }

    /// Some class on the MRO has an incomplete member table
    pub fn mro_is_opaque(&self, class: ValueId) -> bool {
        match self.class(class) {
            Some(c) => {
                c.opaque || c.mro.iter().any(|m| self.class(*m).map_or(false, |k| k.opaque))
            }
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn class(name: &str) -> AbstractValue {
        AbstractValue::Class(Class {
            name: name.to_string(),
            bases: vec![],
            mro: vec![],
            members: IndexMap::new(),
            opaque: false,
            decorators: vec![],
            fields: vec![],
        })
    }

    #[test]
    fn test_ids_follow_insertion_order() {
        let mut store = ValueStore::new();
        let a = store.add(AbstractValue::Unsolvable);
        let b = store.add(class("A"));
        assert_eq!(a, ValueId(0));
        assert_eq!(b, ValueId(1));
        assert_eq!(store.len(), 2);
        assert_eq!(store.class_name(b), "A");
    }

    #[test]
    fn test_members_and_mro_lookup() {
        let mut store = ValueStore::new();
        let base = store.add(class("Base"));
        let derived = store.add(class("Derived"));
        store.class_mut(base).unwrap().mro = vec![base];
        store.class_mut(derived).unwrap().mro = vec![derived, base];
        assert!(store.set_member(base, "f", VariableId(7)));

        assert_eq!(store.lookup_in_mro(derived, "f"), Some((base, VariableId(7))));
        assert_eq!(store.lookup_in_mro(derived, "g"), None);
        assert!(store.is_subclass(derived, base));
        assert!(!store.is_subclass(base, derived));
    }

    #[test]
    fn test_literal_accessors() {
        let mut store = ValueStore::new();
        let cls = store.add(class("str"));
        let s = store.add(AbstractValue::Instance(
            Instance::of(cls).with_literal(Literal::Str("x".into())),
        ));
        assert_eq!(store.str_literal(s), Some("x"));
        assert!(!store.is_none(s));
        assert_eq!(store.describe(s), "str");
        assert!(!store.set_member(s, "x", VariableId(0)) || store.member(s, "x").is_some());
    }
}
