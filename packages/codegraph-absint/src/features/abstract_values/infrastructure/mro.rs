//! C3 linearization

use crate::features::abstract_values::infrastructure::ValueStore;
use crate::features::typegraph::ValueId;

/// The bases admit no consistent method resolution order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MroError {
    pub class: String,
    pub bases: Vec<String>,
}

impl std::fmt::Display for MroError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cannot create a consistent method resolution order for {} (bases {})",
            self.class,
            self.bases.join(", ")
        )
    }
}

/// Linearize `class` given its direct `bases`, whose own MROs are already
/// computed
pub fn compute_mro(
    store: &ValueStore,
    class: ValueId,
    bases: &[ValueId],
) -> Result<Vec<ValueId>, MroError> {
    let mut sequences: Vec<Vec<ValueId>> = bases
        .iter()
        .map(|b| match store.class(*b) {
            Some(c) if !c.mro.is_empty() => c.mro.clone(),
            _ => vec![*b],
        })
        .collect();
    sequences.push(bases.to_vec());

    let mut result = vec![class];
    loop {
        sequences.retain(|s| !s.is_empty());
        if sequences.is_empty() {
            return Ok(result);
        }
        // A head that appears in no tail
        let head = sequences
            .iter()
            .map(|s| s[0])
            .find(|candidate| !sequences.iter().any(|s| s[1..].contains(candidate)));
        let Some(head) = head else {
            return Err(MroError {
                class: store.class_name(class).to_string(),
                bases: bases.iter().map(|b| store.class_name(*b).to_string()).collect(),
            });
        };
        result.push(head);
        for seq in sequences.iter_mut() {
            if seq[0] == head {
                seq.remove(0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::abstract_values::domain::{AbstractValue, Class};
    use indexmap::IndexMap;

    fn add_class(store: &mut ValueStore, name: &str, bases: &[ValueId]) -> ValueId {
        let id = store.add(AbstractValue::Class(Class {
            name: name.to_string(),
            bases: bases.to_vec(),
            mro: vec![],
            members: IndexMap::new(),
            opaque: false,
            decorators: vec![],
            fields: vec![],
        }));
        let mro = compute_mro(store, id, bases).unwrap();
        store.class_mut(id).unwrap().mro = mro;
        id
    }

    #[test]
    fn test_diamond() {
        let mut store = ValueStore::new();
        let o = add_class(&mut store, "object", &[]);
        let a = add_class(&mut store, "A", &[o]);
        let b = add_class(&mut store, "B", &[a]);
        let c = add_class(&mut store, "C", &[a]);
        let d = add_class(&mut store, "D", &[b, c]);
        assert_eq!(store.class(d).unwrap().mro, vec![d, b, c, a, o]);
    }

    #[test]
    fn test_inconsistent_order() {
        let mut store = ValueStore::new();
        let o = add_class(&mut store, "object", &[]);
        let a = add_class(&mut store, "A", &[o]);
        let b = add_class(&mut store, "B", &[a]);
        let bad = store.add(AbstractValue::Unsolvable);
        let err = compute_mro(&store, bad, &[a, b]).unwrap_err();
        assert_eq!(err.bases, vec!["A".to_string(), "B".to_string()]);
    }
}
