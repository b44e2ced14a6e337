//! Call arguments

use indexmap::IndexMap;

use crate::features::typegraph::VariableId;

/// Arguments of one call site
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallArgs {
    pub posargs: Vec<VariableId>,
    pub namedargs: IndexMap<String, VariableId>,
    /// `*args` whose length may be unknown
    pub starargs: Option<VariableId>,
    /// `**kwargs` whose keys may be unknown
    pub starstarargs: Option<VariableId>,
}

impl CallArgs {
    pub fn new(posargs: Vec<VariableId>) -> Self {
        Self {
            posargs,
            ..Self::default()
        }
    }

    pub fn with_named(mut self, name: impl Into<String>, var: VariableId) -> Self {
        self.namedargs.insert(name.into(), var);
        self
    }

    pub fn with_starargs(mut self, var: VariableId) -> Self {
        self.starargs = Some(var);
        self
    }

    pub fn with_starstarargs(mut self, var: VariableId) -> Self {
        self.starstarargs = Some(var);
        self
    }

    /// Same arguments with a receiver in front (bound methods)
    pub fn prepend(&self, receiver: VariableId) -> Self {
        let mut args = self.clone();
        args.posargs.insert(0, receiver);
        args
    }

    pub fn has_unknown_length(&self) -> bool {
        self.starargs.is_some() || self.starstarargs.is_some()
    }

    /// Every variable passed, positional first
    pub fn all_vars(&self) -> Vec<VariableId> {
        self.posargs
            .iter()
            .chain(self.namedargs.values())
            .chain(self.starargs.iter())
            .chain(self.starstarargs.iter())
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_keeps_original() {
        let args = CallArgs::new(vec![VariableId(1)]).with_named("k", VariableId(2));
        let bound = args.prepend(VariableId(0));
        assert_eq!(bound.posargs, vec![VariableId(0), VariableId(1)]);
        assert_eq!(args.posargs, vec![VariableId(1)]);
        assert_eq!(bound.all_vars(), vec![VariableId(0), VariableId(1), VariableId(2)]);
        assert!(!bound.has_unknown_length());
        assert!(bound.with_starargs(VariableId(3)).has_unknown_length());
    }
}
