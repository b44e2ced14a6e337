//! Per-scope record of assignments and annotations
//!
//! Scopes are keyed by name (`<module>`, a class name, a function name).
//! A scope's tables hold the most recent run of a frame with that name.
//! The tracker keeps two views: the ordered list of operations per scope,
//! which gives field declaration order for record-like classes, and the
//! merged declared/observed state per annotated name.

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::features::abstract_values::{Annotation, Field};
use crate::features::annotations::domain::{Local, LocalOp, LocalOpKind};
use crate::features::typegraph::VariableId;

/// Compiler temporaries and class-body bookkeeping names
static UNTRACKED_NAME: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^(\.\d+|__(module|qualname|annotations|doc)__)$").ok());

pub fn is_tracked_name(name: &str) -> bool {
    UNTRACKED_NAME
        .as_ref()
        .map_or(true, |re| !re.is_match(name))
}

#[derive(Debug, Default)]
pub struct LocalTracker {
    local_ops: IndexMap<String, Vec<LocalOp>>,
    annotated_locals: IndexMap<String, IndexMap<String, Local>>,
}

impl LocalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an assignment; returns the name's entry if it is annotated
    pub fn record_assign(
        &mut self,
        scope: &str,
        name: &str,
        value: VariableId,
        op_index: usize,
    ) -> Option<&Local> {
        if !is_tracked_name(name) {
            return None;
        }
        self.push_op(scope, name, LocalOpKind::Assign);
        let local = self
            .annotated_locals
            .get_mut(scope)
            .and_then(|names| names.get_mut(name))?;
        local.orig = Some(value);
        local.last_update_op = Some(op_index);
        Some(local)
    }

    /// Record an annotation; the first explicit annotation of a name wins
    pub fn record_annotate(&mut self, scope: &str, name: &str, annotation: Annotation) -> &Local {
        let tracked = is_tracked_name(name);
        if tracked {
            self.push_op(scope, name, LocalOpKind::Annotate);
        }
        let local = self
            .annotated_locals
            .entry(scope.to_string())
            .or_default()
            .entry(name.to_string())
            .or_default();
        if annotation.is_final() {
            local.is_final = true;
        }
        if matches!(annotation, Annotation::ClassVar(_)) {
            local.is_classvar = true;
        }
        if local.typ.is_none() {
            local.typ = Some(annotation);
        }
        local
    }

    /// Forget what an earlier run of `scope` recorded
    pub fn reset_scope(&mut self, scope: &str) {
        self.local_ops.insert(scope.to_string(), Vec::new());
        self.annotated_locals.insert(scope.to_string(), IndexMap::new());
    }

    fn push_op(&mut self, scope: &str, name: &str, kind: LocalOpKind) {
        self.local_ops
            .entry(scope.to_string())
            .or_default()
            .push(LocalOp {
                name: name.to_string(),
                kind,
            });
    }

    pub fn local(&self, scope: &str, name: &str) -> Option<&Local> {
        self.annotated_locals.get(scope)?.get(name)
    }

    pub fn ops(&self, scope: &str) -> &[LocalOp] {
        self.local_ops.get(scope).map_or(&[], Vec::as_slice)
    }

    /// Annotated, non-ClassVar names in declaration order
    pub fn fields(&self, scope: &str) -> Vec<Field> {
        let ops = self.ops(scope);
        let mut fields: Vec<Field> = Vec::new();
        for op in ops.iter().filter(|op| op.is_annotate()) {
            if fields.iter().any(|f| f.name == op.name) {
                continue;
            }
            let classvar = self.local(scope, &op.name).map_or(false, |l| l.is_classvar);
            if classvar {
                continue;
            }
            let has_default = ops.iter().any(|o| o.name == op.name && o.is_assign());
            fields.push(Field {
                name: op.name.clone(),
                has_default,
            });
        }
        fields
    }

    pub fn local_ops(&self) -> &IndexMap<String, Vec<LocalOp>> {
        &self.local_ops
    }

    pub fn annotated_locals(&self) -> &IndexMap<String, IndexMap<String, Local>> {
        &self.annotated_locals
    }

    pub fn into_parts(
        self,
    ) -> (
        IndexMap<String, Vec<LocalOp>>,
        IndexMap<String, IndexMap<String, Local>>,
    ) {
        (self.local_ops, self.annotated_locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::typegraph::ValueId;

    #[test]
    fn test_temporaries_untracked() {
        assert!(!is_tracked_name(".0"));
        assert!(!is_tracked_name("__qualname__"));
        assert!(is_tracked_name("x"));
        assert!(is_tracked_name("__init__"));
    }

    #[test]
    fn test_first_annotation_wins() {
        let mut tracker = LocalTracker::new();
        tracker.record_annotate("<module>", "x", Annotation::Class(ValueId(1)));
        tracker.record_annotate("<module>", "x", Annotation::Class(ValueId(2)));
        tracker.record_assign("<module>", "x", VariableId(9), 4);
        let local = tracker.local("<module>", "x").unwrap();
        assert_eq!(local.typ, Some(Annotation::Class(ValueId(1))));
        assert_eq!(local.orig, Some(VariableId(9)));
        assert_eq!(local.last_update_op, Some(4));
    }

    #[test]
    fn test_unannotated_assign_records_op_only() {
        let mut tracker = LocalTracker::new();
        assert!(tracker.record_assign("f", "y", VariableId(1), 0).is_none());
        assert!(tracker.record_assign("f", ".0", VariableId(1), 1).is_none());
        assert_eq!(tracker.ops("f").len(), 1);
        assert!(tracker.local("f", "y").is_none());
    }

    #[test]
    fn test_fields_in_declaration_order() {
        let mut tracker = LocalTracker::new();
        let int = Annotation::Class(ValueId(1));
        tracker.record_annotate("P", "x", int.clone());
        tracker.record_annotate("P", "y", int.clone());
        tracker.record_assign("P", "y", VariableId(3), 5);
        tracker.record_annotate("P", "count", Annotation::ClassVar(Box::new(int)));
        tracker.record_annotate("P", "z", Annotation::Final(None));

        let fields = tracker.fields("P");
        let names: Vec<&str> = fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);
        assert!(!fields[0].has_default);
        assert!(fields[1].has_default);
        assert!(tracker.local("P", "z").unwrap().is_final);
    }

    #[test]
    fn test_reset_scope_drops_earlier_run() {
        let mut tracker = LocalTracker::new();
        tracker.record_annotate("init", "x", Annotation::Final(None));
        tracker.record_assign("init", "x", VariableId(1), 0);
        tracker.record_assign("other", "z", VariableId(2), 0);

        tracker.reset_scope("init");
        tracker.record_assign("init", "x", VariableId(3), 2);

        assert_eq!(tracker.ops("init").len(), 1);
        assert!(tracker.ops("init")[0].is_assign());
        assert!(tracker.local("init", "x").is_none());
        assert_eq!(tracker.ops("other").len(), 1);
    }
}
