//! Source-level side information for the instruction stream.
//!
//! The director is produced next to the bytecode and tells the engine what
//! the source said that the bytecode lost: `# type: ignore` lines, type
//! comments, decorators, variable annotations and the shape of `match`
//! statements.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Everything known about one source line
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineInfo {
    /// Diagnostics on this line are suppressed
    pub ignored: bool,
    /// `# type: T` comment on an assignment
    pub type_comment: Option<String>,
    /// Decorator names applied to the definition starting on this line
    pub decorators: Vec<String>,
    /// Variable annotations (`name: expr`) written on this line
    pub annotations: IndexMap<String, String>,
}

/// One `case` clause
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseInfo {
    pub line: u32,
    /// `case _:` or a bare capture pattern
    #[serde(default)]
    pub is_wildcard: bool,
    #[serde(default)]
    pub has_guard: bool,
}

/// Line range and clauses of one `match` statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchStatement {
    pub start: u32,
    pub end: u32,
    pub cases: Vec<CaseInfo>,
}

impl MatchStatement {
    pub fn has_wildcard(&self) -> bool {
        self.cases.iter().any(|c| c.is_wildcard && !c.has_guard)
    }

    pub fn case_at(&self, line: u32) -> Option<&CaseInfo> {
        self.cases.iter().find(|c| c.line == line)
    }

    pub fn contains(&self, line: u32) -> bool {
        self.start <= line && line <= self.end
    }
}

/// Line → metadata map plus the match statements of the unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Director {
    pub lines: BTreeMap<u32, LineInfo>,
    pub matches: Vec<MatchStatement>,
}

impl Director {
    pub fn new() -> Self {
        Self::default()
    }

    fn line_mut(&mut self, line: u32) -> &mut LineInfo {
        self.lines.entry(line).or_default()
    }

    /// Builder: mark a line as `# type: ignore`
    pub fn ignore_line(mut self, line: u32) -> Self {
        self.line_mut(line).ignored = true;
        self
    }

    /// Builder: attach a type comment
    pub fn type_comment(mut self, line: u32, comment: impl Into<String>) -> Self {
        self.line_mut(line).type_comment = Some(comment.into());
        self
    }

    /// Builder: attach decorators to a definition line
    pub fn decorators(mut self, line: u32, names: &[&str]) -> Self {
        self.line_mut(line)
            .decorators
            .extend(names.iter().map(|s| s.to_string()));
        self
    }

    /// Builder: record `name: annotation` on a line
    pub fn annotation(mut self, line: u32, name: &str, annotation: &str) -> Self {
        self.line_mut(line)
            .annotations
            .insert(name.to_string(), annotation.to_string());
        self
    }

    /// Builder: register a match statement
    pub fn match_statement(mut self, statement: MatchStatement) -> Self {
        self.matches.push(statement);
        self
    }

    pub fn line(&self, line: u32) -> Option<&LineInfo> {
        self.lines.get(&line)
    }

    pub fn is_ignored(&self, line: u32) -> bool {
        self.lines.get(&line).map_or(false, |l| l.ignored)
    }

    pub fn type_comment_at(&self, line: u32) -> Option<&str> {
        self.lines.get(&line)?.type_comment.as_deref()
    }

    pub fn decorators_at(&self, line: u32) -> &[String] {
        self.lines
            .get(&line)
            .map(|l| l.decorators.as_slice())
            .unwrap_or(&[])
    }

    pub fn annotation_at(&self, line: u32, name: &str) -> Option<&str> {
        self.lines.get(&line)?.annotations.get(name).map(String::as_str)
    }

    /// The match statement with a `case` clause on this line
    pub fn match_for_case_line(&self, line: u32) -> Option<(usize, &MatchStatement)> {
        self.matches
            .iter()
            .enumerate()
            .find(|(_, m)| m.case_at(line).is_some())
    }

    /// Innermost match statement spanning this line
    pub fn match_containing(&self, line: u32) -> Option<(usize, &MatchStatement)> {
        self.matches
            .iter()
            .enumerate()
            .filter(|(_, m)| m.contains(line))
            .min_by_key(|(_, m)| m.end - m.start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_line_info() {
        let director = Director::new()
            .ignore_line(3)
            .type_comment(4, "int")
            .annotation(5, "x", "str")
            .decorators(7, &["dataclass"]);

        assert!(director.is_ignored(3));
        assert!(!director.is_ignored(4));
        assert_eq!(director.type_comment_at(4), Some("int"));
        assert_eq!(director.annotation_at(5, "x"), Some("str"));
        assert_eq!(director.decorators_at(7), &["dataclass".to_string()]);
        assert!(director.decorators_at(8).is_empty());
    }

    #[test]
    fn test_match_lookup() {
        let director = Director::new().match_statement(MatchStatement {
            start: 10,
            end: 14,
            cases: vec![
                CaseInfo { line: 11, is_wildcard: false, has_guard: false },
                CaseInfo { line: 13, is_wildcard: true, has_guard: false },
            ],
        });

        let (idx, stmt) = director.match_for_case_line(13).unwrap();
        assert_eq!(idx, 0);
        assert!(stmt.has_wildcard());
        assert!(director.match_for_case_line(12).is_none());
        assert!(director.match_containing(12).is_some());
        assert!(director.match_containing(15).is_none());
    }
}
