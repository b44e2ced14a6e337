//! Diagnostic records

use serde::{Deserialize, Serialize};

use crate::features::frame_state::SimpleFrame;

/// Category of a recoverable problem in the analyzed program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NameError,
    AttributeError,
    ImportError,
    UnsupportedOperands,
    NotCallable,
    WrongArgCount,
    MissingParameter,
    WrongKeywordArgs,
    DuplicateKeyword,
    IncompleteMatch,
    RedundantMatch,
    AssigningToFinal,
    AnnotationTypeMismatch,
    InvalidAnnotation,
    BadUnpacking,
    MroError,
    NotIterable,
    UnsupportedOperation,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NameError => "name-error",
            ErrorKind::AttributeError => "attribute-error",
            ErrorKind::ImportError => "import-error",
            ErrorKind::UnsupportedOperands => "unsupported-operands",
            ErrorKind::NotCallable => "not-callable",
            ErrorKind::WrongArgCount => "wrong-arg-count",
            ErrorKind::MissingParameter => "missing-parameter",
            ErrorKind::WrongKeywordArgs => "wrong-keyword-args",
            ErrorKind::DuplicateKeyword => "duplicate-keyword",
            ErrorKind::IncompleteMatch => "incomplete-match",
            ErrorKind::RedundantMatch => "redundant-match",
            ErrorKind::AssigningToFinal => "assigning-to-final",
            ErrorKind::AnnotationTypeMismatch => "annotation-type-mismatch",
            ErrorKind::InvalidAnnotation => "invalid-annotation",
            ErrorKind::BadUnpacking => "bad-unpacking",
            ErrorKind::MroError => "mro-error",
            ErrorKind::NotIterable => "not-iterable",
            ErrorKind::UnsupportedOperation => "unsupported-operation",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One queued diagnostic, attributed to the full call stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Outermost frame first
    pub stack: Vec<SimpleFrame>,
    pub kind: ErrorKind,
    pub message: String,
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Diagnostic {
    pub fn new(stack: Vec<SimpleFrame>, kind: ErrorKind, message: impl Into<String>) -> Self {
        let line = stack.last().map(|f| f.line);
        Self {
            stack,
            kind,
            message: message.into(),
            line,
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "line {}: {} [{}]", line, self.message, self.kind)?,
            None => write!(f, "{} [{}]", self.message, self.kind)?,
        }
        if let Some(details) = &self.details {
            write!(f, "\n  {}", details)?;
        }
        Ok(())
    }
}
