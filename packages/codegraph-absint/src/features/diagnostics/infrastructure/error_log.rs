//! Insertion-ordered diagnostic queue

use tracing::debug;

use crate::features::diagnostics::domain::{Diagnostic, ErrorKind};
use crate::features::diagnostics::ports::DiagnosticSink;
use crate::shared::models::Director;

/// Every diagnostic of one analysis run
pub struct ErrorLog {
    diagnostics: Vec<Diagnostic>,
    sink: Option<Box<dyn DiagnosticSink>>,
    enabled: bool,
    suppressed: usize,
}

impl std::fmt::Debug for ErrorLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorLog")
            .field("diagnostics", &self.diagnostics)
            .field("sink", &self.sink.as_ref().map(|s| s.name()))
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl ErrorLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            diagnostics: Vec::new(),
            sink: None,
            enabled,
            suppressed: 0,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Queue `diagnostic` unless reporting is off, its line is ignored or an
    /// identical diagnostic is already queued
    pub fn add(&mut self, diagnostic: Diagnostic, director: &Director) {
        if !self.enabled {
            return;
        }
        if diagnostic.line.map_or(false, |line| director.is_ignored(line)) {
            debug!(kind = %diagnostic.kind, line = ?diagnostic.line, "Diagnostic on ignored line");
            self.suppressed += 1;
            return;
        }
        // Re-running a function (one call per call site) repeats its errors
        if self.diagnostics.contains(&diagnostic) {
            return;
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.report(&diagnostic);
        }
        self.diagnostics.push(diagnostic);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Diagnostics dropped because their line was ignored
    pub fn suppressed(&self) -> usize {
        self.suppressed
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.diagnostics.iter().any(|d| d.kind == kind)
    }

    pub fn of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::frame_state::SimpleFrame;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn diag(line: u32, kind: ErrorKind) -> Diagnostic {
        let frame = SimpleFrame {
            name: "<module>".into(),
            line,
            filename: "t.py".into(),
        };
        Diagnostic::new(vec![frame], kind, "msg")
    }

    struct Collect(Rc<RefCell<Vec<ErrorKind>>>);

    impl DiagnosticSink for Collect {
        fn report(&mut self, diagnostic: &Diagnostic) {
            self.0.borrow_mut().push(diagnostic.kind);
        }

        fn name(&self) -> &'static str {
            "collect"
        }
    }

    #[test]
    fn test_ignored_lines_filtered() {
        let director = Director::new().ignore_line(2);
        let mut log = ErrorLog::new(true);
        log.add(diag(1, ErrorKind::NameError), &director);
        log.add(diag(2, ErrorKind::AttributeError), &director);
        assert_eq!(log.len(), 1);
        assert_eq!(log.suppressed(), 1);
        assert!(log.has_kind(ErrorKind::NameError));
        assert!(!log.has_kind(ErrorKind::AttributeError));
    }

    #[test]
    fn test_disabled_log_stays_empty() {
        let mut log = ErrorLog::new(false);
        log.add(diag(1, ErrorKind::NameError), &Director::new());
        assert!(log.is_empty());
    }

    #[test]
    fn test_sink_sees_reports_in_order() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let mut log = ErrorLog::new(true).with_sink(Box::new(Collect(seen.clone())));
        log.add(diag(1, ErrorKind::BadUnpacking), &Director::new());
        log.add(diag(2, ErrorKind::MroError), &Director::new());
        assert_eq!(*seen.borrow(), vec![ErrorKind::BadUnpacking, ErrorKind::MroError]);
    }

    #[test]
    fn test_identical_diagnostics_collapse() {
        let mut log = ErrorLog::new(true);
        log.add(diag(4, ErrorKind::WrongArgCount), &Director::new());
        log.add(diag(4, ErrorKind::WrongArgCount), &Director::new());
        log.add(diag(5, ErrorKind::WrongArgCount), &Director::new());
        assert_eq!(log.len(), 2);
    }
}
