//! Sink forwarding diagnostics to `tracing`

use tracing::info;

use crate::features::diagnostics::domain::Diagnostic;
use crate::features::diagnostics::ports::DiagnosticSink;

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&mut self, diagnostic: &Diagnostic) {
        let frame = diagnostic
            .stack
            .last()
            .map(|f| f.name.as_str())
            .unwrap_or("<unknown>");
        info!(
            kind = %diagnostic.kind,
            line = ?diagnostic.line,
            frame,
            "{}",
            diagnostic.message
        );
    }

    fn name(&self) -> &'static str {
        "tracing"
    }
}
