//! Diagnostics Ports
//!
//! The engine queues diagnostics in its [`ErrorLog`](super::ErrorLog); a
//! collaborator that wants them as they happen plugs in a sink.

use super::domain::Diagnostic;

/// Receiver of diagnostics, in the order they are reported
///
/// # Implementors
/// - `TracingSink` (infrastructure/tracing_sink.rs)
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: &Diagnostic);

    /// Sink name for debugging and logging
    fn name(&self) -> &'static str;
}
