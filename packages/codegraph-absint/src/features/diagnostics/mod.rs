//! Diagnostics
//!
//! Hexagonal Architecture:
//! - domain: `ErrorKind`, `Diagnostic`
//! - ports: `DiagnosticSink`
//! - infrastructure: the `ErrorLog` queue and a `tracing` sink
//!
//! Diagnostics are structured data only; formatting belongs to whoever
//! consumes them.

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{Diagnostic, ErrorKind};
pub use infrastructure::{ErrorLog, TracingSink};
pub use ports::DiagnosticSink;
