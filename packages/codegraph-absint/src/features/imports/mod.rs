//! Imports
//!
//! Hexagonal Architecture:
//! - domain: `ModuleSpec` / `MemberSpec`, what a module exports
//! - ports: the `Importer` trait
//! - infrastructure: in-memory importers and the loader that builds module
//!   values (imported classes have incomplete member tables)

pub mod domain;
pub mod infrastructure;
pub mod ports;

pub use domain::{MemberSpec, ModuleSpec};
pub use infrastructure::{ModuleLoader, NullImporter, StaticImporter};
pub use ports::Importer;
