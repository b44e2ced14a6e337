//! Shared module - Common types and utilities
//!
//! Input models handed to the engine by collaborators (bytecode, director)
//! and the macros every feature uses.

#[macro_use]
pub mod macros;
pub mod models;

// Re-exports for convenience
pub use models::*;
