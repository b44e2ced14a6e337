//! Annotation and local tracking
//!
//! Hexagonal Architecture:
//! - domain: `LocalOp`, `Local`, `LateAnnotation`
//! - infrastructure: the per-scope `LocalTracker` and the type-expression
//!   parser for type comments and quoted forward references

pub mod domain;
pub mod infrastructure;

pub use domain::{LateAnnotation, Local, LocalOp, LocalOpKind};
pub use infrastructure::{
    is_tracked_name, parse_type_expr, LocalTracker, TypeExpr, TypeExprError,
};
