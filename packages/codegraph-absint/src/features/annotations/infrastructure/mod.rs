mod local_tracker;
mod type_expr;

pub use local_tracker::{is_tracked_name, LocalTracker};
pub use type_expr::{parse_type_expr, TypeExpr, TypeExprError};
