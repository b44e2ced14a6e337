mod condition;

pub use condition::{new_condition, restrict_by, restrict_condition, Restriction};
