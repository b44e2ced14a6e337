mod ids;
mod program;
mod records;

pub use ids::{BindingId, CfgNodeId, ValueId, VariableId};
pub use program::{Program, ProgramStats};
pub use records::{Binding, CfgNode, Origin, SourceSet, Variable};
