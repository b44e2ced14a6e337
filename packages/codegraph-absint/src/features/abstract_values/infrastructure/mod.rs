mod converter;
mod mro;
mod render;
mod store;
mod truthiness;

pub use converter::{BuiltinClasses, Converter, WellKnown};
pub use mro::{compute_mro, MroError};
pub use render::TypeRenderer;
pub use store::ValueStore;
pub use truthiness::compatible_with;
