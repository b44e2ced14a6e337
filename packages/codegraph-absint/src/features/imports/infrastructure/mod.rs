mod loader;
mod static_importer;

pub use loader::ModuleLoader;
pub use static_importer::{NullImporter, StaticImporter};
