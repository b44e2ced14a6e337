//! In-memory importers

use indexmap::IndexMap;

use crate::features::imports::domain::ModuleSpec;
use crate::features::imports::ports::Importer;

/// Importer backed by a fixed table of modules
#[derive(Debug, Clone, Default)]
pub struct StaticImporter {
    modules: IndexMap<String, ModuleSpec>,
}

impl StaticImporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: register a module under its own name
    pub fn with_module(mut self, spec: ModuleSpec) -> Self {
        self.modules.insert(spec.name.clone(), spec);
        self
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl Importer for StaticImporter {
    fn import_module(&self, name: &str, level: u32) -> Option<ModuleSpec> {
        if level > 0 {
            // Relative names are looked up as given
            return self.modules.get(name.trim_start_matches('.')).cloned();
        }
        self.modules.get(name).cloned()
    }
}

/// Importer that knows no modules
#[derive(Debug, Clone, Copy, Default)]
pub struct NullImporter;

impl Importer for NullImporter {
    fn import_module(&self, _name: &str, _level: u32) -> Option<ModuleSpec> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_lookup() {
        let importer = StaticImporter::new()
            .with_module(ModuleSpec::new("pkg.util").function("helper", "int"));
        assert!(importer.import_module("pkg.util", 0).is_some());
        assert!(importer.import_module("pkg", 0).is_none());
        assert!(importer.import_module("pkg.util", 1).is_some());
        assert!(NullImporter.import_module("pkg.util", 0).is_none());
    }
}
