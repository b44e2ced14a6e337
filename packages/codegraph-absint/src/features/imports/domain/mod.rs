//! Module descriptions handed over by the importer

use serde::{Deserialize, Serialize};

/// What an imported module exports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSpec {
    pub name: String,
    /// Members in definition order; classes may refer to earlier classes
    #[serde(default)]
    pub members: Vec<(String, MemberSpec)>,
}

/// One exported name. Type references are class names: a builtin class,
/// a class defined earlier in the same module, `None` or `Any`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MemberSpec {
    Class {
        #[serde(default)]
        bases: Vec<String>,
        /// `(method, return type)`
        #[serde(default)]
        methods: Vec<(String, String)>,
        /// `(attribute, type)`
        #[serde(default)]
        attributes: Vec<(String, String)>,
    },
    Function { returns: String },
    Constant { class: String },
    /// Another module, by absolute name
    Submodule { module: String },
}

impl ModuleSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: Vec::new(),
        }
    }

    /// Builder: a class with the given bases
    pub fn class(mut self, name: &str, bases: &[&str]) -> Self {
        self.members.push((
            name.to_string(),
            MemberSpec::Class {
                bases: bases.iter().map(|b| b.to_string()).collect(),
                methods: Vec::new(),
                attributes: Vec::new(),
            },
        ));
        self
    }

    /// Builder: add a method to the most recently declared class
    pub fn method(mut self, name: &str, returns: &str) -> Self {
        if let Some((_, MemberSpec::Class { methods, .. })) = self.members.last_mut() {
            methods.push((name.to_string(), returns.to_string()));
        }
        self
    }

    /// Builder: add an attribute to the most recently declared class
    pub fn attribute(mut self, name: &str, class: &str) -> Self {
        if let Some((_, MemberSpec::Class { attributes, .. })) = self.members.last_mut() {
            attributes.push((name.to_string(), class.to_string()));
        }
        self
    }

    pub fn function(mut self, name: &str, returns: &str) -> Self {
        self.members.push((
            name.to_string(),
            MemberSpec::Function {
                returns: returns.to_string(),
            },
        ));
        self
    }

    pub fn constant(mut self, name: &str, class: &str) -> Self {
        self.members.push((
            name.to_string(),
            MemberSpec::Constant {
                class: class.to_string(),
            },
        ));
        self
    }

    pub fn submodule(mut self, name: &str, module: &str) -> Self {
        self.members.push((
            name.to_string(),
            MemberSpec::Submodule {
                module: module.to_string(),
            },
        ));
        self
    }

    pub fn member(&self, name: &str) -> Option<&MemberSpec> {
        self.members.iter().find(|(n, _)| n == name).map(|(_, m)| m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_attaches_methods_to_last_class() {
        let spec = ModuleSpec::new("shapes")
            .class("Shape", &["object"])
            .method("area", "float")
            .attribute("name", "str")
            .function("make", "Shape");
        let Some(MemberSpec::Class { methods, attributes, .. }) = spec.member("Shape") else {
            panic!("Shape is a class");
        };
        assert_eq!(methods, &vec![("area".to_string(), "float".to_string())]);
        assert_eq!(attributes.len(), 1);
        assert!(matches!(spec.member("make"), Some(MemberSpec::Function { .. })));
    }

    #[test]
    fn test_json_round_trip_shape() {
        let json = r#"{"name": "m", "members": [["f", {"kind": "function", "returns": "int"}]]}"#;
        let spec: ModuleSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec, ModuleSpec::new("m").function("f", "int"));
    }
}
