//! Rendered types
//!
//! [`Type`] is the user-facing view of a variable: the union of the classes
//! its visible bindings are instances of. It is what `AnalysisResult::global_type`
//! hands out and what diagnostics print.
//!
//! Features:
//! - Union types: `int | str | None`
//! - Generic types: `list[int]`, `dict[str, int]`
//! - Callable types: `(int, str) -> bool`

use std::fmt;

use rustc_hash::FxHashSet;

/// Type kind categorization
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Instance of a named class: int, str, Foo
    Simple(String),
    /// None type
    None,
    /// Any type (unsolvable)
    Any,
    /// Never type (empty variable, function that cannot return)
    Never,
    /// A class object itself: `type[Foo]`
    ClassObject(String),
    /// Generic type: list[int], dict[str, int]
    Generic { base: String, params: Vec<Type> },
    /// Union type: int | str | None
    Union(Vec<Type>),
    /// Callable type: (int, str) -> bool
    Callable {
        params: Vec<Type>,
        return_type: Box<Type>,
    },
    /// Module object
    Module(String),
}

/// Type representation
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Type {
    pub kind: TypeKind,
}

impl Type {
    /// Create a simple type
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Simple(name.into()),
        }
    }

    /// Create None type
    pub fn none() -> Self {
        Self {
            kind: TypeKind::None,
        }
    }

    /// Create Any type
    pub fn any() -> Self {
        Self {
            kind: TypeKind::Any,
        }
    }

    /// Create Never type
    pub fn never() -> Self {
        Self {
            kind: TypeKind::Never,
        }
    }

    pub fn class_object(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::ClassObject(name.into()),
        }
    }

    pub fn module(name: impl Into<String>) -> Self {
        Self {
            kind: TypeKind::Module(name.into()),
        }
    }

    /// Create generic type
    pub fn generic(base: impl Into<String>, params: Vec<Type>) -> Self {
        Self {
            kind: TypeKind::Generic {
                base: base.into(),
                params,
            },
        }
    }

    /// Create union type
    pub fn union(types: Vec<Type>) -> Self {
        // Flatten nested unions; Never is the identity
        let mut flattened = Vec::new();
        for ty in types {
            match ty.kind {
                TypeKind::Union(inner) => flattened.extend(inner),
                TypeKind::Never => {}
                _ => flattened.push(ty),
            }
        }

        let mut unique = Self::deduplicate(flattened);

        match unique.len() {
            0 => Self::never(),
            1 => unique.remove(0),
            _ => Self {
                kind: TypeKind::Union(unique),
            },
        }
    }

    /// Create callable type
    pub fn callable(params: Vec<Type>, return_type: Type) -> Self {
        Self {
            kind: TypeKind::Callable {
                params,
                return_type: Box::new(return_type),
            },
        }
    }

    /// Check if type is nullable (contains None in union)
    pub fn is_nullable(&self) -> bool {
        match &self.kind {
            TypeKind::None => true,
            TypeKind::Union(types) => types.iter().any(|t| matches!(t.kind, TypeKind::None)),
            _ => false,
        }
    }

    /// Check if type is a union
    pub fn is_union(&self) -> bool {
        matches!(self.kind, TypeKind::Union(_))
    }

    /// Get union members if this is a union type
    pub fn union_members(&self) -> Option<&[Type]> {
        match &self.kind {
            TypeKind::Union(types) => Some(types),
            _ => None,
        }
    }

    /// Members of a union, or the type itself
    pub fn options(&self) -> Vec<&Type> {
        match &self.kind {
            TypeKind::Union(types) => types.iter().collect(),
            _ => vec![self],
        }
    }

    /// Check if type is compatible with another type
    pub fn is_compatible_with(&self, other: &Type) -> bool {
        // Any is compatible with everything
        if matches!(self.kind, TypeKind::Any) || matches!(other.kind, TypeKind::Any) {
            return true;
        }

        // Never is compatible with everything as the empty set
        if matches!(self.kind, TypeKind::Never) {
            return true;
        }

        if self == other {
            return true;
        }

        if let TypeKind::Union(types) = &self.kind {
            return types.iter().all(|t| t.is_compatible_with(other));
        }

        if let TypeKind::Union(types) = &other.kind {
            return types.iter().any(|t| self.is_compatible_with(t));
        }

        // Parameters are not checked
        if let (TypeKind::Generic { base, .. }, TypeKind::Simple(name)) = (&self.kind, &other.kind) {
            return base == name;
        }

        false
    }

    /// Remove duplicate types from a list
    fn deduplicate(types: Vec<Type>) -> Vec<Type> {
        let mut seen = FxHashSet::default();
        let mut unique = Vec::new();

        for ty in types {
            if seen.insert(ty.clone()) {
                unique.push(ty);
            }
        }

        unique
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Type], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, "{}", sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TypeKind::Simple(name) => write!(f, "{}", name),
            TypeKind::None => write!(f, "None"),
            TypeKind::Any => write!(f, "Any"),
            TypeKind::Never => write!(f, "Never"),
            TypeKind::ClassObject(name) => write!(f, "type[{}]", name),
            TypeKind::Module(name) => write!(f, "module[{}]", name),
            TypeKind::Generic { base, params } => {
                write!(f, "{}", base)?;
                if !params.is_empty() {
                    write!(f, "[")?;
                    write_list(f, params, ", ")?;
                    write!(f, "]")?;
                }
                Ok(())
            }
            TypeKind::Union(types) => write_list(f, types, " | "),
            TypeKind::Callable {
                params,
                return_type,
            } => {
                write!(f, "(")?;
                write_list(f, params, ", ")?;
                write!(f, ") -> {}", return_type)
            }
        }
    }
}
