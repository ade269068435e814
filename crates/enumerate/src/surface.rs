//! The reflective source the enumerator walks.
//!
//! A [`TypeSurface`] answers one question: given a qualified type name,
//! what exported methods does it have and what are their signatures?
//! How the answer is produced (runtime reflection inside an isolated
//! context, a dumped JSON document, a hand-written table) is up to the
//! implementation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A type as it appears in a method signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeRef {
    /// A named type, e.g. `string`, `*refdb.DB`, `[]clause.Expression`.
    Named { name: String },
    /// A function type.
    Func {
        #[serde(default)]
        params: Vec<TypeRef>,
        #[serde(default)]
        returns: Vec<TypeRef>,
        #[serde(default)]
        variadic: bool,
    },
    /// A type the reflective source could not render.
    Unreadable { detail: String },
}

impl TypeRef {
    pub fn named(name: impl Into<String>) -> Self {
        TypeRef::Named { name: name.into() }
    }

    pub fn func(params: Vec<TypeRef>, returns: Vec<TypeRef>) -> Self {
        TypeRef::Func {
            params,
            returns,
            variadic: false,
        }
    }

    /// The name of a named type; `None` for functions and unreadable types.
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeRef::Named { name } => Some(name),
            _ => None,
        }
    }

    /// Every named type mentioned, including inside function types.
    pub fn named_types(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeRef::Named { name } => out.push(name),
            TypeRef::Func {
                params, returns, ..
            } => {
                for t in params.iter().chain(returns) {
                    t.collect_names(out);
                }
            }
            TypeRef::Unreadable { .. } => {}
        }
    }

    pub fn is_readable(&self) -> bool {
        match self {
            TypeRef::Named { .. } => true,
            TypeRef::Func {
                params, returns, ..
            } => params.iter().chain(returns).all(TypeRef::is_readable),
            TypeRef::Unreadable { .. } => false,
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named { name } => write!(f, "{}", name),
            TypeRef::Func {
                params,
                returns,
                variadic,
            } => {
                write!(f, "func(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    if *variadic && i == params.len() - 1 {
                        write!(f, "...")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ")")?;
                match returns.len() {
                    0 => Ok(()),
                    1 => write!(f, " {}", returns[0]),
                    _ => {
                        write!(f, " (")?;
                        for (i, r) in returns.iter().enumerate() {
                            if i > 0 {
                                write!(f, ", ")?;
                            }
                            write!(f, "{}", r)?;
                        }
                        write!(f, ")")
                    }
                }
            }
            TypeRef::Unreadable { detail } => write!(f, "<unreadable: {}>", detail),
        }
    }
}

/// One method as reported by the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMethod {
    pub name: String,
    #[serde(default = "default_exported")]
    pub exported: bool,
    #[serde(default)]
    pub params: Vec<TypeRef>,
    #[serde(default)]
    pub returns: Vec<TypeRef>,
    /// The final parameter is variadic; its `TypeRef` is the element type.
    #[serde(default)]
    pub variadic: bool,
}

fn default_exported() -> bool {
    true
}

impl RawMethod {
    pub fn new(name: impl Into<String>, params: Vec<TypeRef>, returns: Vec<TypeRef>) -> Self {
        RawMethod {
            name: name.into(),
            exported: true,
            params,
            returns,
            variadic: false,
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }
}

/// A type as reported by the surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawType {
    pub name: String,
    #[serde(default)]
    pub methods: Vec<RawMethod>,
}

/// Errors a surface may report for a single type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SurfaceError {
    #[error("type '{type_name}' could not be read: {reason}")]
    Unreadable { type_name: String, reason: String },

    #[error("surface document error: {0}")]
    Document(String),
}

/// A reflective source of method signatures.
pub trait TypeSurface {
    /// Describe a type. `Ok(None)` means the surface does not know the
    /// type at all; an error means it knows it but cannot read it.
    fn describe(&self, type_name: &str) -> Result<Option<RawType>, SurfaceError>;
}

impl<S: TypeSurface + ?Sized> TypeSurface for &S {
    fn describe(&self, type_name: &str) -> Result<Option<RawType>, SurfaceError> {
        (**self).describe(type_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_types_reach_into_functions() {
        let f = TypeRef::func(
            vec![
                TypeRef::named("*refdb.DB"),
                TypeRef::func(vec![TypeRef::named("*refdb.Tx")], vec![]),
            ],
            vec![TypeRef::named("error")],
        );
        assert_eq!(f.named_types(), vec!["*refdb.DB", "*refdb.Tx", "error"]);
        assert!(TypeRef::Unreadable { detail: "x".to_string() }.named_types().is_empty());
    }

    #[test]
    fn func_display_matches_signature_style() {
        let f = TypeRef::func(
            vec![TypeRef::named("*refdb.DB")],
            vec![TypeRef::named("*refdb.DB")],
        );
        assert_eq!(f.to_string(), "func(*refdb.DB) *refdb.DB");

        let batches = TypeRef::func(
            vec![TypeRef::named("*refdb.DB"), TypeRef::named("int")],
            vec![TypeRef::named("error")],
        );
        assert_eq!(batches.to_string(), "func(*refdb.DB, int) error");
    }

    #[test]
    fn nested_unreadable_makes_func_unreadable() {
        let f = TypeRef::func(
            vec![TypeRef::Unreadable {
                detail: "unexported generic".to_string(),
            }],
            vec![],
        );
        assert!(!f.is_readable());
        assert!(TypeRef::named("int").is_readable());
    }

    #[test]
    fn type_ref_json_is_tagged() {
        let json = serde_json::to_value(TypeRef::named("string")).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "named", "name": "string"}));
    }
}
