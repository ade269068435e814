//! Allow-list classification of type names.

use crate::surface::TypeRef;

/// How a type name is treated by the walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeClass {
    /// Built-in scalar, `any`, `error`.
    Primitive,
    /// Standard library or third-party type outside the surveyed domain.
    Foreign,
    /// A type of the surveyed library; enqueued for visitation.
    Domain,
}

const DEFAULT_PRIMITIVES: &[&str] = &[
    "error",
    "string",
    "bool",
    "int",
    "int8",
    "int16",
    "int32",
    "int64",
    "uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "float32",
    "float64",
    "uintptr",
    "byte",
    "rune",
    "complex64",
    "complex128",
    "any",
    "interface {}",
];

const DEFAULT_FOREIGN_PREFIXES: &[&str] = &[
    "*sql.", "sql.", "context.", "time.", "sync.", "io.", "*bytes.", "bytes.", "[]byte", "[]uint8",
    "[]string", "[]int", "map[", "[]", "chan ",
];

/// Name/prefix allow-list for the surveyed domain.
#[derive(Debug, Clone)]
pub struct DomainFilter {
    handle_type: String,
    domain_markers: Vec<String>,
    primitives: Vec<String>,
    foreign_prefixes: Vec<String>,
}

impl DomainFilter {
    /// A filter for `handle_type`, treating any name that contains one of
    /// `domain_markers` as part of the surveyed library.
    pub fn new<I, S>(handle_type: impl Into<String>, domain_markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DomainFilter {
            handle_type: handle_type.into(),
            domain_markers: domain_markers.into_iter().map(Into::into).collect(),
            primitives: DEFAULT_PRIMITIVES.iter().map(|s| s.to_string()).collect(),
            foreign_prefixes: DEFAULT_FOREIGN_PREFIXES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    pub fn with_foreign_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.foreign_prefixes.push(prefix.into());
        self
    }

    pub fn handle_type(&self) -> &str {
        &self.handle_type
    }

    pub fn classify(&self, type_name: &str) -> TypeClass {
        if self.primitives.iter().any(|p| p == type_name) {
            return TypeClass::Primitive;
        }
        if self
            .foreign_prefixes
            .iter()
            .any(|p| type_name.starts_with(p.as_str()))
        {
            return TypeClass::Foreign;
        }
        if self
            .domain_markers
            .iter()
            .any(|m| type_name.contains(m.as_str()))
        {
            TypeClass::Domain
        } else {
            TypeClass::Foreign
        }
    }

    pub fn is_handle(&self, ty: &TypeRef) -> bool {
        ty.name() == Some(self.handle_type.as_str())
    }

    /// True for a function type whose direct parameters or returns include
    /// the handle type.
    pub fn is_handle_callback(&self, ty: &TypeRef) -> bool {
        match ty {
            TypeRef::Func {
                params, returns, ..
            } => params.iter().chain(returns).any(|t| self.is_handle(t)),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter() -> DomainFilter {
        DomainFilter::new("*refdb.DB", ["refdb.", "clause."])
    }

    #[test]
    fn classifies_primitives_foreign_and_domain() {
        let f = filter();
        assert_eq!(f.classify("string"), TypeClass::Primitive);
        assert_eq!(f.classify("interface {}"), TypeClass::Primitive);
        assert_eq!(f.classify("*sql.Rows"), TypeClass::Foreign);
        assert_eq!(f.classify("context.Context"), TypeClass::Foreign);
        assert_eq!(f.classify("*refdb.Statement"), TypeClass::Domain);
        assert_eq!(f.classify("clause.Expression"), TypeClass::Domain);
        assert_eq!(f.classify("*othercrate.Thing"), TypeClass::Foreign);
    }

    #[test]
    fn composite_domain_types_are_not_walked() {
        let f = filter();
        assert_eq!(f.classify("[]clause.Expression"), TypeClass::Foreign);
        assert_eq!(f.classify("map[string]refdb.Value"), TypeClass::Foreign);
    }

    #[test]
    fn callback_detection_looks_at_params_and_returns() {
        let f = filter();
        let scope = TypeRef::func(
            vec![TypeRef::named("*refdb.DB")],
            vec![TypeRef::named("*refdb.DB")],
        );
        let tx = TypeRef::func(vec![TypeRef::named("*refdb.DB")], vec![TypeRef::named("error")]);
        let unrelated = TypeRef::func(vec![TypeRef::named("int")], vec![]);
        assert!(f.is_handle_callback(&scope));
        assert!(f.is_handle_callback(&tx));
        assert!(!f.is_handle_callback(&unrelated));
        assert!(!f.is_handle_callback(&TypeRef::named("*refdb.DB")));
    }

    #[test]
    fn extra_foreign_prefix_wins_over_domain_marker() {
        let f = filter().with_foreign_prefix("refdb.internal");
        assert_eq!(f.classify("refdb.internalState"), TypeClass::Foreign);
    }
}
