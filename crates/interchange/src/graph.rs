//! Reflected type-graph types produced by the enumerator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::InterchangeError;

/// One exported method of a reflected type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MethodDescriptor {
    pub name: String,
    /// Parameter type names in declaration order. A variadic final
    /// parameter is rendered as `...T`.
    #[serde(default)]
    pub in_types: Vec<String>,
    #[serde(default)]
    pub out_types: Vec<String>,
    #[serde(default)]
    pub variadic: bool,
    #[serde(default)]
    pub returns_handle: bool,
    #[serde(default)]
    pub takes_handle: bool,
    /// True if any parameter is a function type whose own parameters or
    /// returns mention the handle type.
    #[serde(default)]
    pub takes_handle_callback: bool,
    pub signature: String,
}

impl MethodDescriptor {
    /// True if any of the three handle flags is set.
    pub fn is_pollution_path(&self) -> bool {
        self.returns_handle || self.takes_handle || self.takes_handle_callback
    }

    /// The pollution reasons carried by this method, in a fixed order.
    pub fn pollution_reasons(&self) -> Vec<PollutionReason> {
        let mut reasons = Vec::new();
        if self.takes_handle {
            reasons.push(PollutionReason::TakesHandle);
        }
        if self.takes_handle_callback {
            reasons.push(PollutionReason::TakesHandleCallback);
        }
        if self.returns_handle {
            reasons.push(PollutionReason::ReturnsHandle);
        }
        reasons
    }

    /// Render `Name(A, B) R` or `Name(A) (R1, R2)`.
    pub fn render_signature(name: &str, in_types: &[String], out_types: &[String]) -> String {
        let mut sig = format!("{}({})", name, in_types.join(", "));
        match out_types.len() {
            0 => {}
            1 => {
                sig.push(' ');
                sig.push_str(&out_types[0]);
            }
            _ => {
                sig.push_str(" (");
                sig.push_str(&out_types.join(", "));
                sig.push(')');
            }
        }
        sig
    }
}

/// A named type in the surveyed library's surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReflectedType {
    pub type_name: String,
    /// Exported methods sorted by name.
    pub methods: Vec<MethodDescriptor>,
    /// Types reachable through this type's method return values.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub derived_types: Vec<String>,
}

impl ReflectedType {
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods
            .binary_search_by(|m| m.name.as_str().cmp(name))
            .ok()
            .map(|idx| &self.methods[idx])
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

/// Why a method is considered a pollution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PollutionReason {
    TakesHandle,
    TakesHandleCallback,
    ReturnsHandle,
}

impl fmt::Display for PollutionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollutionReason::TakesHandle => write!(f, "takes the handle directly"),
            PollutionReason::TakesHandleCallback => write!(f, "takes a callback over the handle"),
            PollutionReason::ReturnsHandle => write!(f, "returns the handle (chain point)"),
        }
    }
}

/// A `(type, method)` pair whose signature can propagate or mutate a handle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PollutionPath {
    pub type_name: String,
    pub method: String,
    pub reason: PollutionReason,
}

impl fmt::Display for PollutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.type_name, self.method, self.reason)
    }
}

/// An enumeration anomaly: a type or method that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkippedNode {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub reason: String,
}

/// Complete result of one enumeration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypeGraph {
    pub version: String,
    /// Qualified name of the surveyed handle type.
    pub handle_type: String,
    pub types: BTreeMap<String, ReflectedType>,
    #[serde(default)]
    pub pollution_paths: Vec<PollutionPath>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedNode>,
}

impl TypeGraph {
    /// The reflected handle type, if the walk reached it.
    pub fn handle(&self) -> Option<&ReflectedType> {
        self.types.get(&self.handle_type)
    }

    pub fn handle_method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.handle().and_then(|t| t.method(name))
    }

    pub fn has_method(&self, type_name: &str, method: &str) -> bool {
        self.types
            .get(type_name)
            .is_some_and(|t| t.method(method).is_some())
    }

    /// Check the invariants a persisted graph must satisfy: method lists
    /// are sorted and unique, and every derived type was recorded.
    pub fn validate(&self) -> Result<(), InterchangeError> {
        for (name, ty) in &self.types {
            if name != &ty.type_name {
                return Err(InterchangeError::InvalidGraph(format!(
                    "type keyed as '{}' is named '{}'",
                    name, ty.type_name
                )));
            }
            if ty.methods.windows(2).any(|w| w[0].name >= w[1].name) {
                return Err(InterchangeError::InvalidGraph(format!(
                    "methods of '{}' are not sorted and unique",
                    name
                )));
            }
            for derived in &ty.derived_types {
                let recorded = self.types.contains_key(derived)
                    || self.skipped.iter().any(|s| &s.type_name == derived);
                if !recorded {
                    return Err(InterchangeError::InvalidGraph(format!(
                        "derived type '{}' of '{}' was never recorded",
                        derived, name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(name: &str, returns_handle: bool) -> MethodDescriptor {
        MethodDescriptor {
            name: name.to_string(),
            in_types: vec![],
            out_types: vec![],
            variadic: false,
            returns_handle,
            takes_handle: false,
            takes_handle_callback: false,
            signature: format!("{}()", name),
        }
    }

    #[test]
    fn signature_rendering() {
        let ins = vec!["string".to_string(), "...any".to_string()];
        assert_eq!(
            MethodDescriptor::render_signature("Where", &ins, &["*db.Db".to_string()]),
            "Where(string, ...any) *db.Db"
        );
        assert_eq!(
            MethodDescriptor::render_signature(
                "Row",
                &[],
                &["*sql.Row".to_string(), "error".to_string()]
            ),
            "Row() (*sql.Row, error)"
        );
        assert_eq!(MethodDescriptor::render_signature("Reset", &[], &[]), "Reset()");
    }

    #[test]
    fn method_lookup_uses_sorted_order() {
        let ty = ReflectedType {
            type_name: "*db.Db".to_string(),
            methods: vec![method("Find", true), method("Order", true), method("Where", true)],
            derived_types: vec![],
        };
        assert!(ty.method("Order").is_some());
        assert!(ty.method("Group").is_none());
    }

    #[test]
    fn validate_rejects_unsorted_methods() {
        let mut types = BTreeMap::new();
        types.insert(
            "*db.Db".to_string(),
            ReflectedType {
                type_name: "*db.Db".to_string(),
                methods: vec![method("Where", true), method("Find", true)],
                derived_types: vec![],
            },
        );
        let graph = TypeGraph {
            version: "v1.0.0".to_string(),
            handle_type: "*db.Db".to_string(),
            types,
            pollution_paths: vec![],
            skipped: vec![],
        };
        assert!(matches!(graph.validate(), Err(InterchangeError::InvalidGraph(_))));
    }

    #[test]
    fn pollution_path_display() {
        let path = PollutionPath {
            type_name: "*db.Db".to_string(),
            method: "Scopes".to_string(),
            reason: PollutionReason::TakesHandleCallback,
        };
        assert_eq!(path.to_string(), "*db.Db.Scopes takes a callback over the handle");
    }
}
