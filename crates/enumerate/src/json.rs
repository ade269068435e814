//! A [`TypeSurface`] backed by a JSON document.
//!
//! Lets a target living in another runtime dump its reflected surface
//! once and have it walked here. Document shape:
//!
//! ```json
//! {
//!   "version": "v1.25.0",
//!   "types": [
//!     { "name": "*refdb.DB", "methods": [
//!         { "name": "Where",
//!           "params": [{"kind": "named", "name": "any"}],
//!           "returns": [{"kind": "named", "name": "*refdb.DB"}] } ] },
//!     { "name": "clause.Clause", "error": "generic type parameters" }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::surface::{RawMethod, RawType, SurfaceError, TypeSurface};

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SurfaceDocument {
    #[serde(default)]
    version: Option<String>,
    types: Vec<SurfaceEntry>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SurfaceEntry {
    name: String,
    #[serde(default)]
    methods: Vec<RawMethod>,
    /// Set when the dumping side could not reflect the type.
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct JsonSurface {
    version: Option<String>,
    entries: BTreeMap<String, Result<RawType, String>>,
}

impl JsonSurface {
    pub fn parse(text: &str) -> Result<Self, SurfaceError> {
        let doc: SurfaceDocument =
            serde_json::from_str(text).map_err(|e| SurfaceError::Document(e.to_string()))?;
        let mut entries = BTreeMap::new();
        for entry in doc.types {
            if entries.contains_key(&entry.name) {
                return Err(SurfaceError::Document(format!(
                    "type '{}' is described twice",
                    entry.name
                )));
            }
            let value = match entry.error {
                Some(reason) => Err(reason),
                None => Ok(RawType {
                    name: entry.name.clone(),
                    methods: entry.methods,
                }),
            };
            entries.insert(entry.name, value);
        }
        Ok(JsonSurface {
            version: doc.version,
            entries,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, SurfaceError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SurfaceError::Document(format!("cannot read '{}': {}", path.display(), e))
        })?;
        Self::parse(&text)
    }

    /// The version the document claims to describe, if any.
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl TypeSurface for JsonSurface {
    fn describe(&self, type_name: &str) -> Result<Option<RawType>, SurfaceError> {
        match self.entries.get(type_name) {
            None => Ok(None),
            Some(Ok(raw)) => Ok(Some(raw.clone())),
            Some(Err(reason)) => Err(SurfaceError::Unreadable {
                type_name: type_name.to_string(),
                reason: reason.clone(),
            }),
        }
    }
}
