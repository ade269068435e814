//! The reflective surface the builder publishes, version by version.

use purity_enumerate::{DomainFilter, RawMethod, RawType, SurfaceError, TypeRef, TypeSurface};

use crate::profile::VersionProfile;

pub const HANDLE_TYPE: &str = "*refdb.DB";
pub const STATEMENT_TYPE: &str = "*refdb.Statement";
pub const SESSION_TYPE: &str = "*refdb.Session";

/// Name fragments that mark a type as part of the builder.
pub const DOMAIN_MARKERS: &[&str] = &["refdb."];

pub fn domain_filter() -> DomainFilter {
    DomainFilter::new(HANDLE_TYPE, DOMAIN_MARKERS.iter().copied())
}

fn t(name: &str) -> TypeRef {
    TypeRef::named(name)
}

fn db() -> TypeRef {
    t(HANDLE_TYPE)
}

/// `func(*refdb.DB) *refdb.DB`
fn scope_fn() -> TypeRef {
    TypeRef::func(vec![db()], vec![db()])
}

fn m(name: &str, params: Vec<TypeRef>, returns: Vec<TypeRef>) -> RawMethod {
    RawMethod::new(name, params, returns)
}

/// `Name(any, ...any) *refdb.DB`
fn conditional(name: &str) -> RawMethod {
    m(name, vec![t("any"), t("any")], vec![db()]).variadic()
}

fn handle_method(name: &str) -> Option<RawMethod> {
    let method = match name {
        "Where" | "Or" | "Not" | "Having" | "Select" | "Find" | "First" | "Take" | "Last"
        | "Delete" | "FirstOrCreate" | "FirstOrInit" => conditional(name),
        "Joins" | "InnerJoins" | "Raw" | "Table" | "Exec" => {
            m(name, vec![t("string"), t("any")], vec![db()]).variadic()
        }
        "Order" | "Model" | "Create" | "Updates" | "Save" | "Scan" => {
            m(name, vec![t("any")], vec![db()])
        }
        "Assign" | "Attrs" => m(name, vec![t("any")], vec![db()]).variadic(),
        "Clauses" => m(name, vec![t("clause.Expression")], vec![db()]).variadic(),
        "MapColumns" => m(name, vec![t("map[string]string")], vec![db()]),
        "Group" => m(name, vec![t("string")], vec![db()]),
        "Distinct" => m(name, vec![t("any")], vec![db()]).variadic(),
        "Omit" => m(name, vec![t("string")], vec![db()]).variadic(),
        "Limit" | "Offset" => m(name, vec![t("int")], vec![db()]),
        "Unscoped" | "Debug" | "Commit" | "Rollback" => m(name, vec![], vec![db()]),
        "Preload" => m(name, vec![t("string"), scope_fn()], vec![db()]).variadic(),
        "Scopes" => m(name, vec![scope_fn()], vec![db()]).variadic(),
        "Session" => m(name, vec![t(SESSION_TYPE)], vec![db()]),
        "WithContext" => m(name, vec![t("context.Context")], vec![db()]),
        "Begin" => m(name, vec![t("*sql.TxOptions")], vec![db()]).variadic(),
        "Count" => m(name, vec![t("*int64")], vec![db()]),
        "Pluck" => m(name, vec![t("string"), t("any")], vec![db()]),
        "CreateInBatches" => m(name, vec![t("any"), t("int")], vec![db()]),
        "Update" => m(name, vec![t("string"), t("any")], vec![db()]),
        "Row" => m(name, vec![], vec![t("*sql.Row")]),
        "Rows" => m(name, vec![], vec![t("*sql.Rows"), t("error")]),
        "Transaction" => m(
            name,
            vec![
                TypeRef::func(vec![db()], vec![t("error")]),
                t("*sql.TxOptions"),
            ],
            vec![t("error")],
        )
        .variadic(),
        "Connection" => m(
            name,
            vec![TypeRef::func(vec![db()], vec![t("error")])],
            vec![t("error")],
        ),
        "FindInBatches" => m(
            name,
            vec![
                t("any"),
                t("int"),
                TypeRef::func(vec![db(), t("int")], vec![t("error")]),
            ],
            vec![db()],
        ),
        "ToSQL" => m(name, vec![scope_fn()], vec![t("string")]),
        "Statement" => m(name, vec![], vec![t(STATEMENT_TYPE)]),
        _ => return None,
    };
    Some(method)
}

/// Signatures of the builder's types at one version.
#[derive(Debug, Clone)]
pub struct RefSurface {
    profile: VersionProfile,
}

impl RefSurface {
    pub fn new(version: &str) -> Self {
        RefSurface {
            profile: VersionProfile::for_version(version),
        }
    }
}

impl TypeSurface for RefSurface {
    fn describe(&self, type_name: &str) -> Result<Option<RawType>, SurfaceError> {
        let methods = match type_name {
            HANDLE_TYPE => self.profile.methods().filter_map(handle_method).collect(),
            STATEMENT_TYPE => vec![
                m("DB", vec![], vec![db()]),
                m("SQL", vec![], vec![t("string")]),
                m("Table", vec![], vec![t("string")]),
            ],
            SESSION_TYPE => vec![],
            _ => return Ok(None),
        };
        Ok(Some(RawType {
            name: type_name.to_string(),
            methods,
        }))
    }
}
