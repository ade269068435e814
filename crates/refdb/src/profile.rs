//! Per-version capability table.
//!
//! Which methods exist and which historic isolation defects are present
//! is data keyed by the parsed version, not code branches scattered over
//! the builder. Identifiers without a numeric core (`master`, `main`)
//! get the newest behavior.

use purity_interchange::VersionKey;

/// Every method published on the handle type, sorted.
pub const HANDLE_METHODS: &[&str] = &[
    "Assign",
    "Attrs",
    "Begin",
    "Clauses",
    "Commit",
    "Connection",
    "Count",
    "Create",
    "CreateInBatches",
    "Debug",
    "Delete",
    "Distinct",
    "Exec",
    "Find",
    "FindInBatches",
    "First",
    "FirstOrCreate",
    "FirstOrInit",
    "Group",
    "Having",
    "InnerJoins",
    "Joins",
    "Last",
    "Limit",
    "MapColumns",
    "Model",
    "Not",
    "Offset",
    "Omit",
    "Or",
    "Order",
    "Pluck",
    "Preload",
    "Raw",
    "Rollback",
    "Row",
    "Rows",
    "Save",
    "Scan",
    "Scopes",
    "Select",
    "Session",
    "Statement",
    "Table",
    "Take",
    "ToSQL",
    "Transaction",
    "Unscoped",
    "Update",
    "Updates",
    "Where",
    "WithContext",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionProfile {
    pub version: String,
    pub has_create_in_batches: bool,
    pub has_to_sql: bool,
    pub has_connection: bool,
    pub has_inner_joins: bool,
    pub has_map_columns: bool,
    /// Isolation depth of the handle returned by `Begin`.
    pub begin_depth: u8,
    /// `Begin` reports `begin_depth` but hands back the caller's statement.
    pub begin_shares_statement: bool,
    /// `Count` strips the joins of the query it ran on.
    pub count_clears_joins: bool,
    /// `Preload` callbacks receive a depth-0 handle over a statement that
    /// persists across executions.
    pub preload_callback_shares_statement: bool,
}

impl VersionProfile {
    pub fn for_version(version: &str) -> Self {
        let key = VersionKey::parse(version);
        let latest = key.components().is_none();
        let since = |major, minor, patch| latest || key.at_least(major, minor, patch);
        let within = |from: (u64, u64, u64), until: (u64, u64, u64)| {
            !latest && key.at_least(from.0, from.1, from.2) && !key.at_least(until.0, until.1, until.2)
        };

        VersionProfile {
            version: version.to_string(),
            has_create_in_batches: since(1, 21, 0),
            has_to_sql: since(1, 23, 0),
            has_connection: since(1, 23, 0),
            has_inner_joins: since(1, 25, 0),
            has_map_columns: since(1, 26, 0),
            begin_depth: if since(1, 23, 2) { 1 } else { 2 },
            begin_shares_statement: !since(1, 21, 0),
            count_clears_joins: within((1, 25, 6), (1, 25, 10)),
            preload_callback_shares_statement: within((1, 30, 0), (1, 30, 1)),
        }
    }

    /// True if `method` exists on the handle in this version.
    pub fn has(&self, method: &str) -> bool {
        match method {
            "CreateInBatches" => self.has_create_in_batches,
            "ToSQL" => self.has_to_sql,
            "Connection" => self.has_connection,
            "InnerJoins" => self.has_inner_joins,
            "MapColumns" => self.has_map_columns,
            other => HANDLE_METHODS.binary_search(&other).is_ok(),
        }
    }

    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        HANDLE_METHODS.iter().copied().filter(move |m| self.has(m))
    }
}
