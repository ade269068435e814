//! Query state and SQL rendering.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::db::Db;

/// A bound value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
        }
    }
}

/// Substitute `?` placeholders left to right. Surplus placeholders stay.
pub fn bind(query: &str, values: &[Value]) -> String {
    let mut out = String::with_capacity(query.len());
    let mut values = values.iter();
    for c in query.chars() {
        match (c, values.as_slice().first()) {
            ('?', Some(_)) => {
                if let Some(v) = values.next() {
                    out.push_str(&v.to_string());
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// A callback over the handle, as taken by `Scopes`, `Preload` and `ToSQL`.
pub type ScopeFn = Arc<dyn Fn(Db) -> Db + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Connective {
    And,
    Or,
    Not,
}

#[derive(Clone)]
pub(crate) struct Preload {
    pub relation: String,
    pub callback: Option<ScopeFn>,
    /// Statement handed to the callback when the version shares it.
    pub shared: Arc<Mutex<Statement>>,
}

/// The accumulated state of one query.
#[derive(Clone, Default)]
pub struct Statement {
    pub(crate) table: Option<String>,
    pub(crate) selects: Vec<String>,
    pub(crate) omits: Vec<String>,
    pub(crate) distinct: bool,
    pub(crate) conditions: Vec<(Connective, String)>,
    pub(crate) joins: Vec<String>,
    pub(crate) groups: Vec<String>,
    pub(crate) havings: Vec<String>,
    pub(crate) orders: Vec<String>,
    pub(crate) limit: Option<i64>,
    pub(crate) offset: Option<i64>,
    pub(crate) raw: Option<String>,
    /// Columns written by `FirstOrCreate`, from `Attrs` then `Assign`.
    pub(crate) attrs: Vec<String>,
    pub(crate) assigns: Vec<String>,
    /// Result column renames, source to alias.
    pub(crate) column_map: BTreeMap<String, String>,
    pub(crate) unscoped: bool,
    pub(crate) preloads: Vec<Preload>,
    pub(crate) scopes: Vec<ScopeFn>,
}

impl Statement {
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or("users")
    }

    /// The rendered `SELECT` for the current state.
    pub fn sql(&self) -> String {
        self.render_select(None)
    }

    pub fn join_count(&self) -> usize {
        self.joins.len()
    }

    /// Conditions joined by their connectives, without the `WHERE`.
    pub(crate) fn conditions_sql(&self) -> String {
        let mut out = String::new();
        for (i, (conn, cond)) in self.conditions.iter().enumerate() {
            let part = match (i, conn) {
                (0, Connective::Not) => format!("NOT ({})", cond),
                (0, _) => cond.clone(),
                (_, Connective::And) => format!(" AND {}", cond),
                (_, Connective::Or) => format!(" OR {}", cond),
                (_, Connective::Not) => format!(" AND NOT ({})", cond),
            };
            out.push_str(&part);
        }
        out
    }

    pub(crate) fn where_sql(&self) -> String {
        let mut parts = Vec::new();
        let conditions = self.conditions_sql();
        if !conditions.is_empty() {
            if self.conditions.len() > 1 {
                parts.push(format!("({})", conditions));
            } else {
                parts.push(conditions);
            }
        }
        if !self.unscoped {
            parts.push(format!("{}.deleted_at IS NULL", self.table_name()));
        }
        if parts.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", parts.join(" AND "))
        }
    }

    /// Render a `SELECT`; `projection` replaces the column list.
    pub(crate) fn render_select(&self, projection: Option<&str>) -> String {
        if let Some(raw) = &self.raw {
            return raw.clone();
        }
        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        match projection {
            Some(p) => sql.push_str(p),
            None if self.selects.is_empty() => sql.push('*'),
            None => sql.push_str(&self.selects.join(", ")),
        }
        if projection.is_none() {
            for (from, to) in &self.column_map {
                sql.push_str(&format!(", {} AS {}", from, to));
            }
        }
        if !self.omits.is_empty() {
            sql.push_str(&format!(" EXCLUDE ({})", self.omits.join(", ")));
        }
        sql.push_str(" FROM ");
        sql.push_str(self.table_name());
        for join in &self.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(&self.where_sql());
        if !self.groups.is_empty() {
            sql.push_str(&format!(" GROUP BY {}", self.groups.join(", ")));
        }
        if !self.havings.is_empty() {
            sql.push_str(&format!(" HAVING {}", self.havings.join(" AND ")));
        }
        if !self.orders.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.orders.join(", ")));
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        sql
    }
}

impl fmt::Debug for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Statement")
            .field("sql", &self.sql())
            .field("preloads", &self.preloads.len())
            .field("scopes", &self.scopes.len())
            .finish()
    }
}
