//! The `Db` handle.
//!
//! Every handle points at a [`Statement`] behind an `Arc<Mutex<_>>` and
//! carries an isolation depth that decides what the next chain call works
//! on:
//!
//! - depth 0: the receiver's statement, shared and mutated in place;
//! - depth 1: a fresh, empty statement;
//! - depth 2: a copy of the receiver's statement.
//!
//! Whatever the receiver's depth, the handle returned by a chain call has
//! depth 0, so only the first call after `Session`, `Begin` or the root
//! handle is isolated. Everything the handle executes is rendered to SQL
//! and pushed to the connection's recorder.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use purity_oracle::CapturingRecorder;
use tracing::trace;

use crate::profile::VersionProfile;
use crate::statement::{bind, Connective, Preload, ScopeFn, Statement, Value};
use crate::RefDbError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    pub debug: bool,
    pub context: Option<String>,
}

struct Shared {
    profile: VersionProfile,
    recorder: CapturingRecorder,
}

#[derive(Clone)]
pub struct Db {
    depth: u8,
    /// Depth the handle claims, when it differs from how it behaves.
    reported: Option<u8>,
    stmt: Arc<Mutex<Statement>>,
    config: Config,
    conn: Arc<Shared>,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db")
            .field("depth", &self.depth)
            .field("reported", &self.reported)
            .field("config", &self.config)
            .field("version", &self.conn.profile.version)
            .finish()
    }
}

impl Db {
    /// Open a connection. The returned root handle has depth 1.
    pub fn open(profile: VersionProfile, recorder: CapturingRecorder) -> Db {
        Db {
            depth: 1,
            reported: None,
            stmt: Arc::new(Mutex::new(Statement::default())),
            config: Config::default(),
            conn: Arc::new(Shared { profile, recorder }),
        }
    }

    pub fn profile(&self) -> &VersionProfile {
        &self.conn.profile
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The depth this handle reports.
    pub fn isolation_depth(&self) -> u8 {
        self.reported.unwrap_or(self.depth)
    }

    /// A copy of the current statement.
    pub fn statement(&self) -> Statement {
        self.lock().clone()
    }

    /// True if both handles work on the same statement.
    pub fn shares_statement(&self, other: &Db) -> bool {
        Arc::ptr_eq(&self.stmt, &other.stmt)
    }

    fn lock(&self) -> MutexGuard<'_, Statement> {
        self.stmt.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, sql: impl AsRef<str>) {
        let sql = sql.as_ref();
        trace!(%sql, "execute");
        if self.config.debug {
            self.conn.recorder.record(format!("/* debug */ {}", sql));
        } else {
            self.conn.recorder.record(sql);
        }
    }

    fn require(&self, method: &str, available: bool) -> Result<(), RefDbError> {
        if available {
            Ok(())
        } else {
            Err(RefDbError::Unsupported {
                method: method.to_string(),
                version: self.conn.profile.version.clone(),
            })
        }
    }

    fn instance(&self) -> Db {
        let stmt = match self.depth {
            0 => self.stmt.clone(),
            1 => Arc::new(Mutex::new(Statement::default())),
            _ => Arc::new(Mutex::new(self.lock().clone())),
        };
        Db {
            depth: 0,
            reported: None,
            stmt,
            ..self.clone()
        }
    }

    fn chain(&self, apply: impl FnOnce(&mut Statement)) -> Db {
        let tx = self.instance();
        {
            let mut stmt = tx.lock();
            apply(&mut stmt);
        }
        tx
    }

    // Chain methods.

    pub fn filter(&self, query: &str, values: &[Value]) -> Db {
        let cond = bind(query, values);
        self.chain(|s| s.conditions.push((Connective::And, cond)))
    }

    pub fn or(&self, query: &str, values: &[Value]) -> Db {
        let cond = bind(query, values);
        self.chain(|s| s.conditions.push((Connective::Or, cond)))
    }

    pub fn not(&self, query: &str, values: &[Value]) -> Db {
        let cond = bind(query, values);
        self.chain(|s| s.conditions.push((Connective::Not, cond)))
    }

    pub fn select(&self, column: &str) -> Db {
        self.chain(|s| s.selects = vec![column.to_string()])
    }

    pub fn omit(&self, column: &str) -> Db {
        self.chain(|s| s.omits = vec![column.to_string()])
    }

    pub fn distinct(&self, column: &str) -> Db {
        self.chain(|s| {
            s.distinct = true;
            s.selects = vec![column.to_string()];
        })
    }

    pub fn order(&self, column: &str) -> Db {
        self.chain(|s| s.orders.push(column.to_string()))
    }

    /// Add a raw clause expression; expressions land in the order-by list.
    pub fn clauses(&self, expr: &str) -> Db {
        self.chain(|s| s.orders.push(expr.to_string()))
    }

    pub fn assign(&self, column: &str) -> Db {
        self.chain(|s| s.assigns.push(column.to_string()))
    }

    pub fn attrs(&self, column: &str) -> Db {
        self.chain(|s| s.attrs.push(column.to_string()))
    }

    /// Alias the `name` result column. A later mapping replaces it.
    pub fn map_columns(&self, to: &str) -> Result<Db, RefDbError> {
        self.require("MapColumns", self.conn.profile.has_map_columns)?;
        Ok(self.chain(|s| {
            s.column_map.insert("name".to_string(), to.to_string());
        }))
    }

    pub fn group(&self, column: &str) -> Db {
        self.chain(|s| s.groups.push(column.to_string()))
    }

    pub fn having(&self, query: &str, values: &[Value]) -> Db {
        let cond = bind(query, values);
        self.chain(|s| s.havings.push(cond))
    }

    pub fn joins(&self, clause: &str) -> Db {
        self.chain(|s| s.joins.push(clause.to_string()))
    }

    pub fn inner_joins(&self, clause: &str) -> Result<Db, RefDbError> {
        self.require("InnerJoins", self.conn.profile.has_inner_joins)?;
        Ok(self.chain(|s| s.joins.push(format!("INNER {}", clause))))
    }

    pub fn preload(&self, relation: &str, callback: Option<ScopeFn>) -> Db {
        self.chain(|s| {
            s.preloads.push(Preload {
                relation: relation.to_string(),
                callback,
                shared: Arc::new(Mutex::new(Statement::default())),
            })
        })
    }

    pub fn limit(&self, n: i64) -> Db {
        self.chain(|s| s.limit = Some(n))
    }

    pub fn offset(&self, n: i64) -> Db {
        self.chain(|s| s.offset = Some(n))
    }

    pub fn model(&self, name: &str) -> Db {
        self.chain(|s| s.table = Some(name.to_string()))
    }

    pub fn table(&self, name: &str) -> Db {
        self.chain(|s| s.table = Some(name.to_string()))
    }

    pub fn unscoped(&self) -> Db {
        self.chain(|s| s.unscoped = true)
    }

    pub fn raw(&self, sql: &str, values: &[Value]) -> Db {
        let sql = bind(sql, values);
        self.chain(|s| s.raw = Some(sql))
    }

    /// Register a scope. Scopes run, once, when the query next executes.
    pub fn scopes(&self, scope: ScopeFn) -> Db {
        self.chain(|s| s.scopes.push(scope))
    }

    // Handles with their own isolation.

    pub fn session(&self) -> Db {
        Db {
            depth: 2,
            reported: None,
            ..self.clone()
        }
    }

    pub fn with_context(&self, context: &str) -> Db {
        let mut db = self.session();
        db.config.context = Some(context.to_string());
        db
    }

    pub fn debug(&self) -> Db {
        let mut db = self.session();
        db.config.debug = true;
        db
    }

    pub fn begin(&self) -> Db {
        let depth = self.conn.profile.begin_depth;
        let shares = self.conn.profile.begin_shares_statement;
        let tx = self.instance();
        tx.record("BEGIN");
        if shares {
            Db {
                reported: Some(1),
                ..tx
            }
        } else {
            Db { depth, ..tx }
        }
    }

    pub fn commit(&self) -> Db {
        self.record("COMMIT");
        self.clone()
    }

    pub fn rollback(&self) -> Db {
        self.record("ROLLBACK");
        self.clone()
    }

    // Execution.

    fn apply_scopes(&self) {
        let scopes = std::mem::take(&mut self.lock().scopes);
        for scope in scopes {
            let shared = Db {
                depth: 0,
                reported: None,
                ..self.clone()
            };
            scope(shared);
        }
    }

    fn run_preloads(&self) {
        let preloads = self.lock().preloads.clone();
        for preload in preloads {
            let mut sql = format!(
                "SELECT * FROM {} WHERE user_id IN (1)",
                preload.relation.to_lowercase()
            );
            if let Some(callback) = &preload.callback {
                let handle = if self.conn.profile.preload_callback_shares_statement {
                    Db {
                        depth: 0,
                        reported: None,
                        stmt: preload.shared.clone(),
                        ..self.clone()
                    }
                } else {
                    Db {
                        depth: 1,
                        reported: None,
                        ..self.clone()
                    }
                };
                let scoped = callback(handle);
                let conditions = scoped.lock().conditions_sql();
                if !conditions.is_empty() {
                    sql.push_str(" AND ");
                    sql.push_str(&conditions);
                }
            }
            self.record(sql);
        }
    }

    /// Run a statement that does not load rows.
    fn write(&self, render: impl FnOnce(&Statement) -> String) {
        self.apply_scopes();
        let sql = render(&self.lock());
        self.record(sql);
    }

    /// Run a select and its preloads.
    fn query(&self, render: impl FnOnce(&Statement) -> String) {
        self.write(render);
        self.run_preloads();
    }

    fn with_conditions(&self, conds: &[&str]) -> Db {
        self.chain(|s| {
            for cond in conds {
                s.conditions.push((Connective::And, cond.to_string()));
            }
        })
    }

    // Finishers. Inline conditions are added to the statement the
    // finisher runs on.

    pub fn find(&self, conds: &[&str]) -> Db {
        let tx = self.with_conditions(conds);
        tx.query(|s| s.sql());
        tx
    }

    pub fn first(&self, conds: &[&str]) -> Db {
        let tx = self.with_conditions(conds);
        tx.query(|s| {
            let mut s = s.clone();
            s.orders.push(format!("{}.id", s.table_name()));
            s.limit = Some(1);
            s.sql()
        });
        tx
    }

    pub fn take(&self, conds: &[&str]) -> Db {
        let tx = self.with_conditions(conds);
        tx.query(|s| {
            let mut s = s.clone();
            s.limit = Some(1);
            s.sql()
        });
        tx
    }

    pub fn last(&self, conds: &[&str]) -> Db {
        let tx = self.with_conditions(conds);
        tx.query(|s| {
            let mut s = s.clone();
            s.orders.push(format!("{}.id DESC", s.table_name()));
            s.limit = Some(1);
            s.sql()
        });
        tx
    }

    /// Look the row up, then insert it with the pending attributes and
    /// assignments if it is missing.
    pub fn first_or_create(&self, conds: &[&str]) -> Db {
        let tx = self.first(conds);
        tx.write(|s| {
            let mut columns: Vec<&str> = s
                .attrs
                .iter()
                .chain(s.assigns.iter())
                .map(String::as_str)
                .collect();
            if columns.is_empty() {
                columns.push("name");
            }
            let defaults = vec!["DEFAULT"; columns.len()];
            format!(
                "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
                s.table_name(),
                columns.join(", "),
                defaults.join(", ")
            )
        });
        tx
    }

    /// Like `first`; the row is initialized in memory only.
    pub fn first_or_init(&self, conds: &[&str]) -> Db {
        self.first(conds)
    }

    pub fn delete(&self, conds: &[&str]) -> Db {
        let tx = self.with_conditions(conds);
        tx.write(|s| {
            format!(
                "UPDATE {} SET deleted_at = CURRENT_TIMESTAMP{}",
                s.table_name(),
                s.where_sql()
            )
        });
        tx
    }

    pub fn count(&self) -> Db {
        let tx = self.instance();
        tx.write(|s| s.render_select(Some("count(*)")));
        if self.conn.profile.count_clears_joins {
            tx.lock().joins.clear();
        }
        tx
    }

    /// Select `column` unless the query already selects something.
    pub fn pluck(&self, column: &str) -> Db {
        let tx = self.chain(|s| {
            if s.selects.is_empty() {
                s.selects = vec![column.to_string()];
            }
        });
        tx.query(|s| s.sql());
        tx
    }

    pub fn create(&self, value: &Value) -> Db {
        let tx = self.instance();
        tx.write(|s| format!("INSERT INTO {} (name) VALUES ({})", s.table_name(), value));
        tx
    }

    /// Insert or update by primary key.
    pub fn save(&self, value: &Value) -> Db {
        let tx = self.instance();
        tx.write(|s| {
            format!(
                "INSERT INTO {} (name) VALUES ({}) ON CONFLICT (id) DO UPDATE SET name = excluded.name",
                s.table_name(),
                value
            )
        });
        tx
    }

    pub fn create_in_batches(&self, value: &Value, batch: usize) -> Result<Db, RefDbError> {
        self.require("CreateInBatches", self.conn.profile.has_create_in_batches)?;
        let tx = self.instance();
        tx.write(|s| {
            format!(
                "INSERT INTO {} (name) VALUES ({}) /* batch {} */",
                s.table_name(),
                value,
                batch
            )
        });
        Ok(tx)
    }

    pub fn update(&self, column: &str, value: &Value) -> Db {
        let tx = self.instance();
        tx.write(|s| {
            format!(
                "UPDATE {} SET {} = {}{}",
                s.table_name(),
                column,
                value,
                s.where_sql()
            )
        });
        tx
    }

    pub fn updates(&self, value: &Value) -> Db {
        self.update("name", value)
    }

    pub fn exec(&self, sql: &str, values: &[Value]) -> Db {
        let tx = self.instance();
        tx.record(bind(sql, values));
        tx
    }

    pub fn row(&self) {
        let tx = self.instance();
        tx.query(|s| s.sql());
    }

    pub fn rows(&self) {
        self.row()
    }

    /// Run the query and scan into a destination.
    pub fn scan(&self) -> Db {
        let tx = self.instance();
        tx.query(|s| s.sql());
        tx
    }

    // Callback methods.

    /// Run `fc` inside a transaction on a session of this handle.
    pub fn transaction<F>(&self, fc: F) -> Result<(), RefDbError>
    where
        F: FnOnce(Db) -> Result<(), RefDbError>,
    {
        let tx = self.session().begin();
        match fc(tx.clone()) {
            Ok(()) => {
                tx.commit();
                Ok(())
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    pub fn connection<F>(&self, fc: F) -> Result<(), RefDbError>
    where
        F: FnOnce(Db) -> Result<(), RefDbError>,
    {
        self.require("Connection", self.conn.profile.has_connection)?;
        fc(self.session())
    }

    /// Load one batch and hand the handle that loaded it to `fc`.
    pub fn find_in_batches<F>(&self, batch: usize, mut fc: F) -> Result<Db, RefDbError>
    where
        F: FnMut(Db, usize) -> Result<(), RefDbError>,
    {
        let tx = self.instance();
        tx.query(|s| {
            let mut s = s.clone();
            s.limit = i64::try_from(batch).ok();
            s.sql()
        });
        fc(tx.clone(), 1)?;
        Ok(tx)
    }

    /// Render what `fc` builds without running it.
    pub fn to_sql<F>(&self, fc: F) -> Result<String, RefDbError>
    where
        F: FnOnce(Db) -> Db,
    {
        self.require("ToSQL", self.conn.profile.has_to_sql)?;
        let built = fc(self.session());
        let sql = built.lock().sql();
        built.record(format!("/* dry run */ {}", sql));
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purity_oracle::EffectRecorder;

    fn open(version: &str) -> (Db, CapturingRecorder) {
        let recorder = CapturingRecorder::new();
        (
            Db::open(VersionProfile::for_version(version), recorder.clone()),
            recorder,
        )
    }

    fn truthy(db: &Db, cond: &str) -> Db {
        db.filter(&format!("{} = ?", cond), &[Value::Bool(true)])
    }

    #[test]
    fn depth_zero_shares_the_statement() {
        let (root, _) = open("master");
        let base = root.model("users");
        assert_eq!(base.isolation_depth(), 0);
        let next = truthy(&base, "a");
        assert!(next.shares_statement(&base));
        assert_eq!(base.statement().conditions.len(), 1);
    }

    #[test]
    fn root_starts_fresh_and_session_copies() {
        let (root, _) = open("master");
        let base = truthy(&root.model("users"), "a");
        assert!(root.statement().conditions.is_empty());

        let session = base.session();
        assert_eq!(session.isolation_depth(), 2);
        let branch = truthy(&session, "b");
        assert!(!branch.shares_statement(&base));
        assert_eq!(branch.statement().conditions.len(), 2);
        assert_eq!(base.statement().conditions.len(), 1);
    }

    #[test]
    fn begin_reports_depth_but_old_versions_share() {
        let (root, _) = open("v1.20.0");
        let base = root.model("users");
        let tx = base.begin();
        assert_eq!(tx.isolation_depth(), 1);
        assert!(truthy(&tx, "x").shares_statement(&base));

        let (root, _) = open("v1.23.2");
        let base = root.model("users");
        let tx = base.begin();
        assert_eq!(tx.isolation_depth(), 1);
        assert!(!truthy(&tx, "x").shares_statement(&base));
    }

    #[test]
    fn finder_renders_and_records() {
        let (root, recorder) = open("master");
        root.model("users").limit(3).find(&["id = 1"]);
        assert_eq!(
            recorder.recorded_effects(),
            vec!["SELECT * FROM users WHERE id = 1 AND users.deleted_at IS NULL LIMIT 3".to_string()]
        );
    }

    #[test]
    fn debug_prefixes_statements() {
        let (root, recorder) = open("master");
        root.model("users").debug().find(&[]);
        assert!(recorder.contains_normalized("/* debug */ select"));
    }

    #[test]
    fn scopes_run_once() {
        let (root, recorder) = open("master");
        let scope: ScopeFn = Arc::new(|db: Db| db.order("id"));
        let query = root.model("users").scopes(scope);
        query.find(&[]);
        query.find(&[]);
        assert_eq!(recorder.count_normalized("order by id"), 2);
        assert_eq!(query.statement().orders, vec!["id".to_string()]);
    }

    #[test]
    fn count_clears_joins_only_in_affected_versions() {
        for (version, kept) in [("v1.25.6", false), ("v1.25.10", true)] {
            let (root, _) = open(version);
            let query = root.model("users").joins("JOIN orders ON orders.user_id = users.id");
            query.count();
            assert_eq!(query.statement().join_count() == 1, kept, "{}", version);
        }
    }

    #[test]
    fn first_or_create_inserts_pending_columns() {
        let (root, recorder) = open("master");
        let query = root.model("users").attrs("role").assign("age");
        query.first_or_create(&["name = 'ann'"]);
        assert!(recorder.contains_normalized("name = 'ann'"));
        assert!(recorder.contains_normalized(
            "insert into users (role, age) values (default, default) on conflict do nothing"
        ));

        let (root, recorder) = open("master");
        root.model("users").first_or_init(&[]);
        assert_eq!(recorder.recorded_effects().len(), 1);
    }

    #[test]
    fn map_columns_replaces_the_previous_alias() {
        let (root, recorder) = open("master");
        let query = root.model("users").map_columns("a").unwrap();
        query.map_columns("b").unwrap();
        query.find(&[]);
        assert!(recorder.contains_normalized("name as b"));
        assert!(!recorder.contains_normalized("name as a"));

        let (root, _) = open("v1.25.0");
        assert!(root.map_columns("a").is_err());
    }

    #[test]
    fn gated_methods_fail_before_their_release() {
        let (root, _) = open("v1.22.0");
        let err = root.to_sql(|db| db).unwrap_err();
        assert!(matches!(err, RefDbError::Unsupported { ref method, .. } if method == "ToSQL"));
        assert!(root.inner_joins("JOIN x").is_err());
        assert!(root.create_in_batches(&Value::Int(1), 10).is_ok());
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let (root, recorder) = open("master");
        let err = root
            .model("users")
            .transaction(|_| {
                Err(RefDbError::BadArguments {
                    method: "Transaction".to_string(),
                    message: "stop".to_string(),
                })
            })
            .unwrap_err();
        assert!(matches!(err, RefDbError::BadArguments { .. }));
        assert_eq!(
            recorder.recorded_effects(),
            vec!["BEGIN".to_string(), "ROLLBACK".to_string()]
        );
    }
}
