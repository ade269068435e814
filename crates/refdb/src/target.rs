//! Drives [`Db`] by method name for the oracle.

use std::sync::Arc;

use purity_oracle::{Arg, Call, CallbackLog, CapturingRecorder, Connection, ProbeError, Target};

use crate::db::Db;
use crate::profile::VersionProfile;
use crate::statement::{ScopeFn, Value};
use crate::RefDbError;

/// Batch size passed to `CreateInBatches` and `FindInBatches`.
pub const DEFAULT_BATCH: usize = 100;

/// The reference builder at one version.
#[derive(Debug, Clone)]
pub struct RefTarget {
    profile: VersionProfile,
}

impl RefTarget {
    pub fn new(version: &str) -> Self {
        RefTarget {
            profile: VersionProfile::for_version(version),
        }
    }

    pub fn profile(&self) -> &VersionProfile {
        &self.profile
    }
}

impl From<RefDbError> for ProbeError {
    fn from(e: RefDbError) -> Self {
        match e {
            RefDbError::Unsupported { method, .. } => ProbeError::Unsupported(method),
            other => ProbeError::Target(other.to_string()),
        }
    }
}

fn bad(call: &Call, message: &str) -> RefDbError {
    RefDbError::BadArguments {
        method: call.method.clone(),
        message: message.to_string(),
    }
}

fn text(call: &Call, i: usize) -> Result<&str, RefDbError> {
    match call.args.get(i) {
        Some(Arg::Text(s)) => Ok(s.as_str()),
        _ => Err(bad(call, &format!("argument {} must be text", i))),
    }
}

fn int(call: &Call, i: usize) -> Result<i64, RefDbError> {
    match call.args.get(i) {
        Some(Arg::Int(n)) => Ok(*n),
        _ => Err(bad(call, &format!("argument {} must be an integer", i))),
    }
}

fn value(call: &Call, i: usize) -> Result<Value, RefDbError> {
    match call.args.get(i) {
        Some(Arg::Text(s)) => Ok(Value::Text(s.clone())),
        Some(Arg::Int(n)) => Ok(Value::Int(*n)),
        Some(Arg::Bool(b)) => Ok(Value::Bool(*b)),
        _ => Err(bad(call, &format!("argument {} must be a value", i))),
    }
}

fn values(call: &Call, from: usize) -> Vec<Value> {
    call.args
        .iter()
        .skip(from)
        .filter_map(|a| match a {
            Arg::Text(s) => Some(Value::Text(s.clone())),
            Arg::Int(n) => Some(Value::Int(*n)),
            Arg::Bool(b) => Some(Value::Bool(*b)),
            Arg::Callback { .. } => None,
        })
        .collect()
}

fn conditions(call: &Call) -> Vec<&str> {
    call.args
        .iter()
        .filter_map(|a| match a {
            Arg::Text(s) => Some(s.as_str()),
            _ => None,
        })
        .collect()
}

fn callback_marker(call: &Call) -> Result<String, RefDbError> {
    call.args
        .iter()
        .find_map(|a| match a {
            Arg::Callback { marker } => Some(marker.clone()),
            _ => None,
        })
        .ok_or_else(|| bad(call, "missing callback"))
}

fn tagged(db: &Db, marker: &str) -> Db {
    db.filter(&format!("{} = ?", marker), &[Value::Bool(true)])
}

/// A scope that tags the handle it receives.
fn scope(marker: String, log: &CallbackLog) -> ScopeFn {
    let log = log.clone();
    Arc::new(move |db: Db| {
        log.record(Some(db.isolation_depth()));
        tagged(&db, &marker)
    })
}

/// Invoke `call` on `db`. Returns the handle the method returns, if any.
pub fn dispatch(db: &Db, call: &Call, log: &CallbackLog) -> Result<Option<Db>, RefDbError> {
    let handle = match call.method.as_str() {
        "Where" => db.filter(text(call, 0)?, &values(call, 1)),
        "Or" => db.or(text(call, 0)?, &values(call, 1)),
        "Not" => db.not(text(call, 0)?, &values(call, 1)),
        "Having" => db.having(text(call, 0)?, &values(call, 1)),
        "Select" => db.select(text(call, 0)?),
        "Omit" => db.omit(text(call, 0)?),
        "Distinct" => db.distinct(text(call, 0)?),
        "Order" => db.order(text(call, 0)?),
        "Clauses" => db.clauses(text(call, 0)?),
        "Assign" => db.assign(text(call, 0)?),
        "Attrs" => db.attrs(text(call, 0)?),
        "MapColumns" => db.map_columns(text(call, 0)?)?,
        "Group" => db.group(text(call, 0)?),
        "Model" => db.model(text(call, 0)?),
        "Table" => db.table(text(call, 0)?),
        "Joins" => db.joins(text(call, 0)?),
        "InnerJoins" => db.inner_joins(text(call, 0)?)?,
        "Preload" => {
            let callback = callback_marker(call).ok().map(|m| scope(m, log));
            db.preload(text(call, 0)?, callback)
        }
        "Limit" => db.limit(int(call, 0)?),
        "Offset" => db.offset(int(call, 0)?),
        "Unscoped" => db.unscoped(),
        "Raw" => db.raw(text(call, 0)?, &values(call, 1)),
        "Scopes" => db.scopes(scope(callback_marker(call)?, log)),
        "Session" => db.session(),
        "WithContext" => db.with_context("background"),
        "Debug" => db.debug(),
        "Begin" => db.begin(),
        "Commit" => db.commit(),
        "Rollback" => db.rollback(),
        "Find" => db.find(&conditions(call)),
        "First" => db.first(&conditions(call)),
        "Take" => db.take(&conditions(call)),
        "Last" => db.last(&conditions(call)),
        "FirstOrCreate" => db.first_or_create(&conditions(call)),
        "FirstOrInit" => db.first_or_init(&conditions(call)),
        "Delete" => db.delete(&conditions(call)),
        "Count" => db.count(),
        "Pluck" => db.pluck(text(call, 0)?),
        "Create" => db.create(&value(call, 0)?),
        "Save" => db.save(&value(call, 0)?),
        "Scan" => db.scan(),
        "CreateInBatches" => db.create_in_batches(&value(call, 0)?, DEFAULT_BATCH)?,
        "Update" => db.update("name", &value(call, 0)?),
        "Updates" => db.updates(&value(call, 0)?),
        "Exec" => db.exec(text(call, 0)?, &values(call, 1)),
        "Row" => {
            db.row();
            return Ok(None);
        }
        "Rows" => {
            db.rows();
            return Ok(None);
        }
        "Transaction" | "Connection" => {
            let marker = callback_marker(call)?;
            let log = log.clone();
            let body = move |tx: Db| -> Result<(), RefDbError> {
                log.record(Some(tx.isolation_depth()));
                tagged(&tx, &marker).find(&[]);
                Ok(())
            };
            if call.method == "Transaction" {
                db.transaction(body)?;
            } else {
                db.connection(body)?;
            }
            return Ok(None);
        }
        "FindInBatches" => {
            let marker = callback_marker(call)?;
            let log = log.clone();
            db.find_in_batches(DEFAULT_BATCH, move |batch: Db, _n| {
                log.record(Some(batch.isolation_depth()));
                tagged(&batch, &marker).find(&[]);
                Ok(())
            })?
        }
        "ToSQL" => {
            let marker = callback_marker(call)?;
            let log = log.clone();
            db.to_sql(move |tx: Db| {
                log.record(Some(tx.isolation_depth()));
                tagged(&tx, &marker)
            })?;
            return Ok(None);
        }
        "Statement" => return Ok(None),
        other => {
            return Err(RefDbError::Unsupported {
                method: other.to_string(),
                version: db.profile().version.clone(),
            })
        }
    };
    Ok(Some(handle))
}

impl Target for RefTarget {
    type Handle = Db;
    type Recorder = CapturingRecorder;

    fn connect(&self) -> Result<Connection<Db, CapturingRecorder>, ProbeError> {
        let recorder = CapturingRecorder::new();
        Ok(Connection {
            root: Db::open(self.profile.clone(), recorder.clone()),
            recorder,
            callbacks: CallbackLog::default(),
        })
    }

    fn mutable_base(&self, conn: &Connection<Db, CapturingRecorder>) -> Result<Db, ProbeError> {
        Ok(conn.root.model("users"))
    }

    fn invoke(
        &self,
        conn: &Connection<Db, CapturingRecorder>,
        handle: &Db,
        call: &Call,
    ) -> Result<Option<Db>, ProbeError> {
        if !self.profile.has(&call.method) {
            return Err(ProbeError::Unsupported(call.method.clone()));
        }
        Ok(dispatch(handle, call, &conn.callbacks)?)
    }

    fn tag(&self, handle: &Db, marker: &str) -> Result<Db, ProbeError> {
        Ok(tagged(handle, marker))
    }

    fn execute(&self, handle: &Db) -> Result<(), ProbeError> {
        handle.find(&[]);
        Ok(())
    }

    fn isolation_depth(&self, handle: &Db) -> Option<u8> {
        Some(handle.isolation_depth())
    }

    fn supports(&self, method: &str) -> bool {
        self.profile.has(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purity_oracle::EffectRecorder;

    #[test]
    fn dispatch_applies_conditions_with_values() {
        let target = RefTarget::new("master");
        let conn = target.connect().unwrap();
        let base = target.mutable_base(&conn).unwrap();
        let call = Call::new(
            "Where",
            vec![Arg::Text("name = ?".to_string()), Arg::Text("ann".to_string())],
        );
        target.invoke(&conn, &base, &call).unwrap();
        target.execute(&base).unwrap();
        assert!(conn.recorder.contains_normalized("name = 'ann'"));
    }

    #[test]
    fn gated_method_is_unsupported() {
        let target = RefTarget::new("v1.22.0");
        let conn = target.connect().unwrap();
        let base = target.mutable_base(&conn).unwrap();
        let err = target
            .invoke(&conn, &base, &Call::new("ToSQL", vec![]))
            .unwrap_err();
        assert_eq!(err, ProbeError::Unsupported("ToSQL".to_string()));
        assert!(!target.supports("InnerJoins"));
    }

    #[test]
    fn bad_arguments_are_target_errors() {
        let target = RefTarget::new("master");
        let conn = target.connect().unwrap();
        let base = target.mutable_base(&conn).unwrap();
        let err = target
            .invoke(&conn, &base, &Call::new("Limit", vec![Arg::Text("x".to_string())]))
            .unwrap_err();
        assert!(matches!(err, ProbeError::Target(ref m) if m.contains("Limit")));
    }

    #[test]
    fn callbacks_log_the_depth_they_receive() {
        let target = RefTarget::new("master");
        let conn = target.connect().unwrap();
        let base = target.mutable_base(&conn).unwrap();
        let call = Call::new(
            "Connection",
            vec![Arg::Callback {
                marker: "pm_probe".to_string(),
            }],
        );
        assert!(target.invoke(&conn, &base, &call).unwrap().is_none());
        assert_eq!(conn.callbacks.first(), Some(2));
        assert_eq!(conn.recorder.count_normalized("pm_probe"), 1);
    }
}
