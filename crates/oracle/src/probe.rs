//! The black-box probes.
//!
//! Every probe opens its own connection, so no probe can observe another
//! probe's effects. A probe never concludes `false` from missing evidence:
//! when the observation is not conclusive it returns a [`Verdict`] with
//! `value: None` and a note saying why.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use purity_interchange::ImpureMode;
use tracing::debug;

use crate::catalog::{ArgShape, MethodPlan};
use crate::marker::{marker, Role};
use crate::recorder::EffectRecorder;
use crate::target::{Arg, Call, Connection, Target};
use crate::ProbeError;

/// Name of the chain method used to attach a tagged join for the
/// retention probe.
pub const RETENTION_CARRIER: &str = "Joins";

/// Outcome of one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict<T> {
    pub value: Option<T>,
    /// Isolation depth observed alongside the verdict, if any.
    pub depth: Option<u8>,
    pub note: String,
}

impl<T> Verdict<T> {
    pub fn conclusive(value: T) -> Self {
        Verdict {
            value: Some(value),
            depth: None,
            note: String::new(),
        }
    }

    pub fn inconclusive(note: impl Into<String>) -> Self {
        Verdict {
            value: None,
            depth: None,
            note: note.into(),
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }

    fn with_depth(mut self, depth: Option<u8>) -> Self {
        self.depth = depth;
        self
    }
}

/// Run a probe, turning a panic inside the target into a [`ProbeError`].
pub fn guarded<R>(probe: impl FnOnce() -> Result<R, ProbeError>) -> Result<R, ProbeError> {
    match panic::catch_unwind(AssertUnwindSafe(probe)) {
        Ok(result) => result,
        Err(payload) => Err(ProbeError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

type Conn<T> = Connection<<T as Target>::Handle, <T as Target>::Recorder>;

/// Run the terminal effect on `handle`, through the plan's observer
/// finisher when it has one.
fn terminal<T: Target>(
    target: &T,
    conn: &Conn<T>,
    plan: &MethodPlan,
    handle: &T::Handle,
) -> Result<(), ProbeError> {
    match plan.observer {
        Some(finisher) => target
            .invoke(conn, handle, &Call::new(finisher, vec![]))
            .map(drop),
        None => target.execute(handle),
    }
}

/// Does invoking the method and discarding its result mutate the receiver?
pub fn purity<T: Target>(target: &T, plan: &MethodPlan) -> Result<Verdict<bool>, ProbeError> {
    let probe = plan.call(Role::Pure);
    let Some(needle) = probe.needle else {
        return Ok(Verdict::inconclusive(
            "no observable marker for a nullary method",
        ));
    };
    if plan.shape == ArgShape::Chained {
        return chained_purity(target, plan, &needle);
    }

    let conn = target.connect()?;
    let base = target.mutable_base(&conn)?;
    target.invoke(&conn, &base, &probe.call)?;
    if plan.completes_on_invoke {
        conn.recorder.reset();
    }
    terminal(target, &conn, plan, &base)?;
    if conn.recorder.contains_normalized(&needle) {
        debug!(method = %plan.name, "marker reached the receiver");
        return Ok(Verdict::conclusive(false).with_note("marker reached the receiver"));
    }

    // A pure verdict must also hold on a later terminal call.
    target.tag(&base, &marker(&plan.name, Role::Confirm))?;
    conn.recorder.reset();
    terminal(target, &conn, plan, &base)?;
    if conn.recorder.contains_normalized(&needle) {
        return Ok(Verdict::inconclusive(
            "marker surfaced on a repeated terminal call",
        ));
    }
    Ok(Verdict::conclusive(true))
}

/// Purity of a finisher that takes no marker of its own.
///
/// The finisher runs on a chain tagged with the marker; a second chain
/// from the same receiver is then finished the same way. The marker in
/// the second query means the first chain's state outlived its finisher.
fn chained_purity<T: Target>(
    target: &T,
    plan: &MethodPlan,
    needle: &str,
) -> Result<Verdict<bool>, ProbeError> {
    let finisher = Call::new(plan.name.clone(), vec![]);
    let confirm = marker(&plan.name, Role::Confirm);

    let conn = target.connect()?;
    let base = target.mutable_base(&conn)?;
    let first = target.tag(&base, needle)?;
    target.invoke(&conn, &first, &finisher)?;
    conn.recorder.reset();
    let second = target.tag(&base, &confirm)?;
    target.invoke(&conn, &second, &finisher)?;

    if !conn.recorder.contains_normalized(&confirm) {
        return Ok(Verdict::inconclusive(format!(
            "{} produced no observable effect",
            plan.name
        )));
    }
    let leaked = conn.recorder.contains_normalized(needle);
    debug!(method = %plan.name, leaked, "chained finisher observation");
    Ok(if leaked {
        Verdict::conclusive(false).with_note("an earlier finished chain leaked into the next query")
    } else {
        Verdict::conclusive(true)
    })
}

/// For an impure method: do repeated applications stack or replace?
pub fn impure_mode<T: Target>(
    target: &T,
    plan: &MethodPlan,
) -> Result<Verdict<ImpureMode>, ProbeError> {
    if plan.shape == ArgShape::Chained {
        return Ok(Verdict::inconclusive(
            "the marker rides on the preceding chain call",
        ));
    }
    let first = plan.call(Role::First);
    let second = plan.call(Role::Second);
    let (Some(first_needle), Some(second_needle)) = (first.needle, second.needle) else {
        return Ok(Verdict::inconclusive("repeated calls are indistinguishable"));
    };
    if first_needle == second_needle {
        return Ok(Verdict::inconclusive("repeated calls are indistinguishable"));
    }

    let conn = target.connect()?;
    let base = target.mutable_base(&conn)?;
    target.invoke(&conn, &base, &first.call)?;
    target.invoke(&conn, &base, &second.call)?;
    if plan.completes_on_invoke {
        conn.recorder.reset();
    }
    terminal(target, &conn, plan, &base)?;

    let has_first = conn.recorder.contains_normalized(&first_needle);
    let has_second = conn.recorder.contains_normalized(&second_needle);
    debug!(method = %plan.name, has_first, has_second, "impure-mode observation");
    Ok(match (has_first, has_second) {
        (true, true) => Verdict::conclusive(ImpureMode::Accumulate),
        (false, true) => Verdict::conclusive(ImpureMode::Overwrite),
        (true, false) => Verdict::inconclusive("only the first application survived"),
        (false, false) => Verdict::inconclusive("neither application was observed"),
    })
}

/// Can the returned handle be branched into independent chains?
pub fn immutable_return<T: Target>(
    target: &T,
    plan: &MethodPlan,
) -> Result<Verdict<bool>, ProbeError> {
    let probe = plan.call(Role::Return);
    let conn = target.connect()?;
    let base = target.mutable_base(&conn)?;
    let Some(handle) = target.invoke(&conn, &base, &probe.call)? else {
        return Ok(Verdict::inconclusive("method returned no handle"));
    };
    let depth = target.isolation_depth(&handle);

    let one = marker(&plan.name, Role::BranchOne);
    let two = marker(&plan.name, Role::BranchTwo);

    let branch = target.tag(&handle, &one)?;
    target.execute(&branch)?;
    conn.recorder.reset();
    let branch = target.tag(&handle, &two)?;
    target.execute(&branch)?;

    if !conn.recorder.contains_normalized(&two) {
        return Ok(Verdict::inconclusive("second branch produced no effect").with_depth(depth));
    }
    let crossed = conn.recorder.contains_normalized(&one);
    debug!(method = %plan.name, crossed, ?depth, "immutable-return observation");
    let verdict = if crossed {
        Verdict::conclusive(false).with_note("first branch leaked into the second")
    } else {
        Verdict::conclusive(true)
    };
    Ok(verdict.with_depth(depth))
}

/// Is the handle passed into a callback isolated from earlier runs?
pub fn callback_isolation<T: Target>(
    target: &T,
    plan: &MethodPlan,
) -> Result<Verdict<bool>, ProbeError> {
    let probe = plan.call(Role::Callback);
    let Some(needle) = probe.needle else {
        return Ok(Verdict::inconclusive("no callback plan for this method"));
    };
    if !probe
        .call
        .args
        .iter()
        .any(|a| matches!(a, Arg::Callback { .. }))
    {
        return Ok(Verdict::inconclusive("no callback plan for this method"));
    }

    let conn = target.connect()?;
    let base = target.mutable_base(&conn)?;

    let (first, second) = if plan.completes_on_invoke {
        target.invoke(&conn, &base, &probe.call)?;
        let first = conn.recorder.count_normalized(&needle);
        conn.recorder.reset();
        target.invoke(&conn, &base, &probe.call)?;
        (first, conn.recorder.count_normalized(&needle))
    } else {
        let Some(query) = target.invoke(&conn, &base, &probe.call)? else {
            return Ok(Verdict::inconclusive("method returned no handle to execute"));
        };
        target.execute(&query)?;
        let first = conn.recorder.count_normalized(&needle);
        conn.recorder.reset();
        target.execute(&query)?;
        (first, conn.recorder.count_normalized(&needle))
    };
    let depth = conn.callbacks.first();
    debug!(method = %plan.name, first, second, ?depth, "callback observation");

    if first == 0 && second == 0 {
        return Ok(Verdict::inconclusive("callback marker was never observed").with_depth(depth));
    }
    let verdict = if second > first {
        Verdict::conclusive(false).with_note(format!(
            "callback handle accumulates (first={}, second={})",
            first, second
        ))
    } else {
        Verdict::conclusive(true)
    };
    Ok(verdict.with_depth(depth))
}

/// Does running the finisher leave the query it ran on intact?
pub fn finisher_retention<T: Target>(
    target: &T,
    plan: &MethodPlan,
) -> Result<Verdict<bool>, ProbeError> {
    if !target.supports(RETENTION_CARRIER) {
        return Ok(Verdict::inconclusive(format!(
            "{} is not available",
            RETENTION_CARRIER
        )));
    }
    let join = marker(&plan.name, Role::Join);
    let carrier = Call::new(
        RETENTION_CARRIER,
        vec![Arg::Text(format!(
            "JOIN {} ON {}.user_id = users.id",
            join, join
        ))],
    );

    let conn = target.connect()?;
    let base = target.mutable_base(&conn)?;
    let Some(query) = target.invoke(&conn, &base, &carrier)? else {
        return Ok(Verdict::inconclusive("join carrier returned no handle"));
    };
    target.invoke(&conn, &query, &Call::new(plan.name.clone(), vec![]))?;
    conn.recorder.reset();
    target.execute(&query)?;

    let kept = conn.recorder.contains_normalized(&join);
    debug!(method = %plan.name, kept, "retention observation");
    Ok(if kept {
        Verdict::conclusive(true)
    } else {
        Verdict::conclusive(false).with_note(format!("{} discarded the query's joins", plan.name))
    })
}
