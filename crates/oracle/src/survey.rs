//! Per-version survey: probe every method of interest on one target.

use std::collections::BTreeMap;

use purity_interchange::{MethodClassification, MethodDescriptor, TypeGraph, VersionSnapshot};
use tracing::{debug, info, info_span, warn};

use crate::anomaly;
use crate::catalog::{ArgShape, Catalog, MethodPlan};
use crate::probe::{self, guarded, Verdict};
use crate::target::Target;
use crate::ProbeError;

fn append(note: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !note.is_empty() {
        note.push_str("; ");
    }
    note.push_str(text);
}

/// Drives the probes for one target against one enumerated graph.
pub struct Oracle<'t, T> {
    target: &'t T,
    catalog: Catalog,
}

impl<'t, T: Target> Oracle<'t, T> {
    pub fn new(target: &'t T, catalog: Catalog) -> Self {
        Oracle { target, catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Survey every catalogued method plus every uncatalogued pollution
    /// path on the graph's handle type.
    ///
    /// Fails only if the graph never reached the handle type; individual
    /// probe failures are recorded on the classification instead.
    pub fn survey(&self, graph: &TypeGraph) -> Result<VersionSnapshot, ProbeError> {
        let handle = graph
            .handle()
            .ok_or_else(|| ProbeError::HandleNotEnumerated(graph.handle_type.clone()))?;
        let _span = info_span!("survey", version = %graph.version).entered();

        let mut methods = BTreeMap::new();
        for plan in self.catalog.in_survey_order() {
            let classification = match handle.method(&plan.name) {
                Some(descriptor) if self.target.supports(&plan.name) => {
                    self.classify(plan, descriptor)
                }
                _ => {
                    debug!(method = %plan.name, "method absent in this version");
                    MethodClassification::missing(plan.name.clone())
                }
            };
            methods.insert(plan.name.clone(), classification);
        }

        for descriptor in &handle.methods {
            if methods.contains_key(&descriptor.name) || !descriptor.is_pollution_path() {
                continue;
            }
            let classification = if descriptor.in_types.is_empty() && descriptor.returns_handle {
                self.classify(&MethodPlan::derived(&descriptor.name), descriptor)
            } else {
                let mut c = MethodClassification::existing(descriptor.name.clone());
                c.pure_note = format!("unprobed: no argument plan for {}", descriptor.signature);
                c
            };
            methods.insert(descriptor.name.clone(), classification);
        }

        let snapshot = VersionSnapshot::new(graph.version.clone(), methods);
        info!(
            total = snapshot.summary.total_methods,
            pure = snapshot.summary.pure_methods,
            impure = snapshot.summary.impure_methods,
            anomalies = snapshot.summary.anomaly_count,
            "survey complete"
        );
        Ok(snapshot)
    }

    /// Run every applicable probe for one existing method.
    pub fn classify(&self, plan: &MethodPlan, descriptor: &MethodDescriptor) -> MethodClassification {
        let _span = info_span!("method", name = %plan.name).entered();
        let mut c = MethodClassification::existing(plan.name.clone());

        match guarded(|| probe::purity(self.target, plan)) {
            Ok(v) => {
                c.pure = v.value;
                c.pure_note = v.note;
            }
            Err(e) => record_failure(&mut c, "purity", &e),
        }
        append(&mut c.pure_note, plan.note);

        if c.pure == Some(false) {
            match guarded(|| probe::impure_mode(self.target, plan)) {
                Ok(Verdict {
                    value: Some(mode), ..
                }) => {
                    c.set_impure_mode(mode);
                }
                Ok(v) => append(&mut c.pure_note, &v.note),
                Err(e) => record_failure(&mut c, "impure-mode", &e),
            }
        }

        if descriptor.returns_handle {
            match guarded(|| probe::immutable_return(self.target, plan)) {
                Ok(v) => {
                    c.immutable_return = v.value;
                    c.return_clone_depth = v.depth;
                    c.immutable_note = v.note;
                }
                Err(e) => record_failure(&mut c, "immutable-return", &e),
            }
        }

        if descriptor.takes_handle_callback {
            let has_plan = matches!(
                plan.shape,
                ArgShape::Scope | ArgShape::RelationCallback { .. }
            );
            if has_plan {
                match guarded(|| probe::callback_isolation(self.target, plan)) {
                    Ok(v) => {
                        c.callback_arg_immutable = v.value;
                        c.callback_clone_depth = v.depth;
                        c.callback_note = v.note;
                    }
                    Err(e) => record_failure(&mut c, "callback", &e),
                }
            } else {
                c.callback_note = "no callback plan for this method".to_string();
            }
        }

        if plan.retention {
            match guarded(|| probe::finisher_retention(self.target, plan)) {
                Ok(v) => {
                    c.finisher_preserves_state = v.value;
                    c.finisher_note = v.note;
                }
                Err(e) => record_failure(&mut c, "retention", &e),
            }
        }

        anomaly::detect(&mut c);
        for a in &c.anomalies {
            warn!(method = %c.name, anomaly = %a, "isolation depth disagrees with probes");
        }
        debug!(
            method = %c.name,
            pure = ?c.pure,
            immutable_return = ?c.immutable_return,
            callback_arg_immutable = ?c.callback_arg_immutable,
            "classified"
        );
        c
    }
}

fn record_failure(c: &mut MethodClassification, probe: &str, error: &ProbeError) {
    warn!(method = %c.name, probe, %error, "probe failed");
    let message = format!("{} probe failed: {}", probe, error);
    match probe {
        "purity" | "impure-mode" => append(&mut c.pure_note, &message),
        "immutable-return" => append(&mut c.immutable_note, &message),
        "callback" => append(&mut c.callback_note, &message),
        _ => append(&mut c.finisher_note, &message),
    }
    c.push_error(message);
}

/// Survey `graph` on `target` with the standard catalogue.
pub fn survey<T: Target>(target: &T, graph: &TypeGraph) -> Result<VersionSnapshot, ProbeError> {
    Oracle::new(target, Catalog::standard()).survey(graph)
}
