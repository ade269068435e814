//! Cross-checks between the isolation-depth signal and probe verdicts.
//!
//! The probes are authoritative; disagreements are recorded, never
//! resolved.

use purity_interchange::{Anomaly, MethodClassification};

fn push(c: &mut MethodClassification, anomaly: Anomaly) -> bool {
    if c.anomalies.contains(&anomaly) {
        return false;
    }
    c.anomalies.push(anomaly);
    true
}

fn append(note: &mut String, text: &str) {
    if !note.is_empty() {
        note.push_str("; ");
    }
    note.push_str(text);
}

/// Attach every anomaly the classification exhibits.
pub fn detect(c: &mut MethodClassification) {
    if let (Some(depth), Some(false)) = (c.return_clone_depth, c.immutable_return) {
        if depth >= 1 && push(c, Anomaly::ReturnDepthContradiction) {
            append(
                &mut c.immutable_note,
                &format!("isolation depth {} contradicts branch interference", depth),
            );
        }
    }
    if let (Some(depth), Some(false)) = (c.callback_clone_depth, c.callback_arg_immutable) {
        if depth >= 1 && push(c, Anomaly::CallbackDepthContradiction) {
            append(
                &mut c.callback_note,
                &format!("isolation depth {} contradicts callback accumulation", depth),
            );
        }
    }
    if c.callback_clone_depth == Some(0) && push(c, Anomaly::CallbackSharesHandle) {
        append(&mut c.callback_note, "callback receives a handle at isolation depth 0");
    }
    c.anomalies.sort();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn return_depth_contradiction() {
        let mut c = MethodClassification::existing("Begin");
        c.immutable_return = Some(false);
        c.return_clone_depth = Some(1);
        detect(&mut c);
        assert_eq!(c.anomalies, vec![Anomaly::ReturnDepthContradiction]);
        assert!(c.immutable_note.contains("isolation depth 1"));
    }

    #[test]
    fn depth_zero_with_interference_is_consistent() {
        let mut c = MethodClassification::existing("Where");
        c.immutable_return = Some(false);
        c.return_clone_depth = Some(0);
        detect(&mut c);
        assert!(c.anomalies.is_empty());
    }

    #[test]
    fn shared_callback_handle_is_flagged_once() {
        let mut c = MethodClassification::existing("Preload");
        c.callback_arg_immutable = Some(false);
        c.callback_clone_depth = Some(0);
        detect(&mut c);
        detect(&mut c);
        assert_eq!(c.anomalies, vec![Anomaly::CallbackSharesHandle]);
        assert_eq!(
            c.callback_note,
            "callback receives a handle at isolation depth 0"
        );
    }

    #[test]
    fn callback_depth_contradiction() {
        let mut c = MethodClassification::existing("Transaction");
        c.callback_arg_immutable = Some(false);
        c.callback_clone_depth = Some(2);
        detect(&mut c);
        assert_eq!(c.anomalies, vec![Anomaly::CallbackDepthContradiction]);
    }

    #[test]
    fn missing_depth_never_flags() {
        let mut c = MethodClassification::existing("Where");
        c.immutable_return = Some(false);
        detect(&mut c);
        assert!(c.anomalies.is_empty());
    }
}
