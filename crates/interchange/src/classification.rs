//! Per-method verdicts produced by the mutability oracle.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::InterchangeError;

/// How repeated pollution of the same receiver behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImpureMode {
    /// Every discarded call stacks onto the receiver.
    Accumulate,
    /// A later call replaces an earlier one.
    Overwrite,
}

impl fmt::Display for ImpureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImpureMode::Accumulate => write!(f, "accumulate"),
            ImpureMode::Overwrite => write!(f, "overwrite"),
        }
    }
}

/// A contradiction between the internal isolation-depth signal and the
/// black-box probes. Anomalies are reported, never reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anomaly {
    /// Returned handle reports depth >= 1 but its branches interfere.
    ReturnDepthContradiction,
    /// Callback handle reports depth >= 1 but accumulates across runs.
    CallbackDepthContradiction,
    /// Callback handle reports depth 0, i.e. it shares caller state.
    CallbackSharesHandle,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::ReturnDepthContradiction => write!(f, "return-depth-contradiction"),
            Anomaly::CallbackDepthContradiction => write!(f, "callback-depth-contradiction"),
            Anomaly::CallbackSharesHandle => write!(f, "callback-shares-handle"),
        }
    }
}

/// The oracle's verdict for one method in one version.
///
/// Every probe field is optional: `None` means "not applicable" or
/// "inconclusive", and is omitted from the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodClassification {
    pub name: String,
    pub exists: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pure: Option<bool>,
    /// Only meaningful when `pure == Some(false)`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impure_mode: Option<ImpureMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable_return: Option<bool>,
    /// Isolation depth (0/1/2) of the returned handle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_clone_depth: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_arg_immutable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_clone_depth: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finisher_preserves_state: Option<bool>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pure_note: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub immutable_note: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub callback_note: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub finisher_note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub anomalies: Vec<Anomaly>,
}

/// Largest isolation depth a target may report.
pub const MAX_CLONE_DEPTH: u8 = 2;

impl MethodClassification {
    /// A method present in this version, with nothing probed yet.
    pub fn existing(name: impl Into<String>) -> Self {
        MethodClassification {
            name: name.into(),
            exists: true,
            ..Default::default()
        }
    }

    /// A method absent from this version. All probe fields stay `None`.
    pub fn missing(name: impl Into<String>) -> Self {
        MethodClassification {
            name: name.into(),
            exists: false,
            ..Default::default()
        }
    }

    /// Set the impure mode. Refused unless the method was found impure.
    pub fn set_impure_mode(&mut self, mode: ImpureMode) -> bool {
        if self.pure == Some(false) {
            self.impure_mode = Some(mode);
            true
        } else {
            false
        }
    }

    /// Append a note to the error field without losing earlier errors.
    pub fn push_error(&mut self, message: impl AsRef<str>) {
        match &mut self.error {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(message.as_ref());
            }
            None => self.error = Some(message.as_ref().to_string()),
        }
    }

    /// True if any probe produced a verdict.
    pub fn has_verdict(&self) -> bool {
        self.pure.is_some()
            || self.immutable_return.is_some()
            || self.callback_arg_immutable.is_some()
            || self.finisher_preserves_state.is_some()
    }

    /// Check the field invariants of the data model.
    pub fn validate(&self) -> Result<(), InterchangeError> {
        let fail = |message: &str| InterchangeError::InvalidClassification {
            method: self.name.clone(),
            message: message.to_string(),
        };

        if self.impure_mode.is_some() && self.pure != Some(false) {
            return Err(fail("impure_mode set on a method not classified impure"));
        }
        if !self.exists && (self.has_verdict() || self.impure_mode.is_some()) {
            return Err(fail("absent method carries a probe verdict"));
        }
        let depth_ok = |d: Option<u8>| d.map_or(true, |d| d <= MAX_CLONE_DEPTH);
        if !depth_ok(self.return_clone_depth) || !depth_ok(self.callback_clone_depth) {
            return Err(fail("clone depth out of range"));
        }
        Ok(())
    }
}
