//! Classification dimensions compared across versions.

use std::fmt;

use purity_interchange::{ImpureMode, MethodClassification};
use serde::{Deserialize, Serialize};

/// One comparable field of a [`MethodClassification`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Exists,
    Pure,
    ImpureMode,
    ImmutableReturn,
    ReturnCloneDepth,
    CallbackArgImmutable,
    CallbackCloneDepth,
    FinisherPreservesState,
}

impl Dimension {
    /// Every dimension, in report order.
    pub const ALL: [Dimension; 8] = [
        Dimension::Exists,
        Dimension::Pure,
        Dimension::ImpureMode,
        Dimension::ImmutableReturn,
        Dimension::ReturnCloneDepth,
        Dimension::CallbackArgImmutable,
        Dimension::CallbackCloneDepth,
        Dimension::FinisherPreservesState,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Exists => "exists",
            Dimension::Pure => "pure",
            Dimension::ImpureMode => "impure_mode",
            Dimension::ImmutableReturn => "immutable_return",
            Dimension::ReturnCloneDepth => "return_clone_depth",
            Dimension::CallbackArgImmutable => "callback_arg_immutable",
            Dimension::CallbackCloneDepth => "callback_clone_depth",
            Dimension::FinisherPreservesState => "finisher_preserves_state",
        }
    }

    pub fn parse(name: &str) -> Option<Dimension> {
        Dimension::ALL.into_iter().find(|d| d.as_str() == name)
    }

    /// The method's value in this dimension. `None` means the probe did
    /// not apply or was inconclusive; it is never read as `false`.
    pub fn value(self, m: &MethodClassification) -> Option<Cell> {
        match self {
            Dimension::Exists => Some(Cell::Bool(m.exists)),
            Dimension::Pure => m.pure.map(Cell::Bool),
            Dimension::ImpureMode => m.impure_mode.map(Cell::Mode),
            Dimension::ImmutableReturn => m.immutable_return.map(Cell::Bool),
            Dimension::ReturnCloneDepth => m.return_clone_depth.map(Cell::Depth),
            Dimension::CallbackArgImmutable => m.callback_arg_immutable.map(Cell::Bool),
            Dimension::CallbackCloneDepth => m.callback_clone_depth.map(Cell::Depth),
            Dimension::FinisherPreservesState => m.finisher_preserves_state.map(Cell::Bool),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A present value in a matrix cell or change record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Bool(bool),
    Depth(u8),
    Mode(ImpureMode),
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Bool(b) => write!(f, "{}", b),
            Cell::Depth(d) => write!(f, "{}", d),
            Cell::Mode(m) => write!(f, "{}", m),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_parse() {
        for d in Dimension::ALL {
            assert_eq!(Dimension::parse(d.as_str()), Some(d));
            assert_eq!(serde_json::to_value(d).unwrap(), d.as_str());
        }
        assert_eq!(Dimension::parse("purity"), None);
    }

    #[test]
    fn absent_fields_have_no_value() {
        let m = MethodClassification::missing("Where");
        assert_eq!(Dimension::Exists.value(&m), Some(Cell::Bool(false)));
        for d in &Dimension::ALL[1..] {
            assert_eq!(d.value(&m), None, "{}", d);
        }
    }

    #[test]
    fn cells_serialize_as_plain_values() {
        assert_eq!(serde_json::to_string(&Cell::Bool(false)).unwrap(), "false");
        assert_eq!(serde_json::to_string(&Cell::Depth(2)).unwrap(), "2");
        assert_eq!(
            serde_json::to_string(&Cell::Mode(ImpureMode::Overwrite)).unwrap(),
            "\"overwrite\""
        );
    }
}
