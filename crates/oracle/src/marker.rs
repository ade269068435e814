//! Deterministic probe markers.
//!
//! A marker is `pm_<method>_<role>_<hex8>`, where the hex suffix comes from
//! a SHA-256 digest of `method:role`. Markers are lowercase identifiers so
//! they survive normalization and can be embedded as column names.

use sha2::{Digest, Sha256};

/// The part a marker plays within a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Pure,
    Confirm,
    First,
    Second,
    Return,
    BranchOne,
    BranchTwo,
    Callback,
    Join,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Pure => "pure",
            Role::Confirm => "confirm",
            Role::First => "first",
            Role::Second => "second",
            Role::Return => "return",
            Role::BranchOne => "branch_one",
            Role::BranchTwo => "branch_two",
            Role::Callback => "callback",
            Role::Join => "join",
        }
    }
}

fn digest(method: &str, role: Role) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(method.as_bytes());
    hasher.update(b":");
    hasher.update(role.as_str().as_bytes());
    hasher.finalize().into()
}

pub fn marker(method: &str, role: Role) -> String {
    let d = digest(method, role);
    let hex: String = d[..4].iter().map(|b| format!("{:02x}", b)).collect();
    let method: String = method
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("pm_{}_{}_{}", method, role.as_str(), hex)
}

/// A five-digit integer marker for methods that only take numbers.
pub fn marker_number(method: &str, role: Role) -> i64 {
    let d = digest(method, role);
    let n = u32::from_be_bytes([d[4], d[5], d[6], d[7]]);
    10_000 + i64::from(n % 80_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_are_stable_and_distinct() {
        let a = marker("Where", Role::First);
        assert_eq!(a, marker("Where", Role::First));
        assert_ne!(a, marker("Where", Role::Second));
        assert_ne!(a, marker("Or", Role::First));
        assert!(a.starts_with("pm_where_first_"));
        assert_eq!(a.len(), "pm_where_first_".len() + 8);
    }

    #[test]
    fn markers_are_identifier_safe() {
        let m = marker("Find-In.Batches", Role::BranchOne);
        assert!(m
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn numeric_markers_have_five_digits() {
        for role in [Role::Pure, Role::First, Role::Second] {
            let n = marker_number("Limit", role);
            assert!((10_000..90_000).contains(&n));
        }
        assert_ne!(
            marker_number("Limit", Role::First),
            marker_number("Limit", Role::Second)
        );
    }
}
