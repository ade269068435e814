//! Version identifier ordering.
//!
//! Identifiers like `v1.9.0` and `v1.10.0` must sort numerically, and a
//! pre-release (`v1.25.0-rc1`) sorts before its release. Identifiers with
//! no numeric core sort lexically after all numeric ones.

use std::cmp::Ordering;

/// Sort key for a version identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionKey {
    numeric: Option<Vec<u64>>,
    pre_release: Option<String>,
    raw: String,
}

impl VersionKey {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let core = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        let (core, pre_release) = match core.split_once(['-', '+']) {
            Some((c, rest)) => (c, Some(rest.to_string())),
            None => (core, None),
        };
        let numeric: Option<Vec<u64>> = core.split('.').map(|p| p.parse::<u64>().ok()).collect();
        VersionKey {
            numeric,
            pre_release,
            raw: trimmed.to_string(),
        }
    }

    /// Numeric components, if the identifier has a numeric core.
    pub fn components(&self) -> Option<&[u64]> {
        self.numeric.as_deref()
    }

    /// True if this version is at least `major.minor.patch`.
    pub fn at_least(&self, major: u64, minor: u64, patch: u64) -> bool {
        match &self.numeric {
            Some(parts) => {
                let get = |i: usize| parts.get(i).copied().unwrap_or(0);
                (get(0), get(1), get(2)) >= (major, minor, patch)
            }
            None => false,
        }
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (&self.numeric, &other.numeric) {
            (Some(a), Some(b)) => {
                let len = a.len().max(b.len());
                for i in 0..len {
                    let x = a.get(i).copied().unwrap_or(0);
                    let y = b.get(i).copied().unwrap_or(0);
                    match x.cmp(&y) {
                        Ordering::Equal => continue,
                        ord => return ord,
                    }
                }
                match (&self.pre_release, &other.pre_release) {
                    (None, None) => self.raw.cmp(&other.raw),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (Some(x), Some(y)) => x.cmp(y).then_with(|| self.raw.cmp(&other.raw)),
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.raw.cmp(&other.raw),
        }
    }
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Sort version identifiers in place by [`VersionKey`] order.
pub fn sort_versions(versions: &mut [String]) {
    versions.sort_by_cached_key(|v| VersionKey::parse(v));
}
