//! On-disk artifact cache, partitioned by kind and version.
//!
//! Layout: `<root>/<KIND>/<version>.json`. Writes go to a temporary
//! sibling, are flushed, then renamed over the target, so a reader sees
//! either the old document or the new one. A cached document that does
//! not parse as a well-formed artifact for its version is a cache miss.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use purity_interchange::{sort_versions, Artifact};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot serialize {version}: {source}")]
    Serialize {
        version: String,
        #[source]
        source: serde_json::Error,
    },

    /// The identifier cannot be used as a file name.
    #[error("invalid version identifier '{0}'")]
    InvalidVersion(String),
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Reject identifiers that cannot name a file inside one directory.
pub fn check_version(version: &str) -> Result<(), StoreError> {
    let bad = version.is_empty()
        || version.starts_with('.')
        || version.contains(['/', '\\'])
        || version.chars().any(char::is_control);
    if bad {
        Err(StoreError::InvalidVersion(version.to_string()))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ArtifactStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kind_dir<A: Artifact>(&self) -> PathBuf {
        self.root.join(A::KIND)
    }

    pub fn path_for<A: Artifact>(&self, version: &str) -> Result<PathBuf, StoreError> {
        check_version(version)?;
        Ok(self.kind_dir::<A>().join(format!("{}.json", version)))
    }

    /// Load the cached artifact for `version`, if a well-formed one exists.
    pub fn load<A: Artifact>(&self, version: &str) -> Result<Option<A>, StoreError> {
        let path = self.path_for::<A>(version)?;
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(&path)(e)),
        };
        match A::parse_for(&text, version) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unusable cached artifact");
                Ok(None)
            }
        }
    }

    /// Persist `artifact` atomically. Returns the final path.
    pub fn save<A: Artifact>(&self, artifact: &A) -> Result<PathBuf, StoreError> {
        let version = artifact.version();
        let path = self.path_for::<A>(version)?;
        let dir = self.kind_dir::<A>();
        fs::create_dir_all(&dir).map_err(io_error(&dir))?;

        let mut body =
            serde_json::to_string_pretty(artifact).map_err(|source| StoreError::Serialize {
                version: version.to_string(),
                source,
            })?;
        body.push('\n');

        let tmp = dir.join(format!(".{}.json.tmp", version));
        {
            let mut file = fs::File::create(&tmp).map_err(io_error(&tmp))?;
            file.write_all(body.as_bytes()).map_err(io_error(&tmp))?;
            file.flush().map_err(io_error(&tmp))?;
            file.sync_all().map_err(io_error(&tmp))?;
        }
        fs::rename(&tmp, &path).map_err(io_error(&path))?;
        debug!(path = %path.display(), "artifact persisted");
        Ok(path)
    }

    /// Versions with a file of this kind, in version order. Files are not
    /// validated.
    pub fn versions<A: Artifact>(&self) -> Result<Vec<String>, StoreError> {
        let dir = self.kind_dir::<A>();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(&dir)(e)),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(io_error(&dir))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with('.') {
                continue;
            }
            if let Some(version) = name.strip_suffix(".json") {
                versions.push(version.to_string());
            }
        }
        sort_versions(&mut versions);
        Ok(versions)
    }

    /// Every well-formed artifact of this kind, in version order.
    pub fn load_all<A: Artifact>(&self) -> Result<Vec<A>, StoreError> {
        let mut out = Vec::new();
        for version in self.versions::<A>()? {
            if let Some(artifact) = self.load::<A>(&version)? {
                out.push(artifact);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use purity_interchange::VersionSnapshot;
    use std::collections::BTreeMap;

    fn snapshot(version: &str) -> VersionSnapshot {
        VersionSnapshot::new(version, BTreeMap::new())
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        let path = store.save(&snapshot("v1.2.0")).unwrap();
        assert_eq!(path, dir.path().join("purity").join("v1.2.0.json"));
        let loaded: VersionSnapshot = store.load("v1.2.0").unwrap().unwrap();
        assert_eq!(loaded, snapshot("v1.2.0"));
        assert!(!dir.path().join("purity").join(".v1.2.0.json.tmp").exists());
    }

    #[test]
    fn missing_and_malformed_files_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        assert!(store.load::<VersionSnapshot>("v1.0.0").unwrap().is_none());

        fs::create_dir_all(dir.path().join("purity")).unwrap();
        fs::write(dir.path().join("purity/v1.0.0.json"), "{\"version\": ").unwrap();
        assert!(store.load::<VersionSnapshot>("v1.0.0").unwrap().is_none());

        let other = serde_json::to_string(&snapshot("v2.0.0")).unwrap();
        fs::write(dir.path().join("purity/v1.1.0.json"), other).unwrap();
        assert!(store.load::<VersionSnapshot>("v1.1.0").unwrap().is_none());
    }

    #[test]
    fn versions_are_listed_in_version_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path());
        for v in ["v1.10.0", "v1.9.0", "master"] {
            store.save(&snapshot(v)).unwrap();
        }
        fs::write(dir.path().join("purity/.v1.11.0.json.tmp"), "partial").unwrap();
        assert_eq!(
            store.versions::<VersionSnapshot>().unwrap(),
            vec!["v1.9.0", "v1.10.0", "master"]
        );
        assert_eq!(store.load_all::<VersionSnapshot>().unwrap().len(), 3);
    }

    #[test]
    fn path_like_versions_are_rejected() {
        let store = ArtifactStore::new("unused");
        for v in ["", "../x", "a/b", ".hidden"] {
            assert!(matches!(
                store.path_for::<VersionSnapshot>(v),
                Err(StoreError::InvalidVersion(_))
            ));
        }
    }
}
