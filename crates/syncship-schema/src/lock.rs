use crate::identity::hash_field;
use crate::source::SourceManifest;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock manifest I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock manifest parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("lock manifest contains no packages")]
    Empty,
    #[error("dependency '{name} {version}' is not pinned: {reason}")]
    Unpinned {
        name: String,
        version: String,
        reason: String,
    },
    #[error("'{parent}' depends on '{dependency}', which is missing from the lock manifest")]
    MissingTransitive { parent: String, dependency: String },
    #[error("dependency '{0}' is declared in the source manifest but missing from the lock manifest")]
    MissingFromLock(String),
    #[error("lock manifest drift: {0}")]
    Drift(String),
}

/// One pinned entry of a Cargo-format lock manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct LockedDependency {
    pub name: String,
    pub version: String,
    /// `None` for path dependencies (workspace members).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    /// Edges as written by Cargo: `name`, `name version` or `name version (source)`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl LockedDependency {
    pub fn is_path(&self) -> bool {
        self.source.is_none()
    }

    fn pin_violation(&self) -> Option<String> {
        if !is_exact_version(&self.version) {
            return Some(format!(
                "version '{}' is not an exact MAJOR.MINOR.PATCH version",
                self.version
            ));
        }
        let Some(source) = self.source.as_deref() else {
            // Path dependencies are pinned by the source tree hash.
            return None;
        };
        if source.starts_with("registry+") || source.starts_with("sparse+") {
            match self.checksum.as_deref() {
                Some(sum) if is_hex(sum, 64) => None,
                Some(sum) => Some(format!("checksum '{sum}' is not a sha256 hex digest")),
                None => Some("registry dependency has no checksum".to_owned()),
            }
        } else if source.starts_with("git+") {
            match source.rsplit_once('#') {
                Some((_, rev)) if is_hex(rev, 40) => None,
                _ => Some(format!("git source '{source}' does not pin a commit")),
            }
        } else {
            Some(format!("unsupported source '{source}'"))
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawLock {
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    package: Vec<LockedDependency>,
}

/// Ordered, immutable view of a lock manifest.
///
/// Entries are sorted by (name, version) at parse time so the canonical hash
/// does not depend on the order the package manager wrote them in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LockManifest {
    pub format_version: Option<u32>,
    entries: Vec<LockedDependency>,
}

impl LockManifest {
    pub fn parse_str(input: &str) -> Result<Self, LockError> {
        let raw: RawLock = toml::from_str(input)?;
        let mut entries = raw.package;
        if entries.is_empty() {
            return Err(LockError::Empty);
        }
        entries.sort();
        Ok(Self {
            format_version: raw.version,
            entries,
        })
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, LockError> {
        let content = fs::read_to_string(path)?;
        Self::parse_str(&content)
    }

    pub fn entries(&self) -> &[LockedDependency] {
        &self.entries
    }

    pub fn get<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a LockedDependency> + 'a {
        self.entries.iter().filter(move |e| e.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).next().is_some()
    }

    /// Canonical blake3 hash over the sorted entries.
    pub fn canonical_hash(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        for e in &self.entries {
            hash_field(&mut hasher, "name", &e.name);
            hash_field(&mut hasher, "version", &e.version);
            if let Some(ref source) = e.source {
                hash_field(&mut hasher, "src", source);
            }
            if let Some(ref sum) = e.checksum {
                hash_field(&mut hasher, "sum", sum);
            }
            for dep in &e.dependencies {
                hash_field(&mut hasher, "dep", dep);
            }
        }
        hasher.finalize().to_hex().to_string()
    }

    /// Reject floating versions, unverifiable sources, and dangling edges.
    pub fn ensure_pinned(&self) -> Result<(), LockError> {
        for entry in &self.entries {
            if let Some(reason) = entry.pin_violation() {
                return Err(LockError::Unpinned {
                    name: entry.name.clone(),
                    version: entry.version.clone(),
                    reason,
                });
            }
            for edge in &entry.dependencies {
                let mut parts = edge.split_whitespace();
                let dep_name = parts.next().unwrap_or_default();
                let dep_version = parts.next();
                let found = self
                    .get(dep_name)
                    .any(|d| dep_version.is_none_or(|v| d.version == v));
                if !found {
                    return Err(LockError::MissingTransitive {
                        parent: entry.name.clone(),
                        dependency: edge.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Check that the source manifest agrees with this lock manifest and with
    /// the package identity the release declared.
    pub fn verify_source(
        &self,
        source: &SourceManifest,
        expected_name: &str,
        expected_version: &str,
    ) -> Result<(), LockError> {
        if source.name != expected_name {
            return Err(LockError::Drift(format!(
                "source manifest declares package '{}', package definition expects '{expected_name}'",
                source.name
            )));
        }
        if source.version != expected_version {
            return Err(LockError::Drift(format!(
                "source manifest declares version '{}', package definition expects '{expected_version}'",
                source.version
            )));
        }
        let root_locked = self
            .get(&source.name)
            .any(|e| e.is_path() && e.version == source.version);
        if !root_locked {
            return Err(LockError::Drift(format!(
                "package '{} {}' is not recorded in the lock manifest",
                source.name, source.version
            )));
        }
        for dep in &source.dependencies {
            if !self.contains(dep) {
                return Err(LockError::MissingFromLock(dep.clone()));
            }
        }
        Ok(())
    }
}

fn is_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `MAJOR.MINOR.PATCH` with optional `-pre` and `+build` suffixes.
fn is_exact_version(version: &str) -> bool {
    let without_build = match version.split_once('+') {
        Some((v, build)) => {
            if !is_ident_list(build) {
                return false;
            }
            v
        }
        None => version,
    };
    let core = match without_build.split_once('-') {
        Some((c, pre)) => {
            if !is_ident_list(pre) {
                return false;
            }
            c
        }
        None => without_build,
    };
    let parts: Vec<&str> = core.split('.').collect();
    parts.len() == 3
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()))
}

fn is_ident_list(s: &str) -> bool {
    !s.is_empty()
        && s.split('.').all(|id| {
            !id.is_empty() && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUM: &str = "2f9a1b1ca1b5a0b5cc8d0a86a87f5d0ac6e4e1a0bb4c1a4f38e9b6f5de1f0b21";
    const REV: &str = "0123456789abcdef0123456789abcdef01234567";

    fn sample_lock() -> String {
        format!(
            r#"
version = 3

[[package]]
name = "sync-server"
version = "1.2.3"
dependencies = ["serde", "ws"]

[[package]]
name = "ws"
version = "0.9.2"
source = "registry+https://github.com/rust-lang/crates.io-index"
checksum = "{SUM}"

[[package]]
name = "serde"
version = "1.0.200"
source = "registry+https://github.com/rust-lang/crates.io-index"
checksum = "{SUM}"
"#
        )
    }

    fn sample_source() -> SourceManifest {
        SourceManifest::parse_str(
            r#"
[package]
name = "sync-server"
version = "1.2.3"

[dependencies]
serde = "1"
ws = { version = "0.9" }
"#,
        )
        .unwrap()
    }

    #[test]
    fn parses_and_sorts_entries() {
        let lock = LockManifest::parse_str(&sample_lock()).unwrap();
        let names: Vec<&str> = lock.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["serde", "sync-server", "ws"]);
        assert_eq!(lock.format_version, Some(3));
    }

    #[test]
    fn canonical_hash_ignores_entry_order() {
        let a = LockManifest::parse_str(&sample_lock()).unwrap();
        let reordered = format!(
            r#"
[[package]]
name = "serde"
version = "1.0.200"
source = "registry+https://github.com/rust-lang/crates.io-index"
checksum = "{SUM}"

[[package]]
name = "ws"
version = "0.9.2"
source = "registry+https://github.com/rust-lang/crates.io-index"
checksum = "{SUM}"

[[package]]
name = "sync-server"
version = "1.2.3"
dependencies = ["serde", "ws"]
"#
        );
        let b = LockManifest::parse_str(&reordered).unwrap();
        assert_eq!(a.canonical_hash(), b.canonical_hash());
    }

    #[test]
    fn canonical_hash_changes_with_version() {
        let a = LockManifest::parse_str(&sample_lock()).unwrap();
        let b = LockManifest::parse_str(&sample_lock().replace("0.9.2", "0.9.3")).unwrap();
        assert_ne!(a.canonical_hash(), b.canonical_hash());
    }

    #[test]
    fn canonical_hash_keeps_field_boundaries() {
        let one = |extra: &str| {
            LockManifest::parse_str(&format!(
                "[[package]]\nname = \"x\"\nversion = \"1.0.0\"\n{extra}"
            ))
            .unwrap()
        };
        let joined = one("source = \"asum:bc\"\n");
        let split = one("source = \"a\"\nchecksum = \"bc\"\n");
        assert_ne!(joined.canonical_hash(), split.canonical_hash());
    }

    #[test]
    fn get_filters_by_name() {
        let lock = LockManifest::parse_str(&sample_lock()).unwrap();
        assert_eq!(lock.get("serde").count(), 1);
        assert!(lock.contains("ws"));
        assert!(!lock.contains("tokio"));
    }

    #[test]
    fn fully_pinned_lock_passes() {
        let lock = LockManifest::parse_str(&sample_lock()).unwrap();
        lock.ensure_pinned().unwrap();
    }

    #[test]
    fn rejects_floating_version() {
        let lock = LockManifest::parse_str(&sample_lock().replace("0.9.2", "^0.9")).unwrap();
        let err = lock.ensure_pinned().unwrap_err();
        assert!(matches!(err, LockError::Unpinned { ref name, .. } if name == "ws"));
    }

    #[test]
    fn rejects_wildcard_version() {
        let lock = LockManifest::parse_str(&sample_lock().replace("1.0.200", "1.*")).unwrap();
        assert!(lock.ensure_pinned().is_err());
    }

    #[test]
    fn rejects_registry_entry_without_checksum() {
        let input = r#"
[[package]]
name = "ws"
version = "0.9.2"
source = "registry+https://github.com/rust-lang/crates.io-index"
"#;
        let lock = LockManifest::parse_str(input).unwrap();
        let err = lock.ensure_pinned().unwrap_err();
        assert!(err.to_string().contains("no checksum"));
    }

    #[test]
    fn git_source_requires_commit() {
        let unpinned = r#"
[[package]]
name = "ws"
version = "0.9.2"
source = "git+https://github.com/housleyjk/ws-rs?branch=master"
"#;
        assert!(LockManifest::parse_str(unpinned)
            .unwrap()
            .ensure_pinned()
            .is_err());

        let pinned = format!(
            r#"
[[package]]
name = "ws"
version = "0.9.2"
source = "git+https://github.com/housleyjk/ws-rs?branch=master#{REV}"
"#
        );
        LockManifest::parse_str(&pinned)
            .unwrap()
            .ensure_pinned()
            .unwrap();
    }

    #[test]
    fn rejects_dangling_transitive_edge() {
        let lock =
            LockManifest::parse_str(&sample_lock().replace("[\"serde\", \"ws\"]", "[\"mio\"]"))
                .unwrap();
        let err = lock.ensure_pinned().unwrap_err();
        assert!(matches!(err, LockError::MissingTransitive { .. }));
    }

    #[test]
    fn versioned_edge_must_match_version() {
        let lock = LockManifest::parse_str(
            &sample_lock().replace("[\"serde\", \"ws\"]", "[\"serde 1.0.201\"]"),
        )
        .unwrap();
        assert!(lock.ensure_pinned().is_err());
    }

    #[test]
    fn empty_lock_is_rejected() {
        assert!(matches!(
            LockManifest::parse_str("version = 3\n"),
            Err(LockError::Empty)
        ));
    }

    #[test]
    fn source_consistency_passes() {
        let lock = LockManifest::parse_str(&sample_lock()).unwrap();
        lock.verify_source(&sample_source(), "sync-server", "1.2.3")
            .unwrap();
    }

    #[test]
    fn source_dependency_missing_from_lock() {
        let lock = LockManifest::parse_str(&sample_lock()).unwrap();
        let mut source = sample_source();
        source.dependencies.push("mio".to_owned());
        let err = lock
            .verify_source(&source, "sync-server", "1.2.3")
            .unwrap_err();
        assert!(matches!(err, LockError::MissingFromLock(ref d) if d == "mio"));
    }

    #[test]
    fn source_version_drift_detected() {
        let lock = LockManifest::parse_str(&sample_lock()).unwrap();
        let err = lock
            .verify_source(&sample_source(), "sync-server", "1.2.4")
            .unwrap_err();
        assert!(matches!(err, LockError::Drift(_)));
    }

    #[test]
    fn root_package_must_be_locked() {
        let lock = LockManifest::parse_str(&sample_lock().replace("1.2.3", "1.2.2")).unwrap();
        let err = lock
            .verify_source(&sample_source(), "sync-server", "1.2.3")
            .unwrap_err();
        assert!(err.to_string().contains("not recorded"));
    }

    #[test]
    fn exact_version_grammar() {
        assert!(is_exact_version("1.2.3"));
        assert!(is_exact_version("0.1.0-alpha.1"));
        assert!(is_exact_version("1.0.0+build.5"));
        assert!(!is_exact_version("1.2"));
        assert!(!is_exact_version(">=1.2.3"));
        assert!(!is_exact_version("1.2.x"));
        assert!(!is_exact_version(""));
    }

    #[test]
    fn read_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cargo.lock");
        std::fs::write(&path, sample_lock()).unwrap();
        let lock = LockManifest::read_from_file(&path).unwrap();
        assert_eq!(lock.entries().len(), 3);
    }
}
