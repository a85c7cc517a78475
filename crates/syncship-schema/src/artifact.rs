use crate::types::{Architecture, ArtifactId, ArtifactRef, ObjectHash, SHORT_ID_LEN};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A built, content-addressed executable plus the metadata describing how it
/// was produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Build key: hash of every input that determines the binary.
    pub id: ArtifactId,
    pub name: String,
    pub version: String,
    pub executable: String,
    pub target: Architecture,
    /// blake3 of the binary bytes.
    pub content_hash: ObjectHash,
    pub size: u64,
    pub source_hash: String,
    pub lock_hash: String,
    pub toolchain: String,
    /// Materialized, read-only location of the executable.
    pub install_path: PathBuf,
}

impl Artifact {
    /// Whether `reference` names this artifact.
    ///
    /// Accepts the full id, an id prefix of at least 12 characters, or
    /// `name@version`.
    pub fn matches(&self, reference: &ArtifactRef) -> bool {
        if let Some((name, version)) = reference.name_version() {
            return self.name == name && self.version == version;
        }
        let r = reference.as_str();
        r.len() >= SHORT_ID_LEN && self.id.starts_with(r)
    }

    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef::new(format!("{}@{}", self.name, self.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Artifact {
        Artifact {
            id: ArtifactId::new("0123456789abcdef".repeat(4)),
            name: "sync-server".to_owned(),
            version: "1.2.3".to_owned(),
            executable: "sync-server".to_owned(),
            target: Architecture::Amd64,
            content_hash: ObjectHash::new("f".repeat(64)),
            size: 10,
            source_hash: "s".repeat(64),
            lock_hash: "l".repeat(64),
            toolchain: "mock".to_owned(),
            install_path: PathBuf::from("/store/pkgs/x/bin/sync-server"),
        }
    }

    #[test]
    fn matches_name_version() {
        let a = sample();
        assert!(a.matches(&ArtifactRef::from("sync-server@1.2.3")));
        assert!(!a.matches(&ArtifactRef::from("sync-server@1.2.4")));
        assert!(!a.matches(&ArtifactRef::from("other@1.2.3")));
    }

    #[test]
    fn matches_id_prefix_of_minimum_length() {
        let a = sample();
        assert!(a.matches(&ArtifactRef::from(a.id.as_str())));
        assert!(a.matches(&ArtifactRef::from("0123456789ab")));
        assert!(!a.matches(&ArtifactRef::from("0123")));
        assert!(!a.matches(&ArtifactRef::from("ffffffffffff")));
    }

    #[test]
    fn reference_roundtrip() {
        let a = sample();
        assert!(a.matches(&a.reference()));
    }
}
