use crate::layout::StoreLayout;
use crate::{write_atomic, StoreError};
use serde::{Deserialize, Serialize};
use std::fs;
use syncship_schema::{Artifact, ArtifactId, ArtifactRef};

/// On-disk form of an artifact record with an embedded checksum.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArtifactRecord {
    #[serde(flatten)]
    artifact: Artifact,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
}

impl ArtifactRecord {
    fn compute_checksum(artifact: &Artifact) -> Result<String, StoreError> {
        let json = serde_json::to_string_pretty(artifact)?;
        Ok(blake3::hash(json.as_bytes()).to_hex().to_string())
    }
}

/// Artifact records keyed by build key.
pub struct ArtifactStore {
    layout: StoreLayout,
}

impl ArtifactStore {
    pub fn new(layout: StoreLayout) -> Self {
        Self { layout }
    }

    pub fn put(&self, artifact: &Artifact) -> Result<(), StoreError> {
        let record = ArtifactRecord {
            artifact: artifact.clone(),
            checksum: Some(ArtifactRecord::compute_checksum(artifact)?),
        };
        let content = serde_json::to_string_pretty(&record)?;
        let dir = self.layout.artifacts_dir();
        write_atomic(&dir, &dir.join(artifact.id.as_str()), content.as_bytes())
    }

    pub fn get(&self, id: &ArtifactId) -> Result<Artifact, StoreError> {
        let path = self.layout.artifacts_dir().join(id.as_str());
        if !path.exists() {
            return Err(StoreError::ArtifactNotFound(id.to_string()));
        }
        let content = fs::read_to_string(&path)?;
        let record: ArtifactRecord = serde_json::from_str(&content)?;

        let actual = ArtifactRecord::compute_checksum(&record.artifact)?;
        match record.checksum {
            Some(expected) if expected != actual => Err(StoreError::IntegrityFailure {
                hash: id.to_string(),
                expected,
                actual,
            }),
            _ => Ok(record.artifact),
        }
    }

    pub fn exists(&self, id: &ArtifactId) -> bool {
        self.layout.artifacts_dir().join(id.as_str()).exists()
    }

    /// Every readable record, sorted by name, version, target, then id.
    /// Corrupted records are skipped with a warning.
    pub fn list(&self) -> Result<Vec<Artifact>, StoreError> {
        let mut results = Vec::new();
        for entry in self.list_with_errors()? {
            match entry {
                Ok(artifact) => results.push(artifact),
                Err((id, e)) => {
                    tracing::warn!("skipping corrupted artifact record '{id}': {e}");
                }
            }
        }
        results.sort_by(|a, b| {
            (a.name.as_str(), a.version.as_str(), a.target, a.id.as_str()).cmp(&(
                b.name.as_str(),
                b.version.as_str(),
                b.target,
                b.id.as_str(),
            ))
        });
        Ok(results)
    }

    /// Like [`list`](Self::list), but surfaces per-record failures.
    #[allow(clippy::type_complexity)]
    pub fn list_with_errors(
        &self,
    ) -> Result<Vec<Result<Artifact, (String, StoreError)>>, StoreError> {
        let dir = self.layout.artifacts_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if !name.starts_with('.') {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        Ok(names
            .into_iter()
            .map(|name| {
                self.get(&ArtifactId::new(name.as_str()))
                    .map_err(|e| (name, e))
            })
            .collect())
    }

    /// All artifacts a reference resolves to. A `name@version` reference
    /// matches every build of that version, for every target.
    pub fn find(&self, reference: &ArtifactRef) -> Result<Vec<Artifact>, StoreError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|a| a.matches(reference))
            .collect())
    }
}
