use syncship_schema::{Artifact, ArtifactRef, ConfigValidationError};
use syncship_store::ArtifactStore;
use syncship_unit::ArtifactResolver;
use tracing::warn;

/// Resolves service package references against the artifact records in the
/// store. Host-architecture artifacts are preferred; a `name@version` with
/// several builds for that architecture is rejected.
pub struct StoreResolver<'a> {
    artifacts: &'a ArtifactStore,
}

impl<'a> StoreResolver<'a> {
    pub fn new(artifacts: &'a ArtifactStore) -> Self {
        Self { artifacts }
    }
}

impl ArtifactResolver for StoreResolver<'_> {
    fn resolve(
        &self,
        reference: &ArtifactRef,
    ) -> Result<Option<Artifact>, ConfigValidationError> {
        match self.artifacts.find(reference) {
            Ok(found) => found.as_slice().resolve(reference),
            Err(e) => {
                warn!("cannot read artifact records while resolving {reference}: {e}");
                Ok(None)
            }
        }
    }
}

/// Resolves against the artifacts of the current run first and falls back
/// to the store only for references none of them match.
pub struct BuiltFirstResolver<'a> {
    built: &'a [Artifact],
    store: StoreResolver<'a>,
}

impl<'a> BuiltFirstResolver<'a> {
    pub fn new(built: &'a [Artifact], artifacts: &'a ArtifactStore) -> Self {
        Self {
            built,
            store: StoreResolver::new(artifacts),
        }
    }
}

impl ArtifactResolver for BuiltFirstResolver<'_> {
    fn resolve(
        &self,
        reference: &ArtifactRef,
    ) -> Result<Option<Artifact>, ConfigValidationError> {
        match self.built.resolve(reference)? {
            Some(artifact) => Ok(Some(artifact)),
            None => self.store.resolve(reference),
        }
    }
}
