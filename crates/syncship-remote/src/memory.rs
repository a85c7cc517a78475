use crate::{Credentials, PublishError, RegistryBackend};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

/// A write the registry accepted, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryWrite {
    Blob { repository: String, digest: String },
    Manifest { repository: String, reference: String },
}

#[derive(Default)]
struct State {
    blobs: BTreeMap<(String, String), Vec<u8>>,
    manifests: BTreeMap<(String, String), (String, Vec<u8>)>,
    writes: Vec<RegistryWrite>,
    fail_blob_uploads: bool,
    fail_manifest_refs: BTreeSet<String>,
    unconfirmed_refs: BTreeSet<String>,
    reject_credentials: bool,
}

/// Registry held in memory. Used by tests and `--dry-run`.
#[derive(Default)]
pub struct InMemoryRegistry {
    state: Mutex<State>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Every blob upload fails.
    #[must_use]
    pub fn failing_blob_uploads(self) -> Self {
        self.lock().fail_blob_uploads = true;
        self
    }

    /// Uploading a manifest under `reference` fails.
    #[must_use]
    pub fn failing_manifest(self, reference: &str) -> Self {
        self.lock().fail_manifest_refs.insert(reference.to_owned());
        self
    }

    /// Uploading `reference` appears to succeed but the manifest is never
    /// visible afterwards.
    #[must_use]
    pub fn dropping_manifest(self, reference: &str) -> Self {
        self.lock().unconfirmed_refs.insert(reference.to_owned());
        self
    }

    /// Every request is answered as unauthorized.
    #[must_use]
    pub fn rejecting_credentials(self) -> Self {
        self.lock().reject_credentials = true;
        self
    }

    pub fn writes(&self) -> Vec<RegistryWrite> {
        self.lock().writes.clone()
    }

    pub fn blob(&self, repository: &str, digest: &str) -> Option<Vec<u8>> {
        self.lock()
            .blobs
            .get(&(repository.to_owned(), digest.to_owned()))
            .cloned()
    }

    /// Media type and body of the manifest stored under `reference`.
    pub fn manifest(&self, repository: &str, reference: &str) -> Option<(String, Vec<u8>)> {
        self.lock()
            .manifests
            .get(&(repository.to_owned(), reference.to_owned()))
            .cloned()
    }

    fn authorize(state: &State) -> Result<(), PublishError> {
        if state.reject_credentials {
            return Err(PublishError::Authentication(
                "registry rejected credentials".to_owned(),
            ));
        }
        Ok(())
    }
}

impl RegistryBackend for InMemoryRegistry {
    fn has_blob(
        &self,
        repository: &str,
        digest: &str,
        _credentials: &Credentials,
    ) -> Result<bool, PublishError> {
        let state = self.lock();
        Self::authorize(&state)?;
        Ok(state
            .blobs
            .contains_key(&(repository.to_owned(), digest.to_owned())))
    }

    fn put_blob(
        &self,
        repository: &str,
        digest: &str,
        data: &[u8],
        _credentials: &Credentials,
    ) -> Result<(), PublishError> {
        let mut state = self.lock();
        Self::authorize(&state)?;
        if state.fail_blob_uploads {
            return Err(PublishError::Registry(format!(
                "blob upload failed for {digest}"
            )));
        }
        state
            .blobs
            .insert((repository.to_owned(), digest.to_owned()), data.to_vec());
        state.writes.push(RegistryWrite::Blob {
            repository: repository.to_owned(),
            digest: digest.to_owned(),
        });
        Ok(())
    }

    fn has_manifest(
        &self,
        repository: &str,
        reference: &str,
        _credentials: &Credentials,
    ) -> Result<bool, PublishError> {
        let state = self.lock();
        Self::authorize(&state)?;
        Ok(state
            .manifests
            .contains_key(&(repository.to_owned(), reference.to_owned())))
    }

    fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        data: &[u8],
        _credentials: &Credentials,
    ) -> Result<(), PublishError> {
        let mut state = self.lock();
        Self::authorize(&state)?;
        if state.fail_manifest_refs.contains(reference) {
            return Err(PublishError::Registry(format!(
                "manifest upload failed for {reference}"
            )));
        }
        state.writes.push(RegistryWrite::Manifest {
            repository: repository.to_owned(),
            reference: reference.to_owned(),
        });
        if !state.unconfirmed_refs.contains(reference) {
            state.manifests.insert(
                (repository.to_owned(), reference.to_owned()),
                (media_type.to_owned(), data.to_vec()),
            );
        }
        Ok(())
    }
}
