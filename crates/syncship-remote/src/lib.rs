//! Multi-architecture image publication for syncship.
//!
//! This crate pushes assembled per-architecture images to an OCI registry and
//! publishes the image index under each tag. Registries are reached through
//! the [`RegistryBackend`] trait: [`HttpRegistry`] speaks the OCI distribution
//! API, [`InMemoryRegistry`] records writes for tests and dry runs.

pub mod credentials;
pub mod http;
pub mod memory;
pub mod publish;

pub use credentials::{CredentialSource, Credentials};
pub use http::HttpRegistry;
pub use memory::{InMemoryRegistry, RegistryWrite};
pub use publish::{publish, MultiArchManifest, PublishTarget};

use syncship_schema::Architecture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("incomplete manifest: no image for {}", join_archs(.missing))]
    IncompleteManifest { missing: Vec<Architecture> },
    #[error("more than one image for {0}")]
    DuplicateArchitecture(Architecture),
    #[error("image for {0} is not a declared architecture")]
    UndeclaredArchitecture(Architecture),
    #[error("registry did not confirm manifest {digest} for {architecture}")]
    ManifestNotConfirmed {
        architecture: Architecture,
        digest: String,
    },
    #[error("registry error: {0}")]
    Registry(String),
    #[error("tag '{failed}' not updated ({reason}); already moved: {}", .moved.join(", "))]
    PartialTagUpdate {
        moved: Vec<String>,
        failed: String,
        reason: String,
    },
    #[error("publish config error: {0}")]
    Config(String),
    #[error("image error: {0}")]
    Image(#[from] syncship_image::ImageError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("publish I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn join_archs(archs: &[Architecture]) -> String {
    archs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Registry operations needed to publish an image.
///
/// `reference` is either a digest or a tag.
pub trait RegistryBackend: Send + Sync {
    fn has_blob(
        &self,
        repository: &str,
        digest: &str,
        credentials: &Credentials,
    ) -> Result<bool, PublishError>;

    fn put_blob(
        &self,
        repository: &str,
        digest: &str,
        data: &[u8],
        credentials: &Credentials,
    ) -> Result<(), PublishError>;

    fn has_manifest(
        &self,
        repository: &str,
        reference: &str,
        credentials: &Credentials,
    ) -> Result<bool, PublishError>;

    fn put_manifest(
        &self,
        repository: &str,
        reference: &str,
        media_type: &str,
        data: &[u8],
        credentials: &Credentials,
    ) -> Result<(), PublishError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_manifest_names_missing_architectures() {
        let err = PublishError::IncompleteManifest {
            missing: vec![Architecture::Amd64, Architecture::Arm64],
        };
        assert_eq!(
            err.to_string(),
            "incomplete manifest: no image for amd64, arm64"
        );
    }
}
