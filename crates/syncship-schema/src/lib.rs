//! Deploy manifest parsing, lock manifests, package definitions, and service
//! configuration for syncship.
//!
//! This crate defines the schema layer: TOML deploy manifest parsing
//! (`DeployManifest`), its validated form (`NormalizedManifest`), Cargo-format
//! lock manifests with pinning and source-consistency checks (`LockManifest`),
//! the typed service configuration (`ServiceConfig`), and deterministic build
//! key computation (`compute_build_key`).

pub mod artifact;
pub mod identity;
pub mod lock;
pub mod manifest;
pub mod normalize;
pub mod package;
pub mod service;
pub mod source;
pub mod types;

pub use artifact::Artifact;
pub use identity::{compute_build_key, BuildInputs};
pub use lock::{LockError, LockManifest, LockedDependency};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, DeployManifest, ImageSection, ManifestError,
    PackageSection, PublishSection, ServiceSection,
};
pub use normalize::{validate_tag, ImageSettings, NormalizedManifest, PublishSettings};
pub use package::{NativeInput, PackageDefinition};
pub use service::{default_socket_path, ConfigValidationError, ServiceConfig};
pub use source::{SourceError, SourceManifest};
pub use types::{Architecture, ArtifactId, ArtifactRef, ObjectHash, SHORT_ID_LEN};
