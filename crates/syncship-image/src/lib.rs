//! Deterministic layered OCI images for syncship.
//!
//! `assemble` packs a built artifact and the host CA bundle into an
//! uncompressed two-layer image with sha256 digests and no timestamps,
//! enforcing the layer budget. `build_index` produces the multi-architecture
//! index over a set of images, and `write_oci_layout` exports them to disk.

pub mod assemble;
pub mod index;
pub mod layer;
pub mod layout;
pub mod oci;

pub use assemble::{
    assemble, read_ca_bundle, ContainerImage, ImageSpec, PortSpec, Protocol, CA_BUNDLE_PATH,
    LAYER_CEILING,
};
pub use index::build_index;
pub use layer::ImageLayer;
pub use layout::write_oci_layout;

use std::path::PathBuf;
use syncship_schema::Architecture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("max_layers must be between 1 and {ceiling}, got {requested}")]
    LayerBudget { requested: usize, ceiling: usize },
    #[error("image needs {planned} layers but max_layers is {max}")]
    LayerBudgetExceeded { planned: usize, max: usize },
    #[error("artifact was built for {artifact}, image requested for {requested}")]
    ArchitectureMismatch {
        artifact: Architecture,
        requested: Architecture,
    },
    #[error("binary does not match artifact: expected {expected}, got {actual}")]
    ArtifactMismatch { expected: String, actual: String },
    #[error("CA bundle not found or empty: {0}")]
    MissingCaBundle(PathBuf),
    #[error("invalid exposed port '{0}': expected <port>[/tcp|/udp]")]
    InvalidPort(String),
    #[error("invalid layer path '{0}'")]
    InvalidLayerPath(String),
    #[error("invalid digest '{0}'")]
    InvalidDigest(String),
    #[error("no images to export")]
    NoImages,
    #[error("image I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
