//! Content-addressable object store, artifact records, and deterministic source
//! tree hashing for syncship.
//!
//! This crate provides the storage layer: a blake3-addressed `ObjectStore` with
//! atomic writes, `ArtifactStore` for checksummed artifact records and their
//! read-only installed executables, `StoreLayout` for the directory structure,
//! `hash_tree` for reproducible source tree digests, and an integrity checker.

pub mod artifacts;
pub mod integrity;
pub mod layout;
pub mod objects;
pub mod tree;

pub use artifacts::ArtifactStore;
pub use integrity::{verify_store_integrity, IntegrityFailure, IntegrityReport};
pub use layout::{StoreLayout, STORE_FORMAT_VERSION};
pub use objects::ObjectStore;
pub use tree::{hash_tree, pack_tree, TreeFilter};

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Fsync a directory so that a preceding `rename()` is durable.
pub(crate) fn fsync_dir(dir: &Path) -> Result<(), std::io::Error> {
    let f = std::fs::File::open(dir)?;
    f.sync_all()
}

/// Write `data` to `dest` through a temp file in `dir` followed by a rename.
pub(crate) fn write_atomic(dir: &Path, dest: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| StoreError::Io(e.error))?;
    fsync_dir(dir)?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed for '{hash}': expected {expected}, got {actual}")]
    IntegrityFailure {
        hash: String,
        expected: String,
        actual: String,
    },
    #[error("object not found: {0}")]
    ObjectNotFound(String),
    #[error("artifact not found: {0}")]
    ArtifactNotFound(String),
    #[error("store format version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
