//! Artifact builder for syncship.
//!
//! This crate turns a `PackageDefinition` into a content-addressed `Artifact`:
//! lock manifest pinning and source consistency checks, native build input
//! probing, a pluggable `Toolchain` trait with `cargo` and `mock` backends,
//! and the `ArtifactBuilder` that ties them to the store.

pub mod builder;
pub mod cargo;
pub mod mock;
pub mod prereq;
pub mod toolchain;

pub use builder::{ArtifactBuilder, BuildOptions};
pub use prereq::{
    check_native_inputs, format_missing, EnvironmentProbe, HostProbe, MissingInput, StaticProbe,
};
pub use toolchain::{select_toolchain, CompileRequest, Toolchain};

use syncship_schema::{Architecture, LockError, SourceError};
use syncship_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("lock mismatch: {0}")]
    LockMismatch(#[from] LockError),
    #[error("lock mismatch: {0}")]
    SourceManifest(#[from] SourceError),
    #[error("build environment: {0}")]
    BuildEnvironment(String),
    #[error("compilation of '{package}' for {target} failed:\n{stderr}")]
    Compilation {
        package: String,
        target: Architecture,
        stderr: String,
    },
    #[error("store: {0}")]
    Store(#[from] StoreError),
    #[error("build I/O error: {0}")]
    Io(#[from] std::io::Error),
}
