//! Deployment pipeline engine for syncship.
//!
//! This crate ties the builder, supervision descriptor generator, image
//! assembler and publisher together into the `Engine`, the central API the
//! CLI drives. It also provides the exclusive store lock and the aggregated
//! error type whose messages name the failing pipeline step.

pub mod concurrency;
pub mod engine;
pub mod resolver;

pub use concurrency::StoreLock;
pub use engine::{DeployReport, Engine, Publisher};
pub use resolver::{BuiltFirstResolver, StoreResolver};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("manifest error: {0}")]
    Manifest(#[from] syncship_schema::ManifestError),
    #[error("build error: {0}")]
    Build(#[from] syncship_build::BuildError),
    #[error("config error: {0}")]
    Config(#[from] syncship_schema::ConfigValidationError),
    #[error("image error: {0}")]
    Image(#[from] syncship_image::ImageError),
    #[error("publish error: {0}")]
    Publish(#[from] syncship_remote::PublishError),
    #[error("store error: {0}")]
    Store(#[from] syncship_store::StoreError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
