//! Hardening profile and supervision descriptors for syncship.
//!
//! `SecurityProfile::hardened()` is the single, fixed restriction policy.
//! `generate` turns a `ServiceConfig` plus a resolved artifact into a
//! `SupervisionDescriptor`, which renders to byte-stable systemd unit text.

pub mod descriptor;
pub mod render;
pub mod security;

pub use descriptor::{
    generate, ArtifactResolver, RestartPolicy, SupervisionDescriptor, RUNTIME_DIRECTORY_MODE,
    SOCKET_ENV,
};
pub use security::{SecurityProfile, ServiceIdentity};
