use crate::package::PackageDefinition;
use crate::types::{Architecture, ArtifactId};

/// Every input that determines the bytes of a built artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInputs<'a> {
    pub package: &'a PackageDefinition,
    pub target: Architecture,
    pub source_hash: &'a str,
    pub lock_hash: &'a str,
}

/// Feed one tagged field into `hasher`, length-prefixed so that adjacent
/// fields can never run together.
pub(crate) fn hash_field(hasher: &mut blake3::Hasher, tag: &str, value: &str) {
    hasher.update(tag.as_bytes());
    hasher.update(&[0]);
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

/// Compute the build key for a set of inputs.
///
/// Only hashed content participates: paths, timestamps, and the host are
/// never mixed in, so the same inputs give the same key on any machine.
pub fn compute_build_key(inputs: &BuildInputs<'_>) -> ArtifactId {
    let pkg = inputs.package;
    let mut hasher = blake3::Hasher::new();

    hash_field(&mut hasher, "name", &pkg.name);
    hash_field(&mut hasher, "version", &pkg.version);
    hash_field(&mut hasher, "exe", &pkg.executable);
    hash_field(&mut hasher, "target", inputs.target.rust_triple());
    hash_field(&mut hasher, "toolchain", &pkg.toolchain);
    hash_field(&mut hasher, "source", inputs.source_hash);
    hash_field(&mut hasher, "lock", inputs.lock_hash);

    let mut native: Vec<String> = pkg.native_inputs.iter().map(ToString::to_string).collect();
    native.sort();
    for input in native {
        hash_field(&mut hasher, "native", &input);
    }

    ArtifactId::new(hasher.finalize().to_hex().to_string())
}
