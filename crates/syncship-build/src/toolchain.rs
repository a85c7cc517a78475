use crate::BuildError;
use std::path::Path;
use syncship_schema::{Architecture, ArtifactId, NativeInput, PackageDefinition};

/// Inputs to a single compilation.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub package: &'a PackageDefinition,
    pub target: Architecture,
    pub build_key: &'a ArtifactId,
    /// Private, empty directory the toolchain may write into.
    pub staging_dir: &'a Path,
}

pub trait Toolchain: Send + Sync {
    fn name(&self) -> &str;

    /// Native tools this toolchain needs on `PATH` in addition to the
    /// package's own native inputs.
    fn required_tools(&self) -> Vec<NativeInput>;

    /// Produce the executable's bytes. Must not touch anything outside
    /// `request.staging_dir` besides reading the source tree.
    fn compile(&self, request: &CompileRequest<'_>) -> Result<Vec<u8>, BuildError>;
}

pub fn select_toolchain(name: &str) -> Result<Box<dyn Toolchain>, BuildError> {
    match name {
        "cargo" => Ok(Box::new(crate::cargo::CargoToolchain::new())),
        "mock" => Ok(Box::new(crate::mock::MockToolchain::new())),
        other => Err(BuildError::BuildEnvironment(format!(
            "unknown toolchain '{other}' (expected 'cargo' or 'mock')"
        ))),
    }
}
