use crate::toolchain::{CompileRequest, Toolchain};
use crate::BuildError;
use syncship_schema::NativeInput;

/// Deterministic stand-in for a real compiler.
///
/// The produced "binary" is a function of the build key alone, so identical
/// inputs give identical content hashes without invoking cargo.
#[derive(Default)]
pub struct MockToolchain {
    fail_with: Option<String>,
}

impl MockToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// A toolchain whose every compilation fails with `stderr`.
    pub fn failing(stderr: impl Into<String>) -> Self {
        Self {
            fail_with: Some(stderr.into()),
        }
    }
}

impl Toolchain for MockToolchain {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn required_tools(&self) -> Vec<NativeInput> {
        Vec::new()
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<Vec<u8>, BuildError> {
        if let Some(ref stderr) = self.fail_with {
            return Err(BuildError::Compilation {
                package: request.package.reference(),
                target: request.target,
                stderr: stderr.clone(),
            });
        }

        let mut out = b"\x7fELF".to_vec();
        out.extend_from_slice(
            format!(
                "\nsyncship-mock {} {} {}\nkey {}\n",
                request.package.executable,
                request.package.version,
                request.target.rust_triple(),
                request.build_key
            )
            .as_bytes(),
        );
        out.extend_from_slice(blake3::hash(request.build_key.as_bytes()).as_bytes());
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use syncship_schema::{Architecture, ArtifactId, PackageDefinition};

    fn package() -> PackageDefinition {
        PackageDefinition {
            name: "sync-server".to_owned(),
            version: "1.2.3".to_owned(),
            source: PathBuf::from("/src"),
            lock: PathBuf::from("/src/Cargo.lock"),
            executable: "sync-server".to_owned(),
            native_inputs: Vec::new(),
            toolchain: "mock".to_owned(),
        }
    }

    fn compile(tc: &MockToolchain, key: &str) -> Result<Vec<u8>, BuildError> {
        let pkg = package();
        let key = ArtifactId::new(key);
        tc.compile(&CompileRequest {
            package: &pkg,
            target: Architecture::Amd64,
            build_key: &key,
            staging_dir: Path::new("/unused"),
        })
    }

    #[test]
    fn output_depends_only_on_build_key() {
        let tc = MockToolchain::new();
        assert_eq!(compile(&tc, "k1").unwrap(), compile(&tc, "k1").unwrap());
        assert_ne!(compile(&tc, "k1").unwrap(), compile(&tc, "k2").unwrap());
        assert!(compile(&tc, "k1").unwrap().starts_with(b"\x7fELF"));
    }

    #[test]
    fn failing_variant_reports_compilation_error() {
        let tc = MockToolchain::failing("error: linker `cc` not found");
        match compile(&tc, "k1") {
            Err(BuildError::Compilation { stderr, .. }) => assert!(stderr.contains("linker")),
            other => panic!("expected compilation error, got {other:?}"),
        }
    }
}
