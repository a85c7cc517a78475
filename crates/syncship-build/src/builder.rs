use crate::prereq::{check_native_inputs, format_missing, EnvironmentProbe, HostProbe};
use crate::toolchain::{select_toolchain, CompileRequest, Toolchain};
use crate::BuildError;
use syncship_schema::{
    compute_build_key, Architecture, Artifact, BuildInputs, LockManifest, PackageDefinition,
    SourceManifest,
};
use syncship_store::{hash_tree, ArtifactStore, ObjectStore, StoreLayout, TreeFilter};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Skip native build input probing.
    pub skip_prereqs: bool,
}

impl BuildOptions {
    /// Options from the process environment (`SYNCSHIP_SKIP_PREREQS=1`).
    pub fn from_env() -> Self {
        Self {
            skip_prereqs: std::env::var("SYNCSHIP_SKIP_PREREQS").as_deref() == Ok("1"),
        }
    }
}

/// Produces content-addressed artifacts from package definitions.
pub struct ArtifactBuilder {
    layout: StoreLayout,
    objects: ObjectStore,
    artifacts: ArtifactStore,
    probe: Box<dyn EnvironmentProbe>,
    toolchain: Option<Box<dyn Toolchain>>,
    options: BuildOptions,
}

impl ArtifactBuilder {
    pub fn new(layout: StoreLayout) -> Self {
        Self {
            objects: ObjectStore::new(layout.clone()),
            artifacts: ArtifactStore::new(layout.clone()),
            layout,
            probe: Box::new(HostProbe),
            toolchain: None,
            options: BuildOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: BuildOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_probe(mut self, probe: Box<dyn EnvironmentProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Use `toolchain` regardless of the package's declared toolchain.
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Box<dyn Toolchain>) -> Self {
        self.toolchain = Some(toolchain);
        self
    }

    /// Lock, source, and native input checks, without compiling. Returns the
    /// parsed lock manifest.
    pub fn check(&self, package: &PackageDefinition) -> Result<LockManifest, BuildError> {
        let lock = LockManifest::read_from_file(&package.lock)?;
        lock.ensure_pinned()?;

        let source = SourceManifest::read_from_file(package.source_manifest_path())?;
        lock.verify_source(&source, &package.name, &package.version)?;
        debug!(
            "lock manifest for {} verified ({} entries)",
            package.reference(),
            lock.entries().len()
        );

        if self.options.skip_prereqs {
            debug!("native input check skipped");
        } else {
            let toolchain = self.toolchain_for(package)?;
            let mut inputs = toolchain.required_tools();
            inputs.extend(package.native_inputs.iter().cloned());
            let missing = check_native_inputs(self.probe.as_ref(), &inputs);
            if !missing.is_empty() {
                return Err(BuildError::BuildEnvironment(format_missing(&missing)));
            }
        }
        Ok(lock)
    }

    pub fn build(
        &self,
        package: &PackageDefinition,
        target: Architecture,
    ) -> Result<Artifact, BuildError> {
        let lock = self.check(package)?;
        let toolchain = self.toolchain_for(package)?;

        let source_hash = hash_tree(&package.source, &TreeFilter::default())?;
        let lock_hash = lock.canonical_hash();
        let id = compute_build_key(&BuildInputs {
            package,
            target,
            source_hash: &source_hash,
            lock_hash: &lock_hash,
        });

        if let Some(artifact) = self.cached(&id)? {
            info!(
                "{} for {target} is up to date ({})",
                package.reference(),
                id.short()
            );
            return Ok(artifact);
        }

        info!(
            "building {} for {target} with {} ({})",
            package.reference(),
            toolchain.name(),
            id.short()
        );
        let staging = tempfile::tempdir_in(self.layout.staging_dir())?;
        let binary = toolchain.compile(&CompileRequest {
            package,
            target,
            build_key: &id,
            staging_dir: staging.path(),
        })?;

        let content_hash = self.objects.put(&binary)?;
        let install_path = self
            .layout
            .package_dir(&id, &package.name, &package.version)
            .join("bin")
            .join(&package.executable);
        self.objects.materialize(&content_hash, &install_path)?;

        let artifact = Artifact {
            id,
            name: package.name.clone(),
            version: package.version.clone(),
            executable: package.executable.clone(),
            target,
            content_hash,
            size: binary.len() as u64,
            source_hash,
            lock_hash,
            toolchain: toolchain.name().to_owned(),
            install_path,
        };
        self.artifacts.put(&artifact)?;
        info!(
            "built {} ({} bytes) -> {}",
            artifact.reference(),
            artifact.size,
            artifact.install_path.display()
        );
        Ok(artifact)
    }

    fn toolchain_for(&self, package: &PackageDefinition) -> Result<ToolchainRef<'_>, BuildError> {
        match self.toolchain {
            Some(ref tc) => Ok(ToolchainRef::Borrowed(tc.as_ref())),
            None => Ok(ToolchainRef::Owned(select_toolchain(&package.toolchain)?)),
        }
    }

    /// A stored artifact whose object still verifies. The install is repaired
    /// if it went missing.
    fn cached(&self, id: &syncship_schema::ArtifactId) -> Result<Option<Artifact>, BuildError> {
        if !self.artifacts.exists(id) {
            return Ok(None);
        }
        let artifact = match self.artifacts.get(id) {
            Ok(a) => a,
            Err(e) => {
                warn!("ignoring unreadable artifact record {}: {e}", id.short());
                return Ok(None);
            }
        };
        if let Err(e) = self.objects.get(&artifact.content_hash) {
            warn!("cached artifact {} failed verification: {e}", id.short());
            return Ok(None);
        }
        self.objects
            .materialize(&artifact.content_hash, &artifact.install_path)?;
        Ok(Some(artifact))
    }
}

enum ToolchainRef<'a> {
    Borrowed(&'a (dyn Toolchain + 'static)),
    Owned(Box<dyn Toolchain>),
}

impl std::ops::Deref for ToolchainRef<'_> {
    type Target = dyn Toolchain;

    fn deref(&self) -> &Self::Target {
        match self {
            ToolchainRef::Borrowed(tc) => *tc,
            ToolchainRef::Owned(tc) => tc.as_ref(),
        }
    }
}
