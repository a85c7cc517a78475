use crate::resolver::{BuiltFirstResolver, StoreResolver};
use crate::CoreError;
use serde::Serialize;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use syncship_build::{ArtifactBuilder, BuildOptions};
use syncship_image::{assemble, build_index, read_ca_bundle, ContainerImage, ImageError, ImageSpec};
use syncship_remote::{
    publish, Credentials, MultiArchManifest, PublishError, PublishTarget, RegistryBackend,
};
use syncship_schema::{
    parse_manifest_file, Architecture, Artifact, ArtifactRef, ImageSettings, LockManifest,
    NormalizedManifest, PackageDefinition, PublishSettings, ServiceConfig,
};
use syncship_store::{
    verify_store_integrity, ArtifactStore, IntegrityReport, ObjectStore, StoreError, StoreLayout,
};
use syncship_unit::{generate, SecurityProfile, SupervisionDescriptor};
use tracing::{debug, info};

/// Central orchestration engine for the deployment pipeline.
///
/// Owns the store handles and the security profile, which is created once
/// and passed by reference to every descriptor it generates.
pub struct Engine {
    layout: StoreLayout,
    objects: ObjectStore,
    artifacts: ArtifactStore,
    profile: SecurityProfile,
    build_options: BuildOptions,
    toolchain_override: Option<String>,
}

/// Registry and credentials for the publish step of a deploy.
#[derive(Clone, Copy)]
pub struct Publisher<'a> {
    pub backend: &'a dyn RegistryBackend,
    pub credentials: Option<&'a Credentials>,
}

/// Everything a deploy produced.
#[derive(Debug, Serialize)]
pub struct DeployReport {
    pub artifacts: Vec<Artifact>,
    /// `None` when the service is disabled.
    pub unit: Option<SupervisionDescriptor>,
    pub images: Vec<ContainerImage>,
    pub index_digest: String,
    /// `None` when no registry was given.
    pub publication: Option<MultiArchManifest>,
}

impl Engine {
    pub fn new(store_root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = store_root.into();
        let layout = StoreLayout::new(&root);
        Self {
            objects: ObjectStore::new(layout.clone()),
            artifacts: ArtifactStore::new(layout.clone()),
            layout,
            profile: SecurityProfile::hardened(),
            build_options: BuildOptions::default(),
            toolchain_override: None,
        }
    }

    #[must_use]
    pub fn with_build_options(mut self, options: BuildOptions) -> Self {
        self.build_options = options;
        self
    }

    /// Build with `toolchain` instead of the one each package declares.
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: impl Into<String>) -> Self {
        self.toolchain_override = Some(toolchain.into());
        self
    }

    pub fn store_layout(&self) -> &StoreLayout {
        &self.layout
    }

    pub fn profile(&self) -> &SecurityProfile {
        &self.profile
    }

    /// Parse and normalize a deploy manifest. Relative paths resolve against
    /// the manifest's directory.
    pub fn load_manifest(&self, path: &Path) -> Result<NormalizedManifest, CoreError> {
        debug!("loading manifest {}", path.display());
        let manifest = parse_manifest_file(path)?;
        let base_dir = path.parent().unwrap_or(Path::new("."));
        Ok(manifest.normalize(base_dir)?)
    }

    fn builder(&self) -> ArtifactBuilder {
        ArtifactBuilder::new(self.layout.clone()).with_options(self.build_options)
    }

    /// The package as built: the toolchain override, if any, replaces the
    /// declared toolchain so it also enters the build key.
    fn effective<'p>(&self, package: &'p PackageDefinition) -> Cow<'p, PackageDefinition> {
        match self.toolchain_override {
            Some(ref name) if *name != package.toolchain => Cow::Owned(PackageDefinition {
                toolchain: name.clone(),
                ..package.clone()
            }),
            _ => Cow::Borrowed(package),
        }
    }

    /// Run the lock, source, and native input checks without compiling.
    pub fn check_lock(&self, package: &PackageDefinition) -> Result<LockManifest, CoreError> {
        Ok(self.builder().check(&self.effective(package))?)
    }

    pub fn build(
        &self,
        package: &PackageDefinition,
        target: Architecture,
    ) -> Result<Artifact, CoreError> {
        self.layout.initialize()?;
        Ok(self.builder().build(&self.effective(package), target)?)
    }

    /// Build `package` for each architecture in order.
    pub fn build_all(
        &self,
        package: &PackageDefinition,
        targets: &[Architecture],
    ) -> Result<Vec<Artifact>, CoreError> {
        self.layout.initialize()?;
        let builder = self.builder();
        let package = self.effective(package);
        let mut out = Vec::with_capacity(targets.len());
        for &target in targets {
            out.push(builder.build(&package, target)?);
        }
        Ok(out)
    }

    /// Supervision descriptor for `service`, resolved against the store.
    /// `None` for a disabled service. Several builds of the referenced
    /// version for one architecture make the reference ambiguous.
    pub fn generate_unit(
        &self,
        service: &ServiceConfig,
    ) -> Result<Option<SupervisionDescriptor>, CoreError> {
        let resolver = StoreResolver::new(&self.artifacts);
        Ok(generate(service, &resolver, &self.profile)?)
    }

    /// Like [`generate_unit`](Self::generate_unit), but a reference that
    /// matches `built` resolves to those artifacts, never to older records.
    pub fn generate_unit_for(
        &self,
        service: &ServiceConfig,
        built: &[Artifact],
    ) -> Result<Option<SupervisionDescriptor>, CoreError> {
        let resolver = BuiltFirstResolver::new(built, &self.artifacts);
        Ok(generate(service, &resolver, &self.profile)?)
    }

    /// Assemble one image per architecture in `settings`, each from the
    /// matching artifact. Assembly for different architectures runs in
    /// parallel and is joined before returning.
    pub fn assemble_images(
        &self,
        artifacts: &[Artifact],
        settings: &ImageSettings,
    ) -> Result<Vec<ContainerImage>, CoreError> {
        let spec = ImageSpec::from_settings(settings)?;
        let ca_bundle = read_ca_bundle(&settings.ca_bundle)?;

        let mut inputs = Vec::with_capacity(settings.architectures.len());
        for &arch in &settings.architectures {
            let artifact = artifacts
                .iter()
                .find(|a| a.target == arch)
                .ok_or_else(|| StoreError::ArtifactNotFound(format!("{} for {arch}", spec.name)))?;
            let binary = self.objects.get(&artifact.content_hash)?;
            inputs.push((arch, artifact, binary));
        }

        let spec = &spec;
        let ca_bundle = ca_bundle.as_slice();
        let results: Vec<Result<ContainerImage, ImageError>> = std::thread::scope(|s| {
            let handles: Vec<_> = inputs
                .iter()
                .map(|(arch, artifact, binary)| {
                    s.spawn(move || assemble(artifact, binary, *arch, spec, ca_bundle))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_else(|p| std::panic::resume_unwind(p)))
                .collect()
        });

        let images = results.into_iter().collect::<Result<Vec<_>, _>>()?;
        info!(
            "assembled {}:{} for {} architecture(s)",
            spec.name,
            spec.tag,
            images.len()
        );
        Ok(images)
    }

    pub fn publish(
        &self,
        images: &[ContainerImage],
        settings: &PublishSettings,
        architectures: &[Architecture],
        credentials: Option<&Credentials>,
        backend: &dyn RegistryBackend,
    ) -> Result<MultiArchManifest, CoreError> {
        let target = PublishTarget::from_settings(settings, architectures);
        Ok(publish(images, &target, credentials, backend)?)
    }

    /// The full pipeline: build every declared architecture, generate the
    /// unit, assemble the images, and publish them when a registry is given.
    pub fn deploy(
        &self,
        manifest: &NormalizedManifest,
        publisher: Option<Publisher<'_>>,
    ) -> Result<DeployReport, CoreError> {
        info!("deploying {}", manifest.package.reference());
        let artifacts = self.build_all(&manifest.package, &manifest.image.architectures)?;
        let unit = self.generate_unit_for(&manifest.service, &artifacts)?;
        let images = self.assemble_images(&artifacts, &manifest.image)?;
        let (_, index_digest) = build_index(&images)?;

        let publication = match (publisher, manifest.publish.as_ref()) {
            (Some(p), Some(settings)) => Some(self.publish(
                &images,
                settings,
                &manifest.image.architectures,
                p.credentials,
                p.backend,
            )?),
            (Some(_), None) => {
                return Err(PublishError::Config(
                    "manifest has no [publish] section".to_owned(),
                )
                .into())
            }
            (None, _) => {
                debug!("no registry given, publish skipped");
                None
            }
        };

        Ok(DeployReport {
            artifacts,
            unit,
            images,
            index_digest,
            publication,
        })
    }

    pub fn list(&self) -> Result<Vec<Artifact>, CoreError> {
        Ok(self.artifacts.list()?)
    }

    /// All artifacts `reference` matches; at least one.
    pub fn inspect(&self, reference: &ArtifactRef) -> Result<Vec<Artifact>, CoreError> {
        let found = self.artifacts.find(reference)?;
        if found.is_empty() {
            return Err(StoreError::ArtifactNotFound(reference.to_string()).into());
        }
        Ok(found)
    }

    pub fn verify_store(&self) -> Result<IntegrityReport, CoreError> {
        Ok(verify_store_integrity(&self.layout)?)
    }
}
