use crate::security::{SecurityProfile, ServiceIdentity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use syncship_schema::{
    Architecture, Artifact, ArtifactId, ArtifactRef, ConfigValidationError, ServiceConfig,
};
use tracing::debug;

/// Environment variable carrying the socket path to the service.
pub const SOCKET_ENV: &str = "SOCKET";

/// Mode of the runtime directory the supervisor creates on each start.
pub const RUNTIME_DIRECTORY_MODE: u32 = 0o750;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    /// Restart on non-zero exit, signal, or watchdog timeout, after the
    /// supervisor's default delay.
    OnFailure,
}

impl RestartPolicy {
    pub fn as_systemd(self) -> &'static str {
        match self {
            RestartPolicy::OnFailure => "on-failure",
        }
    }
}

/// Looks up built artifacts by reference.
pub trait ArtifactResolver {
    /// `Ok(None)` when nothing matches. A reference that matches more than
    /// one build for the chosen architecture is an error, never a guess.
    fn resolve(
        &self,
        reference: &ArtifactRef,
    ) -> Result<Option<Artifact>, ConfigValidationError>;
}

/// Among matches, an artifact for the host architecture wins; otherwise the
/// architecture of the first match in slice order.
impl ArtifactResolver for [Artifact] {
    fn resolve(
        &self,
        reference: &ArtifactRef,
    ) -> Result<Option<Artifact>, ConfigValidationError> {
        let matches: Vec<&Artifact> = self.iter().filter(|a| a.matches(reference)).collect();
        let Some(first) = matches.first() else {
            return Ok(None);
        };
        let target = Architecture::host()
            .filter(|host| matches.iter().any(|a| a.target == *host))
            .unwrap_or(first.target);

        let mut builds: Vec<&Artifact> =
            matches.into_iter().filter(|a| a.target == target).collect();
        builds.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        builds.dedup_by(|a, b| a.id == b.id);
        match builds.as_slice() {
            [only] => Ok(Some((*only).clone())),
            _ => Err(ConfigValidationError::AmbiguousPackage {
                reference: reference.to_string(),
                target: target.to_string(),
                count: builds.len(),
            }),
        }
    }
}

impl ArtifactResolver for Vec<Artifact> {
    fn resolve(
        &self,
        reference: &ArtifactRef,
    ) -> Result<Option<Artifact>, ConfigValidationError> {
        self.as_slice().resolve(reference)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisionDescriptor {
    pub unit_name: String,
    pub description: String,
    pub exec_start: PathBuf,
    pub artifact: ArtifactId,
    pub environment: BTreeMap<String, String>,
    pub restart: RestartPolicy,
    pub identity: ServiceIdentity,
    pub runtime_directory: String,
    pub runtime_directory_mode: u32,
    pub security: SecurityProfile,
}

/// Build the supervision descriptor for `config`.
///
/// A disabled service yields `Ok(None)` without touching the resolver.
pub fn generate(
    config: &ServiceConfig,
    resolver: &dyn ArtifactResolver,
    profile: &SecurityProfile,
) -> Result<Option<SupervisionDescriptor>, ConfigValidationError> {
    if !config.enable {
        debug!("service '{}' is disabled, no unit generated", config.name);
        return Ok(None);
    }
    config.validate()?;

    let reference = config
        .package
        .as_ref()
        .ok_or_else(|| ConfigValidationError::MissingPackage(config.name.clone()))?;
    let artifact = resolver
        .resolve(reference)?
        .ok_or_else(|| ConfigValidationError::UnresolvedPackage(reference.to_string()))?;
    let runtime_directory = config.runtime_directory()?;

    let mut environment = BTreeMap::new();
    environment.insert(SOCKET_ENV.to_owned(), config.socket.clone());

    Ok(Some(SupervisionDescriptor {
        unit_name: format!("{}.service", config.name),
        description: config
            .description
            .clone()
            .unwrap_or_else(|| format!("{} sync service", config.name)),
        exec_start: artifact.install_path.clone(),
        artifact: artifact.id,
        environment,
        restart: RestartPolicy::OnFailure,
        identity: profile.identity(),
        runtime_directory,
        runtime_directory_mode: RUNTIME_DIRECTORY_MODE,
        security: profile.clone(),
    }))
}
