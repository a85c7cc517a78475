use crate::manifest::{DeployManifest, ManifestError};
use crate::package::{NativeInput, PackageDefinition};
use crate::service::{default_socket_path, ServiceConfig};
use crate::types::{Architecture, ArtifactRef};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Validated, path-resolved form of a [`DeployManifest`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NormalizedManifest {
    pub package: PackageDefinition,
    pub service: ServiceConfig,
    pub image: ImageSettings,
    pub publish: Option<PublishSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImageSettings {
    pub name: String,
    pub tag: String,
    /// In declaration order, no duplicates.
    pub architectures: Vec<Architecture>,
    pub exposed_ports: Vec<String>,
    pub ca_bundle: PathBuf,
    pub max_layers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishSettings {
    pub registry: String,
    pub repository: String,
    pub tags: Vec<String>,
    pub insecure: bool,
}

impl DeployManifest {
    /// Validate fields, apply defaults, and resolve relative paths against
    /// `base_dir` (the directory holding the manifest).
    pub fn normalize(&self, base_dir: &Path) -> Result<NormalizedManifest, ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::UnsupportedVersion(self.manifest_version));
        }

        let package = self.normalize_package(base_dir)?;
        let service = self.normalize_service(&package)?;
        let image = self.normalize_image(&package, base_dir)?;
        let publish = match self.publish {
            Some(ref p) => Some(normalize_publish(p)?),
            None => None,
        };

        Ok(NormalizedManifest {
            package,
            service,
            image,
            publish,
        })
    }

    fn normalize_package(&self, base_dir: &Path) -> Result<PackageDefinition, ManifestError> {
        let p = &self.package;
        let name = non_empty(&p.name, "package.name")?;
        let version = non_empty(&p.version, "package.version")?;
        let executable = match p.executable {
            Some(ref exe) => non_empty(exe, "package.executable")?,
            None => name.clone(),
        };
        if executable.contains('/') {
            return Err(ManifestError::InvalidValue {
                field: "package.executable",
                value: executable,
            });
        }

        let source = resolve_path(base_dir, non_empty(&p.source, "package.source")?);
        let lock = resolve_path(&source, non_empty(&p.lock, "package.lock")?);

        let mut native_inputs: Vec<NativeInput> = normalize_string_list(&p.native_tools)
            .into_iter()
            .map(NativeInput::Tool)
            .chain(
                normalize_string_list(&p.native_libraries)
                    .into_iter()
                    .map(NativeInput::Library),
            )
            .collect();
        native_inputs.sort();
        native_inputs.dedup();

        Ok(PackageDefinition {
            name,
            version,
            source,
            lock,
            executable,
            native_inputs,
            toolchain: p.toolchain.trim().to_lowercase(),
        })
    }

    fn normalize_service(&self, package: &PackageDefinition) -> Result<ServiceConfig, ManifestError> {
        let s = &self.service;
        let name = s
            .name
            .as_deref()
            .map_or_else(|| package.name.clone(), |n| n.trim().to_owned());
        let service = ServiceConfig {
            socket: s
                .socket
                .as_deref()
                .map_or_else(|| default_socket_path(&name), |v| v.trim().to_owned()),
            name,
            enable: s.enable,
            package: s
                .package
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(ArtifactRef::from),
            description: s.description.clone(),
        };
        service.validate()?;
        Ok(service)
    }

    fn normalize_image(
        &self,
        package: &PackageDefinition,
        base_dir: &Path,
    ) -> Result<ImageSettings, ManifestError> {
        let i = &self.image;
        let name = match i.name {
            Some(ref n) => non_empty(n, "image.name")?,
            None => package.name.clone(),
        };
        let tag = non_empty(&i.tag, "image.tag")?;
        validate_tag(&tag)?;

        if i.architectures.is_empty() {
            return Err(ManifestError::EmptyField("image.architectures"));
        }
        let mut architectures = Vec::with_capacity(i.architectures.len());
        for raw in &i.architectures {
            let arch: Architecture = raw.parse().map_err(ManifestError::InvalidArchitecture)?;
            if architectures.contains(&arch) {
                return Err(ManifestError::DuplicateArchitecture(arch.to_string()));
            }
            architectures.push(arch);
        }

        Ok(ImageSettings {
            name,
            tag,
            architectures,
            exposed_ports: normalize_string_list(&i.exposed_ports),
            ca_bundle: resolve_path(base_dir, non_empty(&i.ca_bundle, "image.ca_bundle")?),
            max_layers: i.max_layers,
        })
    }
}

fn normalize_publish(p: &crate::manifest::PublishSection) -> Result<PublishSettings, ManifestError> {
    let registry = non_empty(&p.registry, "publish.registry")?;
    if registry.contains("://") || registry.contains('/') {
        return Err(ManifestError::InvalidValue {
            field: "publish.registry",
            value: registry,
        });
    }
    let repository = non_empty(&p.repository, "publish.repository")?;
    if !is_valid_repository(&repository) {
        return Err(ManifestError::InvalidValue {
            field: "publish.repository",
            value: repository,
        });
    }
    let tags = normalize_string_list(&p.tags);
    if tags.is_empty() {
        return Err(ManifestError::EmptyField("publish.tags"));
    }
    for tag in &tags {
        validate_tag(tag)?;
    }
    Ok(PublishSettings {
        registry,
        repository,
        tags,
        insecure: p.insecure,
    })
}

fn non_empty(value: &str, field: &'static str) -> Result<String, ManifestError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ManifestError::EmptyField(field));
    }
    Ok(trimmed.to_owned())
}

fn resolve_path(base: &Path, value: String) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

/// OCI tag grammar: `[A-Za-z0-9_][A-Za-z0-9._-]{0,127}`.
pub fn validate_tag(tag: &str) -> Result<(), ManifestError> {
    let valid = !tag.is_empty()
        && tag.len() <= 128
        && tag
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_')
        && tag
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || b == b'-');
    if valid {
        Ok(())
    } else {
        Err(ManifestError::InvalidValue {
            field: "tag",
            value: tag.to_owned(),
        })
    }
}

/// Lowercase path components separated by `/`, each `[a-z0-9]+([._-][a-z0-9]+)*`.
fn is_valid_repository(repo: &str) -> bool {
    repo.split('/').all(|component| {
        !component.is_empty()
            && component
                .split(['.', '_', '-'])
                .all(|part| {
                    !part.is_empty()
                        && part
                            .bytes()
                            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
                })
    })
}

/// Trimmed, non-empty values in declaration order, first occurrence kept.
fn normalize_string_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
        if !out.iter().any(|seen| seen == value) {
            out.push(value.to_owned());
        }
    }
    out
}
