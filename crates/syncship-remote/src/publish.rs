use crate::{CredentialSource, Credentials, PublishError, RegistryBackend};
use serde::Serialize;
use std::collections::BTreeMap;
use syncship_image::oci::{MEDIA_TYPE_INDEX, MEDIA_TYPE_MANIFEST};
use syncship_image::{build_index, ContainerImage};
use syncship_schema::{Architecture, PublishSettings};
use tracing::{debug, info};

/// Where and under which tags an image family is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishTarget {
    pub registry: String,
    pub repository: String,
    pub tags: Vec<String>,
    /// Architectures that must each have exactly one image.
    pub architectures: Vec<Architecture>,
    pub insecure: bool,
}

impl PublishTarget {
    pub fn from_settings(settings: &PublishSettings, architectures: &[Architecture]) -> Self {
        Self {
            registry: settings.registry.clone(),
            repository: settings.repository.clone(),
            tags: settings.tags.clone(),
            architectures: architectures.to_vec(),
            insecure: settings.insecure,
        }
    }
}

/// Record of a completed publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MultiArchManifest {
    pub registry: String,
    pub repository: String,
    pub tags: Vec<String>,
    /// Exactly one per declared architecture.
    pub manifests: BTreeMap<Architecture, String>,
    pub index_digest: String,
    #[serde(skip)]
    pub index_blob: Vec<u8>,
    /// Where the credentials came from; never the secret itself.
    pub credentials: CredentialSource,
    pub published_at: String,
}

/// Check the image set against the declared architectures without touching
/// the registry. Returns the images in architecture order.
fn check_completeness<'a>(
    images: &'a [ContainerImage],
    target: &PublishTarget,
) -> Result<Vec<&'a ContainerImage>, PublishError> {
    let mut by_arch: BTreeMap<Architecture, &ContainerImage> = BTreeMap::new();
    for image in images {
        if !target.architectures.contains(&image.architecture) {
            return Err(PublishError::UndeclaredArchitecture(image.architecture));
        }
        if by_arch.insert(image.architecture, image).is_some() {
            return Err(PublishError::DuplicateArchitecture(image.architecture));
        }
    }
    let mut missing: Vec<Architecture> = target
        .architectures
        .iter()
        .copied()
        .filter(|a| !by_arch.contains_key(a))
        .collect();
    if !missing.is_empty() || by_arch.is_empty() {
        missing.sort();
        return Err(PublishError::IncompleteManifest { missing });
    }
    Ok(by_arch.into_values().collect())
}

/// Publish one image per declared architecture and the index over them.
///
/// Credentials and completeness are checked before any registry call. Blobs
/// and per-architecture manifests are pushed by digest; the index is pushed
/// under each tag only once every manifest has been confirmed, so a failure
/// up to that point leaves all tags where they were.
///
/// Tags are then written one at a time. If a later tag fails, the earlier
/// ones already point at the new index; the error lists them.
pub fn publish(
    images: &[ContainerImage],
    target: &PublishTarget,
    credentials: Option<&Credentials>,
    backend: &dyn RegistryBackend,
) -> Result<MultiArchManifest, PublishError> {
    let credentials = match credentials {
        Some(c) if !c.is_empty() => c,
        _ => {
            return Err(PublishError::Authentication(format!(
                "no credentials for {}",
                target.registry
            )))
        }
    };
    if target.tags.is_empty() {
        return Err(PublishError::Config("at least one tag is required".to_owned()));
    }
    let ordered = check_completeness(images, target)?;
    let repo = target.repository.as_str();

    for image in &ordered {
        for (digest, data) in image.blobs() {
            if backend.has_blob(repo, digest, credentials)? {
                debug!("blob {digest} already present, skipping");
                continue;
            }
            backend.put_blob(repo, digest, data, credentials)?;
        }
        backend.put_manifest(
            repo,
            &image.manifest_digest,
            MEDIA_TYPE_MANIFEST,
            &image.manifest_blob,
            credentials,
        )?;
        info!(
            "pushed {} manifest {}",
            image.architecture, image.manifest_digest
        );
    }

    for image in &ordered {
        if !backend.has_manifest(repo, &image.manifest_digest, credentials)? {
            return Err(PublishError::ManifestNotConfirmed {
                architecture: image.architecture,
                digest: image.manifest_digest.clone(),
            });
        }
    }

    let (index_blob, index_digest) = build_index(images)?;
    let mut moved: Vec<String> = Vec::with_capacity(target.tags.len());
    for tag in &target.tags {
        match backend.put_manifest(repo, tag, MEDIA_TYPE_INDEX, &index_blob, credentials) {
            Ok(()) => moved.push(tag.clone()),
            Err(e) if moved.is_empty() => return Err(e),
            Err(e) => {
                return Err(PublishError::PartialTagUpdate {
                    moved,
                    failed: tag.clone(),
                    reason: e.to_string(),
                })
            }
        }
        info!("tagged {}/{repo}:{tag} -> {index_digest}", target.registry);
    }

    Ok(MultiArchManifest {
        registry: target.registry.clone(),
        repository: target.repository.clone(),
        tags: target.tags.clone(),
        manifests: ordered
            .iter()
            .map(|i| (i.architecture, i.manifest_digest.clone()))
            .collect(),
        index_digest,
        index_blob,
        credentials: credentials.source().clone(),
        published_at: chrono::Utc::now().to_rfc3339(),
    })
}
