use crate::layer::{build_layer, ImageLayer, LayerFile};
use crate::oci::{
    Descriptor, Empty, ImageConfig, ImageManifest, Platform, RootFs, RuntimeConfig,
    MEDIA_TYPE_CONFIG, MEDIA_TYPE_MANIFEST,
};
use crate::ImageError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use syncship_schema::{Architecture, Artifact, ImageSettings};
use tracing::{debug, info};

/// Hard upper bound on layers per image.
pub const LAYER_CEILING: usize = 5;

/// Where the CA bundle lands inside the image.
pub const CA_BUNDLE_PATH: &str = "etc/ssl/certs/ca-certificates.crt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
}

/// An exposed port such as `80/tcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct PortSpec {
    pub port: u16,
    pub protocol: Protocol,
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let proto = match self.protocol {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        };
        write!(f, "{}/{proto}", self.port)
    }
}

impl FromStr for PortSpec {
    type Err = ImageError;

    /// `<port>[/tcp|/udp]`; the protocol defaults to tcp.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ImageError::InvalidPort(s.to_owned());
        let (port, proto) = s.split_once('/').unwrap_or((s, "tcp"));
        let protocol = match proto {
            "tcp" => Protocol::Tcp,
            "udp" => Protocol::Udp,
            _ => return Err(invalid()),
        };
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        Ok(Self { port, protocol })
    }
}

/// What to assemble, independent of architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageSpec {
    pub name: String,
    pub tag: String,
    pub exposed_ports: Vec<PortSpec>,
    pub max_layers: usize,
}

impl ImageSpec {
    pub fn from_settings(settings: &ImageSettings) -> Result<Self, ImageError> {
        let mut exposed_ports = settings
            .exposed_ports
            .iter()
            .map(|p| p.parse())
            .collect::<Result<Vec<PortSpec>, _>>()?;
        exposed_ports.sort();
        exposed_ports.dedup();
        let spec = Self {
            name: settings.name.clone(),
            tag: settings.tag.clone(),
            exposed_ports,
            max_layers: settings.max_layers,
        };
        spec.check_budget()?;
        Ok(spec)
    }

    fn check_budget(&self) -> Result<(), ImageError> {
        if self.max_layers == 0 || self.max_layers > LAYER_CEILING {
            return Err(ImageError::LayerBudget {
                requested: self.max_layers,
                ceiling: LAYER_CEILING,
            });
        }
        Ok(())
    }
}

/// A single-architecture image, fully serialized and digested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerImage {
    pub name: String,
    pub tag: String,
    pub architecture: Architecture,
    pub layers: Vec<ImageLayer>,
    pub config: ImageConfig,
    #[serde(skip)]
    pub config_blob: Vec<u8>,
    pub config_digest: String,
    #[serde(skip)]
    pub manifest_blob: Vec<u8>,
    pub manifest_digest: String,
}

impl ContainerImage {
    pub fn manifest_descriptor(&self) -> Descriptor {
        let mut d = Descriptor::of(MEDIA_TYPE_MANIFEST, &self.manifest_blob);
        d.platform = Some(Platform::linux(self.architecture));
        d
    }

    /// Every blob the manifest references, config first.
    pub fn blobs(&self) -> Vec<(&str, &[u8])> {
        let mut out = vec![(self.config_digest.as_str(), self.config_blob.as_slice())];
        out.extend(
            self.layers
                .iter()
                .map(|l| (l.digest.as_str(), l.data.as_slice())),
        );
        out
    }
}

/// Read the host CA bundle that goes into every image.
pub fn read_ca_bundle(path: &Path) -> Result<Vec<u8>, ImageError> {
    match std::fs::read(path) {
        Ok(data) if !data.is_empty() => Ok(data),
        Ok(_) => Err(ImageError::MissingCaBundle(path.to_path_buf())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ImageError::MissingCaBundle(path.to_path_buf()))
        }
        Err(e) => Err(ImageError::Io(e)),
    }
}

/// Assemble the image for one architecture from a built artifact.
///
/// `binary` must be the artifact's executable (checked against its content
/// hash). The result holds exactly two layers: the CA bundle and the binary.
pub fn assemble(
    artifact: &Artifact,
    binary: &[u8],
    architecture: Architecture,
    spec: &ImageSpec,
    ca_bundle: &[u8],
) -> Result<ContainerImage, ImageError> {
    spec.check_budget()?;
    if artifact.target != architecture {
        return Err(ImageError::ArchitectureMismatch {
            artifact: artifact.target,
            requested: architecture,
        });
    }
    let actual = blake3::hash(binary).to_hex().to_string();
    if actual != artifact.content_hash.as_str() {
        return Err(ImageError::ArtifactMismatch {
            expected: artifact.content_hash.to_string(),
            actual,
        });
    }
    if ca_bundle.is_empty() {
        return Err(ImageError::MissingCaBundle(CA_BUNDLE_PATH.into()));
    }

    let exe_path = format!("bin/{}", artifact.executable);
    let plan: [(&str, LayerFile<'_>); 2] = [
        (
            "ca-certificates",
            LayerFile {
                path: CA_BUNDLE_PATH,
                mode: 0o644,
                data: ca_bundle,
            },
        ),
        (
            "artifact",
            LayerFile {
                path: &exe_path,
                mode: 0o555,
                data: binary,
            },
        ),
    ];
    if plan.len() > spec.max_layers {
        return Err(ImageError::LayerBudgetExceeded {
            planned: plan.len(),
            max: spec.max_layers,
        });
    }

    let layers = plan
        .iter()
        .map(|(name, file)| build_layer(name, std::slice::from_ref(file)))
        .collect::<Result<Vec<_>, _>>()?;

    let platform = Platform::linux(architecture);
    let config = ImageConfig {
        architecture: platform.architecture.clone(),
        os: platform.os.clone(),
        variant: platform.variant.clone(),
        config: RuntimeConfig {
            cmd: vec![format!("/{exe_path}")],
            exposed_ports: spec
                .exposed_ports
                .iter()
                .map(|p| (p.to_string(), Empty {}))
                .collect::<BTreeMap<_, _>>(),
        },
        rootfs: RootFs {
            kind: "layers".to_owned(),
            diff_ids: layers.iter().map(|l| l.diff_id.clone()).collect(),
        },
    };
    let config_blob = serde_json::to_vec(&config)?;
    let config_descriptor = Descriptor::of(MEDIA_TYPE_CONFIG, &config_blob);

    let manifest = ImageManifest {
        schema_version: 2,
        media_type: MEDIA_TYPE_MANIFEST.to_owned(),
        config: config_descriptor.clone(),
        layers: layers.iter().map(ImageLayer::descriptor).collect(),
    };
    let manifest_blob = serde_json::to_vec(&manifest)?;
    let manifest_digest = crate::oci::sha256_digest(&manifest_blob);

    debug!(
        "config {} with {} layers for {architecture}",
        config_descriptor.digest,
        layers.len()
    );
    info!(
        "assembled {}:{} for {architecture} ({manifest_digest})",
        spec.name, spec.tag
    );

    Ok(ContainerImage {
        name: spec.name.clone(),
        tag: spec.tag.clone(),
        architecture,
        layers,
        config,
        config_blob,
        config_digest: config_descriptor.digest,
        manifest_blob,
        manifest_digest,
    })
}
