use crate::service::ConfigValidationError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("unsupported manifest_version: {0}, expected 1")]
    UnsupportedVersion(u32),
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
    #[error("invalid {field}: '{value}'")]
    InvalidValue { field: &'static str, value: String },
    #[error("{0}")]
    InvalidArchitecture(String),
    #[error("architecture '{0}' is listed more than once")]
    DuplicateArchitecture(String),
    #[error("service configuration: {0}")]
    Service(#[from] ConfigValidationError),
}

/// `syncship.toml`, version 1.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeployManifest {
    pub manifest_version: u32,
    pub package: PackageSection,
    #[serde(default)]
    pub service: ServiceSection,
    #[serde(default)]
    pub image: ImageSection,
    #[serde(default)]
    pub publish: Option<PublishSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    pub name: String,
    pub version: String,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default = "default_lock")]
    pub lock: String,
    #[serde(default)]
    pub executable: Option<String>,
    #[serde(default)]
    pub native_tools: Vec<String>,
    #[serde(default)]
    pub native_libraries: Vec<String>,
    #[serde(default = "default_toolchain")]
    pub toolchain: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServiceSection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub package: Option<String>,
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ImageSection {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_architectures")]
    pub architectures: Vec<String>,
    #[serde(default = "default_exposed_ports")]
    pub exposed_ports: Vec<String>,
    #[serde(default = "default_ca_bundle")]
    pub ca_bundle: String,
    #[serde(default = "default_max_layers")]
    pub max_layers: usize,
}

impl Default for ImageSection {
    fn default() -> Self {
        Self {
            name: None,
            tag: default_tag(),
            architectures: default_architectures(),
            exposed_ports: default_exposed_ports(),
            ca_bundle: default_ca_bundle(),
            max_layers: default_max_layers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PublishSection {
    pub registry: String,
    pub repository: String,
    #[serde(default = "default_tags")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub insecure: bool,
}

fn default_source() -> String {
    ".".to_owned()
}

fn default_lock() -> String {
    "Cargo.lock".to_owned()
}

fn default_toolchain() -> String {
    "cargo".to_owned()
}

fn default_tag() -> String {
    "latest".to_owned()
}

fn default_tags() -> Vec<String> {
    vec![default_tag()]
}

fn default_architectures() -> Vec<String> {
    vec!["amd64".to_owned()]
}

fn default_exposed_ports() -> Vec<String> {
    vec!["80/tcp".to_owned()]
}

fn default_ca_bundle() -> String {
    "/etc/ssl/certs/ca-certificates.crt".to_owned()
}

/// Matches the image assembler's layer ceiling.
fn default_max_layers() -> usize {
    5
}

pub fn parse_manifest_str(input: &str) -> Result<DeployManifest, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<DeployManifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}
