use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// A native input the build environment must provide.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum NativeInput {
    /// An executable that must be on `PATH` (e.g. `pkg-config`).
    Tool(String),
    /// A development library discoverable through `pkg-config` (e.g. `openssl`).
    Library(String),
}

impl NativeInput {
    pub fn name(&self) -> &str {
        match self {
            NativeInput::Tool(n) | NativeInput::Library(n) => n,
        }
    }
}

impl fmt::Display for NativeInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeInput::Tool(n) => write!(f, "tool:{n}"),
            NativeInput::Library(n) => write!(f, "lib:{n}"),
        }
    }
}

/// Everything the artifact builder needs to produce one release of the binary.
///
/// Produced once per release and never mutated afterwards; the builder only
/// reads it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDefinition {
    pub name: String,
    pub version: String,
    /// Root of the source tree (contains `Cargo.toml`).
    pub source: PathBuf,
    /// Lock manifest path.
    pub lock: PathBuf,
    pub executable: String,
    /// Sorted and deduplicated.
    pub native_inputs: Vec<NativeInput>,
    pub toolchain: String,
}

impl PackageDefinition {
    pub fn source_manifest_path(&self) -> PathBuf {
        self.source.join("Cargo.toml")
    }

    /// `name@version`, the human-facing artifact reference for this package.
    pub fn reference(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}
