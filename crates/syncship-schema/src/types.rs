//! Newtype wrappers for string identifiers and the closed set of target architectures.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Full 64-character hex build key identifying an artifact.
    ArtifactId
);

string_newtype!(
    /// Blake3 hash of a content-addressable object in the store.
    ObjectHash
);

string_newtype!(
    /// Reference to a built artifact: a full id, an id prefix of at least
    /// 12 hex characters, or `name@version`.
    ArtifactRef
);

impl ArtifactRef {
    /// Split a `name@version` reference. Returns `None` for id references.
    pub fn name_version(&self) -> Option<(&str, &str)> {
        self.0.split_once('@')
    }
}

/// Length of the display prefix of an [`ArtifactId`].
pub const SHORT_ID_LEN: usize = 12;

impl ArtifactId {
    pub fn short(&self) -> &str {
        &self.0[..SHORT_ID_LEN.min(self.0.len())]
    }
}

/// CPU architectures an image can be built and published for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    Amd64,
    Arm64,
}

impl Architecture {
    pub const ALL: [Architecture; 2] = [Architecture::Amd64, Architecture::Arm64];

    /// Name used by OCI image configs and platform descriptors.
    pub fn oci_name(self) -> &'static str {
        match self {
            Architecture::Amd64 => "amd64",
            Architecture::Arm64 => "arm64",
        }
    }

    /// OCI platform variant, if the architecture has one.
    pub fn oci_variant(self) -> Option<&'static str> {
        match self {
            Architecture::Amd64 => None,
            Architecture::Arm64 => Some("v8"),
        }
    }

    /// Statically linked Rust target triple for this architecture.
    pub fn rust_triple(self) -> &'static str {
        match self {
            Architecture::Amd64 => "x86_64-unknown-linux-musl",
            Architecture::Arm64 => "aarch64-unknown-linux-musl",
        }
    }

    /// Architecture of the machine running this process, if supported.
    pub fn host() -> Option<Self> {
        match std::env::consts::ARCH {
            "x86_64" => Some(Architecture::Amd64),
            "aarch64" => Some(Architecture::Arm64),
            _ => None,
        }
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.oci_name())
    }
}

impl FromStr for Architecture {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amd64" | "x86_64" => Ok(Architecture::Amd64),
            "arm64" | "aarch64" => Ok(Architecture::Arm64),
            other => Err(format!(
                "unsupported architecture '{other}', expected one of: amd64, arm64"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_id_short_prefix() {
        let id = ArtifactId::new("a".repeat(64));
        assert_eq!(id.short().len(), SHORT_ID_LEN);
        assert!(id.as_str().starts_with(id.short()));
    }

    #[test]
    fn artifact_ref_name_version() {
        let r = ArtifactRef::from("sync-server@1.2.3");
        assert_eq!(r.name_version(), Some(("sync-server", "1.2.3")));
        assert_eq!(ArtifactRef::from("abcdef012345").name_version(), None);
    }

    #[test]
    fn object_hash_serializes_as_plain_string() {
        let h = ObjectHash::new("deadbeef");
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json, "\"deadbeef\"");
    }

    #[test]
    fn architecture_parses_aliases() {
        assert_eq!("amd64".parse::<Architecture>(), Ok(Architecture::Amd64));
        assert_eq!("x86_64".parse::<Architecture>(), Ok(Architecture::Amd64));
        assert_eq!("AArch64".parse::<Architecture>(), Ok(Architecture::Arm64));
        assert!("mips".parse::<Architecture>().is_err());
    }

    #[test]
    fn architecture_serde_lowercase() {
        let json = serde_json::to_string(&Architecture::Arm64).unwrap();
        assert_eq!(json, "\"arm64\"");
        let back: Architecture = serde_json::from_str("\"amd64\"").unwrap();
        assert_eq!(back, Architecture::Amd64);
    }

    #[test]
    fn architecture_platform_details() {
        assert_eq!(Architecture::Arm64.oci_variant(), Some("v8"));
        assert_eq!(Architecture::Amd64.oci_variant(), None);
        assert!(Architecture::Arm64.rust_triple().starts_with("aarch64"));
    }
}
