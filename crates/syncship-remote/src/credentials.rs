use crate::PublishError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub const USERNAME_ENV: &str = "SYNCSHIP_REGISTRY_USERNAME";
pub const PASSWORD_ENV: &str = "SYNCSHIP_REGISTRY_PASSWORD";

/// Where a set of credentials was loaded from. Recorded in publish results in
/// place of the secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CredentialSource {
    Environment,
    File { path: PathBuf },
    Explicit,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Environment => write!(f, "environment ({USERNAME_ENV})"),
            Self::File { path } => write!(f, "file {}", path.display()),
            Self::Explicit => f.write_str("explicit"),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
    source: CredentialSource,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StoredCredential {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            source: CredentialSource::Explicit,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() || self.password.is_empty()
    }

    /// Credentials for `registry` from the process environment, falling back
    /// to `~/.config/syncship/credentials.json`.
    pub fn load(registry: &str) -> Result<Option<Self>, PublishError> {
        let file = default_credentials_path();
        Self::resolve(registry, |key| std::env::var(key).ok(), file.as_deref())
    }

    /// Lookup with an injectable environment. The environment wins when both
    /// variables are set; otherwise `file` (if present) is consulted.
    pub fn resolve(
        registry: &str,
        env: impl Fn(&str) -> Option<String>,
        file: Option<&Path>,
    ) -> Result<Option<Self>, PublishError> {
        if let (Some(username), Some(password)) = (env(USERNAME_ENV), env(PASSWORD_ENV)) {
            return Ok(Some(Self {
                username,
                password,
                source: CredentialSource::Environment,
            }));
        }
        match file {
            Some(path) if path.exists() => Self::from_file(registry, path),
            _ => Ok(None),
        }
    }

    /// The file maps registry hosts to `{"username", "password"}`.
    pub fn from_file(registry: &str, path: &Path) -> Result<Option<Self>, PublishError> {
        let content = std::fs::read_to_string(path)?;
        let mut entries: BTreeMap<String, StoredCredential> = serde_json::from_str(&content)
            .map_err(|e| PublishError::Config(format!("invalid credentials file: {e}")))?;
        Ok(entries.remove(registry).map(|c| Self {
            username: c.username,
            password: c.password,
            source: CredentialSource::File {
                path: path.to_path_buf(),
            },
        }))
    }
}

fn default_credentials_path() -> Option<PathBuf> {
    let home = std::env::var_os("HOME")?;
    Some(PathBuf::from(home).join(".config/syncship/credentials.json"))
}
