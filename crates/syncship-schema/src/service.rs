use crate::types::ArtifactRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("invalid service name '{0}': must match [a-z0-9][a-z0-9_-]{{0,63}}")]
    InvalidName(String),
    #[error("service '{0}' is enabled but no package is set")]
    MissingPackage(String),
    #[error("package '{0}' does not resolve to a built artifact")]
    UnresolvedPackage(String),
    #[error("package '{reference}' matches {count} builds for {target}; refer to one by id")]
    AmbiguousPackage {
        reference: String,
        target: String,
        count: usize,
    },
    #[error("invalid socket path '{path}': {reason}")]
    InvalidSocket { path: String, reason: String },
    #[error("invalid description: {0}")]
    InvalidDescription(String),
}

/// Declarative service settings applied once per deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Unit and identity name. Defaults to the package name.
    pub name: String,
    /// Defaults to `false`.
    pub enable: bool,
    /// Required when enabled; no default.
    pub package: Option<ArtifactRef>,
    /// Defaults to `/var/run/<name>/sync.socket`.
    pub socket: String,
    pub description: Option<String>,
}

impl ServiceConfig {
    /// A disabled configuration with every default applied.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            socket: default_socket_path(&name),
            name,
            enable: false,
            package: None,
            description: None,
        }
    }

    #[must_use]
    pub fn enabled(mut self, package: impl Into<ArtifactRef>) -> Self {
        self.enable = true;
        self.package = Some(package.into());
        self
    }

    #[must_use]
    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = socket.into();
        self
    }

    /// Validate every field eagerly. A disabled service only needs a valid name.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        validate_service_name(&self.name)?;
        if !self.enable {
            return Ok(());
        }
        if self.package.as_ref().is_none_or(|p| p.trim().is_empty()) {
            return Err(ConfigValidationError::MissingPackage(self.name.clone()));
        }
        runtime_directory_for(&self.socket)?;
        if let Some(ref desc) = self.description {
            if desc.chars().any(char::is_control) {
                return Err(ConfigValidationError::InvalidDescription(
                    "must not contain control characters".to_owned(),
                ));
            }
        }
        Ok(())
    }

    /// Name of the runtime directory (relative to `/run`) holding the socket.
    pub fn runtime_directory(&self) -> Result<String, ConfigValidationError> {
        runtime_directory_for(&self.socket)
    }
}

pub fn default_socket_path(service: &str) -> String {
    format!("/var/run/{service}/sync.socket")
}

pub fn validate_service_name(name: &str) -> Result<(), ConfigValidationError> {
    let valid = !name.is_empty()
        && name.len() <= 64
        && name
            .bytes()
            .next()
            .is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(ConfigValidationError::InvalidName(name.to_owned()))
    }
}

/// Derive the runtime directory from a socket path.
///
/// The socket must live in a sub-directory of `/run` (or its `/var/run`
/// alias), because that directory is the only writable path the service gets.
fn runtime_directory_for(socket: &str) -> Result<String, ConfigValidationError> {
    let invalid = |reason: &str| ConfigValidationError::InvalidSocket {
        path: socket.to_owned(),
        reason: reason.to_owned(),
    };

    if socket
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '"' || c == '\\' || c == '%')
    {
        return Err(invalid(
            "must not contain whitespace, quotes, backslashes, '%' or control characters",
        ));
    }
    let rest = socket
        .strip_prefix("/run/")
        .or_else(|| socket.strip_prefix("/var/run/"))
        .ok_or_else(|| invalid("must be an absolute path under /run or /var/run"))?;

    let segments: Vec<&str> = rest.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(invalid("must not contain empty, '.' or '..' segments"));
    }
    if segments.len() < 2 {
        return Err(invalid(
            "must be inside a sub-directory of /run, e.g. /run/<service>/sync.socket",
        ));
    }
    Ok(segments[..segments.len() - 1].join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_disabled_with_default_socket() {
        let cfg = ServiceConfig::new("sync-server");
        assert!(!cfg.enable);
        assert!(cfg.package.is_none());
        assert_eq!(cfg.socket, "/var/run/sync-server/sync.socket");
        cfg.validate().unwrap();
    }

    #[test]
    fn enabled_requires_package() {
        let mut cfg = ServiceConfig::new("sync-server");
        cfg.enable = true;
        assert_eq!(
            cfg.validate(),
            Err(ConfigValidationError::MissingPackage("sync-server".to_owned()))
        );
    }

    #[test]
    fn runtime_directory_from_socket() {
        let cfg = ServiceConfig::new("x")
            .enabled("x@1.0.0")
            .with_socket("/run/x/sync.socket");
        assert_eq!(cfg.runtime_directory().unwrap(), "x");

        let nested = cfg.with_socket("/var/run/sync/nested/s.sock");
        assert_eq!(nested.runtime_directory().unwrap(), "sync/nested");
    }

    #[test]
    fn socket_outside_run_is_rejected() {
        let cfg = ServiceConfig::new("x")
            .enabled("x@1.0.0")
            .with_socket("/tmp/sync.socket");
        assert!(matches!(
            cfg.validate(),
            Err(ConfigValidationError::InvalidSocket { .. })
        ));
    }

    #[test]
    fn socket_directly_in_run_is_rejected() {
        let cfg = ServiceConfig::new("x")
            .enabled("x@1.0.0")
            .with_socket("/run/sync.socket");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn socket_traversal_is_rejected() {
        let cfg = ServiceConfig::new("x")
            .enabled("x@1.0.0")
            .with_socket("/run/x/../../etc/sync.socket");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn socket_with_whitespace_is_rejected() {
        let cfg = ServiceConfig::new("x")
            .enabled("x@1.0.0")
            .with_socket("/run/x/sync socket");
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn disabled_service_skips_socket_checks() {
        let cfg = ServiceConfig::new("x").with_socket("relative/path");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn service_name_rules() {
        assert!(validate_service_name("sync-server").is_ok());
        assert!(validate_service_name("sync_2").is_ok());
        assert!(validate_service_name("").is_err());
        assert!(validate_service_name("-sync").is_err());
        assert!(validate_service_name("Sync").is_err());
        assert!(validate_service_name("sync/server").is_err());
        assert!(validate_service_name(&"a".repeat(65)).is_err());
    }
}
