//! The subset of a source tree's `Cargo.toml` the builder checks the lock against.

use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read source manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse source manifest: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("source manifest has no [package] table")]
    MissingPackage,
    #[error("source manifest field '{0}' must be a literal string")]
    InvalidField(&'static str),
}

const DEPENDENCY_TABLES: [&str; 3] = ["dependencies", "dev-dependencies", "build-dependencies"];

/// Package identity and declared dependency names of a source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceManifest {
    pub name: String,
    pub version: String,
    /// Sorted, deduplicated crate names (after `package = "..."` renames).
    pub dependencies: Vec<String>,
}

impl SourceManifest {
    pub fn parse_str(input: &str) -> Result<Self, SourceError> {
        let doc: toml::Table = toml::from_str(input)?;
        let package = doc
            .get("package")
            .and_then(toml::Value::as_table)
            .ok_or(SourceError::MissingPackage)?;
        let name = package
            .get("name")
            .and_then(toml::Value::as_str)
            .ok_or(SourceError::InvalidField("package.name"))?
            .to_owned();
        let version = package
            .get("version")
            .and_then(toml::Value::as_str)
            .ok_or(SourceError::InvalidField("package.version"))?
            .to_owned();

        let mut dependencies = Vec::new();
        collect_dependency_tables(&doc, &mut dependencies);
        if let Some(targets) = doc.get("target").and_then(toml::Value::as_table) {
            for target in targets.values().filter_map(toml::Value::as_table) {
                collect_dependency_tables(target, &mut dependencies);
            }
        }
        dependencies.sort();
        dependencies.dedup();

        Ok(Self {
            name,
            version,
            dependencies,
        })
    }

    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let content = fs::read_to_string(path)?;
        Self::parse_str(&content)
    }
}

fn collect_dependency_tables(table: &toml::Table, out: &mut Vec<String>) {
    for key in DEPENDENCY_TABLES {
        let Some(deps) = table.get(key).and_then(toml::Value::as_table) else {
            continue;
        };
        for (name, spec) in deps {
            let crate_name = spec
                .as_table()
                .and_then(|t| t.get("package"))
                .and_then(toml::Value::as_str)
                .unwrap_or(name.as_str());
            out.push(crate_name.to_owned());
        }
    }
}
