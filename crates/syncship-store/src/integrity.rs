use crate::artifacts::ArtifactStore;
use crate::layout::StoreLayout;
use crate::objects::ObjectStore;
use crate::StoreError;
use serde::Serialize;
use std::fs;

#[derive(Debug, Default, Serialize)]
pub struct IntegrityReport {
    pub objects_checked: usize,
    pub objects_passed: usize,
    pub artifacts_checked: usize,
    pub artifacts_passed: usize,
    pub installs_checked: usize,
    pub installs_passed: usize,
    pub failed: Vec<IntegrityFailure>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct IntegrityFailure {
    pub subject: String,
    pub reason: String,
}

/// Re-hash every object, re-check every artifact record checksum, and confirm
/// that each installed executable still matches its recorded content hash.
pub fn verify_store_integrity(layout: &StoreLayout) -> Result<IntegrityReport, StoreError> {
    let objects = ObjectStore::new(layout.clone());
    let artifacts = ArtifactStore::new(layout.clone());

    let all_objects = objects.list()?;
    let all_records = artifacts.list_with_errors()?;

    let mut report = IntegrityReport {
        objects_checked: all_objects.len(),
        artifacts_checked: all_records.len(),
        ..Default::default()
    };

    for hash in &all_objects {
        match objects.get(hash) {
            Ok(_) => report.objects_passed += 1,
            Err(StoreError::IntegrityFailure { actual, .. }) => {
                report.failed.push(IntegrityFailure {
                    subject: format!("object {hash}"),
                    reason: format!("hash mismatch: got {actual}"),
                });
            }
            Err(e) => report.failed.push(IntegrityFailure {
                subject: format!("object {hash}"),
                reason: format!("read error: {e}"),
            }),
        }
    }

    for record in all_records {
        let artifact = match record {
            Ok(a) => a,
            Err((id, e)) => {
                report.failed.push(IntegrityFailure {
                    subject: format!("artifact {id}"),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        if !objects.exists(&artifact.content_hash) {
            report.failed.push(IntegrityFailure {
                subject: format!("artifact {}", artifact.id),
                reason: format!("content object {} is missing", artifact.content_hash),
            });
            continue;
        }
        report.artifacts_passed += 1;

        report.installs_checked += 1;
        match fs::read(&artifact.install_path) {
            Ok(data) => {
                let actual = blake3::hash(&data).to_hex().to_string();
                if actual == artifact.content_hash.as_str() {
                    report.installs_passed += 1;
                } else {
                    report.failed.push(IntegrityFailure {
                        subject: artifact.install_path.display().to_string(),
                        reason: format!(
                            "installed executable differs from {}",
                            artifact.content_hash
                        ),
                    });
                }
            }
            Err(e) => report.failed.push(IntegrityFailure {
                subject: artifact.install_path.display().to_string(),
                reason: format!("installed executable unreadable: {e}"),
            }),
        }
    }

    Ok(report)
}
