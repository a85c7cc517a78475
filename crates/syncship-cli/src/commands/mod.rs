pub mod build;
pub mod check_lock;
pub mod deploy;
pub mod doctor;
pub mod generate;
pub mod image;
pub mod inspect;
pub mod list;
pub mod profile;
pub mod publish;
pub mod unit;
pub mod verify_store;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use syncship_core::{Engine, StoreLock};
use syncship_remote::{Credentials, HttpRegistry, InMemoryRegistry, RegistryBackend};
use syncship_schema::{NormalizedManifest, PublishSettings};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_MANIFEST_ERROR: u8 = 2;
pub const EXIT_STORE_ERROR: u8 = 3;
pub const EXIT_BUILD_ERROR: u8 = 4;
pub const EXIT_PUBLISH_ERROR: u8 = 5;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

fn plain_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_spinner())
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        plain_style("{spinner:.cyan} {msg}")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style("{msg}"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(plain_style("{msg}"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Run one pipeline step behind a spinner. No spinner in JSON mode.
pub fn step<T, E: std::fmt::Display>(
    json: bool,
    running: &str,
    done: &str,
    f: impl FnOnce() -> Result<T, E>,
) -> Result<T, String> {
    let pb = (!json).then(|| spinner(running));
    match f() {
        Ok(v) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, done);
            }
            Ok(v)
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, &format!("{running} failed"));
            }
            Err(e.to_string())
        }
    }
}

pub fn colorize_status(status: &str) -> String {
    use console::Style;
    match status {
        "pass" | "ok" => Style::new().green().apply_to(status).to_string(),
        "fail" | "failed" => Style::new().red().bold().apply_to(status).to_string(),
        "warn" => Style::new().yellow().apply_to(status).to_string(),
        "info" => Style::new().dim().apply_to(status).to_string(),
        other => other.to_owned(),
    }
}

/// `sha256:` plus the first 12 hex digits.
pub fn short_digest(digest: &str) -> &str {
    let end = digest
        .find(':')
        .map_or(12, |i| i + 13)
        .min(digest.len());
    &digest[..end]
}

pub fn load_manifest(engine: &Engine, path: &Path) -> Result<NormalizedManifest, String> {
    engine.load_manifest(path).map_err(|e| e.to_string())
}

pub fn lock_store(engine: &Engine) -> Result<StoreLock, String> {
    StoreLock::acquire(&engine.store_layout().lock_file()).map_err(|e| format!("store lock: {e}"))
}

/// Registry backend for `settings`. Dry runs never leave the process.
pub fn make_registry(settings: &PublishSettings, dry_run: bool) -> Box<dyn RegistryBackend> {
    if dry_run {
        Box::new(InMemoryRegistry::new())
    } else {
        Box::new(HttpRegistry::new(&settings.registry, settings.insecure))
    }
}

/// Credentials for `settings.registry`. A dry run falls back to a
/// placeholder so the rest of the publish checks still run.
pub fn load_credentials(
    settings: &PublishSettings,
    dry_run: bool,
) -> Result<Option<Credentials>, String> {
    let loaded =
        Credentials::load(&settings.registry).map_err(|e| format!("publish error: {e}"))?;
    Ok(loaded.or_else(|| dry_run.then(|| Credentials::new("dry-run", "dry-run"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_pretty_serializes_string() {
        let val = serde_json::json!({"key": "value"});
        let result = json_pretty(&val).unwrap();
        assert!(result.contains("\"key\""));
        assert!(result.contains("\"value\""));
    }

    #[test]
    fn colorize_status_keeps_text() {
        for status in ["pass", "fail", "warn", "info", "ok", "failed"] {
            assert!(colorize_status(status).contains(status));
        }
        assert_eq!(colorize_status("unknown"), "unknown");
    }

    #[test]
    fn short_digest_truncates_hex_part() {
        let digest = format!("sha256:{}", "ab".repeat(32));
        assert_eq!(short_digest(&digest), "sha256:abababababab");
        assert_eq!(short_digest("abc"), "abc");
        assert_eq!(short_digest(&"f".repeat(64)), "ffffffffffff");
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_FAILURE,
            EXIT_MANIFEST_ERROR,
            EXIT_STORE_ERROR,
            EXIT_BUILD_ERROR,
            EXIT_PUBLISH_ERROR,
        ];
        let unique: std::collections::BTreeSet<_> = codes.iter().collect();
        assert_eq!(unique.len(), codes.len());
    }

    #[test]
    fn step_maps_errors_to_strings() {
        let ok: Result<u8, String> = step(true, "working", "done", || Ok::<_, String>(7));
        assert_eq!(ok.unwrap(), 7);
        let err: Result<u8, String> =
            step(true, "working", "done", || Err::<u8, _>("build error: boom"));
        assert_eq!(err.unwrap_err(), "build error: boom");
    }

    #[test]
    fn dry_run_registry_is_in_memory() {
        let settings = PublishSettings {
            registry: "registry.invalid".to_owned(),
            repository: "a/b".to_owned(),
            tags: vec!["latest".to_owned()],
            insecure: false,
        };
        let registry = make_registry(&settings, true);
        let creds = Credentials::new("u", "p");
        assert!(!registry.has_blob("a/b", "sha256:00", &creds).unwrap());
    }

    #[test]
    fn spinner_creates_progress_bar() {
        let pb = spinner("testing...");
        spin_ok(&pb, "done");
        let pb = spinner("testing...");
        spin_fail(&pb, "failed");
    }
}
