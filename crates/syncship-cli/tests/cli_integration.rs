//! CLI subprocess integration tests.
//!
//! These tests invoke the `syncship` binary as a subprocess and verify exit
//! codes, written outputs and JSON shapes. Every project uses the mock
//! toolchain and every publish is a dry run, so nothing needs network access
//! or a Rust cross toolchain.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

const CHECKSUM: &str = "3d5a8c6f1c7e2b9a0d4f6e8b1a3c5e7f9b2d4f6a8c0e1b3d5f7a9c2e4b6d8f0a";

const PUBLISH_SECTION: &str = r#"
[publish]
registry = "registry.invalid"
repository = "example/sync-server"
tags = ["latest", "1.2.3"]
"#;

struct Fixture {
    project: tempfile::TempDir,
    store: tempfile::TempDir,
    home: tempfile::TempDir,
    manifest: PathBuf,
}

impl Fixture {
    fn new(extra_manifest: &str) -> Self {
        let project = tempfile::tempdir().unwrap();
        let manifest = write_project(project.path(), extra_manifest);
        Self {
            project,
            store: tempfile::tempdir().unwrap(),
            home: tempfile::tempdir().unwrap(),
            manifest,
        }
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_syncship"));
        // The mock toolchain needs nothing from the host.
        cmd.env("SYNCSHIP_SKIP_PREREQS", "1");
        cmd.env("HOME", self.home.path());
        cmd.env_remove("SYNCSHIP_REGISTRY_USERNAME");
        cmd.env_remove("SYNCSHIP_REGISTRY_PASSWORD");
        cmd.arg("--store").arg(self.store.path());
        cmd
    }

    fn run(&self, args: &[&str]) -> Output {
        self.cmd().args(args).output().unwrap()
    }

    fn run_with_manifest(&self, args: &[&str]) -> Output {
        self.cmd()
            .args(args)
            .arg(&self.manifest)
            .output()
            .unwrap()
    }

    fn edit_manifest(&self, from: &str, to: &str) {
        let content = std::fs::read_to_string(&self.manifest).unwrap();
        assert!(content.contains(from), "fixture has no '{from}'");
        std::fs::write(&self.manifest, content.replace(from, to)).unwrap();
    }
}

fn write_project(dir: &Path, extra_manifest: &str) -> PathBuf {
    std::fs::create_dir_all(dir.join("src")).unwrap();
    std::fs::write(
        dir.join("Cargo.toml"),
        "[package]\nname = \"sync-server\"\nversion = \"1.2.3\"\n\n[dependencies]\nserde = \"1\"\n",
    )
    .unwrap();
    std::fs::write(dir.join("src/main.rs"), "fn main() {}\n").unwrap();
    std::fs::write(
        dir.join("Cargo.lock"),
        format!(
            r#"version = 3

[[package]]
name = "serde"
version = "1.0.200"
source = "registry+https://github.com/rust-lang/crates.io-index"
checksum = "{CHECKSUM}"

[[package]]
name = "sync-server"
version = "1.2.3"
dependencies = [
 "serde",
]
"#
        ),
    )
    .unwrap();
    std::fs::write(dir.join("ca.crt"), "-----BEGIN CERTIFICATE-----\nMIIB\n").unwrap();

    let path = dir.join("syncship.toml");
    std::fs::write(
        &path,
        format!(
            r#"manifest_version = 1

[package]
name = "sync-server"
version = "1.2.3"
toolchain = "mock"

[service]
enable = true
package = "sync-server@1.2.3"
socket = "/run/x/sync.socket"

[image]
tag = "1.2.3"
architectures = ["amd64", "arm64"]
ca_bundle = "ca.crt"
{extra_manifest}"#
        ),
    )
    .unwrap();
    path
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout)
        .unwrap_or_else(|e| panic!("invalid JSON ({e}): {}", stdout(output)))
}

#[test]
fn cli_version_exits_zero() {
    let output = Command::new(env!("CARGO_BIN_EXE_syncship"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("syncship"));
}

#[test]
fn cli_help_lists_pipeline_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_syncship"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = stdout(&output);
    for command in ["build", "unit", "image", "publish", "deploy", "verify-store"] {
        assert!(text.contains(command), "help must list '{command}'");
    }
}

#[test]
fn cli_build_json_reports_one_artifact_per_architecture() {
    let fx = Fixture::new("");
    let output = fx.run_with_manifest(&["--json", "build"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let artifacts = json(&output);
    let artifacts = artifacts.as_array().unwrap();
    assert_eq!(artifacts.len(), 2);
    let targets: Vec<&str> = artifacts
        .iter()
        .map(|a| a["target"].as_str().unwrap())
        .collect();
    assert_eq!(targets, ["amd64", "arm64"]);
    assert!(artifacts
        .iter()
        .all(|a| a["toolchain"] == "mock" && a["id"].as_str().unwrap().len() == 64));
}

#[test]
fn cli_build_single_architecture() {
    let fx = Fixture::new("");
    let output = fx.run_with_manifest(&["--json", "build", "--arch", "arm64"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let artifacts = json(&output);
    assert_eq!(artifacts.as_array().unwrap().len(), 1);
    assert_eq!(artifacts[0]["target"], "arm64");
}

#[test]
fn cli_build_rejects_unknown_architecture() {
    let fx = Fixture::new("");
    let output = fx.run_with_manifest(&["build", "--arch", "mips"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unsupported architecture"));
}

#[test]
fn cli_check_lock_verifies_pinned_lock() {
    let fx = Fixture::new("");
    let output = fx.run_with_manifest(&["--json", "check-lock"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let payload = json(&output);
    assert_eq!(payload["status"], "verified");
    assert_eq!(payload["entries"], 2);
}

#[test]
fn cli_lock_drift_exits_with_build_error() {
    let fx = Fixture::new("");
    std::fs::write(
        fx.project.path().join("Cargo.toml"),
        "[package]\nname = \"sync-server\"\nversion = \"1.2.3\"\n\n[dependencies]\nserde = \"1\"\ntokio = \"1\"\n",
    )
    .unwrap();

    let output = fx.run_with_manifest(&["check-lock"]);
    assert_eq!(output.status.code(), Some(4));
    assert!(stderr(&output).contains("build error: lock mismatch"));

    let output = fx.run_with_manifest(&["build"]);
    assert_eq!(output.status.code(), Some(4));
    let list = fx.run(&["--json", "list"]);
    assert_eq!(json(&list).as_array().unwrap().len(), 0);
}

#[test]
fn cli_unit_before_build_is_config_error() {
    let fx = Fixture::new("");
    let output = fx.run_with_manifest(&["unit"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("config error:"));
}

#[test]
fn cli_unit_renders_hardened_service() {
    let fx = Fixture::new("");
    assert!(fx.run_with_manifest(&["build"]).status.success());

    let output = fx.run_with_manifest(&["unit"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("[Service]"));
    assert!(text.contains("SOCKET=/run/x/sync.socket"));
    assert!(text.contains("RuntimeDirectory=x\n"));
    assert!(text.contains("DynamicUser=yes"));
    assert!(text.contains("CapabilityBoundingSet=\n"));
    assert!(text.contains("RestrictAddressFamilies=AF_UNIX\n"));
    assert!(text.contains("Restart=on-failure"));
}

#[test]
fn cli_unit_out_writes_service_file() {
    let fx = Fixture::new("");
    assert!(fx.run_with_manifest(&["build"]).status.success());

    let out = fx.project.path().join("units");
    let output = fx
        .cmd()
        .arg("unit")
        .arg(&fx.manifest)
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let written = std::fs::read_to_string(out.join("sync-server.service")).unwrap();
    assert!(written.contains("ExecStart="));
}

#[test]
fn cli_disabled_service_generates_nothing() {
    let fx = Fixture::new("");
    fx.edit_manifest("enable = true", "enable = false");
    let output = fx.run_with_manifest(&["--json", "unit"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(json(&output)["unit"].is_null());
}

#[test]
fn cli_socket_outside_runtime_dir_is_rejected() {
    let fx = Fixture::new("");
    fx.edit_manifest("/run/x/sync.socket", "/tmp/sync.socket");
    let output = fx.run_with_manifest(&["deploy"]);
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_profile_lists_directives() {
    let fx = Fixture::new("");
    let output = fx.run(&["profile"]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("NoNewPrivileges=yes"));
    assert!(text.contains("ProtectSystem=strict"));
    assert!(text.contains("DynamicUser=yes"));
}

#[test]
fn cli_image_writes_oci_layout() {
    let fx = Fixture::new("");
    let oci = fx.project.path().join("oci");
    let output = fx
        .cmd()
        .args(["--json", "image"])
        .arg(&fx.manifest)
        .arg("--oci-dir")
        .arg(&oci)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let payload = json(&output);
    assert_eq!(payload["images"].as_array().unwrap().len(), 2);
    assert!(payload["index_digest"]
        .as_str()
        .unwrap()
        .starts_with("sha256:"));
    assert!(oci.join("index.json").is_file());
    assert!(oci.join("oci-layout").is_file());
    assert!(oci.join("blobs/sha256").is_dir());
}

#[test]
fn cli_image_missing_ca_bundle_fails() {
    let fx = Fixture::new("");
    std::fs::remove_file(fx.project.path().join("ca.crt")).unwrap();
    let output = fx.run_with_manifest(&["image"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("image error:"));
}

#[test]
fn cli_publish_dry_run_covers_every_architecture() {
    let fx = Fixture::new(PUBLISH_SECTION);
    let output = fx.run_with_manifest(&["--json", "publish", "--dry-run"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let payload = json(&output);
    let manifests = payload["manifests"].as_object().unwrap();
    assert!(manifests.contains_key("amd64"));
    assert!(manifests.contains_key("arm64"));
    assert_eq!(payload["tags"], serde_json::json!(["latest", "1.2.3"]));
    assert_eq!(payload["credentials"]["kind"], "explicit");
}

#[test]
fn cli_publish_without_credentials_exits_with_publish_error() {
    let fx = Fixture::new(PUBLISH_SECTION);
    let output = fx.run_with_manifest(&["publish"]);
    assert_eq!(output.status.code(), Some(5));
    assert!(stderr(&output).contains("publish error:"));
}

#[test]
fn cli_publish_uses_credentials_file() {
    let fx = Fixture::new(PUBLISH_SECTION);
    let dir = fx.home.path().join(".config/syncship");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("credentials.json"),
        r#"{"registry.invalid": {"username": "deploy", "password": "s3cret"}}"#,
    )
    .unwrap();

    let output = fx.run_with_manifest(&["--json", "publish", "--dry-run"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(json(&output)["credentials"]["kind"], "file");
}

#[test]
fn cli_publish_without_section_fails() {
    let fx = Fixture::new("");
    let output = fx.run_with_manifest(&["publish", "--dry-run"]);
    assert_eq!(output.status.code(), Some(5));
}

#[test]
fn cli_deploy_dry_run_writes_outputs() {
    let fx = Fixture::new(PUBLISH_SECTION);
    let out = fx.project.path().join("out");
    let output = fx
        .cmd()
        .args(["--json", "deploy"])
        .arg(&fx.manifest)
        .arg("--dry-run")
        .arg("--out")
        .arg(&out)
        .output()
        .unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));

    let report = json(&output);
    assert_eq!(report["artifacts"].as_array().unwrap().len(), 2);
    assert_eq!(report["unit"]["unit_name"], "sync-server.service");
    assert_eq!(
        report["publication"]["index_digest"],
        report["index_digest"]
    );
    assert!(out.join("sync-server.service").is_file());
    assert!(out.join("oci/index.json").is_file());
}

#[test]
fn cli_deploy_no_publish_skips_registry() {
    let fx = Fixture::new(PUBLISH_SECTION);
    let output = fx.run_with_manifest(&["--json", "deploy", "--no-publish"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(json(&output)["publication"].is_null());
}

#[test]
fn cli_deploy_after_source_edit_uses_the_new_build() {
    let fx = Fixture::new("");
    assert!(fx.run_with_manifest(&["build"]).status.success());
    std::fs::write(
        fx.project.path().join("src/main.rs"),
        "fn main() { println!(\"edited\"); }\n",
    )
    .unwrap();

    let output = fx.run_with_manifest(&["--json", "deploy"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report = json(&output);
    let unit_artifact = report["unit"]["artifact"].as_str().unwrap();
    let built = report["artifacts"].as_array().unwrap();
    let deployed = built
        .iter()
        .find(|a| a["id"] == unit_artifact)
        .expect("unit must run an artifact from this deploy");
    assert_eq!(report["unit"]["exec_start"], deployed["install_path"]);

    // Two builds of sync-server@1.2.3 now sit in the store.
    let output = fx.run_with_manifest(&["unit"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("refer to one by id"), "{}", stderr(&output));
}

#[test]
fn cli_deploy_is_deterministic_across_stores() {
    let a = Fixture::new("");
    let first = a.run_with_manifest(&["--json", "deploy"]);
    assert!(first.status.success(), "stderr: {}", stderr(&first));

    let mut b = Fixture::new("");
    b.manifest = a.manifest.clone();
    let second = b.run_with_manifest(&["--json", "deploy"]);
    assert!(second.status.success(), "stderr: {}", stderr(&second));

    assert_eq!(json(&first)["index_digest"], json(&second)["index_digest"]);
}

#[test]
fn cli_toolchain_override_is_recorded() {
    let fx = Fixture::new("");
    fx.edit_manifest("toolchain = \"mock\"", "toolchain = \"cargo\"");
    let output = fx.run_with_manifest(&["--json", "--toolchain", "mock", "build"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(json(&output)[0]["toolchain"], "mock");
}

#[test]
fn cli_list_and_inspect_after_build() {
    let fx = Fixture::new("");
    assert!(fx.run_with_manifest(&["build"]).status.success());

    let list = fx.run(&["--json", "list"]);
    assert!(list.status.success());
    let artifacts = json(&list);
    assert_eq!(artifacts.as_array().unwrap().len(), 2);

    let inspect = fx.run(&["--json", "inspect", "sync-server@1.2.3"]);
    assert!(inspect.status.success(), "stderr: {}", stderr(&inspect));
    assert_eq!(json(&inspect).as_array().unwrap().len(), 2);

    let id = artifacts[0]["id"].as_str().unwrap();
    let by_prefix = fx.run(&["--json", "inspect", &id[..12]]);
    assert!(by_prefix.status.success());
    assert_eq!(json(&by_prefix)[0]["id"], id);
}

#[test]
fn cli_inspect_unknown_artifact_exits_with_store_error() {
    let fx = Fixture::new("");
    let output = fx.run(&["inspect", "sync-server@0.0.1"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_list_empty_store() {
    let fx = Fixture::new("");
    let output = fx.run(&["list"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("no artifacts found"));
}

#[test]
fn cli_verify_store_clean_after_build() {
    let fx = Fixture::new("");
    assert!(fx.run_with_manifest(&["build"]).status.success());
    let output = fx.run(&["--json", "verify-store"]);
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let report = json(&output);
    assert_eq!(report["artifacts_checked"], 2);
    assert!(report["failed"].as_array().unwrap().is_empty());
}

#[test]
fn cli_verify_store_detects_tampered_install() {
    let fx = Fixture::new("");
    let built = fx.run_with_manifest(&["--json", "build", "--arch", "amd64"]);
    assert!(built.status.success());
    let path = json(&built)[0]["install_path"]
        .as_str()
        .unwrap()
        .to_owned();
    // Installed executables are read-only.
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    std::fs::write(&path, b"tampered").unwrap();

    let output = fx.run(&["verify-store"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_doctor_json_with_mock_manifest() {
    let fx = Fixture::new("");
    let output = fx
        .cmd()
        .args(["--json", "doctor", "--manifest"])
        .arg(&fx.manifest)
        .output()
        .unwrap();
    let payload = json(&output);
    assert_eq!(payload["healthy"], output.status.success());
    let names: Vec<&str> = payload["checks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert!(names.contains(&"manifest"));
    assert!(names.contains(&"ca_bundle"));
    assert!(names.contains(&"build_inputs"));
}

#[test]
fn cli_nonexistent_manifest_exits_with_manifest_error() {
    let fx = Fixture::new("");
    let output = fx.run(&["build", "/nonexistent/syncship.toml"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("manifest error:"));
}

#[test]
fn cli_completions_bash() {
    let fx = Fixture::new("");
    let output = fx.run(&["completions", "bash"]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("syncship"));
}

#[test]
fn cli_man_pages_written() {
    let fx = Fixture::new("");
    let dir = fx.project.path().join("man");
    let output = fx.cmd().arg("man-pages").arg(&dir).output().unwrap();
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(dir.join("syncship.1").is_file());
    assert!(dir.join("syncship-deploy.1").is_file());
}
