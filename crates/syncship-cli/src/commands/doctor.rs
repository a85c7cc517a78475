use super::{colorize_status, json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use serde::Serialize;
use std::path::Path;
use syncship_build::{check_native_inputs, format_missing, select_toolchain, HostProbe};
use syncship_core::{Engine, StoreLock};
use syncship_image::read_ca_bundle;
use syncship_remote::Credentials;
use syncship_schema::{Architecture, NativeInput, NormalizedManifest};
use syncship_store::StoreLayout;

pub fn run(engine: &Engine, manifest: Option<&Path>, json: bool) -> Result<u8, String> {
    let mut checks = Checks::default();

    match Architecture::host() {
        Some(arch) => checks.pass("host_arch", &format!("Host architecture {arch} is supported")),
        None => checks.warn(
            "host_arch",
            &format!(
                "Host architecture {} is not a deployment target",
                std::env::consts::ARCH
            ),
        ),
    }

    let loaded = match manifest {
        Some(path) => match engine.load_manifest(path) {
            Ok(m) => {
                checks.pass("manifest", &format!("Manifest {} is valid", path.display()));
                Some(m)
            }
            Err(e) => {
                checks.fail("manifest", &e.to_string());
                None
            }
        },
        None => None,
    };

    check_build_inputs(loaded.as_ref(), &mut checks);
    if let Some(m) = &loaded {
        check_deploy_inputs(m, &mut checks);
    }

    let layout = engine.store_layout();
    if layout.root().join("store").exists() {
        checks.pass("store_exists", "Store directory exists");
        check_store(engine, layout, &mut checks);
    } else {
        checks.info(
            "store_exists",
            "Store not initialized (will be created on first build)",
        );
    }

    print_results(&checks, json)
}

fn check_build_inputs(manifest: Option<&NormalizedManifest>, checks: &mut Checks) {
    let toolchain_name = manifest.map_or("cargo", |m| m.package.toolchain.as_str());
    let toolchain = match select_toolchain(toolchain_name) {
        Ok(t) => t,
        Err(e) => {
            checks.fail("build_inputs", &e.to_string());
            return;
        }
    };
    let mut inputs: Vec<NativeInput> = toolchain.required_tools();
    if let Some(m) = manifest {
        inputs.extend(m.package.native_inputs.iter().cloned());
    }

    let missing = check_native_inputs(&HostProbe, &inputs);
    if missing.is_empty() {
        checks.pass(
            "build_inputs",
            &format!("Build inputs for the {toolchain_name} toolchain are available"),
        );
    } else {
        checks.fail(
            "build_inputs",
            &format!("Missing build inputs:\n{}", format_missing(&missing)),
        );
    }
}

fn check_deploy_inputs(manifest: &NormalizedManifest, checks: &mut Checks) {
    match read_ca_bundle(&manifest.image.ca_bundle) {
        Ok(bundle) => checks.pass(
            "ca_bundle",
            &format!(
                "CA bundle {} ({} bytes)",
                manifest.image.ca_bundle.display(),
                bundle.len()
            ),
        ),
        Err(e) => checks.fail("ca_bundle", &e.to_string()),
    }

    let Some(publish) = &manifest.publish else {
        checks.info("credentials", "No [publish] section, registry not needed");
        return;
    };
    match Credentials::load(&publish.registry) {
        Ok(Some(c)) => checks.pass(
            "credentials",
            &format!("Credentials for {} from {}", publish.registry, c.source()),
        ),
        Ok(None) => checks.warn(
            "credentials",
            &format!("No credentials for {}; publishing will fail", publish.registry),
        ),
        Err(e) => checks.fail("credentials", &e.to_string()),
    }
}

fn check_store(engine: &Engine, layout: &StoreLayout, checks: &mut Checks) {
    match layout.verify_version() {
        Ok(()) => checks.pass("store_version", "Store format version valid"),
        Err(e) => checks.fail("store_version", &format!("Store version check failed: {e}")),
    }

    match engine.verify_store() {
        Ok(report) if report.is_clean() => checks.pass(
            "store_integrity",
            &format!(
                "Store integrity OK ({} objects, {} artifacts checked)",
                report.objects_checked, report.artifacts_checked
            ),
        ),
        Ok(report) => checks.fail(
            "store_integrity",
            &format!("{} integrity failures", report.failed.len()),
        ),
        Err(e) => checks.fail("store_integrity", &format!("Integrity check failed: {e}")),
    }

    match StoreLock::try_acquire(&layout.lock_file()) {
        Ok(Some(_)) => checks.pass("store_lock", "Store lock is free"),
        Ok(None) => {
            let holder = StoreLock::holder(&layout.lock_file())
                .map_or_else(|| "another process".to_owned(), |pid| format!("pid {pid}"));
            checks.warn("store_lock", &format!("Store lock is held by {holder}"));
        }
        Err(e) => checks.fail("store_lock", &format!("Cannot check store lock: {e}")),
    }

    match engine.list() {
        Ok(artifacts) => checks.info("artifacts", &format!("{} artifacts", artifacts.len())),
        Err(e) => checks.warn("artifacts", &format!("Cannot list artifacts: {e}")),
    }
}

fn print_results(checks: &Checks, json: bool) -> Result<u8, String> {
    let healthy = checks.healthy();
    if json {
        let payload = serde_json::json!({
            "healthy": healthy,
            "checks": checks.items,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("syncship doctor\n");
        for check in &checks.items {
            println!("  {:<5} {}", colorize_status(check.status), check.message);
        }
        println!();
        if healthy {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if healthy { EXIT_SUCCESS } else { EXIT_FAILURE })
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    status: &'static str,
    message: String,
}

#[derive(Debug, Default)]
struct Checks {
    items: Vec<Check>,
}

impl Checks {
    fn push(&mut self, name: &'static str, status: &'static str, message: &str) {
        self.items.push(Check {
            name,
            status,
            message: message.to_owned(),
        });
    }

    fn pass(&mut self, name: &'static str, message: &str) {
        self.push(name, "pass", message);
    }

    fn fail(&mut self, name: &'static str, message: &str) {
        self.push(name, "fail", message);
    }

    fn warn(&mut self, name: &'static str, message: &str) {
        self.push(name, "warn", message);
    }

    fn info(&mut self, name: &'static str, message: &str) {
        self.push(name, "info", message);
    }

    fn healthy(&self) -> bool {
        self.items.iter().all(|c| c.status != "fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_failure_makes_report_unhealthy() {
        let mut checks = Checks::default();
        checks.pass("a", "fine");
        checks.warn("b", "meh");
        checks.info("c", "fyi");
        assert!(checks.healthy());
        checks.fail("d", "broken");
        assert!(!checks.healthy());
    }

    #[test]
    fn build_inputs_check_reports_once() {
        let mut checks = Checks::default();
        check_build_inputs(None, &mut checks);
        assert_eq!(checks.items.len(), 1);
        assert_eq!(checks.items[0].name, "build_inputs");

        let toolchain = select_toolchain("mock").unwrap();
        assert!(check_native_inputs(&HostProbe, &toolchain.required_tools()).is_empty());
    }
}
