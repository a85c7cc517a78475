use super::{
    json_pretty, load_credentials, load_manifest, lock_store, make_registry, short_digest, step,
    EXIT_SUCCESS,
};
use std::path::Path;
use syncship_core::{DeployReport, Engine, Publisher};
use syncship_image::write_oci_layout;

pub struct DeployArgs<'a> {
    /// Directory receiving the unit file and `oci/` layout.
    pub out: Option<&'a Path>,
    pub publish: bool,
    pub dry_run: bool,
}

pub fn run(engine: &Engine, manifest: &Path, args: DeployArgs<'_>, json: bool) -> Result<u8, String> {
    let manifest = load_manifest(engine, manifest)?;
    let settings = manifest.publish.as_ref().filter(|_| args.publish);
    let credentials = settings
        .map(|s| load_credentials(s, args.dry_run))
        .transpose()?
        .flatten();
    let registry = settings.map(|s| make_registry(s, args.dry_run));
    let _lock = lock_store(engine)?;

    let publisher = registry.as_deref().map(|backend| Publisher {
        backend,
        credentials: credentials.as_ref(),
    });
    let report = step(json, "deploying...", "deployment ready", || {
        engine.deploy(&manifest, publisher)
    })?;

    if let Some(dir) = args.out {
        write_outputs(&report, dir)?;
    }

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        print_report(&report, args.dry_run);
        if let Some(dir) = args.out {
            println!("outputs written to {}", dir.display());
        }
    }
    Ok(EXIT_SUCCESS)
}

fn write_outputs(report: &DeployReport, dir: &Path) -> Result<(), String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("failed to create dir: {e}"))?;
    if let Some(unit) = &report.unit {
        let path = dir.join(&unit.unit_name);
        std::fs::write(&path, unit.render())
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    }
    write_oci_layout(&report.images, &dir.join("oci")).map_err(|e| format!("image error: {e}"))?;
    Ok(())
}

fn print_report(report: &DeployReport, dry_run: bool) {
    for a in &report.artifacts {
        println!("artifact {} {}@{} {}", a.id.short(), a.name, a.version, a.target);
    }
    match &report.unit {
        Some(unit) => println!("unit     {} -> {}", unit.unit_name, unit.exec_start.display()),
        None => println!("unit     (service disabled)"),
    }
    for image in &report.images {
        println!(
            "image    {}:{} {} {}",
            image.name,
            image.tag,
            image.architecture,
            short_digest(&image.manifest_digest)
        );
    }
    println!("index    {}", report.index_digest);
    if let Some(p) = &report.publication {
        let suffix = if dry_run { " (dry run)" } else { "" };
        println!(
            "publish  {}/{}:{}{suffix}",
            p.registry,
            p.repository,
            p.tags.join(",")
        );
    }
}
