use super::{json_pretty, load_manifest, lock_store, short_digest, step, EXIT_SUCCESS};
use std::path::Path;
use syncship_core::Engine;
use syncship_schema::Architecture;

pub fn run(
    engine: &Engine,
    manifest: &Path,
    architectures: &[Architecture],
    json: bool,
) -> Result<u8, String> {
    let manifest = load_manifest(engine, manifest)?;
    let targets = if architectures.is_empty() {
        manifest.image.architectures.clone()
    } else {
        architectures.to_vec()
    };
    let _lock = lock_store(engine)?;

    let artifacts = step(json, "building executables...", "executables built", || {
        engine.build_all(&manifest.package, &targets)
    })?;

    if json {
        println!("{}", json_pretty(&artifacts)?);
    } else {
        for a in &artifacts {
            println!(
                "built {}@{} for {} ({}, {} bytes)",
                a.name,
                a.version,
                a.target,
                a.id.short(),
                a.size
            );
            println!("  content: {}", short_digest(&a.content_hash));
            println!("  path:    {}", a.install_path.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
