use super::{
    json_pretty, load_credentials, load_manifest, lock_store, make_registry, step, EXIT_SUCCESS,
};
use std::path::Path;
use syncship_core::Engine;

pub fn run(engine: &Engine, manifest: &Path, dry_run: bool, json: bool) -> Result<u8, String> {
    let manifest = load_manifest(engine, manifest)?;
    let Some(settings) = manifest.publish.as_ref() else {
        return Err("publish error: manifest has no [publish] section".to_owned());
    };
    let credentials = load_credentials(settings, dry_run)?;
    let registry = make_registry(settings, dry_run);
    let _lock = lock_store(engine)?;

    let artifacts = step(json, "building executables...", "executables built", || {
        engine.build_all(&manifest.package, &manifest.image.architectures)
    })?;
    let images = step(json, "assembling images...", "images assembled", || {
        engine.assemble_images(&artifacts, &manifest.image)
    })?;
    let published = step(json, "publishing...", "published", || {
        engine.publish(
            &images,
            settings,
            &manifest.image.architectures,
            credentials.as_ref(),
            &*registry,
        )
    })?;

    if json {
        println!("{}", json_pretty(&published)?);
    } else {
        let target = if dry_run { " (dry run)" } else { "" };
        println!(
            "published {}/{}{target}",
            published.registry, published.repository
        );
        for (arch, digest) in &published.manifests {
            println!("  {arch:<6} {digest}");
        }
        println!("index: {}", published.index_digest);
        println!("tags:  {}", published.tags.join(", "));
    }
    Ok(EXIT_SUCCESS)
}
