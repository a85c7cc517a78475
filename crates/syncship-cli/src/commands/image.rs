use super::{json_pretty, load_manifest, lock_store, short_digest, step, EXIT_SUCCESS};
use std::path::Path;
use syncship_core::Engine;
use syncship_image::{build_index, write_oci_layout};

pub fn run(engine: &Engine, manifest: &Path, oci_dir: Option<&Path>, json: bool) -> Result<u8, String> {
    let manifest = load_manifest(engine, manifest)?;
    let _lock = lock_store(engine)?;

    let artifacts = step(json, "building executables...", "executables built", || {
        engine.build_all(&manifest.package, &manifest.image.architectures)
    })?;
    let images = step(json, "assembling images...", "images assembled", || {
        engine.assemble_images(&artifacts, &manifest.image)
    })?;
    let (_, index_digest) = build_index(&images).map_err(|e| format!("image error: {e}"))?;

    if let Some(dir) = oci_dir {
        write_oci_layout(&images, dir).map_err(|e| format!("image error: {e}"))?;
    }

    if json {
        let payload = serde_json::json!({
            "images": images,
            "index_digest": index_digest,
            "oci_dir": oci_dir.map(|d| d.display().to_string()),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for image in &images {
            println!(
                "{}:{} {:<6} {} ({} layers)",
                image.name,
                image.tag,
                image.architecture,
                short_digest(&image.manifest_digest),
                image.layers.len()
            );
        }
        println!("index: {index_digest}");
        if let Some(dir) = oci_dir {
            println!("OCI layout written to {}", dir.display());
        }
    }
    Ok(EXIT_SUCCESS)
}
