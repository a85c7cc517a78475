use super::{json_pretty, load_manifest, EXIT_SUCCESS};
use std::path::Path;
use syncship_core::Engine;

pub fn run(engine: &Engine, manifest: &Path, json: bool) -> Result<u8, String> {
    let manifest = load_manifest(engine, manifest)?;
    let lock = engine
        .check_lock(&manifest.package)
        .map_err(|e| e.to_string())?;

    if json {
        let payload = serde_json::json!({
            "package": manifest.package.reference().to_string(),
            "entries": lock.entries().len(),
            "lock_hash": lock.canonical_hash(),
            "status": "verified",
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!(
            "lock verified for {}: {} entries pinned",
            manifest.package.reference(),
            lock.entries().len()
        );
        println!("lock_hash: {}", lock.canonical_hash());
    }
    Ok(EXIT_SUCCESS)
}
