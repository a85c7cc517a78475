use super::{json_pretty, load_manifest, EXIT_SUCCESS};
use std::path::Path;
use syncship_core::Engine;

pub fn run(engine: &Engine, manifest: &Path, out: Option<&Path>, json: bool) -> Result<u8, String> {
    let manifest = load_manifest(engine, manifest)?;
    let Some(unit) = engine
        .generate_unit(&manifest.service)
        .map_err(|e| e.to_string())?
    else {
        if json {
            println!("{}", json_pretty(&serde_json::json!({ "unit": null }))?);
        } else {
            eprintln!("service '{}' is disabled, no unit generated", manifest.service.name);
        }
        return Ok(EXIT_SUCCESS);
    };

    let text = unit.render();
    if let Some(dir) = out {
        std::fs::create_dir_all(dir).map_err(|e| format!("failed to create dir: {e}"))?;
        let path = dir.join(&unit.unit_name);
        std::fs::write(&path, &text)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        if !json {
            println!("wrote {}", path.display());
        }
    }

    if json {
        println!("{}", json_pretty(&unit)?);
    } else if out.is_none() {
        print!("{text}");
    }
    Ok(EXIT_SUCCESS)
}
