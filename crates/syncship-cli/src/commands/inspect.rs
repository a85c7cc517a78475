use super::{json_pretty, EXIT_SUCCESS};
use syncship_core::Engine;
use syncship_schema::ArtifactRef;

pub fn run(engine: &Engine, reference: &str, json: bool) -> Result<u8, String> {
    let found = engine
        .inspect(&ArtifactRef::from(reference))
        .map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&found)?);
    } else {
        for (i, a) in found.iter().enumerate() {
            if i > 0 {
                println!();
            }
            println!("artifact_id:  {}", a.id);
            println!("name:         {}@{}", a.name, a.version);
            println!("target:       {} ({})", a.target, a.target.rust_triple());
            println!("executable:   {}", a.executable);
            println!("install_path: {}", a.install_path.display());
            println!("content_hash: {}", a.content_hash);
            println!("size:         {}", a.size);
            println!("source_hash:  {}", a.source_hash);
            println!("lock_hash:    {}", a.lock_hash);
            println!("toolchain:    {}", a.toolchain);
        }
    }
    Ok(EXIT_SUCCESS)
}
