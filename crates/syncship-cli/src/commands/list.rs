use super::{json_pretty, EXIT_SUCCESS};
use syncship_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let artifacts = engine.list().map_err(|e| e.to_string())?;
    if json {
        println!("{}", json_pretty(&artifacts)?);
    } else if artifacts.is_empty() {
        println!("no artifacts found");
    } else {
        println!(
            "{:<14} {:<20} {:<10} {:<6} {:<10} SIZE",
            "SHORT_ID", "NAME", "VERSION", "ARCH", "TOOLCHAIN"
        );
        for a in &artifacts {
            println!(
                "{:<14} {:<20} {:<10} {:<6} {:<10} {}",
                a.id.short(),
                a.name,
                a.version,
                a.target,
                a.toolchain,
                a.size
            );
        }
    }
    Ok(EXIT_SUCCESS)
}
