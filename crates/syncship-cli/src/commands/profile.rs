use super::{json_pretty, EXIT_SUCCESS};
use syncship_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let profile = engine.profile();
    if json {
        println!("{}", json_pretty(profile)?);
    } else {
        for (key, value) in profile.directives() {
            println!("{key}={value}");
        }
    }
    Ok(EXIT_SUCCESS)
}
