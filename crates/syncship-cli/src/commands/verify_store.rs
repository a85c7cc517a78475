use super::{colorize_status, json_pretty, EXIT_STORE_ERROR, EXIT_SUCCESS};
use syncship_core::Engine;

pub fn run(engine: &Engine, json: bool) -> Result<u8, String> {
    let report = engine.verify_store().map_err(|e| e.to_string())?;

    if json {
        println!("{}", json_pretty(&report)?);
    } else {
        println!(
            "objects:   {}/{} passed",
            report.objects_passed, report.objects_checked
        );
        println!(
            "artifacts: {}/{} passed",
            report.artifacts_passed, report.artifacts_checked
        );
        println!(
            "installs:  {}/{} passed",
            report.installs_passed, report.installs_checked
        );
        for f in &report.failed {
            println!("  {} {}: {}", colorize_status("fail"), f.subject, f.reason);
        }
    }

    if report.is_clean() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_STORE_ERROR)
    }
}
