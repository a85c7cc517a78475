//! Shell completions and man pages derived from the clap definition.

use super::{json_pretty, EXIT_SUCCESS};
use clap::{Command, CommandFactory};
use clap_complete::Shell;
use std::path::{Path, PathBuf};

const BIN_NAME: &str = "syncship";

#[allow(clippy::unnecessary_wraps)]
pub fn completions<C: CommandFactory>(shell: Shell) -> Result<u8, String> {
    clap_complete::generate(shell, &mut C::command(), BIN_NAME, &mut std::io::stdout());
    Ok(EXIT_SUCCESS)
}

pub fn man_pages<C: CommandFactory>(dir: &Path, json: bool) -> Result<u8, String> {
    let written = write_man_pages(&C::command(), dir)?;
    if json {
        let paths: Vec<String> = written.iter().map(|p| p.display().to_string()).collect();
        println!("{}", json_pretty(&paths)?);
    } else {
        println!("{} man pages written to {}", written.len(), dir.display());
    }
    Ok(EXIT_SUCCESS)
}

/// One page for the root command and one `syncship-<sub>.1` per subcommand.
fn write_man_pages(cmd: &Command, dir: &Path) -> Result<Vec<PathBuf>, String> {
    std::fs::create_dir_all(dir).map_err(|e| format!("failed to create dir: {e}"))?;
    let pages = std::iter::once((BIN_NAME.to_owned(), cmd.clone())).chain(
        cmd.get_subcommands()
            .map(|sub| (format!("{BIN_NAME}-{}", sub.get_name()), sub.clone())),
    );

    let mut written = Vec::new();
    for (name, page) in pages {
        let mut buf = Vec::new();
        clap_mangen::Man::new(page)
            .render(&mut buf)
            .map_err(|e| format!("man page render failed: {e}"))?;
        let path = dir.join(format!("{name}.1"));
        std::fs::write(&path, &buf)
            .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
