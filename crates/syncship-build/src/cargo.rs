use crate::toolchain::{CompileRequest, Toolchain};
use crate::BuildError;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use syncship_schema::NativeInput;
use tracing::{debug, info};

/// Number of stderr lines kept in a `Compilation` error.
const STDERR_TAIL_LINES: usize = 40;

/// Compiles with `cargo build --release --locked` for a musl target triple.
pub struct CargoToolchain {
    program: PathBuf,
}

impl Default for CargoToolchain {
    fn default() -> Self {
        Self {
            program: PathBuf::from("cargo"),
        }
    }
}

impl CargoToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn command(&self, request: &CompileRequest<'_>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&request.package.source)
            .args(build_args(request))
            .env("SOURCE_DATE_EPOCH", "0")
            .env("CARGO_INCREMENTAL", "0")
            .env(
                "RUSTFLAGS",
                remap_flags(request, cargo_home(env::var_os("CARGO_HOME"), env::var_os("HOME"))),
            );
        cmd
    }
}

pub(crate) fn build_args(request: &CompileRequest<'_>) -> Vec<OsString> {
    let mut args: Vec<OsString> = [
        "build",
        "--release",
        "--locked",
        "--bin",
        request.package.executable.as_str(),
        "--target",
        request.target.rust_triple(),
        "--target-dir",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    args.push(request.staging_dir.as_os_str().to_owned());
    args
}

/// `$CARGO_HOME`, else `$HOME/.cargo`, as cargo itself resolves it.
fn cargo_home(cargo_home: Option<OsString>, home: Option<OsString>) -> Option<PathBuf> {
    cargo_home
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| home.filter(|v| !v.is_empty()).map(|h| PathBuf::from(h).join(".cargo")))
}

/// Strip local checkout, staging, and dependency source paths from the
/// binary. Registry and git checkouts live under the cargo home, which
/// differs per build user.
fn remap_flags(request: &CompileRequest<'_>, cargo_home: Option<PathBuf>) -> String {
    let mut flags = format!(
        "--remap-path-prefix={}=/build/src --remap-path-prefix={}=/build/target",
        request.package.source.display(),
        request.staging_dir.display()
    );
    if let Some(home) = cargo_home {
        flags.push_str(&format!(" --remap-path-prefix={}=/cargo", home.display()));
    }
    flags
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

impl Toolchain for CargoToolchain {
    fn name(&self) -> &'static str {
        "cargo"
    }

    fn required_tools(&self) -> Vec<NativeInput> {
        vec![
            NativeInput::Tool("cargo".to_owned()),
            NativeInput::Tool("rustc".to_owned()),
        ]
    }

    fn compile(&self, request: &CompileRequest<'_>) -> Result<Vec<u8>, BuildError> {
        info!(
            "compiling {} for {}",
            request.package.reference(),
            request.target.rust_triple()
        );
        let mut cmd = self.command(request);
        debug!("running {cmd:?}");

        let output = cmd.output().map_err(|e| {
            BuildError::BuildEnvironment(format!(
                "failed to run '{}': {e}",
                self.program.display()
            ))
        })?;

        if !output.status.success() {
            return Err(BuildError::Compilation {
                package: request.package.reference(),
                target: request.target,
                stderr: stderr_tail(&output.stderr),
            });
        }

        let binary = request
            .staging_dir
            .join(request.target.rust_triple())
            .join("release")
            .join(&request.package.executable);
        if !binary.is_file() {
            return Err(BuildError::Compilation {
                package: request.package.reference(),
                target: request.target,
                stderr: format!("cargo succeeded but {} was not produced", binary.display()),
            });
        }
        Ok(fs::read(binary)?)
    }
}
