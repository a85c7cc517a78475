use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::process::Command;
use syncship_schema::NativeInput;

/// A native build input the host does not provide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingInput {
    pub input: NativeInput,
    pub install_hint: String,
}

impl fmt::Display for MissingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.input {
            NativeInput::Tool(_) => "tool on PATH",
            NativeInput::Library(_) => "library via pkg-config",
        };
        write!(
            f,
            "  - {}: {what} (install: {})",
            self.input.name(),
            self.install_hint
        )
    }
}

/// Answers whether the build host provides a tool or library.
pub trait EnvironmentProbe: Send + Sync {
    fn has_tool(&self, name: &str) -> bool;
    fn has_library(&self, name: &str) -> bool;
}

/// Probes the real host with `which` and `pkg-config --exists`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostProbe;

impl EnvironmentProbe for HostProbe {
    fn has_tool(&self, name: &str) -> bool {
        Command::new("which")
            .arg(name)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn has_library(&self, name: &str) -> bool {
        Command::new("pkg-config")
            .args(["--exists", name])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Fixed answers, for tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct StaticProbe {
    tools: BTreeSet<String>,
    libraries: BTreeSet<String>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_tool(mut self, name: &str) -> Self {
        self.tools.insert(name.to_owned());
        self
    }

    #[must_use]
    pub fn with_library(mut self, name: &str) -> Self {
        self.libraries.insert(name.to_owned());
        self
    }
}

impl EnvironmentProbe for StaticProbe {
    fn has_tool(&self, name: &str) -> bool {
        self.tools.contains(name)
    }

    fn has_library(&self, name: &str) -> bool {
        self.libraries.contains(name)
    }
}

fn install_hint(input: &NativeInput) -> String {
    let known = match input {
        NativeInput::Tool(name) => match name.as_str() {
            "cargo" | "rustc" => Some("https://rustup.rs, then: rustup target add <triple>"),
            "pkg-config" => Some(
                "zypper install pkg-config | apt install pkg-config | dnf install pkgconf-pkg-config | pacman -S pkgconf",
            ),
            _ => None,
        },
        NativeInput::Library(name) => match name.as_str() {
            "openssl" => Some(
                "zypper install libopenssl-devel | apt install libssl-dev | dnf install openssl-devel | pacman -S openssl",
            ),
            "zlib" => Some(
                "zypper install zlib-devel | apt install zlib1g-dev | dnf install zlib-devel | pacman -S zlib",
            ),
            _ => None,
        },
    };
    match (known, input) {
        (Some(hint), _) => hint.to_owned(),
        (None, NativeInput::Tool(name)) => format!("install '{name}' with the system package manager"),
        (None, NativeInput::Library(name)) => {
            format!("install the development package providing '{name}.pc'")
        }
    }
}

/// Every input in `inputs` the probe reports as absent, in input order.
/// A library check also requires `pkg-config` itself.
pub fn check_native_inputs(probe: &dyn EnvironmentProbe, inputs: &[NativeInput]) -> Vec<MissingInput> {
    let mut missing: Vec<MissingInput> = Vec::new();
    let needs_pkg_config = inputs.iter().any(|i| matches!(i, NativeInput::Library(_)));
    let pkg_config = NativeInput::Tool("pkg-config".to_owned());

    let mut all: Vec<&NativeInput> = inputs.iter().collect();
    if needs_pkg_config && !inputs.contains(&pkg_config) {
        all.push(&pkg_config);
    }

    for input in all {
        let present = match input {
            NativeInput::Tool(name) => probe.has_tool(name),
            NativeInput::Library(name) => probe.has_library(name),
        };
        if !present && !missing.iter().any(|m| &m.input == input) {
            missing.push(MissingInput {
                input: input.clone(),
                install_hint: install_hint(input),
            });
        }
    }
    missing
}

pub fn format_missing(missing: &[MissingInput]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing native build inputs:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nInstall them, or set SYNCSHIP_SKIP_PREREQS=1 to bypass this check.");
    msg
}
