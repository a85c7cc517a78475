use crate::descriptor::SupervisionDescriptor;
use std::fmt::Write as _;
use std::path::Path;

const HEADER: &str = "# Generated by syncship. Changes will be overwritten.";

/// Quote a value for an `ExecStart=` or `Environment=` line.
///
/// `%` is doubled so systemd does not treat it as a specifier.
fn quote(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('%', "%%");
    if escaped.chars().any(char::is_whitespace) || escaped != value {
        format!("\"{escaped}\"")
    } else {
        escaped
    }
}

fn exec_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

impl SupervisionDescriptor {
    /// Render as systemd unit text. Output depends only on the descriptor.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{HEADER}");
        let _ = writeln!(out, "[Unit]");
        let _ = writeln!(out, "Description={}", self.description.replace('%', "%%"));
        let _ = writeln!(out);

        let _ = writeln!(out, "[Service]");
        let _ = writeln!(out, "Type=simple");
        let _ = writeln!(out, "ExecStart={}", exec_path(&self.exec_start));
        for (key, value) in &self.environment {
            let _ = writeln!(out, "Environment={}", quote(&format!("{key}={value}")));
        }
        let _ = writeln!(out, "Restart={}", self.restart.as_systemd());
        let _ = writeln!(out, "RuntimeDirectory={}", self.runtime_directory);
        let _ = writeln!(
            out,
            "RuntimeDirectoryMode={:04o}",
            self.runtime_directory_mode
        );
        for (key, value) in self.security.directives() {
            let _ = writeln!(out, "{key}={value}");
        }
        let _ = writeln!(out);

        let _ = writeln!(out, "[Install]");
        let _ = writeln!(out, "WantedBy=multi-user.target");
        out
    }
}
