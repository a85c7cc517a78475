mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{
    EXIT_BUILD_ERROR, EXIT_FAILURE, EXIT_MANIFEST_ERROR, EXIT_PUBLISH_ERROR, EXIT_STORE_ERROR,
};
use std::path::PathBuf;
use std::process::ExitCode;
use syncship_build::BuildOptions;
use syncship_core::Engine;
use syncship_schema::Architecture;

#[derive(Debug, Parser)]
#[command(
    name = "syncship",
    version,
    about = "Build, harden, package and publish the sync service"
)]
struct Cli {
    /// Path to the syncship store directory.
    #[arg(long, default_value = "~/.local/share/syncship")]
    store: String,

    /// Override the toolchain declared in the manifest ("cargo" or "mock").
    #[arg(long, global = true)]
    toolchain: Option<String>,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build the service executable for one or more architectures.
    Build {
        /// Path to the deployment manifest.
        #[arg(default_value = "syncship.toml")]
        manifest: PathBuf,
        /// Target architecture; repeat for several. Defaults to the image architectures.
        #[arg(long = "arch")]
        architectures: Vec<Architecture>,
    },
    /// Verify the lock file against the source manifest without compiling.
    CheckLock {
        #[arg(default_value = "syncship.toml")]
        manifest: PathBuf,
    },
    /// Generate the systemd unit for the service.
    Unit {
        #[arg(default_value = "syncship.toml")]
        manifest: PathBuf,
        /// Write `<name>.service` into this directory instead of stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show the hardened security profile applied to every unit.
    Profile,
    /// Build and assemble the container images.
    Image {
        #[arg(default_value = "syncship.toml")]
        manifest: PathBuf,
        /// Write the multi-architecture image as an OCI layout directory.
        #[arg(long)]
        oci_dir: Option<PathBuf>,
    },
    /// Build, assemble and publish the images to the configured registry.
    Publish {
        #[arg(default_value = "syncship.toml")]
        manifest: PathBuf,
        /// Publish to an in-memory registry instead of the network.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Run the whole pipeline: build, unit, images, and publish.
    Deploy {
        #[arg(default_value = "syncship.toml")]
        manifest: PathBuf,
        /// Write the unit file and the OCI layout under this directory.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Skip publishing even when the manifest has a [publish] section.
        #[arg(long, default_value_t = false)]
        no_publish: bool,
        /// Publish to an in-memory registry instead of the network.
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// List all built artifacts.
    List,
    /// Inspect artifacts by name@version or id prefix.
    Inspect {
        /// Artifact reference.
        reference: String,
    },
    /// Verify store integrity.
    VerifyStore,
    /// Run diagnostic checks on the build host and store.
    Doctor {
        /// Manifest whose native inputs should also be checked.
        #[arg(long)]
        manifest: Option<PathBuf>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("SYNCSHIP_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let store_path = expand_tilde(&cli.store);
    let mut engine = Engine::new(&store_path).with_build_options(BuildOptions::from_env());
    if let Some(toolchain) = cli.toolchain {
        engine = engine.with_toolchain(toolchain);
    }
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Build {
            manifest,
            architectures,
        } => commands::build::run(&engine, &manifest, &architectures, json_output),
        Commands::CheckLock { manifest } => {
            commands::check_lock::run(&engine, &manifest, json_output)
        }
        Commands::Unit { manifest, out } => {
            commands::unit::run(&engine, &manifest, out.as_deref(), json_output)
        }
        Commands::Profile => commands::profile::run(&engine, json_output),
        Commands::Image { manifest, oci_dir } => {
            commands::image::run(&engine, &manifest, oci_dir.as_deref(), json_output)
        }
        Commands::Publish { manifest, dry_run } => {
            commands::publish::run(&engine, &manifest, dry_run, json_output)
        }
        Commands::Deploy {
            manifest,
            out,
            no_publish,
            dry_run,
        } => commands::deploy::run(
            &engine,
            &manifest,
            commands::deploy::DeployArgs {
                out: out.as_deref(),
                publish: !no_publish,
                dry_run,
            },
            json_output,
        ),
        Commands::List => commands::list::run(&engine, json_output),
        Commands::Inspect { reference } => {
            commands::inspect::run(&engine, &reference, json_output)
        }
        Commands::VerifyStore => commands::verify_store::run(&engine, json_output),
        Commands::Doctor { manifest } => {
            commands::doctor::run(&engine, manifest.as_deref(), json_output)
        }
        Commands::Completions { shell } => commands::generate::completions::<Cli>(shell),
        Commands::ManPages { dir } => commands::generate::man_pages::<Cli>(&dir, json_output),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("error: {msg}");
            ExitCode::from(exit_code_for(&msg))
        }
    }
}

/// Map an error message to the exit code of the pipeline step that failed.
fn exit_code_for(msg: &str) -> u8 {
    if msg.starts_with("manifest error:")
        || msg.starts_with("config error:")
        || msg.starts_with("failed to parse manifest")
        || msg.starts_with("failed to read manifest")
    {
        EXIT_MANIFEST_ERROR
    } else if msg.starts_with("store error:") || msg.starts_with("store lock:") {
        EXIT_STORE_ERROR
    } else if msg.starts_with("build error:") {
        EXIT_BUILD_ERROR
    } else if msg.starts_with("publish error:") {
        EXIT_PUBLISH_ERROR
    } else {
        EXIT_FAILURE
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(stripped);
        }
    }
    PathBuf::from(path)
}
