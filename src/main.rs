use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gitpack::{container, ErrorKind, GitpackConfig, ObjectFormat, Packer, Unpacker};

/// Pack a directory into a single git pack container, and back
#[derive(Parser)]
#[command(name = "gitpack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/gitpack/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Object format of snapshots: sha1 or sha256
    #[arg(long, global = true)]
    object_format: Option<ObjectFormat>,

    /// Log more (-v for stages, -vv for every git invocation)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Snapshot a directory into a container file
    Pack {
        /// Directory to snapshot
        source: PathBuf,
        /// Container to write (default: build/output/packed.gpk)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract a container file into a directory
    Unpack {
        /// Container to read
        container: PathBuf,
        /// Directory to populate (default: build/output/unpacked)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show the commit a container is anchored to
    Inspect {
        /// Container to read
        container: PathBuf,
    },
    /// Write the effective configuration to the config file
    InitConfig {
        /// Replace an existing config file
        #[arg(long)]
        force: bool,
    },
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,gitpack={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Load the config file and apply `--object-format`; invalid configuration exits with 2
fn load_config(path: Option<&Path>, format: Option<ObjectFormat>) -> Result<GitpackConfig, ExitCode> {
    let mut config = GitpackConfig::load(path).map_err(|e| {
        eprintln!("gitpack: invalid configuration: {:#}", e);
        ExitCode::from(2)
    })?;
    if let Some(format) = format {
        config.object_format = format;
    }
    Ok(config)
}

/// Save defaults, environment overrides and `--object-format` as a config file
fn init_config(path: Option<&Path>, format: Option<ObjectFormat>, force: bool) -> Result<PathBuf> {
    let path = GitpackConfig::resolve_path(path, env::var_os("GITPACK_CONFIG"))
        .context("No home directory; pass --config")?;
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to replace it)", path.display());
    }

    let mut config = GitpackConfig::default();
    config.apply_overrides(|key| env::var(key).ok())?;
    if let Some(format) = format {
        config.object_format = format;
    }
    config.save(&path)?;
    Ok(path)
}

fn failure(kind: ErrorKind, err: &dyn std::error::Error) -> ExitCode {
    eprintln!("gitpack: {} failed: {}", kind.stage(), err);
    ExitCode::from(kind.exit_code())
}

fn main() -> ExitCode {
    let Cli {
        command,
        config: config_path,
        object_format,
        verbose,
    } = Cli::parse();
    init_tracing(verbose);
    let load = || load_config(config_path.as_deref(), object_format);

    match command {
        Commands::Pack { source, output } => {
            let config = match load() {
                Ok(config) => config,
                Err(code) => return code,
            };
            let output = output.unwrap_or_else(|| config.pack_output.clone());
            match Packer::new(config).pack(&source, &output) {
                Ok(commit) => {
                    println!(
                        "Successfully packed {} into {} (commit {})",
                        source.display(),
                        output.display(),
                        commit
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => failure(e.kind(), &e),
            }
        }
        Commands::Unpack { container, output } => {
            let config = match load() {
                Ok(config) => config,
                Err(code) => return code,
            };
            let output = output.unwrap_or_else(|| config.unpack_output.clone());
            match Unpacker::new(config).with_progress(true).unpack(&container, &output) {
                Ok(commit) => {
                    println!(
                        "Successfully extracted {} to {} (commit {})",
                        container.display(),
                        output.display(),
                        commit
                    );
                    ExitCode::SUCCESS
                }
                Err(e) => failure(e.kind(), &e),
            }
        }
        Commands::Inspect { container } => {
            let config = match load() {
                Ok(config) => config,
                Err(code) => return code,
            };
            match container::inspect(&container, config.object_format) {
                Ok(layout) => {
                    println!("commit:    {}", layout.commit);
                    println!("format:    {}", layout.format());
                    println!("pack body: {} bytes", layout.body_len);
                    println!("total:     {} bytes", layout.total_len);
                    ExitCode::SUCCESS
                }
                Err(e) => failure(e.kind(), &e),
            }
        }
        Commands::InitConfig { force } => {
            match init_config(config_path.as_deref(), object_format, force) {
                Ok(path) => {
                    println!("Wrote configuration to {}", path.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("gitpack: init-config failed: {:#}", e);
                    ExitCode::from(2)
                }
            }
        }
    }
}
