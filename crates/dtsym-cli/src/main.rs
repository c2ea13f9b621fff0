//! dtsym - Main entry point
//!
//! Reads a resolved devicetree model and writes the C header and conf file
//! derived from it.

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use dtsym_core::{generate, GenOptions, Tree};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "dtsym")]
#[command(about = "Generate devicetree symbol definitions from a resolved devicetree model")]
#[command(version)]
struct Args {
    /// Resolved devicetree model (JSON)
    #[arg(short, long)]
    model: PathBuf,

    /// Path to write the C header to
    #[arg(long)]
    header_out: Option<PathBuf>,

    /// Path to write the conf file to
    #[arg(long)]
    conf_out: Option<PathBuf>,

    /// Path to configuration file
    #[arg(short, long, default_value = "dtsym.toml")]
    config: PathBuf,

    /// Paths below this directory are shown relative to it in comments
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("dtsym v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = config::load_config(&args.config)?;

    // Command line overrides
    if let Some(base_dir) = args.base_dir {
        config.generator.base_dir = Some(base_dir);
    }
    let header_out = args
        .header_out
        .or(config.output.header)
        .context("no header output path (use --header-out or [output] header)")?;
    let conf_out = args
        .conf_out
        .or(config.output.conf)
        .context("no conf output path (use --conf-out or [output] conf)")?;

    let tree = Tree::from_file(&args.model)
        .with_context(|| format!("failed to load model {}", args.model.display()))?;
    info!(
        path = %args.model.display(),
        nodes = tree.nodes().count(),
        "Model loaded"
    );

    write_outputs(&tree, &config.generator, &header_out, &conf_out)?;

    println!("Devicetree header saved to '{}'", header_out.display());
    Ok(())
}

/// Generate both files. Neither is left behind if generation fails.
fn write_outputs(
    tree: &Tree,
    options: &GenOptions,
    header_out: &Path,
    conf_out: &Path,
) -> Result<()> {
    let result = create_and_generate(tree, options, header_out, conf_out);
    if result.is_err() {
        for path in [header_out, conf_out] {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove output"),
            }
        }
    }
    result
}

fn create_and_generate(
    tree: &Tree,
    options: &GenOptions,
    header_out: &Path,
    conf_out: &Path,
) -> Result<()> {
    let header = File::create(header_out)
        .with_context(|| format!("failed to create {}", header_out.display()))?;
    let conf = File::create(conf_out)
        .with_context(|| format!("failed to create {}", conf_out.display()))?;

    generate(tree, options, BufWriter::new(header), BufWriter::new(conf))
        .context("devicetree error")?;
    Ok(())
}
