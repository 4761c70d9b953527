// Main entrypoint for the portvisor daemon.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;

use portvisor::{
    Loader, LogWriter, ServiceDescriptor, Subscribe, SupervisorBuilder, SupervisorConfig,
};

const CONFIG_PATH: &str = "config.json";

/// Portvisor - socket-activated process supervisor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file or directory (repeatable; defaults to ./config.json)
    #[arg(short, long = "config", value_name = "PATH")]
    config: Vec<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, action = ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,
}

/// Configures structured logging.
fn configure_logger(args: &Args) {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if args.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

/// Loads descriptors from every `-c` path, or from `config.json`.
fn load_descriptors(paths: &[PathBuf]) -> Result<Vec<ServiceDescriptor>> {
    let mut loader = Loader::new();
    if paths.is_empty() {
        loader
            .load_file(CONFIG_PATH)
            .with_context(|| format!("failed to load config from {CONFIG_PATH}"))?;
    } else {
        for path in paths {
            loader
                .load(path)
                .with_context(|| format!("failed to load config from {path:?}"))?;
        }
    }

    let descriptors = loader.into_descriptors();
    info!(
        component = "config",
        event = "load_success",
        services = descriptors.len(),
        "config loaded"
    );
    Ok(descriptors)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    configure_logger(&args);
    info!(component = "main", event = "starting", "starting");

    let descriptors = load_descriptors(&args.config)?;

    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    let sup = SupervisorBuilder::new(SupervisorConfig::default())
        .with_subscribers(subs)
        .build();

    // Bind failures were already logged as they happened.
    let report = sup.run(descriptors).await.context("supervisor failed")?;

    info!(
        component = "main",
        event = "stopped",
        started = report.started.len(),
        failed = report.failed.len(),
        "all services shut down"
    );
    Ok(())
}
