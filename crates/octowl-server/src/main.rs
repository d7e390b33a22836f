use std::env;
use std::sync::Arc;

use octowl_server::config::loader::load_config;
use octowl_server::{ChannelTransport, WorklistServer, observability};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From OCTOWL_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (octowl.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (OCTOWL_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

fn main() {
    // Must run while the process is still single-threaded.
    octowl_core::init_local_offset();

    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };
    tracing::info!(path = %config_path, source = %source, "Configuration loaded");
    observability::apply_logging_level(&cfg.logging.level);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("octowl-runtime")
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to start runtime: {e}");
            std::process::exit(2);
        }
    };

    if let Err(err) = runtime.block_on(run(cfg)) {
        eprintln!("Server error: {err:#}");
        std::process::exit(1);
    }
}

async fn run(cfg: octowl_server::AppConfig) -> anyhow::Result<()> {
    // Commands reach the server through the in-process transport; a DICOM
    // network stack plugs in through the same trait.
    let transport = Arc::new(ChannelTransport::new());
    let server = WorklistServer::from_config(&cfg, transport)?;

    if let Some(template) = &cfg.worklist.template_file {
        if !server.set_template_file(template) {
            tracing::warn!(template = %template.display(), "Template file does not exist yet");
        }
    }
    if !server.start() {
        anyhow::bail!("failed to start worklist server:\n{}", server.status());
    }

    let mut ticker = tokio::time::interval(cfg.report_interval());
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = server.status_snapshot();
                tracing::info!(
                    running = snapshot.running,
                    requests = snapshot.request_count,
                    state = %snapshot.status_text,
                    datasets = server.dataset_count(),
                    "Status"
                );
                for line in &snapshot.last_errors {
                    tracing::warn!("{line}");
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    tracing::error!(error = %e, "Failed to listen for shutdown signal");
                }
                break;
            }
        }
    }

    tracing::info!("Shutting down");
    if !server.save_dirty() {
        tracing::warn!("Some datasets could not be saved");
    }
    server.stop();
    Ok(())
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: OCTOWL_CONFIG
/// 3. Default: octowl.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("OCTOWL_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    ("octowl.toml".to_string(), ConfigSource::Default)
}
