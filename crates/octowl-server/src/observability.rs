// Tracing initialization with a reloadable level for the octowl crates.
use std::sync::OnceLock;
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

/// Targets whose verbosity follows the configured level. Everything else
/// (dependencies, the runtime) stays at `warn`.
const OCTOWL_TARGETS: [&str; 4] = ["octowl_core", "octowl_storage", "octowl_server", "octowl_ffi"];

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, tracing_subscriber::Registry>> =
    OnceLock::new();

/// Filter directives for `level`, e.g. `warn,octowl_core=debug,...`.
/// A `level` that already holds directives (contains `=` or `,`) is used as is.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        return level.to_string();
    }
    let level = if level.is_empty() { "info" } else { level };
    let mut directives = String::from("warn");
    for target in OCTOWL_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

fn octowl_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(filter_directives(level)).unwrap_or_else(|e| {
        eprintln!("octowl: invalid log level {level:?} ({e}), using info");
        EnvFilter::new(filter_directives("info"))
    })
}

pub fn init_tracing() {
    init_tracing_with_level("info");
}

pub fn init_tracing_with_level(level: &str) {
    // RUST_LOG wins over the configured level.
    let base_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|_| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| octowl_filter(level));

    let (reload_layer, handle) = reload::Layer::new(base_filter);
    let _ = LOG_RELOAD_HANDLE.set(handle);

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer().with_thread_names(true))
        .try_init();
}

/// Switch the octowl targets to `level` once tracing is initialized.
pub fn apply_logging_level(level: &str) {
    if let Some(handle) = LOG_RELOAD_HANDLE.get() {
        let filter = octowl_filter(level);
        let _ = handle.modify(|f| *f = filter);
    }
}
