//! Subscriber setup for the binary

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

const DEFAULT_DIRECTIVES: &str = "strategy_runner=debug,sqlx=warn";
const LOG_FILE_NAME: &str = "strategy-runner.log";

/// Filter from `RUST_LOG`, else `<level>,strategy_runner=debug,sqlx=warn`
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},{}", config.level, DEFAULT_DIRECTIVES)))
}

/// Install the global subscriber: console output plus, when `dir` is set and
/// writable, a daily rotated file.
///
/// The returned guard flushes the file writer on drop; keep it alive for the
/// life of the process.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };
    layers.push(console_layer);

    let guard = match config.dir.as_deref().and_then(file_layer) {
        Some((layer, guard)) => {
            layers.push(layer);
            Some(guard)
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layers)
        .with(env_filter(config))
        .init();

    if let Some(dir) = config.dir.as_deref().filter(|_| guard.is_some()) {
        eprintln!("Logging to: {}/{}", dir, LOG_FILE_NAME);
    }

    guard
}

/// Minimal warn-level output for one-shot commands
pub fn init_logging_simple() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn file_layer(dir: &str) -> Option<(BoxedLayer, WorkerGuard)> {
    // rolling::daily panics when it cannot create the file, so probe first
    if let Err(e) = ensure_writable(Path::new(dir)) {
        eprintln!(
            "Warning: Could not write to log directory {} ({}), file logging disabled",
            dir, e
        );
        return None;
    }

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .boxed();

    Some((layer, guard))
}

fn ensure_writable(dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let probe = dir.join(".strategy_runner_write_test");
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&probe)?;
    let _ = std::fs::remove_file(&probe);
    Ok(())
}
