use crate::config::LoggingConfig;
use std::fs;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes console logging plus a daily rolling file under `config.dir`.
///
/// The returned guard flushes the file writer when dropped, keep it alive for
/// the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    let _ = fs::create_dir_all(&config.dir);

    let file_appender = tracing_appender::rolling::daily(&config.dir, &config.file_name);
    let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (json_layer, text_layer) = if config.json_file {
        (
            Some(fmt::layer().json().with_writer(non_blocking_writer)),
            None,
        )
    } else {
        (
            None,
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(non_blocking_writer),
            ),
        )
    };

    let console_layer = fmt::layer().with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .with(console_layer)
        .init();

    guard
}
