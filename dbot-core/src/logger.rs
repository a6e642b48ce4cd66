//! Tracing initialization: one fmt layer (level, target, spans, all fields) for the console,
//! optionally teed into a log file with the same format.

use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;

use tracing_subscriber::{
    fmt::format::FmtSpan, fmt::writer::MakeWriterExt, layer::SubscriberExt,
    util::SubscriberInitExt, EnvFilter, Registry,
};

/// Installs the global subscriber.
///
/// The level comes from `RUST_LOG` (default `info`), so load `.env` before calling this.
/// With `log_file_path` set, output goes to both stdout and the file.
pub fn init_tracing(log_file_path: Option<&str>) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    let registry = Registry::default().with(env_filter);
    let result = match log_file_path {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let writer = io::stdout.and(Arc::new(file));
            registry.with(fmt_layer.with_writer(writer)).try_init()
        }
        None => registry.with(fmt_layer.with_writer(io::stdout)).try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to set global subscriber: {}", e))?;

    Ok(())
}
