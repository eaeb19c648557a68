//! Tracing initialisation for hosts embedding the client.

use anyhow::{Context, Result};
use mcplink_core::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor the configuration sets one
pub const DEFAULT_FILTER: &str = "info,mcplink_core=debug,mcplink_client=debug";

const LOG_PREFIX: &str = "mcplink";

/// Install the global subscriber: compact console output plus, when a
/// directory is configured, a daily rolling file (`mcplink.YYYY-MM-DD.log`).
///
/// The returned guard flushes the file writer on drop and must be kept alive
/// by the host. Fails instead of panicking if a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    dotenvy::dotenv().ok();

    // RUST_LOG takes precedence over the configured filter
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            let directives = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
            EnvFilter::try_new(directives)
                .with_context(|| format!("Invalid log filter '{}'", directives))?
        }
    };

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(LOG_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .context("Failed to create log file appender")?;
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Global tracing subscriber already installed")?;

    Ok(guard)
}
