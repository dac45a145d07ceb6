//! Structured logging setup.
//!
//! One entry point, [`init`], selects the sinks by [`LogMode`]: a one-shot
//! CLI command logs human-readable output to stderr only, while the
//! long-running agent additionally writes JSON lines to a daily-rotated
//! file derived from the agent configuration (`<logs_dir>/<name>.log`).
//! Both honour `RUST_LOG` (default `info`).

use std::io;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::AgentConfig;

/// Which sinks to install.
pub enum LogMode<'a> {
    /// Long-running agent: rotated JSON file plus stderr. The file lives in
    /// the configured logs directory and is named after the agent.
    Agent(&'a AgentConfig),
    /// One-shot subcommand: stderr only, no file.
    Cli,
}

/// Keeps the background file writer alive until the process exits.
///
/// Dropping the guard flushes pending entries; in [`LogMode::Cli`] there is
/// no writer and the guard is empty.
#[derive(Default)]
pub struct LoggingGuard {
    _file_writer: Option<WorkerGuard>,
}

/// Install the global subscriber for the given mode.
///
/// # Errors
///
/// Returns an error in [`LogMode::Agent`] when the logs directory cannot be
/// created. [`LogMode::Cli`] does not fail.
pub fn init(mode: LogMode<'_>) -> anyhow::Result<LoggingGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    let registry = tracing_subscriber::registry().with(filter).with(stderr_layer);

    let LogMode::Agent(agent) = mode else {
        registry.init();
        return Ok(LoggingGuard::default());
    };

    std::fs::create_dir_all(&agent.logs_dir).with_context(|| {
        format!(
            "failed to create logs directory {}",
            agent.logs_dir.display()
        )
    })?;

    let file_prefix = format!("{}.log", agent.name.to_lowercase());
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&agent.logs_dir, file_prefix));

    registry
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .init();

    Ok(LoggingGuard {
        _file_writer: Some(guard),
    })
}
