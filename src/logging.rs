//! Logging configuration and initialization for ccengine.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::{Level, Span};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::command::TriggerType;
use crate::config::LoggingConfig;
use crate::Result;

/// Parse log level string to tracing Level.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::from_default_env().add_directive(parse_level(level).into())
}

/// Initialize the logging system with the given configuration.
///
/// Log lines go to stderr and are appended to the configured file, so
/// restarts keep the history of failed membership-trigger scripts.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if let Some(parent) = Path::new(&config.file).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.file)?;
    let writer = std::io::stderr.and(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false),
        )
        .with(build_filter(&config.level))
        .init();

    Ok(())
}

/// Initialize console-only logging (for the CLI and development).
pub fn init_console_only(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(true),
        )
        .with(build_filter(level))
        .init();
}

/// Span wrapping a single script invocation.
///
/// Every log line emitted by the engine and the capability surface while
/// the script runs carries these fields.
pub fn invocation_span(command: &str, trigger: TriggerType, guild_id: u64) -> Span {
    let invocation = uuid::Uuid::new_v4();
    tracing::info_span!(
        "cc",
        command = %command,
        trigger = %trigger,
        guild = guild_id,
        invocation = %invocation
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level_trace() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("TRACE"), Level::TRACE);
    }

    #[test]
    fn test_parse_level_warn_aliases() {
        assert_eq!(parse_level("warn"), Level::WARN);
        assert_eq!(parse_level("Warning"), Level::WARN);
    }

    #[test]
    fn test_parse_level_error() {
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_default() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_invocation_span_without_subscriber() {
        // No subscriber installed: the span is disabled but still usable.
        let span = invocation_span("greet", TriggerType::OnMessage, 1);
        let _guard = span.enter();
    }
}
