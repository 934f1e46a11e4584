//! Logging initialization.
//!
//! Logs always go to stderr: stdout carries the hook protocol when running
//! `ctxguard serve`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over everything; otherwise `verbose` selects `debug` and
/// the configured level applies. The returned guard flushes the file writer
/// on drop and must be held for the life of the process.
pub fn init_logging(
    config: &LoggingConfig,
    verbose: bool,
    json: bool,
) -> Result<Option<WorkerGuard>> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directive(config, verbose))
            .with_context(|| format!("Invalid log level '{}'", config.level))?,
    };

    let console_layer = if json || config.json {
        fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer).boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(level = %config.level, verbose, "logging initialized");
    Ok(guard)
}

fn default_directive(config: &LoggingConfig, verbose: bool) -> String {
    if verbose {
        "debug".to_string()
    } else {
        config.level.clone()
    }
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let name = path
        .file_name()
        .with_context(|| format!("Log file path has no file name: {}", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_directive() {
        let config = LoggingConfig {
            level: "warn".to_string(),
            ..Default::default()
        };
        assert_eq!(default_directive(&config, false), "warn");
        assert_eq!(default_directive(&config, true), "debug");
    }

    #[test]
    fn test_configured_levels_parse() {
        for level in ["trace", "debug", "info", "warn", "error", "ctxguard=debug,reqwest=warn"] {
            assert!(EnvFilter::try_new(level).is_ok(), "{} should parse", level);
        }
    }

    #[test]
    fn test_split_log_path() {
        let path = PathBuf::from("/var/log/ctxguard/ctxguard.log");
        let (dir, name) = split_log_path(&path).unwrap();
        assert_eq!(dir, Path::new("/var/log/ctxguard"));
        assert_eq!(name, "ctxguard.log");

        let path = PathBuf::from("ctxguard.log");
        let (dir, _) = split_log_path(&path).unwrap();
        assert_eq!(dir, Path::new("."));

        assert!(split_log_path(Path::new("/")).is_err());
    }
}
