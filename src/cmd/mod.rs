//! CLI command implementations.
//!
//! | Module     | Commands handled |
//! |------------|------------------|
//! | `serve`    | `Serve`          |
//! | `estimate` | `Estimate`       |
//! | `compact`  | `Compact`        |
//! | `config`   | `Config`         |

pub mod compact;
pub mod config;
pub mod estimate;
pub mod serve;

pub use compact::cmd_compact;
pub use config::cmd_config;
pub use estimate::cmd_estimate;
pub use serve::cmd_serve;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ctxguard::backend::OpenAiCompatibleBackend;
use ctxguard::compaction::{CompactionEngine, Summarizer};
use ctxguard::config::CtxguardToml;
use ctxguard::{ConfigurationError, Message};

/// A transcript file: either a bare message array or `{"context": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Messages(Vec<Message>),
    Wrapped { context: Vec<Message> },
}

pub(crate) fn read_transcript(path: &Path) -> Result<Vec<Message>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read transcript: {}", path.display()))?;
    let file: TranscriptFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse transcript: {}", path.display()))?;
    Ok(match file {
        TranscriptFile::Messages(messages) => messages,
        TranscriptFile::Wrapped { context } => context,
    })
}

/// Build the engine and its HTTP-backed summarizer from a loaded config.
pub(crate) fn build_engine(toml: &CtxguardToml) -> Result<CompactionEngine, ConfigurationError> {
    let backend = OpenAiCompatibleBackend::from_config(&toml.model);
    let summarizer = Summarizer::new(
        Arc::new(backend),
        Duration::from_secs(toml.model.timeout_secs),
    );
    CompactionEngine::new(toml.compaction.clone(), summarizer)
}
