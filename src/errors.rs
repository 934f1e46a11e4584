//! Typed error hierarchy for ctxguard.
//!
//! Three enums cover the three failure domains:
//! - `EstimationInputError`: content that cannot be measured as text
//! - `SummarizationError`: the model round-trip behind a compaction
//! - `ConfigurationError`: loading and validating `ctxguard.toml`

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use ctxguard_common::Role;

/// Content that the estimator cannot measure.
///
/// Always recovered locally by counting the message content as zero tokens.
#[derive(Debug, Error)]
pub enum EstimationInputError {
    #[error("Non-text content in {role} message")]
    NonTextContent { role: Role },
}

/// Failures of the summary generation call.
///
/// The engine recovers from all of these by passing the original context
/// through unchanged for the current turn.
#[derive(Debug, Error)]
pub enum SummarizationError {
    #[error("Model backend failed: {0}")]
    Backend(#[source] anyhow::Error),

    #[error("Summarization timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Model returned an empty summary")]
    EmptyOutput,
}

/// Invalid or missing configuration. Fatal to engine construction.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("No configuration file found (searched: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },

    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl ConfigurationError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigurationError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimation_error_names_role() {
        let err = EstimationInputError::NonTextContent {
            role: Role::ToolResult,
        };
        assert!(err.to_string().contains("tool_result"));
    }

    #[test]
    fn summarization_timeout_carries_duration() {
        let err = SummarizationError::Timeout {
            after: Duration::from_secs(45),
        };
        match &err {
            SummarizationError::Timeout { after } => assert_eq!(after.as_secs(), 45),
            _ => panic!("Expected Timeout"),
        }
        assert!(err.to_string().contains("45s"));
    }

    #[test]
    fn summarization_timeout_keeps_sub_second_precision() {
        let err = SummarizationError::Timeout {
            after: Duration::from_millis(250),
        };
        assert!(err.to_string().contains("250ms"), "{}", err);
    }

    #[test]
    fn summarization_backend_keeps_source() {
        let err = SummarizationError::Backend(anyhow::anyhow!("connection refused"));
        let source = std::error::Error::source(&err).expect("source");
        assert!(source.to_string().contains("connection refused"));
    }

    #[test]
    fn configuration_not_found_lists_paths() {
        let err = ConfigurationError::NotFound {
            searched: vec![PathBuf::from("/a/ctxguard.toml"), PathBuf::from("/b/ctxguard.toml")],
        };
        let text = err.to_string();
        assert!(text.contains("/a/ctxguard.toml"));
        assert!(text.contains("/b/ctxguard.toml"));
    }

    #[test]
    fn configuration_invalid_names_field() {
        let err = ConfigurationError::invalid("maxTokens", "must be greater than zero");
        match &err {
            ConfigurationError::Invalid { field, .. } => assert_eq!(*field, "maxTokens"),
            _ => panic!("Expected Invalid"),
        }
        assert!(err.to_string().contains("maxTokens"));
    }

    #[test]
    fn configuration_parse_converts_from_toml_error() {
        let toml_err = toml::from_str::<toml::Table>("not = [valid").unwrap_err();
        let err: ConfigurationError = toml_err.into();
        assert!(matches!(err, ConfigurationError::Parse(_)));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&EstimationInputError::NonTextContent { role: Role::User });
        assert_std_error(&SummarizationError::EmptyOutput);
        assert_std_error(&ConfigurationError::invalid("charsPerToken", "x"));
    }
}
