//! Compaction budget configuration.

use serde::{Deserialize, Serialize};

use crate::errors::ConfigurationError;

/// Budgets that drive the compaction decision.
///
/// Keys use the host's camelCase names; snake_case spellings are accepted
/// as aliases. The four budget keys are required: a missing key is a
/// configuration error, never a silently substituted default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionConfig {
    /// Estimated context size above which a turn compacts.
    #[serde(alias = "max_tokens")]
    pub max_tokens: usize,
    /// Budget reserved for verbatim recent messages.
    #[serde(alias = "keep_recent_tokens")]
    pub keep_recent_tokens: usize,
    /// Advisory cap on the generated summary.
    #[serde(alias = "summary_max_tokens")]
    pub summary_max_tokens: usize,
    /// Estimator ratio.
    #[serde(alias = "chars_per_token")]
    pub chars_per_token: f64,
    /// Fixed per-message cost for role/formatting tokens.
    #[serde(default, alias = "message_overhead_tokens")]
    pub message_overhead_tokens: usize,
    /// Consecutive no-progress compactions tolerated before a session is
    /// flagged unresolvable.
    #[serde(
        default = "default_max_no_progress_compactions",
        alias = "max_no_progress_compactions"
    )]
    pub max_no_progress_compactions: u32,
    /// Number of stats entries retained per session.
    #[serde(
        default = "default_stats_history_limit",
        alias = "stats_history_limit"
    )]
    pub stats_history_limit: usize,
}

fn default_max_no_progress_compactions() -> u32 {
    3
}

fn default_stats_history_limit() -> usize {
    100
}

impl CompactionConfig {
    /// Create a configuration with explicit budgets and default extras.
    pub fn new(
        max_tokens: usize,
        keep_recent_tokens: usize,
        summary_max_tokens: usize,
        chars_per_token: f64,
    ) -> Self {
        Self {
            max_tokens,
            keep_recent_tokens,
            summary_max_tokens,
            chars_per_token,
            message_overhead_tokens: 0,
            max_no_progress_compactions: default_max_no_progress_compactions(),
            stats_history_limit: default_stats_history_limit(),
        }
    }

    /// Values written by `ctxguard config init`, sized for an 8k window.
    pub fn recommended() -> Self {
        Self::new(8_000, 2_000, 1_000, 4.0)
    }

    pub fn with_message_overhead(mut self, tokens: usize) -> Self {
        self.message_overhead_tokens = tokens;
        self
    }

    pub fn with_max_no_progress(mut self, attempts: u32) -> Self {
        self.max_no_progress_compactions = attempts;
        self
    }

    pub fn with_stats_history_limit(mut self, limit: usize) -> Self {
        self.stats_history_limit = limit;
        self
    }

    /// Check the budgets, returning warnings for suspicious but usable values.
    pub fn validate(&self) -> Result<Vec<String>, ConfigurationError> {
        if self.max_tokens == 0 {
            return Err(ConfigurationError::invalid(
                "maxTokens",
                "must be greater than zero",
            ));
        }
        if self.keep_recent_tokens == 0 {
            return Err(ConfigurationError::invalid(
                "keepRecentTokens",
                "must be greater than zero",
            ));
        }
        if self.keep_recent_tokens >= self.max_tokens {
            return Err(ConfigurationError::invalid(
                "keepRecentTokens",
                format!(
                    "must be less than maxTokens ({} >= {})",
                    self.keep_recent_tokens, self.max_tokens
                ),
            ));
        }
        if self.summary_max_tokens == 0 {
            return Err(ConfigurationError::invalid(
                "summaryMaxTokens",
                "must be greater than zero",
            ));
        }
        if !self.chars_per_token.is_finite() || self.chars_per_token <= 0.0 {
            return Err(ConfigurationError::invalid(
                "charsPerToken",
                format!("must be a positive number, got {}", self.chars_per_token),
            ));
        }
        if self.max_no_progress_compactions == 0 {
            return Err(ConfigurationError::invalid(
                "maxNoProgressCompactions",
                "must be at least 1",
            ));
        }
        if self.stats_history_limit == 0 {
            return Err(ConfigurationError::invalid(
                "statsHistoryLimit",
                "must be at least 1",
            ));
        }

        let mut warnings = Vec::new();
        let steady_state = self.keep_recent_tokens + self.summary_max_tokens;
        if steady_state >= self.max_tokens {
            warnings.push(format!(
                "keepRecentTokens + summaryMaxTokens ({}) is not below maxTokens ({}); \
                 compacted contexts may immediately re-trigger compaction",
                steady_state, self.max_tokens
            ));
        }
        Ok(warnings)
    }
}
