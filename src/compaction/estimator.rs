//! Token estimation for context size calculation.

use ctxguard_common::{Message, MessageContent};
use tracing::debug;

use super::config::CompactionConfig;
use crate::errors::EstimationInputError;

/// Approximate token counting.
///
/// Implementations must be deterministic and monotonic in the amount of
/// text: more characters never yield fewer tokens. The boundary search
/// depends on it.
pub trait TokenEstimator: Send + Sync {
    /// Estimate tokens for a text string.
    fn estimate(&self, text: &str) -> usize;

    /// Fixed cost added to every message.
    fn message_overhead(&self) -> usize {
        0
    }

    /// Estimate tokens for a single message.
    ///
    /// Structured content cannot be measured; it counts as zero and only
    /// the overhead applies.
    fn estimate_message(&self, message: &Message) -> usize {
        let content_tokens = match message_text(message) {
            Ok(text) => self.estimate(text),
            Err(err) => {
                debug!(%err, "counting content as zero tokens");
                0
            }
        };
        content_tokens + self.message_overhead()
    }

    /// Estimate total tokens for a message sequence.
    fn estimate_context(&self, messages: &[Message]) -> usize {
        messages.iter().map(|m| self.estimate_message(m)).sum()
    }
}

/// Text of a message, or an error when its content is not text.
pub fn message_text(message: &Message) -> Result<&str, EstimationInputError> {
    match &message.content {
        MessageContent::Text(text) => Ok(text),
        MessageContent::Structured(_) => Err(EstimationInputError::NonTextContent {
            role: message.role,
        }),
    }
}

/// Characters-divided-by-ratio estimator.
///
/// Counts Unicode scalar values, so multi-byte text is not over-counted.
#[derive(Debug, Clone, PartialEq)]
pub struct CharRatioEstimator {
    chars_per_token: f64,
    message_overhead: usize,
}

impl CharRatioEstimator {
    /// The ratio must be finite and positive; `CompactionConfig::validate`
    /// enforces this for configured values.
    pub fn new(chars_per_token: f64, message_overhead: usize) -> Self {
        Self {
            chars_per_token,
            message_overhead,
        }
    }

    pub fn from_config(config: &CompactionConfig) -> Self {
        Self::new(config.chars_per_token, config.message_overhead_tokens)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        let chars = text.chars().count();
        if chars == 0 {
            return 0;
        }
        let tokens = (chars as f64 / self.chars_per_token).ceil() as usize;
        tokens.max(1)
    }

    fn message_overhead(&self) -> usize {
        self.message_overhead
    }
}
