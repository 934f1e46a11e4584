//! The per-turn compaction decision and its execution.

use chrono::Utc;
use ctxguard_common::Message;
use tracing::{debug, info, warn};

use super::config::CompactionConfig;
use super::estimator::{CharRatioEstimator, TokenEstimator};
use super::splitter::split;
use super::state::{CompactionState, StatsEntry, StatsOutcome};
use super::summarizer::Summarizer;
use crate::errors::ConfigurationError;

/// Result of one engine invocation.
#[derive(Debug, Clone)]
pub struct Processed {
    /// The context to send to the model this turn.
    pub context: Vec<Message>,
    /// Successor state for the session.
    pub state: CompactionState,
    pub outcome: StatsOutcome,
}

impl Processed {
    pub fn compacted(&self) -> bool {
        self.outcome == StatsOutcome::Compacted
    }
}

/// Keeps a session's context under `max_tokens` by replacing old messages
/// with a model-written summary.
pub struct CompactionEngine<E: TokenEstimator = CharRatioEstimator> {
    config: CompactionConfig,
    estimator: E,
    summarizer: Summarizer,
}

impl CompactionEngine<CharRatioEstimator> {
    /// Build an engine using the ratio estimator from `config`.
    ///
    /// # Errors
    /// Returns `ConfigurationError::Invalid` when the budgets are unusable.
    pub fn new(config: CompactionConfig, summarizer: Summarizer) -> Result<Self, ConfigurationError> {
        let estimator = CharRatioEstimator::from_config(&config);
        Self::with_estimator(config, estimator, summarizer)
    }
}

impl<E: TokenEstimator> CompactionEngine<E> {
    pub fn with_estimator(
        config: CompactionConfig,
        estimator: E,
        summarizer: Summarizer,
    ) -> Result<Self, ConfigurationError> {
        for warning in config.validate()? {
            warn!("{}", warning);
        }
        Ok(Self {
            config,
            estimator,
            summarizer,
        })
    }

    pub fn config(&self) -> &CompactionConfig {
        &self.config
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    /// Decide whether this turn compacts, and do it if so.
    ///
    /// `state` is never modified; the successor is returned in
    /// [`Processed::state`]. Dropping the future before it resolves leaves
    /// the caller's state exactly as it was. No path loses messages: every
    /// failure returns `context` unchanged.
    pub async fn process(
        &self,
        context: &[Message],
        state: &CompactionState,
        model: Option<&str>,
    ) -> Processed {
        let config = &self.config;
        let mut next = state.clone();
        let total = self.estimator.estimate_context(context);
        let forced = state.force_recompact;
        next.last_context_tokens = Some(total);

        if !forced && total <= config.max_tokens {
            debug!(total, max_tokens = config.max_tokens, "under threshold");
            next.clear_no_progress();
            return self.unchanged(context, next, total, StatsOutcome::PassThrough, false);
        }

        let parts = split(context, config.keep_recent_tokens, &self.estimator);
        if !forced && next.is_unresolvable(config.max_no_progress_compactions) {
            if !next.old_segment_grew(parts.old.len()) {
                warn!(
                    total,
                    max_tokens = config.max_tokens,
                    keep_recent_tokens = config.keep_recent_tokens,
                    summary_max_tokens = config.summary_max_tokens,
                    attempts = next.consecutive_no_progress,
                    "context cannot be compacted below maxTokens; raise maxTokens or lower \
                     keepRecentTokens/summaryMaxTokens"
                );
                return self.unchanged(context, next, total, StatsOutcome::Unresolvable, false);
            }
            debug!(
                old = parts.old.len(),
                "new messages left the recent group since compaction was suspended; retrying"
            );
        }

        if parts.is_noop() {
            debug!(total, forced, "every message belongs to the recent group");
            next.force_recompact = false;
            if !forced {
                next.note_no_progress(0);
            }
            return self.unchanged(context, next, total, StatsOutcome::NothingToCompact, forced);
        }

        info!(
            total,
            forced,
            old = parts.old.len(),
            recent = parts.recent.len(),
            boundary = parts.boundary,
            "compacting context"
        );

        let summary = match self
            .summarizer
            .summarize(parts.old, config.summary_max_tokens, model)
            .await
        {
            Ok(summary) => summary,
            Err(err) => {
                warn!(error = %err, "summarization failed; keeping original context");
                let outcome = StatsOutcome::SummarizationFailed {
                    reason: err.to_string(),
                };
                return self.unchanged(context, next, total, outcome, forced);
            }
        };

        let mut compacted = Vec::with_capacity(parts.recent.len() + 1);
        compacted.push(summary);
        compacted.extend_from_slice(parts.recent);
        let after = self.estimator.estimate_context(&compacted);

        if after > config.max_tokens {
            warn!(
                tokens_before = total,
                tokens_after = after,
                max_tokens = config.max_tokens,
                "compacted context is still over the threshold"
            );
            if !forced {
                let left = split(&compacted, config.keep_recent_tokens, &self.estimator);
                next.note_no_progress(left.old.len());
            }
        } else {
            next.clear_no_progress();
        }

        let now = Utc::now();
        next.force_recompact = false;
        next.last_compaction_timestamp = Some(now);
        next.last_compaction_boundary_index = Some(parts.boundary);
        next.last_context_tokens = Some(after);
        next.record(
            StatsEntry {
                timestamp: now,
                tokens_before: total,
                tokens_after: after,
                messages_summarized: parts.old.len(),
                outcome: StatsOutcome::Compacted,
                forced,
            },
            config.stats_history_limit,
        );

        info!(
            tokens_before = total,
            tokens_after = after,
            messages_summarized = parts.old.len(),
            "context compacted"
        );

        Processed {
            context: compacted,
            state: next,
            outcome: StatsOutcome::Compacted,
        }
    }

    fn unchanged(
        &self,
        context: &[Message],
        mut state: CompactionState,
        tokens: usize,
        outcome: StatsOutcome,
        forced: bool,
    ) -> Processed {
        state.record(
            StatsEntry::unchanged(tokens, outcome.clone(), forced),
            self.config.stats_history_limit,
        );
        Processed {
            context: context.to_vec(),
            state,
            outcome,
        }
    }
}
