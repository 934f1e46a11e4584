//! Per-session compaction state and stats history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What happened on one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatsOutcome {
    /// Context was under the threshold and returned unchanged.
    PassThrough,
    /// Old messages were replaced by a summary.
    Compacted,
    /// Compaction was due but every message belonged to the recent group.
    NothingToCompact,
    /// The summary call failed; the original context was returned.
    SummarizationFailed { reason: String },
    /// Repeated attempts made no progress; compaction is suspended.
    Unresolvable,
}

impl StatsOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StatsOutcome::PassThrough => "pass-through",
            StatsOutcome::Compacted => "compacted",
            StatsOutcome::NothingToCompact => "nothing to compact",
            StatsOutcome::SummarizationFailed { .. } => "summarization failed",
            StatsOutcome::Unresolvable => "unresolvable",
        }
    }
}

/// One row of the stats history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsEntry {
    pub timestamp: DateTime<Utc>,
    pub tokens_before: usize,
    pub tokens_after: usize,
    pub messages_summarized: usize,
    pub outcome: StatsOutcome,
    /// Whether the force flag triggered this attempt.
    #[serde(default)]
    pub forced: bool,
}

impl StatsEntry {
    /// Entry for a turn where the context was returned unchanged.
    pub fn unchanged(tokens: usize, outcome: StatsOutcome, forced: bool) -> Self {
        Self {
            timestamp: Utc::now(),
            tokens_before: tokens,
            tokens_after: tokens,
            messages_summarized: 0,
            outcome,
            forced,
        }
    }

    /// Tokens removed by this turn, zero when the context grew.
    pub fn tokens_saved(&self) -> usize {
        self.tokens_before.saturating_sub(self.tokens_after)
    }
}

/// Compaction bookkeeping for one session.
///
/// Only the engine and the force command change it. The engine never
/// mutates a state in place: it returns a successor, which the session
/// installs once the turn resolves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionState {
    pub last_compaction_timestamp: Option<DateTime<Utc>>,
    pub last_compaction_boundary_index: Option<usize>,
    pub force_recompact: bool,
    pub stats_history: VecDeque<StatsEntry>,
    /// Threshold-triggered attempts in a row that left the context over
    /// the limit.
    pub consecutive_no_progress: u32,
    /// Size of the old segment left behind by the last attempt without
    /// progress. A suspended session retries once more messages than this
    /// fall outside the recent group.
    pub no_progress_old_messages: Option<usize>,
    /// Estimate of the most recent context the engine saw.
    pub last_context_tokens: Option<usize>,
}

impl CompactionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the force flag. Returns whether it was already set.
    pub fn request_force_recompact(&mut self) -> bool {
        std::mem::replace(&mut self.force_recompact, true)
    }

    /// Append a stats entry, evicting the oldest beyond `limit`.
    pub fn record(&mut self, entry: StatsEntry, limit: usize) {
        self.stats_history.push_back(entry);
        while self.stats_history.len() > limit.max(1) {
            self.stats_history.pop_front();
        }
    }

    pub fn latest_stats(&self) -> Option<&StatsEntry> {
        self.stats_history.back()
    }

    /// Most recent successful compaction in the retained history.
    pub fn last_compaction(&self) -> Option<&StatsEntry> {
        self.stats_history
            .iter()
            .rev()
            .find(|entry| entry.outcome == StatsOutcome::Compacted)
    }

    pub fn compaction_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, StatsOutcome::Compacted))
    }

    pub fn failure_count(&self) -> usize {
        self.count(|outcome| matches!(outcome, StatsOutcome::SummarizationFailed { .. }))
    }

    /// Whether threshold-triggered compaction is suspended.
    pub fn is_unresolvable(&self, max_no_progress: u32) -> bool {
        self.consecutive_no_progress >= max_no_progress
    }

    /// Whether an old segment of `old_messages` holds more than the last
    /// attempt without progress left behind.
    pub fn old_segment_grew(&self, old_messages: usize) -> bool {
        old_messages > self.no_progress_old_messages.unwrap_or(0)
    }

    /// Count an attempt that left the context over the limit.
    pub(crate) fn note_no_progress(&mut self, old_messages_left: usize) {
        self.consecutive_no_progress += 1;
        self.no_progress_old_messages = Some(old_messages_left);
    }

    pub(crate) fn clear_no_progress(&mut self) {
        self.consecutive_no_progress = 0;
        self.no_progress_old_messages = None;
    }

    fn count(&self, predicate: impl Fn(&StatsOutcome) -> bool) -> usize {
        self.stats_history
            .iter()
            .filter(|entry| predicate(&entry.outcome))
            .count()
    }
}
