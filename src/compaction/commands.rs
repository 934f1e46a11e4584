//! Host commands: `compaction-stats` and `force-recompact`.

use std::fmt::Write;
use std::str::FromStr;

use super::config::CompactionConfig;
use super::state::CompactionState;

pub const STATS_COMMAND: &str = "compaction-stats";
pub const FORCE_RECOMPACT_COMMAND: &str = "force-recompact";

/// A command the host can forward to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Stats,
    ForceRecompact,
}

impl FromStr for HostCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('/') {
            STATS_COMMAND => Ok(HostCommand::Stats),
            FORCE_RECOMPACT_COMMAND => Ok(HostCommand::ForceRecompact),
            other => Err(format!(
                "Unknown command '{}'. Available: {}, {}",
                other, STATS_COMMAND, FORCE_RECOMPACT_COMMAND
            )),
        }
    }
}

/// Render the session's compaction status. Never mutates the state.
pub fn stats(state: &CompactionState, config: &CompactionConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Context compaction");

    match state.last_context_tokens {
        Some(tokens) => {
            let percent = tokens as f64 / config.max_tokens as f64 * 100.0;
            let _ = writeln!(
                out,
                "  Live estimate:   {} / {} tokens ({:.0}%)",
                tokens, config.max_tokens, percent
            );
        }
        None => {
            let _ = writeln!(out, "  Live estimate:   no turns processed yet");
        }
    }

    if let Some(latest) = state.latest_stats() {
        let _ = writeln!(
            out,
            "  Last turn:       {} ({} -> {} tokens)",
            latest.outcome.label(),
            latest.tokens_before,
            latest.tokens_after
        );
    }

    match state.last_compaction() {
        Some(entry) => {
            let _ = writeln!(
                out,
                "  Last compaction: {} ({} messages summarized, {} -> {} tokens, saved {})",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                entry.messages_summarized,
                entry.tokens_before,
                entry.tokens_after,
                entry.tokens_saved()
            );
        }
        None => match state.last_compaction_timestamp {
            Some(timestamp) => {
                let _ = writeln!(
                    out,
                    "  Last compaction: {}",
                    timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            None => {
                let _ = writeln!(out, "  Last compaction: never");
            }
        },
    }

    let _ = writeln!(
        out,
        "  History:         {} compactions, {} failures in last {} turns",
        state.compaction_count(),
        state.failure_count(),
        state.stats_history.len()
    );
    let _ = writeln!(
        out,
        "  Budgets:         maxTokens={} keepRecentTokens={} summaryMaxTokens={} charsPerToken={}",
        config.max_tokens,
        config.keep_recent_tokens,
        config.summary_max_tokens,
        config.chars_per_token
    );

    if state.is_unresolvable(config.max_no_progress_compactions) {
        let _ = writeln!(
            out,
            "  Warning: compaction suspended after {} attempts without progress; \
             the recent messages alone exceed maxTokens",
            state.consecutive_no_progress
        );
    }
    if state.force_recompact {
        let _ = writeln!(out, "  Force recompact pending for the next turn");
    }

    out.trim_end().to_string()
}

/// Flag the session for compaction on its next turn.
pub fn force_recompact(state: &mut CompactionState) -> String {
    if state.request_force_recompact() {
        "Force recompact already pending; the next turn will compact.".to_string()
    } else {
        "Force recompact requested; the next turn will compact.".to_string()
    }
}
