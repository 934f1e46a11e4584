//! Old/recent partitioning under a token budget.

use ctxguard_common::Message;

use super::estimator::TokenEstimator;

/// A context partitioned at `boundary`.
///
/// `old` is everything before the boundary and is what gets summarized;
/// `recent` is kept verbatim.
#[derive(Debug, Clone, Copy)]
pub struct Split<'a> {
    pub old: &'a [Message],
    pub recent: &'a [Message],
    /// Index of the first recent message in the original sequence.
    pub boundary: usize,
}

impl Split<'_> {
    /// Nothing to summarize.
    pub fn is_noop(&self) -> bool {
        self.old.is_empty()
    }
}

/// Partition `messages` so the recent group fits in `keep_recent_tokens`.
///
/// The budget is soft: the newest message is always recent even when it
/// alone exceeds the budget, and messages are never cut. The boundary then
/// moves backward until no tool call/result pair straddles it.
pub fn split<'a, E>(messages: &'a [Message], keep_recent_tokens: usize, estimator: &E) -> Split<'a>
where
    E: TokenEstimator + ?Sized,
{
    let budget_boundary = budget_boundary(messages, keep_recent_tokens, estimator);
    let boundary = align_to_tool_pairs(messages, budget_boundary);
    let (old, recent) = messages.split_at(boundary);
    Split {
        old,
        recent,
        boundary,
    }
}

/// Earliest index whose suffix still fits in the budget.
fn budget_boundary<E>(messages: &[Message], keep_recent_tokens: usize, estimator: &E) -> usize
where
    E: TokenEstimator + ?Sized,
{
    let mut boundary = messages.len();
    let mut used = 0usize;

    for (index, message) in messages.iter().enumerate().rev() {
        let tokens = estimator.estimate_message(message);
        let is_newest = boundary == messages.len();
        if !is_newest && used + tokens > keep_recent_tokens {
            break;
        }
        used += tokens;
        boundary = index;
    }

    boundary
}

/// Move the boundary backward until every tool result in the recent group
/// has its call in the recent group too.
fn align_to_tool_pairs(messages: &[Message], mut boundary: usize) -> usize {
    while let Some(call_index) = earliest_orphaning_call(messages, boundary) {
        boundary = call_index;
    }
    boundary
}

/// The earliest old-side call whose result sits on the recent side.
fn earliest_orphaning_call(messages: &[Message], boundary: usize) -> Option<usize> {
    (boundary..messages.len())
        .filter(|&index| messages[index].is_tool_result())
        .filter_map(|index| paired_call_index(messages, index))
        .filter(|&call_index| call_index < boundary)
        .min()
}

/// Index of the tool call answered by the result at `result_index`.
///
/// Results carrying an id pair with the latest earlier call with the same
/// id; results without one pair with the nearest earlier call without one.
pub fn paired_call_index(messages: &[Message], result_index: usize) -> Option<usize> {
    let result_id = messages[result_index].tool_call_id();
    messages[..result_index]
        .iter()
        .rposition(|m| m.is_tool_call() && m.tool_call_id() == result_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compaction::estimator::CharRatioEstimator;

    /// One token per character keeps the arithmetic readable.
    fn per_char() -> CharRatioEstimator {
        CharRatioEstimator::new(1.0, 0)
    }

    fn text(len: usize) -> String {
        "x".repeat(len)
    }

    fn assert_pairs_intact(messages: &[Message], split: &Split<'_>) {
        for (index, message) in messages.iter().enumerate() {
            if !message.is_tool_result() {
                continue;
            }
            if let Some(call_index) = paired_call_index(messages, index) {
                assert_eq!(
                    call_index < split.boundary,
                    index < split.boundary,
                    "pair ({call_index}, {index}) split at {}",
                    split.boundary
                );
            }
        }
    }

    #[test]
    fn test_split_by_budget() {
        let messages = vec![
            Message::user(text(10)),
            Message::assistant(text(10)),
            Message::user(text(10)),
            Message::assistant(text(10)),
        ];

        let split = split(&messages, 25, &per_char());

        assert_eq!(split.boundary, 2);
        assert_eq!(split.old.len(), 2);
        assert_eq!(split.recent.len(), 2);
    }

    #[test]
    fn test_split_exact_fit_includes_message() {
        let messages = vec![
            Message::user(text(10)),
            Message::assistant(text(10)),
            Message::user(text(10)),
        ];

        let split = split(&messages, 20, &per_char());

        assert_eq!(split.boundary, 1);
    }

    #[test]
    fn test_split_stops_at_first_message_that_does_not_fit() {
        // A small message further back must not be pulled in past a large one.
        let messages = vec![
            Message::user(text(1)),
            Message::assistant(text(50)),
            Message::user(text(5)),
        ];

        let split = split(&messages, 10, &per_char());

        assert_eq!(split.boundary, 2);
        assert_eq!(split.old.len(), 2);
    }

    #[test]
    fn test_newest_message_kept_whole_when_over_budget() {
        let messages = vec![Message::user(text(10)), Message::assistant(text(500))];

        let split = split(&messages, 20, &per_char());

        assert_eq!(split.boundary, 1);
        assert_eq!(split.recent.len(), 1);
        assert_eq!(split.recent[0].text().map(str::len), Some(500));
    }

    #[test]
    fn test_everything_fits_is_noop() {
        let messages = vec![Message::user(text(5)), Message::assistant(text(5))];

        let split = split(&messages, 100, &per_char());

        assert!(split.is_noop());
        assert_eq!(split.boundary, 0);
        assert_eq!(split.recent.len(), 2);
    }

    #[test]
    fn test_empty_context() {
        let messages: Vec<Message> = Vec::new();
        let split = split(&messages, 100, &per_char());
        assert!(split.is_noop());
        assert!(split.recent.is_empty());
    }

    #[test]
    fn test_tool_result_pulls_in_its_call() {
        let messages = vec![
            Message::user(text(10)),
            Message::assistant(text(10)),
            Message::tool_call("call_1", text(30)),
            Message::tool_result("call_1", text(10)),
            Message::assistant(text(10)),
        ];

        // Budget admits the result and the final answer but not the call.
        let split = split(&messages, 20, &per_char());

        assert_eq!(split.boundary, 2);
        assert!(split.recent[0].is_tool_call());
        assert_pairs_intact(&messages, &split);
    }

    #[test]
    fn test_pairs_without_ids_use_nearest_call() {
        let messages = vec![
            Message::user(text(10)),
            Message::new(ctxguard_common::Role::ToolCall, text(30)),
            Message::new(ctxguard_common::Role::ToolResult, text(5)),
        ];

        let split = split(&messages, 5, &per_char());

        assert_eq!(split.boundary, 1);
        assert_pairs_intact(&messages, &split);
    }

    #[test]
    fn test_parallel_calls_move_boundary_transitively() {
        let messages = vec![
            Message::user(text(10)),
            Message::tool_call("a", text(10)),
            Message::tool_call("b", text(10)),
            Message::tool_result("a", text(10)),
            Message::tool_result("b", text(10)),
        ];

        // Budget only admits the last result; its call pulls in result "a",
        // whose call in turn moves the boundary further back.
        let split = split(&messages, 10, &per_char());

        assert_eq!(split.boundary, 1);
        assert_eq!(split.old.len(), 1);
        assert_pairs_intact(&messages, &split);
    }

    #[test]
    fn test_prior_summary_falls_into_old() {
        use chrono::Utc;
        use ctxguard_common::CompactionMarker;

        let summary = Message::system(text(40)).with_compaction_marker(CompactionMarker {
            id: "c-1".to_string(),
            created_at: Utc::now(),
            messages_summarized: 6,
        });
        let messages = vec![summary, Message::user(text(10)), Message::assistant(text(10))];

        let split = split(&messages, 25, &per_char());

        assert_eq!(split.boundary, 1);
        assert!(split.old[0].is_compaction_summary());
    }

    #[test]
    fn test_split_preserves_every_message_in_order() {
        let messages: Vec<Message> = (0..12)
            .map(|i| {
                if i % 2 == 0 {
                    Message::user(format!("question {i} {}", text(i * 3)))
                } else {
                    Message::assistant(format!("answer {i}"))
                }
            })
            .collect();

        for budget in [0, 5, 17, 40, 90, 1_000] {
            let split = split(&messages, budget, &per_char());
            let rejoined: Vec<Message> = split.old.iter().chain(split.recent).cloned().collect();
            assert_eq!(rejoined, messages);
        }
    }

    #[test]
    fn test_pairing_invariant_over_budgets() {
        let mut messages = Vec::new();
        for turn in 0..6 {
            messages.push(Message::user(format!("step {turn} {}", text(turn * 7))));
            let id = format!("call_{turn}");
            messages.push(Message::tool_call(&id, text(5 + turn)));
            if turn % 2 == 0 {
                messages.push(Message::tool_call(format!("{id}_b"), text(3)));
                messages.push(Message::tool_result(format!("{id}_b"), text(20)));
            }
            messages.push(Message::tool_result(&id, text(25 - turn)));
            messages.push(Message::assistant(text(12)));
        }

        let estimator = per_char();
        let total = estimator.estimate_context(&messages);
        for budget in 0..=total {
            let split = split(&messages, budget, &estimator);
            assert_pairs_intact(&messages, &split);
            assert!(!split.recent.is_empty());
        }
    }
}
