//! Summary generation for the old segment of a context.

use chrono::Utc;
use ctxguard_common::{CompactionMarker, Message, MessageContent, Role};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

use crate::backend::{GenerationRequest, ModelBackend};
use crate::errors::SummarizationError;

/// Heading placed above the generated summary in the summary message.
pub const SUMMARY_HEADER: &str = "[Summary of earlier conversation]";

/// Tool results longer than this are clipped inside the summarization prompt.
const MAX_TOOL_RESULT_CHARS: usize = 2_000;

const SYSTEM_PROMPT: &str = "You are a precise summarizer. You condense conversation transcripts \
into summaries that let an assistant continue the work without the original messages.";

/// Turns an old message segment into a single summary message using the
/// session's own model.
#[derive(Clone)]
pub struct Summarizer {
    backend: Arc<dyn ModelBackend>,
    timeout: Duration,
}

impl Summarizer {
    pub fn new(backend: Arc<dyn ModelBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Summarize `old` within an advisory budget of `summary_max_tokens`.
    ///
    /// `model` selects the session's model when it differs from the backend
    /// default. Output longer than the budget is accepted as-is.
    ///
    /// # Errors
    /// Fails when the backend errors, exceeds the timeout, or returns only
    /// whitespace.
    pub async fn summarize(
        &self,
        old: &[Message],
        summary_max_tokens: usize,
        model: Option<&str>,
    ) -> Result<Message, SummarizationError> {
        let transcript = render_transcript(old);
        let request = GenerationRequest {
            system: SYSTEM_PROMPT.to_string(),
            prompt: build_summary_prompt(&transcript, summary_max_tokens),
            max_tokens: summary_max_tokens,
            model: model.map(String::from),
        };

        tracing::debug!(
            messages = old.len(),
            summary_max_tokens,
            timeout_ms = self.timeout.as_millis() as u64,
            "requesting summary"
        );

        let text = match timeout(self.timeout, self.backend.generate(request)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => return Err(SummarizationError::Backend(err)),
            Err(_) => {
                return Err(SummarizationError::Timeout {
                    after: self.timeout,
                });
            }
        };

        let text = text.trim();
        if text.is_empty() {
            return Err(SummarizationError::EmptyOutput);
        }

        Ok(summary_message(text, old.len()))
    }
}

/// Wrap generated text as a tagged system message.
fn summary_message(text: &str, messages_summarized: usize) -> Message {
    Message::system(format!("{}\n\n{}", SUMMARY_HEADER, text)).with_compaction_marker(
        CompactionMarker {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            messages_summarized,
        },
    )
}

/// Render messages as a plain transcript for the summarization prompt.
fn render_transcript(messages: &[Message]) -> String {
    let mut output = String::new();

    for message in messages {
        let body = match &message.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Structured(value) => value.to_string(),
        };

        if message.is_compaction_summary() {
            let body = body.strip_prefix(SUMMARY_HEADER).unwrap_or(&body).trim();
            let _ = writeln!(output, "[Previous summary]\n{}\n", body);
            continue;
        }

        let label = match (message.role, message.tool_call_id()) {
            (Role::User, _) => "User".to_string(),
            (Role::Assistant, _) => "Assistant".to_string(),
            (Role::System, _) => "System".to_string(),
            (Role::ToolCall, Some(id)) => format!("Tool call ({})", id),
            (Role::ToolCall, None) => "Tool call".to_string(),
            (Role::ToolResult, Some(id)) => format!("Tool result ({})", id),
            (Role::ToolResult, None) => "Tool result".to_string(),
        };

        let body = if message.is_tool_result() {
            clip(&body, MAX_TOOL_RESULT_CHARS)
        } else {
            body
        };

        let _ = writeln!(output, "{}: {}\n", label, body);
    }

    output
}

/// Character-safe prefix of `text`.
fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

fn build_summary_prompt(transcript: &str, summary_max_tokens: usize) -> String {
    format!(
        r"Summarize the conversation below so the assistant can continue it without the original messages. Preserve:
- The topics discussed and the user's goals
- Decisions made and conclusions reached
- Unresolved questions, pending work and next steps
- Tool results that later turns depend on (file paths, identifiers, values, error messages)

If the transcript starts with a previous summary, merge it into the new summary instead of nesting it.
Be specific and factual. Do not invent details.

Conversation:
{transcript}
Write the summary in at most {summary_max_tokens} tokens:"
    )
}
