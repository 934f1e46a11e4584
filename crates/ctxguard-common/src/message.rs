use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author of a message in the transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    /// A model-issued tool invocation.
    #[serde(alias = "tool-call")]
    ToolCall,
    /// The host's answer to a tool invocation.
    #[serde(alias = "tool-result")]
    ToolResult,
}

impl Role {
    /// Returns the wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::ToolCall => "tool_call",
            Role::ToolResult => "tool_result",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Message body.
///
/// Hosts normally send plain text. Anything else is kept verbatim so the
/// message can be handed back unchanged, but it cannot be measured as text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Structured(serde_json::Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

/// Marker attached to summaries produced by compaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompactionMarker {
    /// Unique id of the compaction that produced the summary.
    pub id: String,
    pub created_at: DateTime<Utc>,
    /// How many messages the summary replaced.
    pub messages_summarized: usize,
}

/// Optional per-message metadata.
///
/// Keys ctxguard does not know about are preserved in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Links a tool call to its result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Present only on compaction summaries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compaction: Option<CompactionMarker>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A single transcript entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(default)]
    pub content: MessageContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Create a message with text content and no metadata.
    pub fn new(role: Role, content: impl Into<MessageContent>) -> Self {
        Self {
            role,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::Assistant, text.into())
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, text.into())
    }

    /// Create a tool call carrying its call id.
    pub fn tool_call(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Role::ToolCall, text.into()).with_tool_call_id(id)
    }

    /// Create a tool result answering the call with the given id.
    pub fn tool_result(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(Role::ToolResult, text.into()).with_tool_call_id(id)
    }

    /// Attach a tool-call id, creating metadata if needed.
    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.get_or_insert_with(Default::default).tool_call_id = Some(id.into());
        self
    }

    /// Attach a compaction marker, creating metadata if needed.
    pub fn with_compaction_marker(mut self, marker: CompactionMarker) -> Self {
        self.metadata.get_or_insert_with(Default::default).compaction = Some(marker);
        self
    }

    /// Text content, or `None` when the content is structured.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Structured(_) => None,
        }
    }

    pub fn tool_call_id(&self) -> Option<&str> {
        self.metadata.as_ref()?.tool_call_id.as_deref()
    }

    pub fn compaction_marker(&self) -> Option<&CompactionMarker> {
        self.metadata.as_ref()?.compaction.as_ref()
    }

    /// Whether this message is a summary produced by a previous compaction.
    pub fn is_compaction_summary(&self) -> bool {
        self.compaction_marker().is_some()
    }

    pub fn is_tool_call(&self) -> bool {
        self.role == Role::ToolCall
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::ToolResult
    }
}
