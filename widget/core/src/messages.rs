//! Conversation Messages
//!
//! The message model shared by every store: who said what, when, and (for bot
//! replies) why. Messages are immutable once appended to the conversation.
//!
//! # Why-Metadata
//!
//! The backend may attach a trace to each reply describing the tools it ran
//! and the memories it recalled. The wire shape is kept intact so surfaces can
//! render the "why" panel without re-parsing:
//!
//! ```text
//! {
//!   "input": "what is the white rabbit?",
//!   "intermediate_steps": [[["search", "white rabbit"], "a late rabbit"]],
//!   "memory": { "episodic": [ { "score": 0.91, "page_content": "...", "metadata": {...} } ] }
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Memory collection shown first in the why panel
pub const DEFAULT_MEMORY_COLLECTION: &str = "episodic";

/// Message identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a new unique message ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("m_{id}"))
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who sent a message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Typed (or pasted) by the person using the widget
    User,
    /// Produced by the backend
    Bot,
}

/// A message in the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: MessageId,
    /// Who sent this message
    pub sender: Sender,
    /// Message content
    pub text: String,
    /// When the message was appended (Unix timestamp ms)
    pub timestamp: i64,
    /// Trace attached by the backend to bot replies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub why: Option<WhyMetadata>,
}

impl Message {
    /// Create a message from the user
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::User,
            text: text.into(),
            timestamp: now_ms(),
            why: None,
        }
    }

    /// Create a bot reply
    pub fn bot(text: impl Into<String>, why: Option<WhyMetadata>) -> Self {
        Self {
            id: MessageId::new(),
            sender: Sender::Bot,
            text: text.into(),
            timestamp: now_ms(),
            why,
        }
    }

    /// Whether the backend produced this message
    #[must_use]
    pub fn is_bot(&self) -> bool {
        self.sender == Sender::Bot
    }
}

/// Trace data attached to a bot reply
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WhyMetadata {
    /// The prompt the backend actually answered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Tool invocations, in execution order
    #[serde(default)]
    pub intermediate_steps: Vec<IntermediateStep>,
    /// Recalled memories grouped by collection name
    #[serde(default)]
    pub memory: BTreeMap<String, Vec<MemoryItem>>,
}

impl WhyMetadata {
    /// Names of the collections that contributed memories
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.memory.keys().map(String::as_str)
    }

    /// Memories recalled from a collection (empty when the collection is absent)
    #[must_use]
    pub fn recalled(&self, collection: &str) -> &[MemoryItem] {
        self.memory.get(collection).map_or(&[], Vec::as_slice)
    }

    /// Whether the trace carries nothing worth showing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intermediate_steps.is_empty() && self.memory.values().all(Vec::is_empty)
    }
}

/// A single tool invocation
///
/// Serialized as `[[tool, tool_input], observation]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "((String, String), String)", into = "((String, String), String)")]
pub struct IntermediateStep {
    /// Tool name
    pub tool: String,
    /// Input handed to the tool
    pub tool_input: String,
    /// What the tool returned
    pub observation: String,
}

impl From<((String, String), String)> for IntermediateStep {
    fn from(((tool, tool_input), observation): ((String, String), String)) -> Self {
        Self {
            tool,
            tool_input,
            observation,
        }
    }
}

impl From<IntermediateStep> for ((String, String), String) {
    fn from(step: IntermediateStep) -> Self {
        ((step.tool, step.tool_input), step.observation)
    }
}

/// A memory recalled while answering
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Similarity score
    pub score: f64,
    /// Stored content
    pub page_content: String,
    /// Where the memory came from
    pub metadata: MemoryMetadata,
}

impl MemoryItem {
    /// Text to show for this memory: the docstring when present, else the content
    #[must_use]
    pub fn summary(&self) -> &str {
        self.metadata
            .docstring
            .as_deref()
            .unwrap_or(&self.page_content)
    }
}

/// Provenance of a recalled memory
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetadata {
    /// Tool docstring (procedural memories)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docstring: Option<String>,
    /// Origin of the memory (a user id, a file name, a URL)
    pub source: String,
    /// Tool name (procedural memories)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// When the memory was stored (Unix timestamp, seconds)
    pub when: f64,
}

/// Get current timestamp in milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
