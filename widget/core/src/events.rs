//! Client Events and Widget Hooks
//!
//! Two directions of traffic cross the core:
//!
//! - [`ClientEvent`]: what the backend connection reports (connected, a server
//!   message, an error, disconnected). The session controller drains these into
//!   the conversation store.
//! - [`WidgetObserver`]: hooks the embedding application registers to hear about
//!   messages, uploads and notifications as the stores produce them.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::backend::UploadFile;
use crate::messages::{Message, WhyMetadata};
use crate::notifications::Notification;

/// Events from the backend connection
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// The persistent connection is open
    Connected,
    /// The server pushed a message
    Message(ServerMessage),
    /// The connection failed
    Error {
        /// Human-readable description
        description: String,
    },
    /// The connection closed
    Disconnected,
}

/// A message pushed by the server
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    /// Message text
    pub content: String,
    /// What kind of message this is
    #[serde(rename = "type")]
    pub kind: ServerMessageKind,
    /// Trace attached to chat replies
    #[serde(default)]
    pub why: Option<WhyMetadata>,
}

impl ServerMessage {
    /// A complete chat reply
    pub fn chat(content: impl Into<String>, why: Option<WhyMetadata>) -> Self {
        Self {
            content: content.into(),
            kind: ServerMessageKind::Chat,
            why,
        }
    }

    /// A server-side notification
    pub fn notification(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            kind: ServerMessageKind::Notification,
            why: None,
        }
    }
}

/// Server message kinds
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessageKind {
    /// A complete chat reply
    Chat,
    /// A partial token of a reply being generated
    ChatToken,
    /// A notification for the user
    Notification,
    /// A server-side error report
    Error,
    /// Anything this core does not understand
    #[serde(other)]
    Unknown,
}

/// Which rabbit-hole endpoint an upload went to
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadTarget<'a> {
    /// A document to index
    File(&'a UploadFile),
    /// A website to scrape and index
    Website(&'a Url),
}

/// Hooks for the embedding application
///
/// Every method has a no-op default, so implementors only override what they
/// care about. Hooks run synchronously inside the store operation that
/// triggered them and must not block.
pub trait WidgetObserver: Send + Sync {
    /// A message was appended to the conversation
    fn on_message(&self, _message: &Message) {}

    /// A file or website was submitted to the rabbit hole
    fn on_upload(&self, _target: UploadTarget<'_>) {}

    /// A memory file was submitted
    fn on_memory(&self, _file: &UploadFile) {}

    /// A notification was shown
    fn on_notification(&self, _notification: &Notification) {}
}

/// Observer that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl WidgetObserver for NoopObserver {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_wire_format() {
        let msg: ServerMessage = serde_json::from_value(serde_json::json!({
            "content": "Hi",
            "type": "chat",
            "why": null
        }))
        .unwrap();
        assert_eq!(msg, ServerMessage::chat("Hi", None));

        let note: ServerMessage = serde_json::from_value(serde_json::json!({
            "content": "Indexing done",
            "type": "notification"
        }))
        .unwrap();
        assert_eq!(note.kind, ServerMessageKind::Notification);
    }

    #[test]
    fn test_unknown_kind_is_tolerated() {
        let msg: ServerMessage = serde_json::from_value(serde_json::json!({
            "content": "",
            "type": "something_new"
        }))
        .unwrap();
        assert_eq!(msg.kind, ServerMessageKind::Unknown);
    }
}
