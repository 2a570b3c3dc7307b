//! Backend Client Traits
//!
//! Trait definitions for the conversational-AI backend. The core never speaks
//! the wire protocol itself: it consumes a client that exposes the connection
//! as an event stream and the REST surface as async request methods.
//!
//! # Request Methods
//!
//! The backend groups its endpoints by namespace; the trait flattens them:
//!
//! | namespace    | endpoint                    | method                          |
//! |--------------|-----------------------------|---------------------------------|
//! | rabbit hole  | `uploadFile`                | [`BackendClient::upload_file`]  |
//! | rabbit hole  | `uploadMemory`              | [`BackendClient::upload_memory`]|
//! | rabbit hole  | `uploadUrl`                 | [`BackendClient::upload_url`]   |
//! | memory       | `wipeConversationHistory`   | [`BackendClient::wipe_conversation_history`] |
//!
//! Request methods return the response `data` payload on success. Mapping
//! success and failure to user-facing text happens in
//! [`try_request`](super::try_request), never in the client.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use url::Url;

use crate::config::WidgetSettings;
use crate::events::ClientEvent;

/// Outbound chat payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Text to send
    pub text: String,
}

impl OutboundMessage {
    /// Create a new outbound message
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A file handed to the rabbit hole
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadFile {
    /// File name shown to the user and sent to the backend
    pub name: String,
    /// MIME type, when known
    pub mime_type: Option<String>,
    /// File contents
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Create an upload from in-memory contents
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            mime_type: None,
            bytes: bytes.into(),
        }
    }

    /// Set the MIME type
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Read a file from disk
    ///
    /// The upload is named after the final path component.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub async fn read(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    /// Size of the contents in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the file is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Backend client trait
///
/// One instance represents one session with the backend. Implementations own
/// the transport; the session controller owns the instance.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Take the connection's event stream
    ///
    /// Returns `None` once the stream has been taken. The stream ends when the
    /// connection is closed.
    fn take_events(&self) -> Option<mpsc::Receiver<ClientEvent>>;

    /// Send a chat message on behalf of `user_id`
    ///
    /// Delivery failures are also reported on the event stream as
    /// [`ClientEvent::Error`].
    async fn send(&self, message: &OutboundMessage, user_id: &str) -> anyhow::Result<()>;

    /// Send a document down the rabbit hole
    async fn upload_file(&self, file: &UploadFile) -> anyhow::Result<serde_json::Value>;

    /// Upload a memories export
    async fn upload_memory(&self, file: &UploadFile) -> anyhow::Result<serde_json::Value>;

    /// Send a website down the rabbit hole
    async fn upload_url(&self, url: &Url) -> anyhow::Result<serde_json::Value>;

    /// Wipe the backend's working memory of the current conversation
    async fn wipe_conversation_history(&self) -> anyhow::Result<serde_json::Value>;

    /// Close the connection
    ///
    /// Must be idempotent. In-flight requests are not required to abort.
    fn close(&self);
}

/// Builds backend clients from widget settings
pub trait ClientFactory: Send + Sync {
    /// Construct a client for the given settings
    ///
    /// # Errors
    ///
    /// Returns an error when the settings cannot produce a client (for
    /// example an unusable host).
    fn create(&self, settings: &WidgetSettings) -> anyhow::Result<Arc<dyn BackendClient>>;
}

impl<F> ClientFactory for F
where
    F: Fn(&WidgetSettings) -> anyhow::Result<Arc<dyn BackendClient>> + Send + Sync,
{
    fn create(&self, settings: &WidgetSettings) -> anyhow::Result<Arc<dyn BackendClient>> {
        self(settings)
    }
}
