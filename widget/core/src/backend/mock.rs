//! Scripted Backend Client
//!
//! A [`BackendClient`] that talks to nobody. Tests (and headless surfaces)
//! drive it by pushing [`ClientEvent`]s into its connection and inspecting the
//! calls the stores made.
//!
//! # Usage
//!
//! ```ignore
//! use catwidget_core::backend::mock::MockClientFactory;
//!
//! let factory = Arc::new(MockClientFactory::new());
//! let mut session = WidgetSessionController::new(factory.clone());
//! session.apply_settings(WidgetSettings::default());
//!
//! let client = factory.latest().unwrap();
//! client.connect().await;
//! client.reply("Hi").await;
//!
//! session.send_message("hello").await;
//! assert_eq!(client.sent_texts(), vec!["hello"]);
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use url::Url;

use super::traits::{BackendClient, ClientFactory, OutboundMessage, UploadFile};
use crate::config::WidgetSettings;
use crate::events::{ClientEvent, ServerMessage};
use crate::messages::WhyMetadata;

/// Capacity of the scripted connection
const EVENT_CAPACITY: usize = 64;

/// A call the stores made on the client
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockCall {
    /// `send`
    Send {
        /// Text that went over the wire
        text: String,
        /// Sending user
        user_id: String,
    },
    /// `upload_file`
    UploadFile {
        /// Uploaded file name
        name: String,
    },
    /// `upload_memory`
    UploadMemory {
        /// Uploaded file name
        name: String,
    },
    /// `upload_url`
    UploadUrl {
        /// Submitted URL
        url: String,
    },
    /// `wipe_conversation_history`
    WipeHistory,
}

/// Scripted backend client
pub struct MockClient {
    settings: Option<WidgetSettings>,
    events_tx: mpsc::Sender<ClientEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<ClientEvent>>>,
    calls: Mutex<Vec<MockCall>>,
    fail_requests: AtomicBool,
    fail_send: AtomicBool,
    /// `true` while calls may complete
    gate: watch::Sender<bool>,
    closed: AtomicBool,
}

impl MockClient {
    /// Create a client with no settings attached
    #[must_use]
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (gate, _) = watch::channel(true);
        Self {
            settings: None,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            calls: Mutex::new(Vec::new()),
            fail_requests: AtomicBool::new(false),
            fail_send: AtomicBool::new(false),
            gate,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a client built from `settings`
    #[must_use]
    pub fn with_settings(settings: WidgetSettings) -> Self {
        Self {
            settings: Some(settings),
            ..Self::new()
        }
    }

    /// Settings the client was built from
    #[must_use]
    pub fn settings(&self) -> Option<&WidgetSettings> {
        self.settings.as_ref()
    }

    /// Push an event into the connection
    ///
    /// Returns false when nobody is listening any more.
    pub async fn emit(&self, event: ClientEvent) -> bool {
        self.events_tx.send(event).await.is_ok()
    }

    /// Report the connection as open
    pub async fn connect(&self) -> bool {
        self.emit(ClientEvent::Connected).await
    }

    /// Push a chat reply
    pub async fn reply(&self, text: &str) -> bool {
        self.emit(ClientEvent::Message(ServerMessage::chat(text, None)))
            .await
    }

    /// Push a chat reply with a trace
    pub async fn reply_with_why(&self, text: &str, why: WhyMetadata) -> bool {
        self.emit(ClientEvent::Message(ServerMessage::chat(text, Some(why))))
            .await
    }

    /// Report a connection failure
    pub async fn fail_connection(&self, description: &str) -> bool {
        self.emit(ClientEvent::Error {
            description: description.to_string(),
        })
        .await
    }

    /// Make every request method fail
    pub fn set_fail_requests(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    /// Make `send` fail
    pub fn set_fail_send(&self, fail: bool) {
        self.fail_send.store(fail, Ordering::SeqCst);
    }

    /// Hold `send` and the request methods until
    /// [`release_requests`](Self::release_requests)
    ///
    /// Held calls are recorded as soon as they are made.
    pub fn hold_requests(&self) {
        self.gate.send_replace(false);
    }

    /// Let held requests complete
    pub fn release_requests(&self) {
        self.gate.send_replace(true);
    }

    /// Every call made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Texts passed to `send`, in order
    #[must_use]
    pub fn sent_texts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                MockCall::Send { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    /// Whether `close` was called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn pass_gate(&self) {
        let mut gate = self.gate.subscribe();
        // The sender lives as long as `self`, so this only fails on teardown.
        let _ = gate.wait_for(|open| *open).await;
    }

    async fn request(&self, call: MockCall) -> anyhow::Result<serde_json::Value> {
        self.calls.lock().push(call.clone());
        self.pass_gate().await;

        if self.fail_requests.load(Ordering::SeqCst) {
            anyhow::bail!("scripted failure for {call:?}");
        }
        Ok(serde_json::json!({ "accepted": format!("{call:?}") }))
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendClient for MockClient {
    fn take_events(&self) -> Option<mpsc::Receiver<ClientEvent>> {
        self.events_rx.lock().take()
    }

    async fn send(&self, message: &OutboundMessage, user_id: &str) -> anyhow::Result<()> {
        self.calls.lock().push(MockCall::Send {
            text: message.text.clone(),
            user_id: user_id.to_string(),
        });
        self.pass_gate().await;

        if self.fail_send.load(Ordering::SeqCst) {
            anyhow::bail!("scripted send failure");
        }
        Ok(())
    }

    async fn upload_file(&self, file: &UploadFile) -> anyhow::Result<serde_json::Value> {
        self.request(MockCall::UploadFile {
            name: file.name.clone(),
        })
        .await
    }

    async fn upload_memory(&self, file: &UploadFile) -> anyhow::Result<serde_json::Value> {
        self.request(MockCall::UploadMemory {
            name: file.name.clone(),
        })
        .await
    }

    async fn upload_url(&self, url: &Url) -> anyhow::Result<serde_json::Value> {
        self.request(MockCall::UploadUrl {
            url: url.to_string(),
        })
        .await
    }

    async fn wipe_conversation_history(&self) -> anyhow::Result<serde_json::Value> {
        self.request(MockCall::WipeHistory).await
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Factory producing [`MockClient`]s and remembering every one it built
#[derive(Default)]
pub struct MockClientFactory {
    clients: Mutex<Vec<Arc<MockClient>>>,
    fail_next: AtomicBool,
}

impl MockClientFactory {
    /// Create a new factory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create` call fail
    pub fn fail_next_create(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Every client built so far, oldest first
    #[must_use]
    pub fn clients(&self) -> Vec<Arc<MockClient>> {
        self.clients.lock().clone()
    }

    /// The most recently built client
    #[must_use]
    pub fn latest(&self) -> Option<Arc<MockClient>> {
        self.clients.lock().last().cloned()
    }

    /// How many clients were built
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.clients.lock().len()
    }
}

impl ClientFactory for MockClientFactory {
    fn create(&self, settings: &WidgetSettings) -> anyhow::Result<Arc<dyn BackendClient>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            anyhow::bail!("cannot reach {}", settings.base_url());
        }
        let client = Arc::new(MockClient::with_settings(settings.clone()));
        self.clients.lock().push(Arc::clone(&client));
        Ok(client)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_are_taken_once() {
        let client = MockClient::new();
        let mut rx = client.take_events().unwrap();
        assert!(client.take_events().is_none());

        assert!(client.connect().await);
        assert_eq!(rx.recv().await, Some(ClientEvent::Connected));
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped() {
        let client = MockClient::new();
        drop(client.take_events());
        assert!(!client.reply("nobody home").await);
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let client = MockClient::new();
        client
            .send(&OutboundMessage::new("hello"), "user1")
            .await
            .unwrap();
        client.wipe_conversation_history().await.unwrap();

        assert_eq!(
            client.calls(),
            vec![
                MockCall::Send {
                    text: "hello".to_string(),
                    user_id: "user1".to_string()
                },
                MockCall::WipeHistory,
            ]
        );
        assert_eq!(client.sent_texts(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let client = MockClient::new();
        client.set_fail_requests(true);
        client.set_fail_send(true);

        assert!(client.wipe_conversation_history().await.is_err());
        assert!(client
            .send(&OutboundMessage::new("x"), "user")
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_held_requests_wait_for_release() {
        let client = Arc::new(MockClient::new());
        client.hold_requests();

        let pending = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.wipe_conversation_history().await }
        });

        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        client.release_requests();
        assert!(pending.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_held_send_is_recorded_before_release() {
        let client = Arc::new(MockClient::new());
        client.hold_requests();

        let pending = tokio::spawn({
            let client = Arc::clone(&client);
            async move { client.send(&OutboundMessage::new("hi"), "user").await }
        });

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(1);
        while client.sent_texts().is_empty() {
            assert!(tokio::time::Instant::now() < deadline, "send never started");
            tokio::task::yield_now().await;
        }
        assert!(!pending.is_finished());

        client.release_requests();
        assert!(pending.await.unwrap().is_ok());
    }

    #[test]
    fn test_factory_tracks_clients() {
        let factory = MockClientFactory::new();
        let settings = WidgetSettings::default();

        factory.create(&settings).unwrap();
        factory.fail_next_create();
        assert!(factory.create(&settings).is_err());
        factory.create(&settings).unwrap();

        assert_eq!(factory.created_count(), 2);
        assert_eq!(factory.latest().unwrap().settings(), Some(&settings));
    }
}
