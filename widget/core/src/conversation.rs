//! Conversation Store
//!
//! Holds the chat transcript and the connection-derived flags the input box
//! depends on. Connection events come in through [`ConversationStore::apply_event`]
//! in delivery order; user input goes out through [`ConversationStore::dispatch`].
//!
//! # State machine
//!
//! ```text
//!   Connected      ─▶ ready = true
//!   Disconnected   ─▶ ready = false
//!   Error(desc)    ─▶ ready = false, loading = false, error = desc
//!   chat reply     ─▶ append bot message, loading = false, error cleared
//!   notification   ─▶ NotificationCenter (no state change)
//!   user dispatch  ─▶ append user message, loading = true, error cleared
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::watch;

use crate::backend::{ClientHandle, OutboundMessage};
use crate::events::{ClientEvent, ServerMessage, ServerMessageKind, WidgetObserver};
use crate::messages::{Message, Sender};
use crate::notifications::{NotificationCenter, NotificationKind};

/// How many suggestions the widget offers
pub const SUGGESTION_COUNT: usize = 5;

/// Built-in conversation starters
pub const DEFAULT_SUGGESTIONS: &[&str] = &[
    "What's up?",
    "Who's the Queen of Hearts?",
    "Where is the white rabbit?",
    "What is Python?",
    "How do I write my own AI app?",
    "Does pineapple belong on pizza?",
    "What is the meaning of life?",
    "What is the best programming language?",
    "What is the best pizza topping?",
    "What is a language model?",
    "What is a neural network?",
    "What is a chatbot?",
    "What time is it?",
    "Is AI capable of creating art?",
    "What is the best way to learn AI?",
    "Is it worth learning AI?",
    "Who is the Cheshire Cat?",
    "Is Alice in Wonderland a true story?",
    "Who is the Mad Hatter?",
    "How do I find my way to Wonderland?",
    "Is Wonderland a real place?",
];

type PreprocessFn = dyn Fn(String) -> BoxFuture<'static, anyhow::Result<String>> + Send + Sync;

/// Async hook rewriting user text before it goes over the wire
///
/// Two preprocessors compare equal only when they share the same closure.
#[derive(Clone)]
pub struct MessagePreprocessor(Arc<PreprocessFn>);

impl MessagePreprocessor {
    /// Wrap an async closure
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        Self(Arc::new(move |text| f(text).boxed()))
    }

    /// Run the hook on `text`
    pub async fn apply(&self, text: String) -> anyhow::Result<String> {
        (self.0)(text).await
    }
}

impl PartialEq for MessagePreprocessor {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for MessagePreprocessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MessagePreprocessor(..)")
    }
}

/// Observable conversation state
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConversationState {
    /// The connection has been established
    pub ready: bool,
    /// Waiting for a reply to the last user message
    pub loading: bool,
    /// Last connection error, cleared by the next message
    pub error: Option<String>,
    /// Transcript, oldest first
    pub messages: Vec<Message>,
}

impl ConversationState {
    /// Whether the input box should refuse new messages
    #[must_use]
    pub fn input_disabled(&self) -> bool {
        self.loading || !self.ready || self.error.is_some()
    }
}

/// The conversation store
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ConversationStore {
    state: Arc<watch::Sender<ConversationState>>,
    client: ClientHandle,
    notifications: NotificationCenter,
    observer: Arc<dyn WidgetObserver>,
}

impl ConversationStore {
    /// Create an empty store reading the live client from `client`
    pub fn new(
        client: ClientHandle,
        notifications: NotificationCenter,
        observer: Arc<dyn WidgetObserver>,
    ) -> Self {
        let (state, _) = watch::channel(ConversationState::default());
        Self {
            state: Arc::new(state),
            client,
            notifications,
            observer,
        }
    }

    /// Current state
    #[must_use]
    pub fn snapshot(&self) -> ConversationState {
        self.state.borrow().clone()
    }

    /// Watch the state for changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationState> {
        self.state.subscribe()
    }

    /// Apply one connection event
    pub fn apply_event(&self, event: ClientEvent) {
        match event {
            ClientEvent::Connected => {
                tracing::info!("Connected to backend");
                self.state.send_modify(|state| state.ready = true);
            }
            ClientEvent::Disconnected => {
                tracing::info!("Disconnected from backend");
                self.state.send_modify(|state| state.ready = false);
            }
            ClientEvent::Error { description } => {
                tracing::warn!(error = %description, "Backend connection error");
                self.state.send_modify(|state| {
                    state.ready = false;
                    state.loading = false;
                    state.error = Some(description);
                });
            }
            ClientEvent::Message(message) => self.apply_server_message(message),
        }
    }

    fn apply_server_message(&self, message: ServerMessage) {
        match message.kind {
            ServerMessageKind::Chat => {
                self.append(Message::bot(message.content, message.why));
            }
            ServerMessageKind::Notification => {
                self.notifications
                    .show(NotificationKind::Info, message.content);
            }
            kind => {
                tracing::trace!(kind = ?kind, "Ignoring server message");
            }
        }
    }

    fn append(&self, message: Message) {
        let loading = message.sender == Sender::User;
        tracing::debug!(id = %message.id, sender = ?message.sender, "Appending message");

        self.state.send_modify(|state| {
            state.error = None;
            state.loading = loading;
            state.messages.push(message.clone());
        });
        self.observer.on_message(&message);
    }

    /// Send user input to the backend and record it locally
    ///
    /// Blank input does nothing. The local record keeps the trimmed original
    /// text even when `preprocessor` rewrites what goes over the wire. Returns
    /// whether a message was recorded.
    pub async fn dispatch(
        &self,
        text: &str,
        user_id: &str,
        preprocessor: Option<&MessagePreprocessor>,
    ) -> bool {
        let original = text.trim();
        if original.is_empty() {
            tracing::debug!("Ignoring blank message");
            return false;
        }

        let outbound = match preprocessor {
            Some(preprocessor) => match preprocessor.apply(text.to_string()).await {
                Ok(rewritten) => rewritten,
                Err(e) => {
                    tracing::warn!(error = %e, "Message preprocessor failed");
                    self.notifications
                        .show(NotificationKind::Error, "Unable to prepare the message");
                    return false;
                }
            },
            None => text.to_string(),
        };

        let live = self.client.current();
        self.append(Message::user(original));

        let Some(live) = live else {
            tracing::warn!("No live client, message recorded but not sent");
            return true;
        };

        // Failures surface later as a connection error event.
        if let Err(e) = live
            .client
            .send(&OutboundMessage::new(outbound), user_id)
            .await
        {
            tracing::warn!(generation = %live.generation, error = %e, "Failed to send message");
        }
        true
    }

    /// Drop every message, keeping the connection flags
    pub fn clear_messages(&self) {
        self.state.send_modify(|state| state.messages.clear());
    }

    /// Forget connection-derived flags before a new client takes over
    pub fn reset_connection(&self) {
        self.state.send_modify(|state| {
            state.ready = false;
            state.loading = false;
            state.error = None;
        });
    }

    /// Pick up to `n` conversation starters in random order
    ///
    /// Draws from `defaults` when it has entries, otherwise from
    /// [`DEFAULT_SUGGESTIONS`].
    #[must_use]
    pub fn select_random_defaults(&self, defaults: Option<&[String]>, n: usize) -> Vec<String> {
        let mut pool: Vec<String> = match defaults {
            Some(defaults) if !defaults.is_empty() => defaults.to_vec(),
            _ => DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
        };
        pool.shuffle(&mut rand::thread_rng());
        pool.truncate(n);
        pool
    }
}

impl fmt::Debug for ConversationStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("ConversationStore")
            .field("ready", &state.ready)
            .field("loading", &state.loading)
            .field("messages", &state.messages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::MockClient;
    use crate::events::NoopObserver;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn store() -> (ConversationStore, ClientHandle, NotificationCenter) {
        let handle = ClientHandle::new();
        let notifications = NotificationCenter::new();
        let store = ConversationStore::new(
            handle.clone(),
            notifications.clone(),
            Arc::new(NoopObserver),
        );
        (store, handle, notifications)
    }

    fn texts(store: &ConversationStore) -> Vec<String> {
        store
            .snapshot()
            .messages
            .into_iter()
            .map(|m| m.text)
            .collect()
    }

    #[test]
    fn test_initial_state() {
        let (store, _, _) = store();
        assert_eq!(store.snapshot(), ConversationState::default());
        assert!(store.snapshot().input_disabled());
    }

    #[test]
    fn test_connect_then_reply() {
        let (store, _, _) = store();
        store.apply_event(ClientEvent::Connected);
        store.apply_event(ClientEvent::Message(ServerMessage::chat("Hi", None)));

        let state = store.snapshot();
        assert!(state.ready);
        assert!(!state.loading);
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.messages[0].sender, Sender::Bot);
        assert_eq!(state.messages[0].text, "Hi");
    }

    #[test]
    fn test_replies_append_in_order() {
        let (store, _, _) = store();
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            store.apply_event(ClientEvent::Message(ServerMessage::chat(*text, None)));
            assert_eq!(store.snapshot().messages.len(), i + 1);
        }
        assert_eq!(texts(&store), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_error_then_reply_clears_error() {
        let (store, _, _) = store();
        store.apply_event(ClientEvent::Connected);
        store.apply_event(ClientEvent::Error {
            description: "socket closed".to_string(),
        });

        let state = store.snapshot();
        assert!(!state.ready);
        assert_eq!(state.error.as_deref(), Some("socket closed"));

        store.apply_event(ClientEvent::Message(ServerMessage::chat("back", None)));
        assert!(store.snapshot().error.is_none());
    }

    #[test]
    fn test_disconnect_keeps_messages() {
        let (store, _, _) = store();
        store.apply_event(ClientEvent::Connected);
        store.apply_event(ClientEvent::Message(ServerMessage::chat("Hi", None)));
        store.apply_event(ClientEvent::Disconnected);

        let state = store.snapshot();
        assert!(!state.ready);
        assert_eq!(state.messages.len(), 1);
    }

    #[test]
    fn test_server_notification_goes_to_center() {
        let (store, _, notifications) = store();
        store.apply_event(ClientEvent::Message(ServerMessage::notification(
            "Finished reading file",
        )));

        assert!(store.snapshot().messages.is_empty());
        let visible = notifications.visible();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].kind, NotificationKind::Info);
        assert_eq!(visible[0].text, "Finished reading file");
    }

    #[test]
    fn test_token_messages_are_ignored() {
        let (store, _, notifications) = store();
        store.apply_event(ClientEvent::Message(ServerMessage {
            content: "partial".to_string(),
            kind: ServerMessageKind::ChatToken,
            why: None,
        }));
        assert!(store.snapshot().messages.is_empty());
        assert!(notifications.is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_sends_and_appends() {
        let (store, handle, _) = store();
        let mock = Arc::new(MockClient::new());
        handle.install(mock.clone());

        assert!(store.dispatch("hello", "user1", None).await);

        assert_eq!(
            mock.calls(),
            vec![crate::backend::mock::MockCall::Send {
                text: "hello".to_string(),
                user_id: "user1".to_string(),
            }]
        );
        let state = store.snapshot();
        assert!(state.loading);
        assert_eq!(state.messages[0].sender, Sender::User);
        assert_eq!(state.messages[0].text, "hello");

        store.apply_event(ClientEvent::Message(ServerMessage::chat("Hi!", None)));
        assert!(!store.snapshot().loading);
    }

    #[tokio::test]
    async fn test_reply_during_send_lands_after_user_message() {
        let (store, handle, _) = store();
        let mock = Arc::new(MockClient::new());
        mock.hold_requests();
        handle.install(mock.clone());
        store.apply_event(ClientEvent::Connected);

        let pending = tokio::spawn({
            let store = store.clone();
            async move { store.dispatch("hello", "user", None).await }
        });

        let mut rx = store.subscribe();
        let wait = rx.wait_for(|state| !state.messages.is_empty());
        tokio::time::timeout(Duration::from_secs(1), wait)
            .await
            .unwrap()
            .unwrap();
        assert!(!pending.is_finished());

        store.apply_event(ClientEvent::Message(ServerMessage::chat("Hi", None)));
        mock.release_requests();
        assert!(pending.await.unwrap());

        assert_eq!(texts(&store), vec!["hello", "Hi"]);
        assert!(!store.snapshot().loading);
        assert_eq!(mock.sent_texts(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_dispatch_is_noop() {
        let (store, handle, _) = store();
        let mock = Arc::new(MockClient::new());
        handle.install(mock.clone());

        assert!(!store.dispatch("", "user", None).await);
        assert!(!store.dispatch("   ", "user", None).await);

        assert!(mock.calls().is_empty());
        assert!(store.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn test_preprocessor_rewrites_outbound_only() {
        let (store, handle, _) = store();
        let mock = Arc::new(MockClient::new());
        handle.install(mock.clone());

        let shout = MessagePreprocessor::new(|text: String| async move {
            Ok::<_, anyhow::Error>(text.to_uppercase())
        });
        store.dispatch("  hello there ", "user", Some(&shout)).await;

        assert_eq!(mock.sent_texts(), vec!["  HELLO THERE ".to_string()]);
        assert_eq!(texts(&store), vec!["hello there"]);
    }

    #[tokio::test]
    async fn test_failing_preprocessor_drops_message() {
        let (store, handle, notifications) = store();
        let mock = Arc::new(MockClient::new());
        handle.install(mock.clone());

        let broken = MessagePreprocessor::new(|_: String| async {
            Err::<String, _>(anyhow::anyhow!("no way"))
        });
        assert!(!store.dispatch("hello", "user", Some(&broken)).await);

        assert!(mock.calls().is_empty());
        assert!(store.snapshot().messages.is_empty());
        assert_eq!(notifications.visible()[0].kind, NotificationKind::Error);
    }

    #[tokio::test]
    async fn test_send_failure_still_records_message() {
        let (store, handle, _) = store();
        let mock = Arc::new(MockClient::new());
        mock.set_fail_send(true);
        handle.install(mock.clone());

        assert!(store.dispatch("hello", "user", None).await);
        assert_eq!(texts(&store), vec!["hello"]);
        assert!(store.snapshot().loading);
    }

    #[tokio::test]
    async fn test_dispatch_without_client_records_message() {
        let (store, _, _) = store();
        assert!(store.dispatch("anyone?", "user", None).await);
        assert_eq!(texts(&store), vec!["anyone?"]);
    }

    #[test]
    fn test_clear_messages_keeps_flags() {
        let (store, _, _) = store();
        store.apply_event(ClientEvent::Connected);
        store.apply_event(ClientEvent::Message(ServerMessage::chat("Hi", None)));
        store.clear_messages();

        let state = store.snapshot();
        assert!(state.ready);
        assert!(state.messages.is_empty());
    }

    #[test]
    fn test_reset_connection() {
        let (store, _, _) = store();
        store.apply_event(ClientEvent::Error {
            description: "gone".to_string(),
        });
        store.reset_connection();
        assert_eq!(store.snapshot(), ConversationState::default());
    }

    #[test]
    fn test_random_defaults_is_a_permutation() {
        let (store, _, _) = store();
        let defaults = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let mut picked = store.select_random_defaults(Some(&defaults), SUGGESTION_COUNT);
        picked.sort();
        assert_eq!(picked, defaults);
    }

    #[test]
    fn test_random_defaults_falls_back_to_builtin() {
        let (store, _, _) = store();
        for defaults in [None, Some(&[][..])] {
            let picked = store.select_random_defaults(defaults, SUGGESTION_COUNT);
            assert_eq!(picked.len(), SUGGESTION_COUNT);
            assert!(picked
                .iter()
                .all(|s| DEFAULT_SUGGESTIONS.contains(&s.as_str())));
        }
    }

    #[test]
    fn test_preprocessor_equality_is_identity() {
        let a = MessagePreprocessor::new(|t: String| async move { Ok::<_, anyhow::Error>(t) });
        let b = MessagePreprocessor::new(|t: String| async move { Ok::<_, anyhow::Error>(t) });
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }
}
