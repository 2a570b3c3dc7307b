//! Widget Session Controller
//!
//! Owns the backend client and wires the stores to it. The embedding surface
//! talks only to the controller: it applies settings, forwards user input and
//! reads state from the stores.
//!
//! # Client lifecycle
//!
//! ```text
//!   apply_settings(new)  (no-op when equal to the current settings)
//!        │
//!        ├─ take the old client out of the handle
//!        ├─ abort its event pump, close it
//!        ├─ reset ready/loading, abandon in-flight uploads
//!        ├─ build a new client from the factory
//!        └─ install it under a new generation, spawn its event pump
//! ```
//!
//! There is never more than one client in the handle. Results from a client
//! that was swapped out while a request was in flight are dropped by the
//! stores.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

use crate::backend::{ClientFactory, ClientHandle, Generation, UploadFile};
use crate::config::{Feature, WidgetSettings};
use crate::conversation::{ConversationStore, SUGGESTION_COUNT};
use crate::events::{ClientEvent, NoopObserver, WidgetObserver};
use crate::messages::{Message, WhyMetadata};
use crate::notifications::NotificationCenter;
use crate::reset::ConversationResetService;
use crate::uploads::{classify_content, ContentAction, PastedContent, UploadCoordinator};

/// Drives one chat widget
pub struct WidgetSessionController {
    factory: Arc<dyn ClientFactory>,
    client: ClientHandle,
    settings: WidgetSettings,
    notifications: NotificationCenter,
    conversation: ConversationStore,
    uploads: UploadCoordinator,
    reset: ConversationResetService,
    suggestions: Vec<String>,
    /// Event pump of the live client
    pump: Option<JoinHandle<()>>,
}

impl WidgetSessionController {
    /// Create a controller with no client yet
    ///
    /// Nothing connects until [`apply_settings`](Self::apply_settings) is called.
    pub fn new(factory: Arc<dyn ClientFactory>) -> Self {
        Self::with_observer(factory, Arc::new(NoopObserver))
    }

    /// Create a controller reporting activity to `observer`
    pub fn with_observer(
        factory: Arc<dyn ClientFactory>,
        observer: Arc<dyn WidgetObserver>,
    ) -> Self {
        let client = ClientHandle::new();
        let notifications = NotificationCenter::with_observer(Arc::clone(&observer));
        let conversation =
            ConversationStore::new(client.clone(), notifications.clone(), Arc::clone(&observer));
        let uploads = UploadCoordinator::new(client.clone(), notifications.clone(), observer);

        let store = conversation.clone();
        let clear = move || store.clear_messages();
        let reset = ConversationResetService::new(client.clone(), notifications.clone(), clear);

        let settings = WidgetSettings::default();
        let suggestions = conversation
            .select_random_defaults(Some(settings.defaults.as_slice()), SUGGESTION_COUNT);

        Self {
            factory,
            client,
            settings,
            notifications,
            conversation,
            uploads,
            reset,
            suggestions,
            pump: None,
        }
    }

    /// Apply new settings, rebuilding the client when they changed
    ///
    /// Must be called from within a tokio runtime so the event pump can be
    /// spawned. Returns whether a new client was built.
    pub fn apply_settings(&mut self, settings: WidgetSettings) -> bool {
        if self.client.current().is_some() && self.settings == settings {
            tracing::debug!("Settings unchanged, keeping client");
            return false;
        }

        self.retire_client();
        self.settings = settings;
        self.suggestions = self
            .conversation
            .select_random_defaults(Some(self.settings.defaults.as_slice()), SUGGESTION_COUNT);

        if let Err(e) = self.settings.validate() {
            tracing::warn!(error = %e, "Rejecting widget settings");
            self.conversation.apply_event(ClientEvent::Error {
                description: e.to_string(),
            });
            return false;
        }

        let client = match self.factory.create(&self.settings) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(
                    url = %self.settings.base_url(),
                    error = %e,
                    "Failed to create backend client"
                );
                self.conversation.apply_event(ClientEvent::Error {
                    description: e.to_string(),
                });
                return false;
            }
        };

        let events = client.take_events();
        let live = self.client.install(client);
        tracing::info!(
            generation = %live.generation,
            url = %self.settings.base_url(),
            user = %self.settings.user_id,
            "Backend client installed"
        );

        match events {
            Some(events) => self.spawn_pump(live.generation, events),
            None => tracing::warn!(generation = %live.generation, "Client has no event stream"),
        }
        true
    }

    fn spawn_pump(&mut self, generation: Generation, events: mpsc::Receiver<ClientEvent>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                generation = %generation,
                "No async runtime, client events will not be applied"
            );
            return;
        };
        self.pump = Some(runtime.spawn(pump_events(
            generation,
            events,
            self.client.clone(),
            self.conversation.clone(),
        )));
    }

    fn retire_client(&mut self) {
        let previous = self.client.take();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Some(previous) = previous {
            previous.client.close();
            tracing::info!(generation = %previous.generation, "Backend client closed");
        }
        self.conversation.reset_connection();
        self.uploads.abandon();
    }

    /// Close the client and cancel pending notification timers
    pub fn shutdown(&mut self) {
        self.retire_client();
        self.notifications.dispose();
    }

    /// Send a chat message as the configured user
    ///
    /// Runs the configured preprocessor, if any. Returns whether a message
    /// was recorded.
    pub async fn send_message(&self, text: &str) -> bool {
        let callback = self.settings.callback.as_ref();
        self.conversation
            .dispatch(text, &self.settings.user_id, callback)
            .await
    }

    /// Route pasted or dropped content
    ///
    /// URLs go to the rabbit hole, other text becomes a chat message and
    /// files are uploaded concurrently. Returns whether everything that was
    /// attempted succeeded.
    pub async fn handle_content(&self, content: PastedContent) -> bool {
        match classify_content(content) {
            ContentAction::Website(url) => self.uploads.send_website(&url).await,
            ContentAction::Message(text) => self.send_message(&text).await,
            ContentAction::Files(files) => {
                let uploads = files.iter().map(|file| self.uploads.send_file(file));
                join_all(uploads).await.into_iter().all(|ok| ok)
            }
            ContentAction::Ignore => false,
        }
    }

    /// Upload a document from the attachment menu
    pub async fn upload_file(&self, file: &UploadFile) -> bool {
        if !self.feature_enabled(Feature::File) {
            return false;
        }
        self.uploads.send_file(file).await
    }

    /// Upload a memory export from the attachment menu
    pub async fn upload_memory(&self, file: &UploadFile) -> bool {
        if !self.feature_enabled(Feature::Memory) {
            return false;
        }
        self.uploads.send_memory(file).await
    }

    /// Submit a URL typed into the insert-URL dialog
    ///
    /// Blank or unparsable input is dropped without a notification.
    pub async fn submit_url(&self, raw: &str) -> bool {
        if !self.feature_enabled(Feature::Web) {
            return false;
        }
        let raw = raw.trim();
        if raw.is_empty() {
            return false;
        }
        match Url::parse(raw) {
            Ok(url) => self.uploads.send_website(&url).await,
            Err(e) => {
                tracing::debug!(input = %raw, error = %e, "Ignoring invalid URL");
                false
            }
        }
    }

    /// Wipe the conversation from the attachment menu
    pub async fn wipe_conversation(&self) -> bool {
        if !self.feature_enabled(Feature::Reset) {
            return false;
        }
        self.reset.wipe_conversation().await
    }

    fn feature_enabled(&self, feature: Feature) -> bool {
        let enabled = self.settings.has_feature(feature);
        if !enabled {
            tracing::debug!(feature = %feature, "Feature disabled");
        }
        enabled
    }

    /// Whether the input box should refuse new messages
    #[must_use]
    pub fn input_disabled(&self) -> bool {
        self.conversation.snapshot().input_disabled()
    }

    /// Whether the attachment menu has anything in it
    #[must_use]
    pub fn has_menu(&self) -> bool {
        self.settings.has_menu()
    }

    /// Whether voice input is enabled
    #[must_use]
    pub fn voice_enabled(&self) -> bool {
        self.settings.has_feature(Feature::Record)
    }

    /// Whether wiping makes sense right now
    #[must_use]
    pub fn can_wipe(&self) -> bool {
        self.settings.has_feature(Feature::Reset)
            && !self.conversation.snapshot().messages.is_empty()
    }

    /// Conversation starters for the empty state
    #[must_use]
    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Trace to show under a message, if the why panel is enabled
    #[must_use]
    pub fn why_for<'a>(&self, message: &'a Message) -> Option<&'a WhyMetadata> {
        if self.settings.why && message.is_bot() {
            message.why.as_ref()
        } else {
            None
        }
    }

    /// Current settings
    #[must_use]
    pub fn settings(&self) -> &WidgetSettings {
        &self.settings
    }

    /// Generation of the live client
    #[must_use]
    pub fn generation(&self) -> Option<Generation> {
        self.client.generation()
    }

    /// Conversation store
    #[must_use]
    pub fn conversation(&self) -> &ConversationStore {
        &self.conversation
    }

    /// Upload coordinator
    #[must_use]
    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    /// Notification center
    #[must_use]
    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    /// Reset service
    #[must_use]
    pub fn reset(&self) -> &ConversationResetService {
        &self.reset
    }
}

impl Drop for WidgetSessionController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for WidgetSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WidgetSessionController")
            .field("generation", &self.client.generation())
            .field("host", &self.settings.host)
            .field("conversation", &self.conversation)
            .finish_non_exhaustive()
    }
}

/// Drain one client's events into the conversation, in delivery order
async fn pump_events(
    generation: Generation,
    mut events: mpsc::Receiver<ClientEvent>,
    client: ClientHandle,
    conversation: ConversationStore,
) {
    while let Some(event) = events.recv().await {
        let apply = || conversation.apply_event(event);
        if client.with_current(generation, apply).is_none() {
            tracing::debug!(generation = %generation, "Dropping event from replaced client");
            return;
        }
    }
    tracing::debug!(generation = %generation, "Client event stream ended");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockCall, MockClientFactory};
    use pretty_assertions::assert_eq;

    fn controller() -> (WidgetSessionController, Arc<MockClientFactory>) {
        let factory = Arc::new(MockClientFactory::new());
        let session = WidgetSessionController::new(factory.clone());
        (session, factory)
    }

    #[tokio::test]
    async fn test_first_settings_build_a_client() {
        let (mut session, factory) = controller();
        assert!(session.generation().is_none());

        assert!(session.apply_settings(WidgetSettings::default()));
        assert_eq!(factory.created_count(), 1);
        assert!(session.generation().is_some());
    }

    #[tokio::test]
    async fn test_equal_settings_keep_the_client() {
        let (mut session, factory) = controller();
        session.apply_settings(WidgetSettings::default().with_host("cat.local"));
        let generation = session.generation();

        let same = WidgetSettings::default().with_host("cat.local");
        assert!(!session.apply_settings(same));
        assert_eq!(factory.created_count(), 1);
        assert_eq!(session.generation(), generation);
    }

    #[tokio::test]
    async fn test_changed_settings_swap_the_client() {
        let (mut session, factory) = controller();
        session.apply_settings(WidgetSettings::default());
        let first = session.generation().unwrap();

        let alice = WidgetSettings::default().with_user("alice");
        assert!(session.apply_settings(alice));
        let second = session.generation().unwrap();

        assert!(second > first);
        let clients = factory.clients();
        assert_eq!(clients.len(), 2);
        assert!(clients[0].is_closed());
        assert!(!clients[1].is_closed());
    }

    #[tokio::test]
    async fn test_invalid_settings_report_an_error() {
        let (mut session, factory) = controller();
        let hostless = WidgetSettings::default().with_host("");
        assert!(!session.apply_settings(hostless));

        assert_eq!(factory.created_count(), 0);
        assert!(session.conversation().snapshot().error.is_some());
        assert!(session.input_disabled());
    }

    #[tokio::test]
    async fn test_disabled_features_are_noops() {
        let (mut session, factory) = controller();
        session.apply_settings(WidgetSettings::default().with_features([Feature::Record]));

        let file = UploadFile::new("alice.txt", b"curiouser".to_vec());
        assert!(!session.upload_file(&file).await);
        assert!(!session.upload_memory(&file).await);
        assert!(!session.submit_url("https://example.com").await);
        assert!(!session.wipe_conversation().await);

        assert!(factory.latest().unwrap().calls().is_empty());
        assert!(!session.has_menu());
        assert!(session.voice_enabled());
    }

    #[tokio::test]
    async fn test_submit_url_ignores_garbage() {
        let (mut session, factory) = controller();
        session.apply_settings(WidgetSettings::default());

        assert!(!session.submit_url("   ").await);
        assert!(!session.submit_url("not a url").await);
        assert!(session.notifications().is_empty());

        assert!(session.submit_url(" https://example.com/alice ").await);
        assert_eq!(
            factory.latest().unwrap().calls(),
            vec![MockCall::UploadUrl {
                url: "https://example.com/alice".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_suggestions_follow_settings() {
        let (mut session, _) = controller();
        assert_eq!(session.suggestions().len(), SUGGESTION_COUNT);

        session.apply_settings(WidgetSettings::default().with_defaults(["only one"]));
        assert_eq!(session.suggestions(), ["only one".to_string()]);
    }

    #[tokio::test]
    async fn test_why_requires_setting_and_bot() {
        let (mut session, _) = controller();
        let reply = Message::bot("Hi", Some(WhyMetadata::default()));
        let mine = Message::user("Hello");

        assert!(session.why_for(&reply).is_none());

        session.apply_settings(WidgetSettings {
            why: true,
            ..WidgetSettings::default()
        });

        assert!(session.why_for(&reply).is_some());
        assert!(session.why_for(&mine).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_closes_client() {
        let (mut session, factory) = controller();
        session.apply_settings(WidgetSettings::default());
        session.shutdown();

        assert!(session.generation().is_none());
        assert!(factory.latest().unwrap().is_closed());
    }
}
