//! Rabbit Hole Uploads
//!
//! Files, memory exports and websites sent to the backend for indexing. The
//! coordinator keeps a single status slot: concurrent uploads share it and the
//! last one to settle wins. Every settled upload is reported through the
//! notification center.
//!
//! Pasted or dropped content is routed by [`classify_content`] before any of
//! the upload operations fire.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use url::Url;

use crate::backend::{
    try_request, ClientHandle, Generation, LiveClient, RequestOutcome, UploadFile,
};
use crate::events::{UploadTarget, WidgetObserver};
use crate::notifications::NotificationCenter;

const FILE_FAILURE: &str = "Unable to send the file to the rabbit hole";
const MEMORY_SUCCESS: &str = "Memories file successfully sent down the rabbit hole!";
const MEMORY_FAILURE: &str = "Unable to send the memories to the rabbit hole";
const WEBSITE_SUCCESS: &str = "Website successfully sent down the rabbit hole";
const WEBSITE_FAILURE: &str = "Unable to send the website to the rabbit hole";

/// Observable upload status
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UploadState {
    /// An upload is in flight
    pub loading: bool,
    /// Outcome of the upload that settled last
    pub last_result: Option<RequestOutcome>,
}

/// Sends files and websites down the rabbit hole
///
/// Cheap to clone; clones share the same status slot.
#[derive(Clone)]
pub struct UploadCoordinator {
    state: Arc<watch::Sender<UploadState>>,
    client: ClientHandle,
    notifications: NotificationCenter,
    observer: Arc<dyn WidgetObserver>,
}

impl UploadCoordinator {
    /// Create an idle coordinator
    pub fn new(
        client: ClientHandle,
        notifications: NotificationCenter,
        observer: Arc<dyn WidgetObserver>,
    ) -> Self {
        let (state, _) = watch::channel(UploadState::default());
        Self {
            state: Arc::new(state),
            client,
            notifications,
            observer,
        }
    }

    /// Current status
    #[must_use]
    pub fn snapshot(&self) -> UploadState {
        self.state.borrow().clone()
    }

    /// Watch the status for changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    /// Upload a document to index
    ///
    /// Returns whether the upload succeeded. A result produced by a client
    /// that has since been replaced is dropped and reported as false.
    pub async fn send_file(&self, file: &UploadFile) -> bool {
        self.observer.on_upload(UploadTarget::File(file));
        let success = format!(
            "File {} successfully sent down the rabbit hole!",
            file.name
        );

        match self.begin("file") {
            Some(live) => {
                let request = live.client.upload_file(file);
                let outcome = try_request(request, success, FILE_FAILURE).await;
                self.settle(Some(live.generation), outcome)
            }
            None => self.settle(None, RequestOutcome::error(FILE_FAILURE)),
        }
    }

    /// Upload an exported memory file
    pub async fn send_memory(&self, file: &UploadFile) -> bool {
        self.observer.on_memory(file);

        match self.begin("memory") {
            Some(live) => {
                let request = live.client.upload_memory(file);
                let outcome = try_request(request, MEMORY_SUCCESS, MEMORY_FAILURE).await;
                self.settle(Some(live.generation), outcome)
            }
            None => self.settle(None, RequestOutcome::error(MEMORY_FAILURE)),
        }
    }

    /// Submit a website to scrape and index
    pub async fn send_website(&self, url: &Url) -> bool {
        self.observer.on_upload(UploadTarget::Website(url));

        match self.begin("website") {
            Some(live) => {
                let request = live.client.upload_url(url);
                let outcome = try_request(request, WEBSITE_SUCCESS, WEBSITE_FAILURE).await;
                self.settle(Some(live.generation), outcome)
            }
            None => self.settle(None, RequestOutcome::error(WEBSITE_FAILURE)),
        }
    }

    /// Stop waiting on uploads started by a client that is going away
    pub fn abandon(&self) {
        self.state
            .send_if_modified(|state| std::mem::replace(&mut state.loading, false));
    }

    fn begin(&self, kind: &'static str) -> Option<LiveClient> {
        let live = self.client.current();
        self.state.send_modify(|state| state.loading = true);

        match &live {
            Some(live) => tracing::debug!(kind, generation = %live.generation, "Starting upload"),
            None => tracing::warn!(kind, "No live client for upload"),
        }
        live
    }

    fn settle(&self, generation: Option<Generation>, outcome: RequestOutcome) -> bool {
        let record = || {
            self.state.send_modify(|state| {
                state.loading = false;
                state.last_result = Some(outcome.clone());
            });
            self.notifications.from_result(&outcome)
        };

        let Some(generation) = generation else {
            return record();
        };
        let settled = self.client.with_current(generation, record);
        settled.unwrap_or_else(|| {
            tracing::warn!(%generation, "Dropping upload result from replaced client");
            false
        })
    }
}

impl fmt::Debug for UploadCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadCoordinator")
            .field("loading", &self.state.borrow().loading)
            .finish_non_exhaustive()
    }
}

/// Content pasted into or dropped onto the widget
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PastedContent {
    /// Plain text, if any
    pub text: Option<String>,
    /// Attached files
    pub files: Vec<UploadFile>,
}

impl PastedContent {
    /// Content carrying only text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            files: Vec::new(),
        }
    }

    /// Content carrying only files
    pub fn files(files: Vec<UploadFile>) -> Self {
        Self { text: None, files }
    }
}

/// What to do with pasted or dropped content
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ContentAction {
    /// Submit the URL to the rabbit hole
    Website(Url),
    /// Send the text as a chat message
    Message(String),
    /// Upload each file
    Files(Vec<UploadFile>),
    /// Nothing to do
    Ignore,
}

/// Route pasted or dropped content
///
/// Non-empty text wins over files. Text that parses as an absolute URL is a
/// website, any other non-blank text is a chat message and blank text is
/// ignored. Without text, the files are uploaded.
pub fn classify_content(content: PastedContent) -> ContentAction {
    match content.text {
        Some(text) if !text.is_empty() => {
            if text.trim().is_empty() {
                ContentAction::Ignore
            } else if let Ok(url) = Url::parse(&text) {
                ContentAction::Website(url)
            } else {
                ContentAction::Message(text)
            }
        }
        _ if content.files.is_empty() => ContentAction::Ignore,
        _ => ContentAction::Files(content.files),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::mock::{MockCall, MockClient};
    use crate::events::NoopObserver;
    use crate::notifications::NotificationKind;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn coordinator() -> (UploadCoordinator, ClientHandle, NotificationCenter) {
        let handle = ClientHandle::new();
        let notifications = NotificationCenter::new();
        let uploads = UploadCoordinator::new(
            handle.clone(),
            notifications.clone(),
            Arc::new(NoopObserver),
        );
        (uploads, handle, notifications)
    }

    fn alice() -> UploadFile {
        UploadFile::new("alice.txt", b"Down the rabbit hole".to_vec())
    }

    #[tokio::test]
    async fn test_send_file_success() {
        let (uploads, handle, notifications) = coordinator();
        let mock = Arc::new(MockClient::new());
        handle.install(mock.clone());

        assert!(uploads.send_file(&alice()).await);

        assert_eq!(
            mock.calls(),
            vec![MockCall::UploadFile {
                name: "alice.txt".to_string()
            }]
        );
        let state = uploads.snapshot();
        assert!(!state.loading);
        assert!(state.last_result.unwrap().is_success());

        let shown = notifications.visible();
        assert_eq!(shown[0].kind, NotificationKind::Success);
        assert_eq!(
            shown[0].text,
            "File alice.txt successfully sent down the rabbit hole!"
        );
    }

    #[tokio::test]
    async fn test_failures_become_notifications() {
        let (uploads, handle, notifications) = coordinator();
        let mock = Arc::new(MockClient::new());
        mock.set_fail_requests(true);
        handle.install(mock.clone());

        assert!(!uploads.send_memory(&alice()).await);
        let url = Url::parse("https://example.com/wonderland").unwrap();
        assert!(!uploads.send_website(&url).await);

        let texts: Vec<_> = notifications
            .history()
            .into_iter()
            .map(|n| n.text)
            .collect();
        assert_eq!(texts, vec![MEMORY_FAILURE, WEBSITE_FAILURE]);
        assert!(!uploads.snapshot().loading);
    }

    #[tokio::test]
    async fn test_no_client_reports_failure() {
        let (uploads, _, notifications) = coordinator();

        assert!(!uploads.send_file(&alice()).await);
        assert_eq!(notifications.visible()[0].text, FILE_FAILURE);
        assert_eq!(
            uploads.snapshot().last_result,
            Some(RequestOutcome::error(FILE_FAILURE))
        );
    }

    #[tokio::test]
    async fn test_loading_while_in_flight() {
        let (uploads, handle, _) = coordinator();
        let mock = Arc::new(MockClient::new());
        mock.hold_requests();
        handle.install(mock.clone());

        let pending = tokio::spawn({
            let uploads = uploads.clone();
            async move { uploads.send_file(&alice()).await }
        });

        let mut rx = uploads.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.loading))
            .await
            .unwrap()
            .unwrap();

        mock.release_requests();
        assert!(pending.await.unwrap());
        assert!(!uploads.snapshot().loading);
    }

    #[tokio::test]
    async fn test_stale_result_is_dropped() {
        let (uploads, handle, notifications) = coordinator();
        let old = Arc::new(MockClient::new());
        old.hold_requests();
        handle.install(old.clone());

        let pending = tokio::spawn({
            let uploads = uploads.clone();
            async move { uploads.send_file(&alice()).await }
        });
        let mut rx = uploads.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.loading))
            .await
            .unwrap()
            .unwrap();

        handle.take();
        uploads.abandon();
        handle.install(Arc::new(MockClient::new()));
        old.release_requests();

        assert!(!pending.await.unwrap());
        assert_eq!(uploads.snapshot(), UploadState::default());
        assert!(notifications.is_empty());
    }

    #[test]
    fn test_classify_url() {
        let action = classify_content(PastedContent::text("https://cheshirecat.ai"));
        assert_eq!(
            action,
            ContentAction::Website(Url::parse("https://cheshirecat.ai").unwrap())
        );
    }

    #[test]
    fn test_classify_plain_text() {
        assert_eq!(
            classify_content(PastedContent::text("not a url")),
            ContentAction::Message("not a url".to_string())
        );
    }

    #[test]
    fn test_classify_blank_and_empty() {
        assert_eq!(
            classify_content(PastedContent::text("   ")),
            ContentAction::Ignore
        );
        assert_eq!(
            classify_content(PastedContent::default()),
            ContentAction::Ignore
        );
    }

    #[test]
    fn test_classify_files() {
        let content = PastedContent {
            text: Some(String::new()),
            files: vec![alice()],
        };
        assert_eq!(
            classify_content(content),
            ContentAction::Files(vec![alice()])
        );

        let with_text = PastedContent {
            text: Some("hello".to_string()),
            files: vec![alice()],
        };
        assert_eq!(
            classify_content(with_text),
            ContentAction::Message("hello".to_string())
        );
    }
}
