//! Notification Center
//!
//! Transient feedback for the user: upload results, wipe results, server-side
//! notices. Every notification starts visible and hides itself after a
//! timeout. Nothing is ever removed from the history; the visible list is a
//! filtered view of it.
//!
//! # Timers
//!
//! Each notification gets its own expiry task. The task's abort handle is
//! kept per notification id, so hiding early or disposing the center cancels
//! pending expiries instead of letting them fire against a dead widget. Expiry
//! tasks hold only a weak reference to the center.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::backend::{RequestOutcome, RequestStatus};
use crate::events::{NoopObserver, WidgetObserver};

/// How long a notification stays visible unless told otherwise
pub const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_millis(3000);

/// Notification identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(pub String);

impl NotificationId {
    /// Generate a new unique notification ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("n_{id}"))
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Notification kinds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    /// Informational
    Info,
    /// Something worked
    Success,
    /// Something failed
    Error,
}

impl From<RequestStatus> for NotificationKind {
    fn from(status: RequestStatus) -> Self {
        match status {
            RequestStatus::Success => Self::Success,
            RequestStatus::Error => Self::Error,
        }
    }
}

/// A user-facing notification
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique notification ID
    pub id: NotificationId,
    /// Notification kind
    pub kind: NotificationKind,
    /// Text to show
    pub text: String,
    /// Whether the notification has been hidden
    pub hidden: bool,
}

impl Notification {
    /// Create a new visible notification
    pub fn new(kind: NotificationKind, text: impl Into<String>) -> Self {
        Self {
            id: NotificationId::new(),
            kind,
            text: text.into(),
            hidden: false,
        }
    }
}

struct Inner {
    history: watch::Sender<Vec<Notification>>,
    timers: Mutex<HashMap<NotificationId, AbortHandle>>,
    observer: Arc<dyn WidgetObserver>,
    default_timeout: Duration,
}

impl Inner {
    /// Flag a notification hidden; returns whether anything changed
    fn mark_hidden(&self, id: &NotificationId) -> bool {
        self.history.send_if_modified(|history| {
            let Some(notification) = history.iter_mut().find(|n| &n.id == id) else {
                return false;
            };
            !std::mem::replace(&mut notification.hidden, true)
        })
    }

    fn cancel_all(&self) -> usize {
        let timers: Vec<_> = self.timers.lock().drain().collect();
        for (_, timer) in &timers {
            timer.abort();
        }
        timers.len()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

/// Holds transient notifications and their expiry timers
///
/// Cheap to clone; clones share the same history.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<Inner>,
}

impl NotificationCenter {
    /// Create a center with the default timeout and no observer
    #[must_use]
    pub fn new() -> Self {
        Self::with_observer(Arc::new(NoopObserver))
    }

    /// Create a center reporting shown notifications to `observer`
    #[must_use]
    pub fn with_observer(observer: Arc<dyn WidgetObserver>) -> Self {
        Self::with_timeout(observer, DEFAULT_NOTIFICATION_TIMEOUT)
    }

    /// Create a center with a custom default timeout
    #[must_use]
    pub fn with_timeout(observer: Arc<dyn WidgetObserver>, default_timeout: Duration) -> Self {
        let (history, _) = watch::channel(Vec::new());
        Self {
            inner: Arc::new(Inner {
                history,
                timers: Mutex::new(HashMap::new()),
                observer,
                default_timeout,
            }),
        }
    }

    /// Show a notification for the default timeout
    pub fn show(&self, kind: NotificationKind, text: impl Into<String>) -> NotificationId {
        self.show_with_timeout(kind, text, self.inner.default_timeout)
    }

    /// Show a notification that hides itself after `timeout`
    ///
    /// Outside a tokio runtime the notification is shown but never expires;
    /// call [`hide`](Self::hide) to dismiss it.
    pub fn show_with_timeout(
        &self,
        kind: NotificationKind,
        text: impl Into<String>,
        timeout: Duration,
    ) -> NotificationId {
        let notification = Notification::new(kind, text);
        let id = notification.id.clone();

        tracing::debug!(id = %id, kind = ?kind, timeout = ?timeout, "Showing notification");
        self.inner.observer.on_notification(&notification);
        self.inner
            .history
            .send_modify(|history| history.push(notification));
        self.schedule_hide(id.clone(), timeout);

        id
    }

    fn schedule_hide(&self, id: NotificationId, timeout: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(id = %id, "No async runtime, notification will not expire");
            return;
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let timer_id = id.clone();

        // Hold the table while spawning so the timer cannot fire before it is registered.
        let mut timers = self.inner.timers.lock();
        let task = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.timers.lock().remove(&timer_id);
                if inner.mark_hidden(&timer_id) {
                    tracing::trace!(id = %timer_id, "Notification expired");
                }
            }
        });
        timers.insert(id, task.abort_handle());
    }

    /// Hide a notification and cancel its expiry
    ///
    /// Hiding an unknown or already hidden notification does nothing.
    pub fn hide(&self, id: &NotificationId) {
        if let Some(timer) = self.inner.timers.lock().remove(id) {
            timer.abort();
        }
        self.inner.mark_hidden(id);
    }

    /// Visible notifications, oldest first
    #[must_use]
    pub fn visible(&self) -> Vec<Notification> {
        self.inner
            .history
            .borrow()
            .iter()
            .filter(|n| !n.hidden)
            .cloned()
            .collect()
    }

    /// Every notification ever shown, oldest first
    #[must_use]
    pub fn history(&self) -> Vec<Notification> {
        self.inner.history.borrow().clone()
    }

    /// Number of notifications ever shown
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.history.borrow().len()
    }

    /// Whether no notification was ever shown
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of expiry timers still pending
    #[must_use]
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.lock().len()
    }

    /// Watch the history for changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Notification>> {
        self.inner.history.subscribe()
    }

    /// Show a request outcome; returns true unless it is an error
    pub fn from_result(&self, outcome: &RequestOutcome) -> bool {
        self.show(outcome.status.into(), outcome.message.clone());
        outcome.is_success()
    }

    /// Cancel every pending expiry
    ///
    /// Notifications already shown keep their current visibility.
    pub fn dispose(&self) {
        let cancelled = self.inner.cancel_all();
        if cancelled > 0 {
            tracing::debug!(cancelled, "Cancelled pending notification timers");
        }
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("len", &self.len())
            .field("pending_timers", &self.pending_timers())
            .finish()
    }
}
