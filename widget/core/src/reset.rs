//! Conversation Reset
//!
//! Wipes the backend's in-memory conversation and, when that worked, clears
//! the local transcript. The service never touches the conversation store
//! directly: it is handed a mutator that clears the history.

use std::fmt;
use std::sync::Arc;

use crate::backend::{try_request, ClientHandle, RequestOutcome};
use crate::notifications::NotificationCenter;

const WIPE_SUCCESS: &str = "The current conversation was wiped";
const WIPE_FAILURE: &str = "Unable to wipe the in-memory current conversation";

type ClearHistory = dyn Fn() + Send + Sync;

/// Wipes the current conversation
#[derive(Clone)]
pub struct ConversationResetService {
    client: ClientHandle,
    notifications: NotificationCenter,
    clear_history: Arc<ClearHistory>,
}

impl ConversationResetService {
    /// Create a service that runs `clear_history` after a successful wipe
    pub fn new<F>(
        client: ClientHandle,
        notifications: NotificationCenter,
        clear_history: F,
    ) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            client,
            notifications,
            clear_history: Arc::new(clear_history),
        }
    }

    /// Wipe the conversation on the backend and locally
    ///
    /// The outcome is always shown as a notification. Returns whether the
    /// wipe succeeded; a result from a client replaced mid-request is
    /// dropped and reported as false.
    pub async fn wipe_conversation(&self) -> bool {
        let Some(live) = self.client.current() else {
            tracing::warn!("No live client to wipe the conversation");
            return self
                .notifications
                .from_result(&RequestOutcome::error(WIPE_FAILURE));
        };

        let outcome = try_request(
            live.client.wipe_conversation_history(),
            WIPE_SUCCESS,
            WIPE_FAILURE,
        )
        .await;

        let settled = self.client.with_current(live.generation, || {
            if outcome.is_success() {
                tracing::info!("Conversation wiped");
                (self.clear_history)();
            }
            self.notifications.from_result(&outcome)
        });

        settled.unwrap_or_else(|| {
            tracing::warn!(
                generation = %live.generation,
                "Dropping wipe result from replaced client"
            );
            false
        })
    }
}

impl fmt::Debug for ConversationResetService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversationResetService")
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}
