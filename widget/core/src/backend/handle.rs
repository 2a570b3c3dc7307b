//! Live Client Handle
//!
//! The single slot through which every store reaches the backend. The session
//! controller is the only writer; stores read the slot when they start a call
//! and compare generations after every await, so a response produced by a
//! client that has since been replaced is recognised and dropped.
//!
//! ```text
//!   WidgetSessionController ──replace──▶ ClientHandle ◀──current()── stores
//!                                        (generation, Arc<dyn BackendClient>)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::traits::BackendClient;

/// Identity of one client instance over the widget's lifetime
///
/// Strictly increasing: a newer client always has a larger generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u64);

impl Generation {
    /// Allocate the next generation
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw numeric value
    #[must_use]
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

/// The live client together with its generation
#[derive(Clone)]
pub struct LiveClient {
    /// Which client this is
    pub generation: Generation,
    /// The client itself
    pub client: Arc<dyn BackendClient>,
}

impl fmt::Debug for LiveClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveClient")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Shared slot holding the live backend client (if any)
#[derive(Clone, Default)]
pub struct ClientHandle {
    inner: Arc<RwLock<Option<LiveClient>>>,
}

impl ClientHandle {
    /// Create an empty handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The live client, read fresh on every call
    #[must_use]
    pub fn current(&self) -> Option<LiveClient> {
        self.inner.read().clone()
    }

    /// Generation of the live client
    #[must_use]
    pub fn generation(&self) -> Option<Generation> {
        self.inner.read().as_ref().map(|live| live.generation)
    }

    /// Whether `generation` still identifies the live client
    #[must_use]
    pub fn is_current(&self, generation: Generation) -> bool {
        self.generation() == Some(generation)
    }

    /// Run `f` only if `generation` still identifies the live client
    ///
    /// The slot stays read-locked while `f` runs, so the client cannot be
    /// swapped out between the check and whatever `f` mutates. `f` must not
    /// block or touch the handle's write side.
    pub fn with_current<R>(&self, generation: Generation, f: impl FnOnce() -> R) -> Option<R> {
        let slot = self.inner.read();
        match slot.as_ref() {
            Some(live) if live.generation == generation => Some(f()),
            _ => None,
        }
    }

    /// Install a new client, returning the previous one
    pub(crate) fn install(&self, client: Arc<dyn BackendClient>) -> LiveClient {
        let live = LiveClient {
            generation: Generation::next(),
            client,
        };
        let previous = self.inner.write().replace(live.clone());
        debug_assert!(previous.is_none(), "previous client must be taken first");
        live
    }

    /// Empty the slot, returning the client that was live
    pub(crate) fn take(&self) -> Option<LiveClient> {
        self.inner.write().take()
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("generation", &self.generation())
            .finish()
    }
}
