//! Catwidget Core - Headless State for the Cheshire Cat Chat Widget
//!
//! This crate holds everything the chat widget knows and does, independent of
//! how it is drawn. A surface (web component, TUI, native window, test
//! harness) renders the stores' state and forwards user input to the session
//! controller.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                          UI Surface                             │
//! │      input box · message list · attachment menu · toasts        │
//! └───────────────┬───────────────────────────────▲─────────────────┘
//!                 │ send / paste / upload / wipe  │ watch::Receiver
//! ┌───────────────┼───────────────────────────────┼─────────────────┐
//! │               ▼        CATWIDGET CORE         │                 │
//! │  ┌────────────────────────────────────────────┴──────────────┐  │
//! │  │                 WidgetSessionController                   │  │
//! │  │  ┌──────────────┐ ┌──────────────┐ ┌───────────────────┐  │  │
//! │  │  │ Conversation │ │    Upload    │ │ ConversationReset │  │  │
//! │  │  │    Store     │ │ Coordinator  │ │      Service      │  │  │
//! │  │  └──────┬───────┘ └──────┬───────┘ └─────────┬─────────┘  │  │
//! │  │         └────────────────┼───────────────────┘            │  │
//! │  │                 NotificationCenter                        │  │
//! │  └──────────────────────────┬────────────────────────────────┘  │
//! │                        ClientHandle                             │
//! │                 (generation, BackendClient)                     │
//! └─────────────────────────────┼───────────────────────────────────┘
//!                               ▼
//!                    Cheshire Cat backend
//! ```
//!
//! # Key Types
//!
//! - [`WidgetSessionController`]: owns the backend client, swaps it when the
//!   settings change and routes user input
//! - [`ConversationStore`]: transcript plus `ready`/`loading`/`error`
//! - [`UploadCoordinator`]: rabbit-hole uploads with a single status slot
//! - [`ConversationResetService`]: wipes the conversation on both ends
//! - [`NotificationCenter`]: auto-expiring user feedback
//! - [`BackendClient`]: the seam to the actual network client
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use catwidget_core::{load_settings, WidgetSessionController};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let loaded = load_settings()?;
//!     let mut session = WidgetSessionController::new(Arc::new(MyClientFactory));
//!     session.apply_settings(loaded.settings);
//!
//!     let mut state = session.conversation().subscribe();
//!     state.wait_for(|s| s.ready).await?;
//!
//!     session.send_message("Who is the Cheshire Cat?").await;
//!     Ok(())
//! }
//! ```
//!
//! # Module Overview
//!
//! - [`backend`]: client trait, request outcomes, the live client handle and
//!   a scripted mock client
//! - [`config`]: widget settings, features and layered loading
//! - [`conversation`]: the conversation store
//! - [`events`]: connection events and observer hooks
//! - [`messages`]: chat messages and why-metadata
//! - [`notifications`]: the notification center
//! - [`reset`]: the conversation reset service
//! - [`session`]: the session controller
//! - [`uploads`]: the upload coordinator and content routing

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod conversation;
pub mod events;
pub mod messages;
pub mod notifications;
pub mod reset;
pub mod session;
pub mod uploads;

// Re-exports for convenience
pub use backend::{
    try_request, BackendClient, ClientFactory, ClientHandle, Generation, LiveClient,
    OutboundMessage, RequestOutcome, RequestStatus, UploadFile,
};
pub use conversation::{
    ConversationState, ConversationStore, MessagePreprocessor, DEFAULT_SUGGESTIONS,
    SUGGESTION_COUNT,
};
pub use events::{
    ClientEvent, NoopObserver, ServerMessage, ServerMessageKind, UploadTarget, WidgetObserver,
};
pub use messages::{
    IntermediateStep, MemoryItem, MemoryMetadata, Message, MessageId, Sender, WhyMetadata,
    DEFAULT_MEMORY_COLLECTION,
};
pub use notifications::{
    Notification, NotificationCenter, NotificationId, NotificationKind,
    DEFAULT_NOTIFICATION_TIMEOUT,
};
pub use reset::ConversationResetService;
pub use session::WidgetSessionController;
pub use uploads::{classify_content, ContentAction, PastedContent, UploadCoordinator, UploadState};

// Config exports
pub use config::{
    default_config_path, load_settings, load_settings_from_path, load_settings_with_env,
    parse_features, ConfigError, ConfigSource, Feature, FeatureParseError, LoadedSettings,
    SettingsToml, WidgetSettings,
};
