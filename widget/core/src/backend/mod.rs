//! Backend Integration
//!
//! This module provides abstracted access to the conversational-AI backend
//! through a common trait interface. The wire protocol lives in the client
//! implementation; the core only sees events and request results.
//!
//! # Usage
//!
//! ```ignore
//! use catwidget_core::backend::{try_request, BackendClient, ClientHandle};
//!
//! let live = handle.current().expect("connected");
//! let outcome = try_request(
//!     live.client.wipe_conversation_history(),
//!     "The current conversation was wiped",
//!     "Unable to wipe the in-memory current conversation",
//! )
//! .await;
//! ```

mod handle;
pub mod mock;
mod outcome;
mod traits;

pub use handle::{ClientHandle, Generation, LiveClient};
pub use outcome::{try_request, RequestOutcome, RequestStatus};
pub use traits::{BackendClient, ClientFactory, OutboundMessage, UploadFile};
