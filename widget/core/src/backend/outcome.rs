//! Request Outcomes
//!
//! Every rabbit-hole and memory request ends up as a [`RequestOutcome`]: a
//! status plus a fixed, user-facing message. Callers never see the underlying
//! error; it is logged here and replaced by the failure text.

use std::future::Future;

use serde::{Deserialize, Serialize};

/// Outcome status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// The request succeeded
    Success,
    /// The request failed
    Error,
}

/// Result of a backend request, ready to show to the user
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RequestOutcome {
    /// Whether the request succeeded
    pub status: RequestStatus,
    /// User-facing message
    pub message: String,
    /// Response payload (success only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RequestOutcome {
    /// A successful outcome
    pub fn success(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            status: RequestStatus::Success,
            message: message.into(),
            data,
        }
    }

    /// A failed outcome
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RequestStatus::Error,
            message: message.into(),
            data: None,
        }
    }

    /// Whether the status is anything but an error
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status != RequestStatus::Error
    }
}

/// Await a backend request and map it to a user-facing outcome
///
/// Never fails: an error from `request` becomes an outcome carrying
/// `failure`, and the error itself is logged.
pub async fn try_request<F>(
    request: F,
    success: impl Into<String>,
    failure: impl Into<String>,
) -> RequestOutcome
where
    F: Future<Output = anyhow::Result<serde_json::Value>>,
{
    match request.await {
        Ok(data) => RequestOutcome::success(success, Some(data)),
        Err(e) => {
            let failure = failure.into();
            tracing::warn!(error = %e, message = %failure, "Backend request failed");
            RequestOutcome::error(failure)
        }
    }
}
