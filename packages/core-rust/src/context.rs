use std::time::{Duration, Instant};

use http::HeaderMap;
use tokio_util::sync::CancellationToken;

use crate::headers;

/// Per-invocation context handed to user functions and initializers.
///
/// Carries the platform request id and temporary credentials read from the
/// request headers (unvalidated), plus deadline and cancellation signals the
/// function may observe. The runtime itself never waits on either.
#[derive(Debug, Clone, Default)]
pub struct InvocationContext {
    /// Value of `X-Faas-Request-Id`, empty when absent.
    pub request_id: String,
    /// Value of `X-Faas-Access-Key-Id`, empty when absent.
    pub access_key_id: String,
    /// Value of `X-Faas-Secret-Access-Key`, empty when absent.
    pub secret_access_key: String,
    /// Value of `X-Faas-Session-Token`, empty when absent.
    pub session_token: String,
    deadline: Option<Instant>,
    cancellation: CancellationToken,
}

impl InvocationContext {
    /// Builds a context from request headers.
    #[must_use]
    pub fn from_headers(map: &HeaderMap) -> Self {
        Self {
            request_id: header_string(map, headers::REQUEST_ID),
            access_key_id: header_string(map, headers::ACCESS_KEY_ID),
            secret_access_key: header_string(map, headers::SECRET_ACCESS_KEY),
            session_token: header_string(map, headers::SESSION_TOKEN),
            ..Self::default()
        }
    }

    /// Overrides the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Sets a deadline `timeout` from now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Instant::now().checked_add(timeout);
        self
    }

    /// Attaches a cancellation token, typically a child of the runtime's
    /// shutdown token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Point in time by which the invocation is expected to finish.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left until the deadline, `None` when no deadline is set.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Token cancelled when the runtime starts shutting down.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Reads a header as a string, yielding an empty string when absent or not
/// valid visible ASCII.
fn header_string(map: &HeaderMap, name: &str) -> String {
    map.get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}
