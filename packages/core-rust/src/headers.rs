//! Literal header names of the runtime wire protocol.
//!
//! All names are lower-case so they can be used with
//! `http::HeaderName::from_static`. HTTP header matching is case-insensitive.

/// Selects the dispatch pipeline (`http`, `cloudevent`, `batch-cloudevent`).
pub const EVENT_TYPE: &str = "x-faas-event-type";
/// Platform-assigned request identifier.
pub const REQUEST_ID: &str = "x-faas-request-id";
/// Temporary credential: access key id.
pub const ACCESS_KEY_ID: &str = "x-faas-access-key-id";
/// Temporary credential: secret access key.
pub const SECRET_ACCESS_KEY: &str = "x-faas-secret-access-key";
/// Temporary credential: session token.
pub const SESSION_TOKEN: &str = "x-faas-session-token";
/// Client IP forwarded by the gateway.
pub const REAL_IP: &str = "x-real-ip";
/// Client port forwarded by the gateway.
pub const REAL_PORT: &str = "x-real-port";
/// Batch envelope version, preferred name.
pub const BATCH_EVENTS_VERSION: &str = "x-bytefaas-batch-events-version";
/// Batch envelope version, fallback name.
pub const BATCH_EVENTS_VERSION_FALLBACK: &str = "x-faas-batch-events-version";
/// Marks platform control requests (`true`).
pub const INTERNAL_REQUEST: &str = "x-faas-internal-request";

/// Execution time of the function in milliseconds, two decimals.
pub const EXECUTION_DURATION: &str = "x-faas-execution-duration";
/// Machine-readable error code on failed invocations.
pub const RESPONSE_ERROR_CODE: &str = "x-faas-response-error-code";
/// Human-readable error message on failed invocations.
pub const RESPONSE_ERROR_MESSAGE: &str = "x-faas-response-error-message";
