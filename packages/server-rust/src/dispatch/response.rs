//! Translation of invocation outcomes into wire responses.
//!
//! Error responses carry an empty body and describe the failure through the
//! `X-Faas-Response-Error-Code` and `X-Faas-Response-Error-Message` headers.
//! Every response produced after the function was invoked also carries
//! `X-Faas-Execution-Duration` in milliseconds.

use std::fmt;
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::Response;
use faas_core::{headers, EventResponse, EventType};
use tracing::{error, warn};

use crate::function::{FunctionResult, PanicError};

const PANIC_MESSAGE: &str = "Function panic, please check log for more details.";
const NO_RESPONSE_MESSAGE: &str = "No response was returned from function.";

// ---------------------------------------------------------------------------
// ErrorCode
// ---------------------------------------------------------------------------

/// Machine-readable failure reported in `X-Faas-Response-Error-Code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    FunctionPanic,
    FunctionExecutionError,
    FunctionNoResponse,
    InvalidEventType,
    InvalidCloudEvent,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FunctionPanic => "function_panic",
            Self::FunctionExecutionError => "function_execution_error",
            Self::FunctionNoResponse => "function_no_response",
            Self::InvalidEventType => "invalid_event_type",
            Self::InvalidCloudEvent => "invalid_cloud_event",
        }
    }

    /// Status code that accompanies this error.
    #[must_use]
    pub fn status(self) -> StatusCode {
        match self {
            Self::InvalidEventType | Self::InvalidCloudEvent => StatusCode::BAD_REQUEST,
            Self::FunctionPanic | Self::FunctionExecutionError | Self::FunctionNoResponse => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ExecutionOutcome
// ---------------------------------------------------------------------------

/// Terminal result of one function invocation.
#[derive(Debug)]
pub enum ExecutionOutcome {
    Success(EventResponse),
    DomainError(anyhow::Error),
    NoResponse,
    Panic(PanicError),
}

impl From<Result<FunctionResult, PanicError>> for ExecutionOutcome {
    fn from(result: Result<FunctionResult, PanicError>) -> Self {
        match result {
            Ok(Ok(Some(response))) => Self::Success(response),
            Ok(Ok(None)) => Self::NoResponse,
            Ok(Err(err)) => Self::DomainError(err),
            Err(panic) => Self::Panic(panic),
        }
    }
}

// ---------------------------------------------------------------------------
// Error responses
// ---------------------------------------------------------------------------

/// Builds an empty-bodied error response.
///
/// `started` is the instant the function was first invoked, when it was.
#[must_use]
pub fn error_response(code: ErrorCode, message: &str, started: Option<Instant>) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = code.status();

    let map = response.headers_mut();
    if let Some(started) = started {
        map.insert(headers::EXECUTION_DURATION, duration_value(started));
    }
    map.insert(
        headers::RESPONSE_ERROR_CODE,
        HeaderValue::from_static(code.as_str()),
    );
    map.insert(headers::RESPONSE_ERROR_MESSAGE, message_value(message));
    response
}

/// The request carried an event type the handler category does not accept.
#[must_use]
pub fn invalid_event_type(actual: &str, expected: &[EventType]) -> Response {
    let expected = expected
        .iter()
        .map(|t| t.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let message = format!(
        "The request event type \"{actual}\" is not acceptable, expected type \"[{expected}]\"."
    );
    error_response(ErrorCode::InvalidEventType, &message, None)
}

/// The request body could not be decoded into structured events.
#[must_use]
pub fn invalid_cloud_event(err: &dyn fmt::Display) -> Response {
    let message = format!("The request is not valid cloudevent message, {err}.");
    error_response(ErrorCode::InvalidCloudEvent, &message, None)
}

/// A panic escaped user code.
#[must_use]
pub fn function_panic(started: Option<Instant>) -> Response {
    error_response(ErrorCode::FunctionPanic, PANIC_MESSAGE, started)
}

/// The request body could not be read from the connection.
#[must_use]
pub fn unreadable_body() -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::BAD_REQUEST;
    response
}

// ---------------------------------------------------------------------------
// Outcome translation
// ---------------------------------------------------------------------------

/// Translates a single invocation outcome.
#[must_use]
pub fn outcome_response(outcome: ExecutionOutcome, started: Instant) -> Response {
    match outcome {
        ExecutionOutcome::Success(response) => success_response(response, None, started),
        failure => failure_response(failure, started),
    }
}

/// Builds the response for a non-success outcome, logging the cause.
fn failure_response(outcome: ExecutionOutcome, started: Instant) -> Response {
    match outcome {
        ExecutionOutcome::Panic(panic) => {
            error!(
                panic = %panic.message,
                backtrace = %panic.backtrace,
                "function panicked"
            );
            function_panic(Some(started))
        }
        ExecutionOutcome::DomainError(err) => {
            warn!(error = %err, "function returned error");
            let message = format!("Function returns error, {err}.");
            error_response(ErrorCode::FunctionExecutionError, &message, Some(started))
        }
        ExecutionOutcome::NoResponse => {
            warn!("function returned no response");
            error_response(ErrorCode::FunctionNoResponse, NO_RESPONSE_MESSAGE, Some(started))
        }
        ExecutionOutcome::Success(response) => success_response(response, None, started),
    }
}

/// Writes a user response.
///
/// User headers are set over the runtime's, then the duration header is
/// rewritten so a user value never survives. `status_override` wins over the
/// response's own status; a zero status means 200.
#[must_use]
pub fn success_response(
    user: EventResponse,
    status_override: Option<u16>,
    started: Instant,
) -> Response {
    let code = status_override.unwrap_or(user.status_code);
    let status = if code == 0 {
        StatusCode::OK
    } else {
        match StatusCode::from_u16(code) {
            Ok(status) => status,
            Err(_) => {
                let err = anyhow::anyhow!("invalid response status code {code}");
                return failure_response(ExecutionOutcome::DomainError(err), started);
            }
        }
    };

    let mut response = Response::new(Body::from(user.body));
    *response.status_mut() = status;

    let map = response.headers_mut();
    map.insert(headers::EXECUTION_DURATION, duration_value(started));
    for (name, value) in &user.headers {
        let Ok(name) = HeaderName::try_from(name.as_str()) else {
            warn!(header = %name, "skipping response header with invalid name");
            continue;
        };
        let Ok(value) = HeaderValue::try_from(value.as_str()) else {
            warn!(header = %name, "skipping response header with invalid value");
            continue;
        };
        map.insert(name, value);
    }
    map.insert(headers::EXECUTION_DURATION, duration_value(started));
    response
}

fn duration_value(started: Instant) -> HeaderValue {
    let millis = started.elapsed().as_secs_f64() * 1000.0;
    // Digits and a dot are always a valid header value.
    HeaderValue::try_from(format!("{millis:.2}")).unwrap_or(HeaderValue::from_static("0.00"))
}

/// Header-safe rendering of an error message. Control characters, which
/// error chains from user code may contain, become spaces.
fn message_value(message: &str) -> HeaderValue {
    let cleaned: String = message
        .chars()
        .map(|c| if c.is_control() && c != '\t' { ' ' } else { c })
        .collect();
    HeaderValue::try_from(cleaned).unwrap_or(HeaderValue::from_static("unprintable error"))
}

// ---------------------------------------------------------------------------
// Batch aggregation
// ---------------------------------------------------------------------------

/// Folds the successful responses of a batch into one.
///
/// The last response supplies headers and body. If any response had a status
/// of 400 or more, the status of the last such response replaces the final
/// status.
#[derive(Debug, Default)]
pub struct BatchAggregation {
    last: Option<EventResponse>,
    invalid_status: Option<u16>,
}

impl BatchAggregation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, response: EventResponse) {
        if response.status_code >= 400 {
            self.invalid_status = Some(response.status_code);
        }
        self.last = Some(response);
    }

    /// Status the batch response will carry, if anything was recorded.
    #[must_use]
    pub(crate) fn status(&self) -> Option<u16> {
        let last = self.last.as_ref()?;
        Some(self.invalid_status.unwrap_or(last.status_code))
    }

    /// Builds the batch response. An empty aggregation counts as no response.
    #[must_use]
    pub fn finish(self, started: Instant) -> Response {
        match self.last {
            Some(last) => success_response(last, self.invalid_status, started),
            None => failure_response(ExecutionOutcome::NoResponse, started),
        }
    }
}
