//! Event dispatch: routes each request to the pipeline matching its
//! `X-Faas-Event-Type` and the handler category, invokes the user function
//! and translates the outcome.
//!
//! | category          | accepted event types                 |
//! |-------------------|--------------------------------------|
//! | `Http`            | absent, `http`                       |
//! | `StructuredEvent` | `cloudevent`, `batch-cloudevent`     |
//! | `Any`             | absent, `http`, `cloudevent`         |
//!
//! Anything else is answered with `invalid_event_type` before the body is
//! read.

pub mod event;
pub mod http;
pub mod response;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::to_bytes;
use axum::extract::Request;
use axum::response::Response;
use faas_core::{
    headers, CloudEventCodec, EventCodec, EventType, HttpRequest, InvocationContext, Payload,
    StructuredEvent,
};
use tracing::{debug, warn};

use crate::function::{
    catch_panic, Function, FunctionFuture, FunctionHandler, HandlerCategory, ValidatedHandler,
};

pub use response::{BatchAggregation, ErrorCode, ExecutionOutcome};

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Per-process dispatcher built once from the validated handler.
#[derive(Clone)]
pub struct Dispatcher {
    handler: FunctionHandler,
    codec: Arc<dyn EventCodec>,
}

impl Dispatcher {
    /// Creates a dispatcher using the default `CloudEvents` codec.
    #[must_use]
    pub fn new(validated: ValidatedHandler) -> Self {
        Self {
            handler: validated.handler,
            codec: Arc::new(CloudEventCodec),
        }
    }

    /// Replaces the structured event codec.
    #[must_use]
    pub fn with_codec(mut self, codec: Arc<dyn EventCodec>) -> Self {
        self.codec = codec;
        self
    }

    #[must_use]
    pub fn category(&self) -> HandlerCategory {
        self.handler.category()
    }

    /// Handles one invocation request end to end.
    ///
    /// Always produces a response; user errors and panics are translated,
    /// never propagated.
    pub async fn dispatch(
        &self,
        request: Request,
        remote_addr: Option<SocketAddr>,
        ctx: InvocationContext,
    ) -> Response {
        let (parts, body) = request.into_parts();

        let header = parts
            .headers
            .get(headers::EVENT_TYPE)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .filter(|v| !v.is_empty());

        let pipeline = match header.as_deref() {
            None => select(&self.handler, None),
            Some(value) => EventType::parse(value).and_then(|t| select(&self.handler, Some(t))),
        };
        let Some(pipeline) = pipeline else {
            let actual = header.unwrap_or_default();
            warn!(
                event_type = %actual,
                category = %self.category(),
                "rejecting unacceptable event type"
            );
            return response::invalid_event_type(&actual, expected_types(self.category()));
        };

        let body = match to_bytes(body, usize::MAX).await {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "failed to read request body");
                return response::unreadable_body();
            }
        };

        match pipeline {
            Pipeline::Http(callee) => {
                let request = http::build_http_request(&parts, remote_addr, body.to_vec());
                debug!(method = %request.http_method, path = %request.path, "dispatching http request");
                let started = Instant::now();
                let outcome = invoke(callee, ctx, request).await;
                response::outcome_response(outcome, started)
            }
            Pipeline::Event(callee) => {
                event::dispatch_single(callee, self.codec.as_ref(), &parts.headers, &body, ctx)
                    .await
            }
            Pipeline::Batch(function) => {
                event::dispatch_batch(function, self.codec.as_ref(), &parts.headers, &body, ctx)
                    .await
            }
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handler", &self.handler)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// A function reached either through its own payload type or through the
/// open [`Payload`].
pub(crate) enum Callee<'a, P> {
    Typed(&'a dyn Function<P>),
    Any(&'a dyn Function<Payload>),
}

impl<P> Clone for Callee<'_, P> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<P> Copy for Callee<'_, P> {}

impl<P: Into<Payload> + 'static> Callee<'_, P> {
    fn call(self, ctx: InvocationContext, payload: P) -> FunctionFuture {
        match self {
            Self::Typed(f) => f.call(ctx, payload),
            Self::Any(f) => f.call(ctx, payload.into()),
        }
    }
}

enum Pipeline<'a> {
    Http(Callee<'a, HttpRequest>),
    Event(Callee<'a, StructuredEvent>),
    Batch(&'a dyn Function<StructuredEvent>),
}

/// Picks the pipeline for a parsed event type. `None` means the header was
/// absent.
fn select(handler: &FunctionHandler, event_type: Option<EventType>) -> Option<Pipeline<'_>> {
    match (handler, event_type) {
        (FunctionHandler::Http(f), None | Some(EventType::Http)) => {
            Some(Pipeline::Http(Callee::Typed(f.as_ref())))
        }
        (FunctionHandler::StructuredEvent(f), Some(EventType::CloudEvent)) => {
            Some(Pipeline::Event(Callee::Typed(f.as_ref())))
        }
        (FunctionHandler::StructuredEvent(f), Some(EventType::BatchCloudEvent)) => {
            Some(Pipeline::Batch(f.as_ref()))
        }
        (FunctionHandler::Any(f), None | Some(EventType::Http)) => {
            Some(Pipeline::Http(Callee::Any(f.as_ref())))
        }
        (FunctionHandler::Any(f), Some(EventType::CloudEvent)) => {
            Some(Pipeline::Event(Callee::Any(f.as_ref())))
        }
        _ => None,
    }
}

/// Event types listed in the `invalid_event_type` message.
fn expected_types(category: HandlerCategory) -> &'static [EventType] {
    match category {
        HandlerCategory::Http => &[EventType::Http],
        HandlerCategory::StructuredEvent => &[EventType::CloudEvent, EventType::BatchCloudEvent],
        HandlerCategory::Any => &[EventType::Http, EventType::CloudEvent],
    }
}

/// Invokes the function with panic capture. Panics raised while building the
/// future are captured as well.
pub(crate) async fn invoke<P: Into<Payload> + Send + 'static>(
    callee: Callee<'_, P>,
    ctx: InvocationContext,
    payload: P,
) -> ExecutionOutcome {
    catch_panic(async move { callee.call(ctx, payload).await })
        .await
        .into()
}
