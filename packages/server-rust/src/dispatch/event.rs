//! Single structured event and batch pipelines.

use std::time::Instant;

use axum::http::HeaderMap;
use axum::response::Response;
use faas_core::{decode_batch, headers, EventCodec, InvocationContext, StructuredEvent};
use tracing::{debug, warn};

use super::response::{self, BatchAggregation, ExecutionOutcome};
use super::{invoke, Callee};
use crate::function::Function;

/// Decodes one event from the request and invokes the function with it.
pub(crate) async fn dispatch_single(
    callee: Callee<'_, StructuredEvent>,
    codec: &dyn EventCodec,
    map: &HeaderMap,
    body: &[u8],
    ctx: InvocationContext,
) -> Response {
    let event = match codec.decode(map, body) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, "rejecting invalid structured event");
            return response::invalid_cloud_event(&err);
        }
    };
    debug!(id = %event.id, source = %event.source, "dispatching structured event");

    let started = Instant::now();
    let outcome = invoke(callee, ctx, event).await;
    response::outcome_response(outcome, started)
}

/// Decodes a batch envelope and invokes the function once per event, in
/// order.
///
/// A sub-event that errors, panics or returns nothing ends the batch with
/// that failure. Statuses of 400 or more do not stop the batch; they are
/// folded into the final response by [`BatchAggregation`].
pub(crate) async fn dispatch_batch(
    function: &dyn Function<StructuredEvent>,
    codec: &dyn EventCodec,
    map: &HeaderMap,
    body: &[u8],
    ctx: InvocationContext,
) -> Response {
    let version = batch_version(map);
    let events = match decode_batch(version, body, codec) {
        Ok(events) => events,
        Err(err) => {
            warn!(error = %err, version, "rejecting invalid batch");
            return response::invalid_cloud_event(&err);
        }
    };
    if events.is_empty() {
        warn!("rejecting empty batch");
        return response::invalid_cloud_event(&"batch request contains no events");
    }
    debug!(count = events.len(), "dispatching batch");

    let started = Instant::now();
    let mut aggregation = BatchAggregation::new();
    for event in events {
        match invoke(Callee::Typed(function), ctx.clone(), event).await {
            ExecutionOutcome::Success(resp) => aggregation.record(resp),
            failure => return response::outcome_response(failure, started),
        }
    }
    debug!(status = ?aggregation.status(), "batch completed");
    aggregation.finish(started)
}

/// Batch format version, taken from the first non-empty version header.
fn batch_version(map: &HeaderMap) -> &str {
    [headers::BATCH_EVENTS_VERSION, headers::BATCH_EVENTS_VERSION_FALLBACK]
        .into_iter()
        .filter_map(|name| map.get(name).and_then(|v| v.to_str().ok()))
        .find(|v| !v.is_empty())
        .unwrap_or_default()
}
