//! Example function: echoes HTTP requests and structured events back to the
//! caller.
//!
//! ```text
//! _FAAS_RUNTIME_PORT=8000 cargo run --bin echo-function
//! curl -H 'X-Faas-Request-Id: r1' localhost:8000/hello?x=1
//! ```

use faas_server::{
    start_with_initializer, EventResponse, FunctionHandler, Initializer, InvocationContext,
    Payload,
};
use serde_json::json;
use tracing::info;

async fn echo(ctx: InvocationContext, payload: Payload) -> anyhow::Result<Option<EventResponse>> {
    let body = match payload {
        Payload::Http(req) => json!({
            "request_id": ctx.request_id,
            "kind": "http",
            "method": req.http_method,
            "path": req.path,
            "query": req.query_string_parameters,
            "remote_addr": req.remote_addr,
            "body": String::from_utf8_lossy(&req.body),
        }),
        Payload::Event(event) => json!({
            "request_id": ctx.request_id,
            "kind": "cloudevent",
            "id": event.id,
            "source": event.source,
            "type": event.event_type,
            "data": String::from_utf8_lossy(&event.data),
        }),
    };

    let response = EventResponse::new(200, serde_json::to_vec(&body)?)
        .with_header("Content-Type", "application/json");
    Ok(Some(response))
}

fn main() {
    let handler = FunctionHandler::any(echo);
    let initializer = Initializer::new(|ctx: InvocationContext| async move {
        info!(request_id = %ctx.request_id, "echo function initialized");
        Ok(())
    });
    start_with_initializer(handler, initializer);
}
