//! Entry point for every request reaching the runtime.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request, State};
use axum::response::Response;
use faas_core::{headers, InvocationContext};
use tracing::{info_span, Instrument};

use super::{internal_handler, AppState};

/// Routes platform control requests to the internal endpoints and
/// everything else to the dispatcher.
///
/// The invocation context carries the request credentials, a deadline of
/// `function_timeout` and a token cancelled on shutdown.
pub async fn invoke_handler(State(state): State<AppState>, request: Request) -> Response {
    let _in_flight = state.shutdown.in_flight_guard();

    let ctx = InvocationContext::from_headers(request.headers())
        .with_timeout(state.config.function_timeout)
        .with_cancellation(state.shutdown.cancellation_token());

    if is_internal(&request) {
        return internal_handler(&state, request, ctx).await;
    }

    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let span = info_span!("invoke", request_id = %ctx.request_id);
    state
        .dispatcher
        .dispatch(request, remote_addr, ctx)
        .instrument(span)
        .await
}

fn is_internal(request: &Request) -> bool {
    request
        .headers()
        .get(headers::INTERNAL_REQUEST)
        .is_some_and(|v| v.as_bytes() == b"true")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::StatusCode;
    use faas_core::{EventResponse, HttpRequest};

    use crate::dispatch::Dispatcher;
    use crate::function::{validate_handler, FunctionHandler, InitializerGuard};
    use crate::network::{NetworkConfig, ShutdownController};

    fn state(handler: FunctionHandler) -> AppState {
        AppState {
            dispatcher: Arc::new(Dispatcher::new(validate_handler(Some(handler.into())))),
            initializer: Arc::new(InitializerGuard::new(None)),
            shutdown: Arc::new(ShutdownController::new()),
            config: Arc::new(NetworkConfig::default()),
        }
    }

    #[tokio::test]
    async fn context_carries_deadline_and_credentials() {
        let handler = FunctionHandler::http(|ctx: InvocationContext, _req: HttpRequest| async move {
            let body = format!(
                "{}|{}|{}",
                ctx.request_id,
                ctx.access_key_id,
                ctx.deadline().is_some()
            );
            Ok(Some(EventResponse::new(200, body)))
        });

        let request = Request::builder()
            .uri("/")
            .header("x-faas-request-id", "req-1")
            .header("x-faas-access-key-id", "ak")
            .body(Body::empty())
            .unwrap();
        let response = invoke_handler(State(state(handler)), request).await;

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"req-1|ak|true");
    }

    #[tokio::test]
    async fn in_flight_is_released_after_response() {
        let state = state(FunctionHandler::http(|_ctx, _req| async {
            Ok(Some(EventResponse::new(200, "")))
        }));
        let shutdown = Arc::clone(&state.shutdown);

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let _ = invoke_handler(State(state), request).await;
        assert_eq!(shutdown.in_flight_count(), 0);
    }

    #[test]
    fn only_exact_true_marks_internal() {
        let request = |value: &str| {
            Request::builder()
                .uri("/v1/version")
                .header("x-faas-internal-request", value)
                .body(Body::empty())
                .unwrap()
        };
        assert!(is_internal(&request("true")));
        assert!(!is_internal(&request("TRUE")));
        assert!(!is_internal(&request("1")));
    }
}
