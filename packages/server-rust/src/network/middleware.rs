//! HTTP middleware stack for the function runtime.
//!
//! Middleware ordering follows the outer-to-inner convention: the first
//! layer listed is the outermost (processes the request first on the way
//! in, and the response last on the way out).

use std::any::Any;

use axum::response::Response;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::dispatch::response::function_panic;
use crate::function::panic::panic_message;

/// Answers a panic that escaped every inner boundary.
pub type PanicResponder = fn(Box<dyn Any + Send + 'static>) -> Response;

/// The composed Tower layer type produced by [`build_http_layers`].
pub type HttpLayers = tower::layer::util::Stack<
    CatchPanicLayer<PanicResponder>,
    tower::layer::util::Stack<
        TraceLayer<
            tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
        >,
        tower::layer::util::Identity,
    >,
>;

/// Builds the HTTP-level Tower middleware stack.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `Tracing` -- logs request/response with structured trace spans
/// 2. `CatchPanic` -- last-resort `function_panic` answer for panics outside
///    the invocation boundary
#[must_use]
pub fn build_http_layers() -> HttpLayers {
    ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(respond_to_panic as PanicResponder))
        .into_inner()
}

fn respond_to_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    error!(panic = %panic_message(payload.as_ref()), "panic escaped request handling");
    function_panic(None)
}
