//! Platform control endpoints, reachable only with
//! `X-Faas-Internal-Request: true`.
//!
//! - `POST /v1/initialize` runs the user initializer (200 or 500)
//! - `GET /v1/version` returns the runtime version
//!
//! Other methods on those paths get 405; other paths get 404.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use faas_core::InvocationContext;
use tracing::{info, warn};

use super::AppState;

pub const INITIALIZE_PATH: &str = "/v1/initialize";
pub const VERSION_PATH: &str = "/v1/version";

/// Serves one internal control request.
pub async fn internal_handler(
    state: &AppState,
    request: Request<Body>,
    ctx: InvocationContext,
) -> Response {
    match (request.uri().path(), request.method()) {
        (INITIALIZE_PATH, &Method::POST) => match state.initializer.initialize(ctx).await {
            Ok(()) => StatusCode::OK.into_response(),
            Err(err) => {
                warn!(error = %err, "initialize request failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        (VERSION_PATH, &Method::GET) => {
            info!(version = crate::VERSION, "version requested");
            (StatusCode::OK, crate::VERSION).into_response()
        }
        (INITIALIZE_PATH | VERSION_PATH, _) => StatusCode::METHOD_NOT_ALLOWED.into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
