//! Handler definitions for the function runtime.
//!
//! This module defines `AppState` (the shared state carried through axum
//! extractors) and re-exports the handler functions used to build the
//! router.

pub mod internal;
pub mod invoke;

pub use internal::internal_handler;
pub use invoke::invoke_handler;

use std::sync::Arc;

use super::{NetworkConfig, ShutdownController};
use crate::dispatch::Dispatcher;
use crate::function::InitializerGuard;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Dispatcher built once from the validated handler.
    pub dispatcher: Arc<Dispatcher>,
    /// One-shot user initialization, driven by `/v1/initialize`.
    pub initializer: Arc<InitializerGuard>,
    /// Graceful shutdown controller with in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    pub config: Arc<NetworkConfig>,
}
