//! Graceful shutdown controller with in-flight invocation tracking.
//!
//! A `CancellationToken` that invocation contexts derive from, and an
//! atomic counter with RAII guards for in-flight tracking.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Coordinates shutdown across the runtime.
///
/// `trigger_shutdown()` cancels the root token, which every invocation
/// context observes through a child token. The server module bounds the
/// drain that follows and reads [`in_flight_count`](Self::in_flight_count)
/// to report what was left running.
#[derive(Debug)]
pub struct ShutdownController {
    cancellation: CancellationToken,
    in_flight: Arc<AtomicU64>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancellation: CancellationToken::new(),
            in_flight: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Token cancelled when shutdown is triggered. Each invocation gets its
    /// own child so cancelling one never affects the others.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.child_token()
    }

    /// Resolves once shutdown has been triggered.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await;
    }

    /// Cancels every outstanding invocation token.
    pub fn trigger_shutdown(&self) {
        self.cancellation.cancel();
    }

    /// Creates an RAII guard that tracks an in-flight invocation.
    ///
    /// The counter is decremented when the guard is dropped, including
    /// during unwinding.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the in-flight counter when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
