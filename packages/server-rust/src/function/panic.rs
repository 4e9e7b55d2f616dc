//! Panic capture at the invocation boundary.
//!
//! User code may panic anywhere, synchronously or while being polled.
//! [`catch_panic`] turns that into a [`PanicError`] carrying the panic message
//! and the backtrace recorded at the panic site by a process-wide hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Once;

use futures_util::FutureExt;

thread_local! {
    static LAST_BACKTRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static HOOK: Once = Once::new();

/// A panic recovered from user code.
///
/// `Display` shows only the message; the backtrace is meant for logs and
/// never goes on the wire.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct PanicError {
    /// The panic payload rendered as text.
    pub message: String,
    /// Backtrace captured where the panic happened.
    pub backtrace: String,
}

/// Installs a panic hook that records the backtrace of each panic on the
/// panicking thread, then defers to the previously installed hook.
///
/// Idempotent.
pub fn install_panic_hook() {
    HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let trace = Backtrace::force_capture().to_string();
            LAST_BACKTRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// Polls `fut` to completion, converting a panic into [`PanicError`].
///
/// # Errors
///
/// Returns [`PanicError`] if `fut` panicked while being polled.
pub async fn catch_panic<F: Future>(fut: F) -> Result<F::Output, PanicError> {
    install_panic_hook();
    AssertUnwindSafe(fut).catch_unwind().await.map_err(|payload| {
        // The unwind is caught in the same poll, so the hook ran on this
        // thread.
        let backtrace = LAST_BACKTRACE
            .with(|slot| slot.borrow_mut().take())
            .unwrap_or_else(|| "<backtrace unavailable>".to_string());
        PanicError {
            message: panic_message(payload.as_ref()),
            backtrace,
        }
    })
}

/// Renders a panic payload as text.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
