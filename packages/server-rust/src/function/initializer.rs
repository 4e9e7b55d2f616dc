//! One-time user initialization.
//!
//! The platform asks the runtime to initialize before the first invocation.
//! [`InitializerGuard`] runs the user initializer at most once successfully:
//! concurrent callers serialize on a lock, a success is remembered for the
//! lifetime of the process, and a failure leaves the guard uninitialized so
//! the next request retries.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use faas_core::InvocationContext;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::panic::{catch_panic, PanicError};

/// Boxed future returned by an initializer.
pub type InitFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A user initializer.
pub trait InitFunction: Send + Sync + 'static {
    fn call(&self, ctx: InvocationContext) -> InitFuture;
}

impl<F, Fut> InitFunction for F
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn call(&self, ctx: InvocationContext) -> InitFuture {
        Box::pin(self(ctx))
    }
}

/// Shareable handle to a user initializer.
#[derive(Clone)]
pub struct Initializer(Arc<dyn InitFunction>);

impl Initializer {
    /// Wraps an initializer closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self(Arc::new(f))
    }

    /// Runs the initializer once, without any guarding.
    pub fn call(&self, ctx: InvocationContext) -> InitFuture {
        self.0.call(ctx)
    }
}

impl fmt::Debug for Initializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Initializer")
    }
}

/// Why initialization did not complete.
#[derive(Debug, thiserror::Error)]
pub enum InitializeError {
    /// The initializer returned an error.
    #[error("failed to initialize function, {0}")]
    Failed(anyhow::Error),
    /// The initializer panicked.
    #[error("panic while initializing function: {0}")]
    Panicked(PanicError),
}

/// Runs the user initializer at most once successfully.
#[derive(Debug)]
pub struct InitializerGuard {
    initializer: Option<Initializer>,
    initialized: AtomicBool,
    lock: Mutex<()>,
}

impl InitializerGuard {
    #[must_use]
    pub fn new(initializer: Option<Initializer>) -> Self {
        Self {
            initializer,
            initialized: AtomicBool::new(false),
            lock: Mutex::new(()),
        }
    }

    /// Whether a previous [`initialize`](Self::initialize) call succeeded.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Ensures the initializer has run successfully.
    ///
    /// Returns immediately once a previous call succeeded. Otherwise the call
    /// serializes with concurrent callers, re-checks, and runs the user
    /// initializer with panic capture. A guard without an initializer
    /// succeeds trivially.
    ///
    /// # Errors
    ///
    /// Returns [`InitializeError`] when the initializer fails or panics. The
    /// guard stays uninitialized in that case.
    pub async fn initialize(&self, ctx: InvocationContext) -> Result<(), InitializeError> {
        if self.is_initialized() {
            return Ok(());
        }

        let _lock = self.lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        let Some(initializer) = &self.initializer else {
            debug!("no initializer registered");
            self.initialized.store(true, Ordering::Release);
            return Ok(());
        };

        match catch_panic(async move { initializer.call(ctx).await }).await {
            Ok(Ok(())) => {
                info!("function initialized");
                self.initialized.store(true, Ordering::Release);
                Ok(())
            }
            Ok(Err(err)) => {
                error!(error = %err, "function initializer failed");
                Err(InitializeError::Failed(err))
            }
            Err(panic) => {
                error!(
                    panic = %panic.message,
                    backtrace = %panic.backtrace,
                    "function initializer panicked"
                );
                Err(InitializeError::Panicked(panic))
            }
        }
    }
}
