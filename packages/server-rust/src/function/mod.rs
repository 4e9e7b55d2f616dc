//! User function shapes, validation, initialization and panic capture.
//!
//! A function is registered in exactly one of three shapes, chosen by the
//! constructor used to build its [`FunctionHandler`]:
//!
//! - [`FunctionHandler::http`] handles regular HTTP requests, e.g. from an
//!   API gateway trigger.
//! - [`FunctionHandler::structured_event`] handles structured events, e.g.
//!   from timer, object storage or message queue triggers.
//! - [`FunctionHandler::any`] handles both; the function matches on
//!   [`Payload`] to tell them apart.
//!
//! Every shape receives an [`InvocationContext`] and returns
//! `anyhow::Result<Option<EventResponse>>`. `Ok(None)` means the function
//! produced no response, which is reported to the caller as an error.

pub mod initializer;
pub mod panic;
pub mod validate;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use faas_core::{EventResponse, HttpRequest, InvocationContext, Payload, StructuredEvent};

pub use initializer::{InitializeError, Initializer, InitializerGuard};
pub use panic::{catch_panic, PanicError};
pub use validate::{
    validate_handler, validate_initializer, DynamicFunction, HandlerSymbol, InitializerSymbol,
    Shape, Signature, SymbolKind, ValidatedHandler, ValidationError,
};

/// What a user function returns.
pub type FunctionResult = anyhow::Result<Option<EventResponse>>;

/// Boxed future returned by [`Function::call`].
pub type FunctionFuture = Pin<Box<dyn Future<Output = FunctionResult> + Send>>;

// ---------------------------------------------------------------------------
// Function trait
// ---------------------------------------------------------------------------

/// A user function accepting payloads of type `P`.
///
/// Implemented for every `Fn(InvocationContext, P) -> impl Future` closure,
/// so most users never implement it by hand.
pub trait Function<P>: Send + Sync + 'static {
    /// Invokes the function.
    fn call(&self, ctx: InvocationContext, payload: P) -> FunctionFuture;
}

impl<P, F, Fut> Function<P> for F
where
    F: Fn(InvocationContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FunctionResult> + Send + 'static,
{
    fn call(&self, ctx: InvocationContext, payload: P) -> FunctionFuture {
        Box::pin(self(ctx, payload))
    }
}

// ---------------------------------------------------------------------------
// HandlerCategory
// ---------------------------------------------------------------------------

/// Event-type category a handler was classified into at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerCategory {
    /// Accepts HTTP requests only.
    Http,
    /// Accepts single or batched structured events.
    StructuredEvent,
    /// Accepts HTTP requests and single structured events.
    Any,
}

impl HandlerCategory {
    /// Returns the lowercase name of the category.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::StructuredEvent => "cloudevent",
            Self::Any => "any",
        }
    }
}

impl fmt::Display for HandlerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// FunctionHandler
// ---------------------------------------------------------------------------

/// A user function in one of the three supported shapes.
#[derive(Clone)]
pub enum FunctionHandler {
    /// `(InvocationContext, HttpRequest)` shape.
    Http(Arc<dyn Function<HttpRequest>>),
    /// `(InvocationContext, StructuredEvent)` shape.
    StructuredEvent(Arc<dyn Function<StructuredEvent>>),
    /// `(InvocationContext, Payload)` shape.
    Any(Arc<dyn Function<Payload>>),
}

impl FunctionHandler {
    /// Wraps a function handling HTTP requests.
    pub fn http<F, Fut>(f: F) -> Self
    where
        F: Fn(InvocationContext, HttpRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FunctionResult> + Send + 'static,
    {
        Self::Http(Arc::new(f))
    }

    /// Wraps a function handling structured events.
    pub fn structured_event<F, Fut>(f: F) -> Self
    where
        F: Fn(InvocationContext, StructuredEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FunctionResult> + Send + 'static,
    {
        Self::StructuredEvent(Arc::new(f))
    }

    /// Wraps a function handling any payload.
    pub fn any<F, Fut>(f: F) -> Self
    where
        F: Fn(InvocationContext, Payload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FunctionResult> + Send + 'static,
    {
        Self::Any(Arc::new(f))
    }

    /// The category implied by this handler's shape.
    #[must_use]
    pub fn category(&self) -> HandlerCategory {
        match self {
            Self::Http(_) => HandlerCategory::Http,
            Self::StructuredEvent(_) => HandlerCategory::StructuredEvent,
            Self::Any(_) => HandlerCategory::Any,
        }
    }
}

impl fmt::Debug for FunctionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FunctionHandler")
            .field(&self.category())
            .finish()
    }
}
