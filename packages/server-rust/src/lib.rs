//! FaaS language runtime: validates a user function once at startup, then
//! turns each inbound invocation (HTTP request, structured event, or batch
//! of structured events) into a typed payload, invokes the function, and
//! translates the outcome into the platform's wire response.

pub mod dispatch;
pub mod function;
pub mod network;
pub mod runtime;

pub use dispatch::Dispatcher;
pub use function::{
    DynamicFunction, Function, FunctionHandler, FunctionResult, HandlerCategory, HandlerSymbol,
    Initializer, InitializerSymbol,
};
pub use runtime::{run, start, start_with_initializer, RuntimeArgs};

pub use faas_core::{EventResponse, HttpRequest, InvocationContext, Payload, StructuredEvent};

/// Runtime version reported on `/v1/version`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
