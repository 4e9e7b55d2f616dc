//! Startup validation of the user handler and initializer.
//!
//! Typed symbols are checked by the compiler and only classified here.
//! Dynamic symbols, registered through a type-erased bridge, describe their
//! shape with a [`Signature`] that is checked rule by rule; the first
//! violated rule wins.
//!
//! Validation never fails startup. An invalid handler is replaced by one that
//! answers every invocation with the validation error, so the misconfiguration
//! is reported through the wire protocol instead of crashing the process.

use std::fmt;
use std::sync::Arc;

use faas_core::{HttpRequest, InvocationContext, Payload, StructuredEvent};
use tracing::error;

use super::initializer::Initializer;
use super::{Function, FunctionFuture, FunctionHandler, FunctionResult, HandlerCategory};

// ---------------------------------------------------------------------------
// Signatures
// ---------------------------------------------------------------------------

/// Shape of one parameter or result of a dynamic symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    /// The invocation context capability.
    Context,
    /// An HTTP request payload.
    HttpRequest,
    /// A structured event payload.
    StructuredEvent,
    /// Open payload, accepts anything.
    Any,
    /// A function response.
    EventResponse,
    /// An error capability.
    Error,
    /// Anything else, described by name.
    Other(String),
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Context => f.write_str("InvocationContext"),
            Self::HttpRequest => f.write_str("HttpRequest"),
            Self::StructuredEvent => f.write_str("StructuredEvent"),
            Self::Any => f.write_str("any"),
            Self::EventResponse => f.write_str("EventResponse"),
            Self::Error => f.write_str("error"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Kind of value a dynamic symbol refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    /// A callable function.
    Function,
    /// Any non-callable value, described by name.
    Other(String),
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function => f.write_str("func"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Declared shape of a dynamic symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub kind: SymbolKind,
    pub params: Vec<Shape>,
    pub results: Vec<Shape>,
}

impl Signature {
    /// A function signature with the given parameters and results.
    #[must_use]
    pub fn function(params: Vec<Shape>, results: Vec<Shape>) -> Self {
        Self {
            kind: SymbolKind::Function,
            params,
            results,
        }
    }
}

// ---------------------------------------------------------------------------
// Symbols
// ---------------------------------------------------------------------------

/// A type-erased handler and its declared signature.
///
/// The callable always receives a [`Payload`]; once classified, HTTP-shaped
/// symbols only ever see `Payload::Http` and event-shaped symbols only
/// `Payload::Event`.
#[derive(Clone)]
pub struct DynamicFunction {
    pub signature: Signature,
    pub call: Arc<dyn Function<Payload>>,
}

impl fmt::Debug for DynamicFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicFunction")
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

/// A handler as supplied to the runtime.
#[derive(Debug, Clone)]
pub enum HandlerSymbol {
    /// Shape fixed at compile time.
    Typed(FunctionHandler),
    /// Shape declared at run time.
    Dynamic(DynamicFunction),
}

impl From<FunctionHandler> for HandlerSymbol {
    fn from(handler: FunctionHandler) -> Self {
        Self::Typed(handler)
    }
}

impl From<DynamicFunction> for HandlerSymbol {
    fn from(function: DynamicFunction) -> Self {
        Self::Dynamic(function)
    }
}

/// An initializer as supplied to the runtime.
#[derive(Debug, Clone)]
pub enum InitializerSymbol {
    /// Shape fixed at compile time.
    Typed(Initializer),
    /// Shape declared at run time.
    Dynamic {
        signature: Signature,
        call: Initializer,
    },
}

impl From<Initializer> for InitializerSymbol {
    fn from(initializer: Initializer) -> Self {
        Self::Typed(initializer)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A handler or initializer that does not satisfy the function contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("expected a handler function, but got none")]
    MissingHandler,
    #[error("expected handler kind: func, but got: {0}")]
    HandlerNotFunction(SymbolKind),
    #[error("handler should take two arguments, but got {0}")]
    HandlerParamCount(usize),
    #[error("the first argument of handler does not implement InvocationContext, got {0}")]
    HandlerContextParam(Shape),
    #[error(
        "the second argument of handler should be one of (HttpRequest, StructuredEvent, any), but got {0}"
    )]
    HandlerPayloadParam(Shape),
    #[error("handler should return two values, but got {0}")]
    HandlerResultCount(usize),
    #[error("the first return value of handler should be EventResponse, but got {0}")]
    HandlerResponseResult(Shape),
    #[error("the second return value of handler should implement error, but got {0}")]
    HandlerErrorResult(Shape),
    #[error("expected initializer kind: func, but got: {0}")]
    InitializerNotFunction(SymbolKind),
    #[error("initializer should take one argument (InvocationContext), but got {0}")]
    InitializerParamCount(usize),
    #[error("the argument of initializer should implement InvocationContext, but got {0}")]
    InitializerContextParam(Shape),
    #[error("initializer should return one value (error), but got {0}")]
    InitializerResultCount(usize),
    #[error("the return value of initializer should implement error, but got {0}")]
    InitializerErrorResult(Shape),
}

// ---------------------------------------------------------------------------
// Handler validation
// ---------------------------------------------------------------------------

/// A classified handler, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ValidatedHandler {
    pub category: HandlerCategory,
    pub handler: FunctionHandler,
    /// Set when the supplied symbol was rejected and `handler` only reports
    /// this error.
    pub error: Option<ValidationError>,
}

/// Classifies the supplied handler.
///
/// Never fails: an invalid or missing handler is logged and replaced by an
/// `Any` handler that returns the validation error on every invocation.
#[must_use]
pub fn validate_handler(symbol: Option<HandlerSymbol>) -> ValidatedHandler {
    let result = match symbol {
        None => Err(ValidationError::MissingHandler),
        Some(HandlerSymbol::Typed(handler)) => Ok(handler),
        Some(HandlerSymbol::Dynamic(function)) => classify_dynamic(function),
    };

    match result {
        Ok(handler) => ValidatedHandler {
            category: handler.category(),
            handler,
            error: None,
        },
        Err(err) => {
            error!(error = %err, "invalid function handler");
            ValidatedHandler {
                category: HandlerCategory::Any,
                handler: error_handler(err.clone()),
                error: Some(err),
            }
        }
    }
}

fn classify_dynamic(function: DynamicFunction) -> Result<FunctionHandler, ValidationError> {
    let DynamicFunction { signature, call } = function;

    if signature.kind != SymbolKind::Function {
        return Err(ValidationError::HandlerNotFunction(signature.kind));
    }

    let category = classify_params(&signature.params)?;
    check_results(&signature.results)?;

    Ok(match category {
        HandlerCategory::Http => FunctionHandler::http(move |ctx, req: HttpRequest| {
            call.call(ctx, Payload::Http(req))
        }),
        HandlerCategory::StructuredEvent => {
            FunctionHandler::structured_event(move |ctx, event: StructuredEvent| {
                call.call(ctx, Payload::Event(event))
            })
        }
        HandlerCategory::Any => FunctionHandler::Any(call),
    })
}

fn classify_params(params: &[Shape]) -> Result<HandlerCategory, ValidationError> {
    let [context, payload] = params else {
        return Err(ValidationError::HandlerParamCount(params.len()));
    };
    if *context != Shape::Context {
        return Err(ValidationError::HandlerContextParam(context.clone()));
    }
    match payload {
        Shape::Any => Ok(HandlerCategory::Any),
        Shape::HttpRequest => Ok(HandlerCategory::Http),
        Shape::StructuredEvent => Ok(HandlerCategory::StructuredEvent),
        other => Err(ValidationError::HandlerPayloadParam(other.clone())),
    }
}

fn check_results(results: &[Shape]) -> Result<(), ValidationError> {
    let [response, error] = results else {
        return Err(ValidationError::HandlerResultCount(results.len()));
    };
    if *response != Shape::EventResponse {
        return Err(ValidationError::HandlerResponseResult(response.clone()));
    }
    if *error != Shape::Error {
        return Err(ValidationError::HandlerErrorResult(error.clone()));
    }
    Ok(())
}

/// A handler that reports `err` for every payload.
fn error_handler(err: ValidationError) -> FunctionHandler {
    FunctionHandler::Any(Arc::new(ErrorFunction(err)))
}

struct ErrorFunction(ValidationError);

impl Function<Payload> for ErrorFunction {
    fn call(&self, _ctx: InvocationContext, _payload: Payload) -> FunctionFuture {
        let result: FunctionResult = Err(self.0.clone().into());
        Box::pin(async move { result })
    }
}

// ---------------------------------------------------------------------------
// Initializer validation
// ---------------------------------------------------------------------------

/// Validates the supplied initializer.
///
/// `None` stays `None`. An invalid dynamic initializer is logged and replaced
/// by one that always fails with the validation error.
#[must_use]
pub fn validate_initializer(symbol: Option<InitializerSymbol>) -> Option<Initializer> {
    match symbol? {
        InitializerSymbol::Typed(initializer) => Some(initializer),
        InitializerSymbol::Dynamic { signature, call } => match check_initializer(&signature) {
            Ok(()) => Some(call),
            Err(err) => {
                error!(error = %err, "invalid function initializer");
                Some(Initializer::new(move |_ctx| {
                    let err = err.clone();
                    async move { Err(err.into()) }
                }))
            }
        },
    }
}

fn check_initializer(signature: &Signature) -> Result<(), ValidationError> {
    if signature.kind != SymbolKind::Function {
        return Err(ValidationError::InitializerNotFunction(signature.kind.clone()));
    }
    let [context] = signature.params.as_slice() else {
        return Err(ValidationError::InitializerParamCount(signature.params.len()));
    };
    if *context != Shape::Context {
        return Err(ValidationError::InitializerContextParam(context.clone()));
    }
    let [result] = signature.results.as_slice() else {
        return Err(ValidationError::InitializerResultCount(signature.results.len()));
    };
    if *result != Shape::Error {
        return Err(ValidationError::InitializerErrorResult(result.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use faas_core::EventResponse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn echo_dynamic(params: Vec<Shape>, results: Vec<Shape>) -> DynamicFunction {
        DynamicFunction {
            signature: Signature::function(params, results),
            call: Arc::new(|_ctx: InvocationContext, payload: Payload| async move {
                let tag = match payload {
                    Payload::Http(_) => "http",
                    Payload::Event(_) => "event",
                };
                Ok::<_, anyhow::Error>(Some(EventResponse::new(200, tag)))
            }),
        }
    }

    fn valid_results() -> Vec<Shape> {
        vec![Shape::EventResponse, Shape::Error]
    }

    async fn call_any(handler: &FunctionHandler) -> anyhow::Result<Option<EventResponse>> {
        let FunctionHandler::Any(f) = handler else {
            panic!("expected an Any handler, got {handler:?}");
        };
        f.call(InvocationContext::default(), Payload::Http(HttpRequest::default()))
            .await
    }

    #[test]
    fn typed_handlers_keep_their_category() {
        let cases = [
            (FunctionHandler::http(|_c, _r| async { Ok(None) }), HandlerCategory::Http),
            (
                FunctionHandler::structured_event(|_c, _e| async { Ok(None) }),
                HandlerCategory::StructuredEvent,
            ),
            (FunctionHandler::any(|_c, _p| async { Ok(None) }), HandlerCategory::Any),
        ];
        for (handler, expected) in cases {
            let validated = validate_handler(Some(handler.into()));
            assert_eq!(validated.category, expected);
            assert!(validated.error.is_none());
        }
    }

    #[tokio::test]
    async fn typed_handler_is_invoked_unmodified() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let handler = FunctionHandler::any(move |_ctx, _payload| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some(EventResponse::new(201, "typed"))) }
        });

        let validated = validate_handler(Some(handler.into()));
        let resp = call_any(&validated.handler).await.unwrap().unwrap();
        assert_eq!(resp.status_code, 201);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dynamic_shapes_are_classified() {
        let http = validate_handler(Some(
            echo_dynamic(vec![Shape::Context, Shape::HttpRequest], valid_results()).into(),
        ));
        assert_eq!(http.category, HandlerCategory::Http);

        let event = validate_handler(Some(
            echo_dynamic(vec![Shape::Context, Shape::StructuredEvent], valid_results()).into(),
        ));
        assert_eq!(event.category, HandlerCategory::StructuredEvent);

        let any = validate_handler(Some(
            echo_dynamic(vec![Shape::Context, Shape::Any], valid_results()).into(),
        ));
        assert_eq!(any.category, HandlerCategory::Any);
        let resp = call_any(&any.handler).await.unwrap().unwrap();
        assert_eq!(resp.body, b"http");
    }

    #[tokio::test]
    async fn dynamic_http_handler_receives_http_payload() {
        let validated = validate_handler(Some(
            echo_dynamic(vec![Shape::Context, Shape::HttpRequest], valid_results()).into(),
        ));
        let FunctionHandler::Http(f) = validated.handler else {
            panic!("expected http handler");
        };
        let resp = f
            .call(InvocationContext::default(), HttpRequest::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(resp.body, b"http");
    }

    #[test]
    fn missing_handler_is_rejected() {
        let validated = validate_handler(None);
        assert_eq!(validated.category, HandlerCategory::Any);
        assert_eq!(validated.error, Some(ValidationError::MissingHandler));
    }

    #[tokio::test]
    async fn malformed_dynamic_handlers_always_answer_with_error() {
        let other = |name: &str| Shape::Other(name.to_string());
        let cases = vec![
            (
                DynamicFunction {
                    signature: Signature {
                        kind: SymbolKind::Other("int".to_string()),
                        params: vec![],
                        results: vec![],
                    },
                    ..echo_dynamic(vec![], vec![])
                },
                "expected handler kind: func, but got: int",
            ),
            (
                echo_dynamic(vec![Shape::Context], valid_results()),
                "handler should take two arguments, but got 1",
            ),
            (
                echo_dynamic(vec![other("string"), Shape::Any], valid_results()),
                "the first argument of handler does not implement InvocationContext, got string",
            ),
            (
                echo_dynamic(vec![Shape::Context, other("Vec<u8>")], valid_results()),
                "the second argument of handler should be one of (HttpRequest, StructuredEvent, any), but got Vec<u8>",
            ),
            (
                echo_dynamic(vec![Shape::Context, Shape::Any], vec![Shape::EventResponse]),
                "handler should return two values, but got 1",
            ),
            (
                echo_dynamic(vec![Shape::Context, Shape::Any], vec![other("String"), Shape::Error]),
                "the first return value of handler should be EventResponse, but got String",
            ),
            (
                echo_dynamic(
                    vec![Shape::Context, Shape::Any],
                    vec![Shape::EventResponse, other("bool")],
                ),
                "the second return value of handler should implement error, but got bool",
            ),
        ];

        for (function, message) in cases {
            let validated = validate_handler(Some(function.into()));
            assert_eq!(validated.category, HandlerCategory::Any);
            assert_eq!(validated.error.as_ref().unwrap().to_string(), message);

            // Same error on every call.
            for _ in 0..2 {
                let err = call_any(&validated.handler).await.unwrap_err();
                assert_eq!(err.to_string(), message);
            }
        }
    }

    #[test]
    fn absent_initializer_stays_absent() {
        assert!(validate_initializer(None).is_none());
    }

    #[tokio::test]
    async fn valid_dynamic_initializer_is_kept() {
        let symbol = InitializerSymbol::Dynamic {
            signature: Signature::function(vec![Shape::Context], vec![Shape::Error]),
            call: Initializer::new(|_ctx| async { Ok(()) }),
        };
        let initializer = validate_initializer(Some(symbol)).unwrap();
        assert!(initializer.call(InvocationContext::default()).await.is_ok());
    }

    #[tokio::test]
    async fn invalid_dynamic_initializer_always_fails() {
        let cases = [
            (
                Signature::function(vec![], vec![Shape::Error]),
                "initializer should take one argument (InvocationContext), but got 0",
            ),
            (
                Signature::function(vec![Shape::Any], vec![Shape::Error]),
                "the argument of initializer should implement InvocationContext, but got any",
            ),
            (
                Signature::function(vec![Shape::Context], vec![]),
                "initializer should return one value (error), but got 0",
            ),
            (
                Signature::function(vec![Shape::Context], vec![Shape::EventResponse]),
                "the return value of initializer should implement error, but got EventResponse",
            ),
            (
                Signature {
                    kind: SymbolKind::Other("struct".to_string()),
                    params: vec![],
                    results: vec![],
                },
                "expected initializer kind: func, but got: struct",
            ),
        ];

        for (signature, message) in cases {
            let symbol = InitializerSymbol::Dynamic {
                signature,
                call: Initializer::new(|_ctx| async { Ok(()) }),
            };
            let initializer = validate_initializer(Some(symbol)).unwrap();
            let err = initializer.call(InvocationContext::default()).await.unwrap_err();
            assert_eq!(err.to_string(), message);
        }
    }
}
