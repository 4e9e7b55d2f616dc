//! FaaS runtime core: payload types, invocation context, and the
//! structured-event and batch-envelope codecs.

pub mod batch;
pub mod codec;
pub mod context;
pub mod headers;
pub mod types;

pub use batch::{decode_batch, encode_batch, BatchError, RawEvent};
pub use codec::{CloudEventCodec, CodecError, EventCodec};
pub use context::InvocationContext;
pub use types::{EventResponse, EventType, HttpRequest, Payload, StructuredEvent};
