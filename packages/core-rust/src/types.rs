use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of the `X-Faas-Event-Type` request header.
///
/// An absent (or empty) header is represented by `Option::None` at the call
/// sites rather than by a variant here, because its meaning depends on the
/// handler category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Regular HTTP request, e.g. from an API gateway trigger.
    Http,
    /// A single structured event (timer, object storage, message queue, ...).
    CloudEvent,
    /// A batch of structured events packed in the binary batch envelope.
    BatchCloudEvent,
}

impl EventType {
    /// Returns the literal header value for this event type.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::CloudEvent => "cloudevent",
            Self::BatchCloudEvent => "batch-cloudevent",
        }
    }

    /// Parses a header value. Matching is exact; unknown values return `None`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "http" => Some(Self::Http),
            "cloudevent" => Some(Self::CloudEvent),
            "batch-cloudevent" => Some(Self::BatchCloudEvent),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An HTTP invocation as seen by a user function.
///
/// Multi-valued query parameters and headers are joined with `,`. Header
/// names are lower-case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpRequest {
    /// Request method, e.g. `GET`.
    pub http_method: String,
    /// Request path, e.g. `/abc`.
    pub path: String,
    /// Caller address as `ip:port`.
    pub remote_addr: String,
    /// Parsed path parameters.
    pub path_parameters: HashMap<String, String>,
    /// Parsed query string parameters.
    pub query_string_parameters: HashMap<String, String>,
    /// Request headers.
    pub headers: HashMap<String, String>,
    /// Raw request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Looks up a header by name, ignoring ASCII case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Response returned from a user function.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventResponse {
    /// HTTP status code. `0` leaves the transport default (200) in place.
    pub status_code: u16,
    /// Extra response headers; each entry replaces any existing value.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl EventResponse {
    /// Creates a response with the given status and body and no headers.
    #[must_use]
    pub fn new(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Adds a header, replacing any previous value for the same name.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

/// A decoded structured event (`CloudEvents` 1.0 / 0.3 attributes plus data).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredEvent {
    /// `specversion` attribute.
    pub spec_version: String,
    /// `id` attribute.
    pub id: String,
    /// `source` attribute.
    pub source: String,
    /// `type` attribute.
    #[serde(rename = "type")]
    pub event_type: String,
    /// `time` attribute, kept as the RFC 3339 string that was received.
    pub time: Option<String>,
    /// `subject` attribute.
    pub subject: Option<String>,
    /// `datacontenttype` attribute.
    pub data_content_type: Option<String>,
    /// `dataschema` (1.0) or `schemaurl` (0.3) attribute.
    pub data_schema: Option<String>,
    /// Extension attributes, keyed by lower-case attribute name.
    pub extensions: BTreeMap<String, String>,
    /// Event data bytes. Empty when the event carries no data.
    pub data: Vec<u8>,
}

impl StructuredEvent {
    /// Deserializes the event data as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not valid JSON for `T`.
    pub fn data_as_json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.data)
    }
}

/// Payload handed to a function that accepts any event type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Regular HTTP request.
    Http(HttpRequest),
    /// A single structured event.
    Event(StructuredEvent),
}

impl Payload {
    /// Returns the event type this payload was dispatched as.
    #[must_use]
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Http(_) => EventType::Http,
            Self::Event(_) => EventType::CloudEvent,
        }
    }
}

impl From<HttpRequest> for Payload {
    fn from(request: HttpRequest) -> Self {
        Self::Http(request)
    }
}

impl From<StructuredEvent> for Payload {
    fn from(event: StructuredEvent) -> Self {
        Self::Event(event)
    }
}
