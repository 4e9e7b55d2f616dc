//! Structured event decoding.
//!
//! [`EventCodec`] is the decode contract the dispatcher relies on: one event
//! from one set of headers plus one body. [`CloudEventCodec`] implements the
//! `CloudEvents` HTTP protocol binding for spec versions 1.0 and 0.3, in both
//! binary mode (`ce-*` headers, body is the data) and structured mode
//! (`application/cloudevents+json` body). Batch mode is rejected; batches use
//! the private envelope in [`crate::batch`].

use std::collections::BTreeMap;

use base64::Engine;
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use serde_json::{Map, Value};

use crate::types::StructuredEvent;

/// Spec versions accepted by [`CloudEventCodec`].
pub const SUPPORTED_SPEC_VERSIONS: [&str; 2] = ["1.0", "0.3"];

const BINARY_PREFIX: &str = "ce-";
const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents";
const BATCH_CONTENT_TYPE: &str = "application/cloudevents-batch";

/// Errors from decoding a structured event.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("unknown Message encoding")]
    UnknownEncoding,
    #[error("batch mode cloudevents are not supported")]
    BatchModeUnsupported,
    #[error("specversion {0:?} is not supported")]
    UnsupportedSpecVersion(String),
    #[error("missing required attribute {0:?}")]
    MissingAttribute(&'static str),
    #[error("attribute {name:?} is not a valid string")]
    InvalidAttribute { name: String },
    #[error("invalid structured event body: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid data_base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
}

/// Decodes one structured event from transport headers and body.
pub trait EventCodec: Send + Sync {
    /// Decodes a single event.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the message is not a valid event.
    fn decode(&self, headers: &HeaderMap, body: &[u8]) -> Result<StructuredEvent, CodecError>;
}

/// `CloudEvents` HTTP binding codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct CloudEventCodec;

impl EventCodec for CloudEventCodec {
    fn decode(&self, headers: &HeaderMap, body: &[u8]) -> Result<StructuredEvent, CodecError> {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_ascii_lowercase());

        if let Some(ct) = content_type.as_deref() {
            if ct.starts_with(BATCH_CONTENT_TYPE) {
                return Err(CodecError::BatchModeUnsupported);
            }
            if ct.starts_with(STRUCTURED_CONTENT_TYPE) {
                return decode_structured(body);
            }
        }

        if headers.contains_key("ce-specversion") {
            return decode_binary(headers, body);
        }

        Err(CodecError::UnknownEncoding)
    }
}

// ---------------------------------------------------------------------------
// Binary mode
// ---------------------------------------------------------------------------

fn decode_binary(headers: &HeaderMap, body: &[u8]) -> Result<StructuredEvent, CodecError> {
    let mut attrs: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let Some(attr) = name.as_str().strip_prefix(BINARY_PREFIX) else {
            continue;
        };
        let value = value
            .to_str()
            .map_err(|_| CodecError::InvalidAttribute {
                name: attr.to_string(),
            })?
            .trim()
            .to_string();
        // Repeated headers: first value wins, matching `HeaderMap::get`.
        attrs.entry(attr.to_string()).or_insert(value);
    }

    let spec_version = take_required(&mut attrs, "specversion")?;
    check_spec_version(&spec_version)?;

    let data_content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string());

    Ok(StructuredEvent {
        id: take_required(&mut attrs, "id")?,
        source: take_required(&mut attrs, "source")?,
        event_type: take_required(&mut attrs, "type")?,
        time: attrs.remove("time"),
        subject: attrs.remove("subject"),
        data_schema: take_schema(&mut attrs, &spec_version),
        data_content_type,
        spec_version,
        extensions: attrs,
        data: body.to_vec(),
    })
}

fn take_required(
    attrs: &mut BTreeMap<String, String>,
    name: &'static str,
) -> Result<String, CodecError> {
    match attrs.remove(name) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CodecError::MissingAttribute(name)),
    }
}

fn take_schema(attrs: &mut BTreeMap<String, String>, spec_version: &str) -> Option<String> {
    if spec_version == "0.3" {
        attrs.remove("schemaurl")
    } else {
        attrs.remove("dataschema")
    }
}

fn check_spec_version(version: &str) -> Result<(), CodecError> {
    if SUPPORTED_SPEC_VERSIONS.contains(&version) {
        Ok(())
    } else {
        Err(CodecError::UnsupportedSpecVersion(version.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Structured mode
// ---------------------------------------------------------------------------

fn decode_structured(body: &[u8]) -> Result<StructuredEvent, CodecError> {
    let mut object: Map<String, Value> = serde_json::from_slice(body)?;

    let spec_version = take_json_required(&mut object, "specversion")?;
    check_spec_version(&spec_version)?;

    let id = take_json_required(&mut object, "id")?;
    let source = take_json_required(&mut object, "source")?;
    let event_type = take_json_required(&mut object, "type")?;
    let time = take_json_optional(&mut object, "time")?;
    let subject = take_json_optional(&mut object, "subject")?;
    let data_content_type = take_json_optional(&mut object, "datacontenttype")?;
    let schema_key = if spec_version == "0.3" { "schemaurl" } else { "dataschema" };
    let data_schema = take_json_optional(&mut object, schema_key)?;

    let data = match (object.remove("data_base64"), object.remove("data")) {
        (Some(Value::String(encoded)), _) => {
            base64::engine::general_purpose::STANDARD.decode(encoded.as_bytes())?
        }
        (Some(_), _) => {
            return Err(CodecError::InvalidAttribute {
                name: "data_base64".to_string(),
            })
        }
        (None, None | Some(Value::Null)) => Vec::new(),
        (None, Some(Value::String(text))) if !is_json_content(data_content_type.as_deref()) => {
            text.into_bytes()
        }
        (None, Some(value)) => serde_json::to_vec(&value)?,
    };

    let mut extensions = BTreeMap::new();
    for (name, value) in object {
        let text = match value {
            Value::String(s) => s,
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            _ => return Err(CodecError::InvalidAttribute { name }),
        };
        extensions.insert(name.to_ascii_lowercase(), text);
    }

    Ok(StructuredEvent {
        spec_version,
        id,
        source,
        event_type,
        time,
        subject,
        data_content_type,
        data_schema,
        extensions,
        data,
    })
}

fn take_json_required(
    object: &mut Map<String, Value>,
    name: &'static str,
) -> Result<String, CodecError> {
    match take_json_optional(object, name)? {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CodecError::MissingAttribute(name)),
    }
}

fn take_json_optional(
    object: &mut Map<String, Value>,
    name: &str,
) -> Result<Option<String>, CodecError> {
    match object.remove(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(CodecError::InvalidAttribute {
            name: name.to_string(),
        }),
    }
}

/// A missing content type defaults to JSON in structured mode.
fn is_json_content(content_type: Option<&str>) -> bool {
    content_type.map_or(true, |ct| {
        let ct = ct.to_ascii_lowercase();
        ct.starts_with("application/json") || ct.contains("+json")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn binary_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("ce-specversion", HeaderValue::from_static("1.0"));
        headers.insert("ce-id", HeaderValue::from_static("evt-1"));
        headers.insert("ce-source", HeaderValue::from_static("/timer/t1"));
        headers.insert("ce-type", HeaderValue::from_static("timer.fired"));
        headers
    }

    #[test]
    fn decodes_binary_mode() {
        let mut headers = binary_headers();
        headers.insert("ce-time", HeaderValue::from_static("2024-01-01T00:00:00Z"));
        headers.insert("ce-subject", HeaderValue::from_static("s"));
        headers.insert("ce-traceparent", HeaderValue::from_static("00-abc"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let event = CloudEventCodec.decode(&headers, br#"{"a":1}"#).unwrap();
        assert_eq!(event.spec_version, "1.0");
        assert_eq!(event.id, "evt-1");
        assert_eq!(event.source, "/timer/t1");
        assert_eq!(event.event_type, "timer.fired");
        assert_eq!(event.time.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(event.subject.as_deref(), Some("s"));
        assert_eq!(event.data_content_type.as_deref(), Some("application/json"));
        assert_eq!(event.extensions.get("traceparent").map(String::as_str), Some("00-abc"));
        assert_eq!(event.data, br#"{"a":1}"#);
    }

    #[test]
    fn binary_mode_requires_id() {
        let mut headers = binary_headers();
        headers.remove("ce-id");
        let err = CloudEventCodec.decode(&headers, b"").unwrap_err();
        assert!(matches!(err, CodecError::MissingAttribute("id")));
    }

    #[test]
    fn binary_mode_rejects_unknown_spec_version() {
        let mut headers = binary_headers();
        headers.insert("ce-specversion", HeaderValue::from_static("2.0"));
        let err = CloudEventCodec.decode(&headers, b"").unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedSpecVersion(v) if v == "2.0"));
    }

    #[test]
    fn binary_mode_v03_reads_schemaurl() {
        let mut headers = binary_headers();
        headers.insert("ce-specversion", HeaderValue::from_static("0.3"));
        headers.insert("ce-schemaurl", HeaderValue::from_static("http://schema"));
        let event = CloudEventCodec.decode(&headers, b"").unwrap();
        assert_eq!(event.data_schema.as_deref(), Some("http://schema"));
        assert!(event.extensions.is_empty());
    }

    #[test]
    fn plain_request_is_unknown_encoding() {
        let err = CloudEventCodec.decode(&HeaderMap::new(), b"hello").unwrap_err();
        assert!(matches!(err, CodecError::UnknownEncoding));
        assert_eq!(err.to_string(), "unknown Message encoding");
    }

    #[test]
    fn decodes_structured_mode_json_data() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/cloudevents+json; charset=utf-8"),
        );
        let body = br#"{
            "specversion": "1.0",
            "id": "42",
            "source": "/mq",
            "type": "mq.message",
            "datacontenttype": "application/json",
            "partition": 3,
            "data": {"k": "v"}
        }"#;

        let event = CloudEventCodec.decode(&headers, body).unwrap();
        assert_eq!(event.id, "42");
        assert_eq!(event.extensions.get("partition").map(String::as_str), Some("3"));
        let data: serde_json::Value = event.data_as_json().unwrap();
        assert_eq!(data["k"], "v");
    }

    #[test]
    fn decodes_structured_mode_base64_data() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/cloudevents+json"));
        let body = br#"{"specversion":"1.0","id":"1","source":"s","type":"t","data_base64":"aGVsbG8="}"#;
        let event = CloudEventCodec.decode(&headers, body).unwrap();
        assert_eq!(event.data, b"hello");
    }

    #[test]
    fn structured_mode_text_data_is_raw() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/cloudevents+json"));
        let body = br#"{"specversion":"1.0","id":"1","source":"s","type":"t","datacontenttype":"text/plain","data":"hi"}"#;
        let event = CloudEventCodec.decode(&headers, body).unwrap();
        assert_eq!(event.data, b"hi");
    }

    #[test]
    fn structured_mode_rejects_bad_json() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/cloudevents+json"));
        let err = CloudEventCodec.decode(&headers, b"{not json").unwrap_err();
        assert!(matches!(err, CodecError::InvalidJson(_)));
    }

    #[test]
    fn batch_mode_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/cloudevents-batch+json"),
        );
        let err = CloudEventCodec.decode(&headers, b"[]").unwrap_err();
        assert!(matches!(err, CodecError::BatchModeUnsupported));
    }
}
