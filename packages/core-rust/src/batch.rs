//! Binary batch envelope codec.
//!
//! Packs several structured events into one request body. Big-endian
//! throughout:
//!
//! ```text
//! count      u32
//! repeat count times:
//!   hdr_len  u32
//!   hdr      hdr_len bytes   CRLF-joined "key:value" lines
//!   body_len u32
//!   body     body_len bytes
//! ```
//!
//! Header lines that do not contain exactly one `:` are skipped, and each
//! value is split on `,` into repeated header entries. A value containing
//! either character therefore does not survive a round trip.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::HeaderMap;

use crate::codec::{CodecError, EventCodec};
use crate::types::StructuredEvent;

/// The only envelope version this codec understands.
pub const SUPPORTED_VERSION: &str = "1.0";

const LEN_PREFIX: usize = 4;
const LINE_SEPARATOR: &[u8] = b"\r\n";

/// Errors from decoding or encoding a batch envelope.
#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("batch events version {0} is not supported")]
    UnsupportedVersion(String),
    #[error("batch envelope truncated reading {field}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        field: &'static str,
        needed: usize,
        remaining: usize,
    },
    #[error("failed to parse cloudevent in batch request, err: {0}")]
    Event(#[source] CodecError),
    #[error("batch envelope {field} of {len} bytes exceeds the u32 length prefix")]
    TooLarge { field: &'static str, len: usize },
}

/// One undecoded event of a batch: its header block and body.
#[derive(Debug, Clone, Default)]
pub struct RawEvent {
    /// Headers parsed from the event's header block.
    pub headers: HeaderMap,
    /// Event body.
    pub body: Bytes,
}

/// Decodes a batch body into structured events, in envelope order.
///
/// The batch fails as a whole: if any event fails to decode, no events are
/// returned.
///
/// # Errors
///
/// - [`BatchError::UnsupportedVersion`] unless `version` is `1.0`
/// - [`BatchError::Truncated`] when a length prefix points past the input
/// - [`BatchError::Event`] when the codec rejects an event
pub fn decode_batch(
    version: &str,
    data: &[u8],
    codec: &dyn EventCodec,
) -> Result<Vec<StructuredEvent>, BatchError> {
    if version != SUPPORTED_VERSION {
        return Err(BatchError::UnsupportedVersion(version.to_string()));
    }

    decode_envelope(data)?
        .into_iter()
        .map(|raw| codec.decode(&raw.headers, &raw.body).map_err(BatchError::Event))
        .collect()
}

/// Splits an envelope into raw events without decoding them.
///
/// Bytes after the last declared event are ignored.
///
/// # Errors
///
/// Returns [`BatchError::Truncated`] if the input ends early.
pub fn decode_envelope(data: &[u8]) -> Result<Vec<RawEvent>, BatchError> {
    let mut buf = data;
    let count = read_u32(&mut buf, "event count")? as usize;

    // Every event needs at least two length prefixes; don't trust `count`
    // for the allocation.
    let mut events = Vec::with_capacity(count.min(buf.remaining() / (2 * LEN_PREFIX)));
    for _ in 0..count {
        let header_len = read_u32(&mut buf, "header length")? as usize;
        let header_block = read_bytes(&mut buf, header_len, "header block")?;
        let body_len = read_u32(&mut buf, "body length")? as usize;
        let body = read_bytes(&mut buf, body_len, "body")?;

        events.push(RawEvent {
            headers: parse_header_block(&header_block),
            body,
        });
    }

    Ok(events)
}

/// Encodes raw events into an envelope.
///
/// Repeated values of a header are joined with `,` on one line.
///
/// # Errors
///
/// Returns [`BatchError::TooLarge`] if the event count, a header block or a
/// body does not fit a `u32` length prefix.
pub fn encode_batch(events: &[RawEvent]) -> Result<Bytes, BatchError> {
    let mut out = BytesMut::new();
    out.put_u32(len_prefix(events.len(), "event count")?);

    for event in events {
        let header_block = format_header_block(&event.headers);
        out.put_u32(len_prefix(header_block.len(), "header block")?);
        out.put_slice(&header_block);
        out.put_u32(len_prefix(event.body.len(), "body")?);
        out.put_slice(&event.body);
    }

    Ok(out.freeze())
}

/// Parses a CRLF-joined `key:value` header block.
///
/// Malformed lines, and names or values that are not valid HTTP header
/// tokens, are skipped.
#[must_use]
pub fn parse_header_block(block: &[u8]) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for line in split_lines(block) {
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split(|b| *b == b':');
        let (Some(name), Some(values), None) = (parts.next(), parts.next(), parts.next()) else {
            tracing::trace!(line = %String::from_utf8_lossy(line), "skipping malformed batch header line");
            continue;
        };
        let Ok(name) = HeaderName::from_bytes(name) else {
            continue;
        };
        for value in values.split(|b| *b == b',') {
            if let Ok(value) = HeaderValue::from_bytes(value) {
                headers.append(name.clone(), value);
            }
        }
    }
    headers
}

fn format_header_block(headers: &HeaderMap) -> Vec<u8> {
    let mut block = Vec::new();
    for name in headers.keys() {
        if !block.is_empty() {
            block.extend_from_slice(LINE_SEPARATOR);
        }
        block.extend_from_slice(name.as_str().as_bytes());
        block.push(b':');
        for (i, value) in headers.get_all(name).iter().enumerate() {
            if i > 0 {
                block.push(b',');
            }
            block.extend_from_slice(value.as_bytes());
        }
    }
    block
}

fn split_lines(block: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(block);
    std::iter::from_fn(move || {
        let current = rest?;
        match current
            .windows(LINE_SEPARATOR.len())
            .position(|w| w == LINE_SEPARATOR)
        {
            Some(pos) => {
                rest = Some(&current[pos + LINE_SEPARATOR.len()..]);
                Some(&current[..pos])
            }
            None => {
                rest = None;
                Some(current)
            }
        }
    })
}

fn read_u32(buf: &mut &[u8], field: &'static str) -> Result<u32, BatchError> {
    ensure_remaining(buf, LEN_PREFIX, field)?;
    Ok(buf.get_u32())
}

fn read_bytes(buf: &mut &[u8], len: usize, field: &'static str) -> Result<Bytes, BatchError> {
    ensure_remaining(buf, len, field)?;
    Ok(buf.copy_to_bytes(len))
}

fn ensure_remaining(buf: &[u8], needed: usize, field: &'static str) -> Result<(), BatchError> {
    if buf.remaining() < needed {
        return Err(BatchError::Truncated {
            field,
            needed,
            remaining: buf.remaining(),
        });
    }
    Ok(())
}

fn len_prefix(len: usize, field: &'static str) -> Result<u32, BatchError> {
    u32::try_from(len).map_err(|_| BatchError::TooLarge { field, len })
}
