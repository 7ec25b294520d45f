//! Wire framing for docwire messages.
//!
//! Every message exchanged between a client and a server is a single frame:
//!
//! ```text
//! [2 bytes: big-endian u16 header length N]
//! [N bytes: UTF-8 JSON header]
//! [content-length bytes: payload]
//! ```
//!
//! The header is a JSON object carrying `byteorder`, `content-type`,
//! `content-encoding` and `content-length`. Payloads tagged with
//! [`JSON_CONTENT_TYPE`] are parsed as JSON text in the declared encoding; any
//! other content type is surfaced as opaque bytes.
//!
//! The decode functions never block and never assume a TCP segment lines up
//! with a frame boundary. Each returns `Ok(None)` while the buffer does not yet
//! hold enough bytes, and reports how many bytes it consumed once it does.
//! [`FrameReader`] chains them into the incremental decoder used by a
//! connection.
use std::str::Utf8Error;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::connection::Phase;

/// Content type of JSON payloads.
pub const JSON_CONTENT_TYPE: &str = "text/json";

/// Size of the big-endian header length prefix.
pub const HEADER_LENGTH_SIZE: usize = 2;

/// Largest payload a peer may announce.
pub const MAX_CONTENT_LENGTH: usize = 16 * 1024 * 1024;

const REQUIRED_HEADERS: [&str; 4] = [
    "byteorder",
    "content-length",
    "content-type",
    "content-encoding",
];

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed header: missing required header \"{0}\"")]
    MissingHeader(&'static str),
    #[error("malformed header: {0}")]
    MalformedHeader(String),
    #[error("header of {0} bytes does not fit the 2 byte length prefix")]
    HeaderTooLarge(usize),
    #[error("payload of {0} bytes exceeds the {MAX_CONTENT_LENGTH} byte limit")]
    PayloadTooLarge(usize),
    #[error("unsupported content encoding '{0}'")]
    UnsupportedEncoding(String),
    #[error("payload is not valid text: {0}")]
    InvalidText(#[from] Utf8Error),
    #[error("payload is not valid ascii")]
    InvalidAscii,
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Frame metadata sent ahead of every payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub byteorder: String,
    #[serde(rename = "content-type")]
    pub content_type: String,
    #[serde(rename = "content-encoding")]
    pub content_encoding: String,
    #[serde(rename = "content-length")]
    pub content_length: usize,
}

impl Header {
    pub fn new(content_type: &str, content_encoding: &str, content_length: usize) -> Self {
        Self {
            byteorder: native_byteorder().to_string(),
            content_type: content_type.to_string(),
            content_encoding: content_encoding.to_string(),
            content_length,
        }
    }

    pub fn is_json(&self) -> bool {
        is_json(&self.content_type)
    }
}

/// A decoded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Binary(Vec<u8>),
}

pub fn is_json(content_type: &str) -> bool {
    content_type.eq_ignore_ascii_case(JSON_CONTENT_TYPE)
}

fn native_byteorder() -> &'static str {
    if cfg!(target_endian = "big") {
        "big"
    } else {
        "little"
    }
}

/// Builds a complete frame around `payload`.
pub fn encode_frame(
    payload: &[u8],
    content_type: &str,
    content_encoding: &str,
) -> Result<Vec<u8>, FrameError> {
    let header = Header::new(content_type, content_encoding, payload.len());
    let header = serde_json::to_vec(&header)?;
    let length =
        u16::try_from(header.len()).map_err(|_| FrameError::HeaderTooLarge(header.len()))?;

    let mut frame = Vec::with_capacity(HEADER_LENGTH_SIZE + header.len() + payload.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(&header);
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Serializes `value` as JSON and frames it.
pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, FrameError> {
    let payload = serde_json::to_vec(value)?;
    encode_frame(&payload, JSON_CONTENT_TYPE, "utf-8")
}

/// Reads the header length prefix. Returns the length and the bytes consumed.
pub fn decode_header_length(buffer: &[u8]) -> Option<(usize, usize)> {
    let prefix: [u8; HEADER_LENGTH_SIZE] = buffer.get(..HEADER_LENGTH_SIZE)?.try_into().ok()?;
    Some((u16::from_be_bytes(prefix) as usize, HEADER_LENGTH_SIZE))
}

/// Reads and validates a JSON header of `header_length` bytes.
pub fn decode_header(
    buffer: &[u8],
    header_length: usize,
) -> Result<Option<(Header, usize)>, FrameError> {
    let Some(bytes) = buffer.get(..header_length) else {
        return Ok(None);
    };

    let text = std::str::from_utf8(bytes)
        .map_err(|e| FrameError::MalformedHeader(format!("header is not UTF-8: {e}")))?;
    let value: Value = match text {
        "" => Value::Object(Default::default()),
        text => serde_json::from_str(text)
            .map_err(|e| FrameError::MalformedHeader(e.to_string()))?,
    };

    let Value::Object(fields) = &value else {
        return Err(FrameError::MalformedHeader(
            "header is not a JSON object".to_string(),
        ));
    };
    for required in REQUIRED_HEADERS {
        if !fields.contains_key(required) {
            return Err(FrameError::MissingHeader(required));
        }
    }

    let header: Header =
        serde_json::from_value(value).map_err(|e| FrameError::MalformedHeader(e.to_string()))?;
    if header.content_length > MAX_CONTENT_LENGTH {
        return Err(FrameError::PayloadTooLarge(header.content_length));
    }

    Ok(Some((header, header_length)))
}

/// Reads the payload described by `header`.
pub fn decode_payload(
    buffer: &[u8],
    header: &Header,
) -> Result<Option<(Payload, usize)>, FrameError> {
    let Some(bytes) = buffer.get(..header.content_length) else {
        return Ok(None);
    };

    let payload = if header.is_json() {
        let text = decode_text(bytes, &header.content_encoding)?;
        Payload::Json(serde_json::from_str(text)?)
    } else {
        Payload::Binary(bytes.to_vec())
    };

    Ok(Some((payload, header.content_length)))
}

fn decode_text<'a>(bytes: &'a [u8], encoding: &str) -> Result<&'a str, FrameError> {
    match encoding.to_ascii_lowercase().as_str() {
        "utf-8" | "utf8" => Ok(std::str::from_utf8(bytes)?),
        "ascii" | "us-ascii" => {
            if !bytes.is_ascii() {
                return Err(FrameError::InvalidAscii);
            }
            Ok(std::str::from_utf8(bytes)?)
        }
        other => Err(FrameError::UnsupportedEncoding(other.to_string())),
    }
}

/// Incremental decoder for a single inbound frame.
#[derive(Debug, Default)]
pub struct FrameReader {
    buffer: Vec<u8>,
    header_length: Option<usize>,
    header: Option<Header>,
    complete: bool,
}

impl FrameReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn phase(&self) -> Phase {
        if self.complete {
            Phase::Complete
        } else if self.header.is_some() {
            Phase::AwaitingPayload
        } else if self.header_length.is_some() {
            Phase::AwaitingHeader
        } else {
            Phase::AwaitingHeaderLength
        }
    }

    /// Advances as far as the buffered bytes allow. Yields the payload once,
    /// when the frame completes.
    pub fn advance(&mut self) -> Result<Option<Payload>, FrameError> {
        if self.complete {
            return Ok(None);
        }

        let header_length = match self.header_length {
            Some(length) => length,
            None => match decode_header_length(&self.buffer) {
                Some((length, consumed)) => {
                    self.buffer.drain(..consumed);
                    self.header_length = Some(length);
                    length
                }
                None => return Ok(None),
            },
        };

        if self.header.is_none() {
            match decode_header(&self.buffer, header_length)? {
                Some((header, consumed)) => {
                    self.buffer.drain(..consumed);
                    self.header = Some(header);
                }
                None => return Ok(None),
            }
        }

        let Some(header) = self.header.as_ref() else {
            return Ok(None);
        };
        match decode_payload(&self.buffer, header)? {
            Some((payload, consumed)) => {
                self.buffer.drain(..consumed);
                self.complete = true;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }
}
