use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::codec::{FrameError, JSON_CONTENT_TYPE, encode_frame};

/// Operation name and arguments carried by a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestContent {
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Document to insert, usually as JSON-encoded text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Search filter, usually as JSON-encoded text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestContent {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Body {
    Content(RequestContent),
    Binary(Vec<u8>),
}

/// A request as the client sends it.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    content_type: String,
    encoding: String,
    body: Body,
}

impl Request {
    pub fn new(content: RequestContent) -> Self {
        Self {
            content_type: JSON_CONTENT_TYPE.to_string(),
            encoding: "utf-8".to_string(),
            body: Body::Content(content),
        }
    }

    /// An opaque request; the server answers it without touching the store.
    pub fn binary(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            encoding: "binary".to_string(),
            body: Body::Binary(bytes),
        }
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn encoding(&self) -> &str {
        &self.encoding
    }

    pub fn content(&self) -> Option<&RequestContent> {
        match &self.body {
            Body::Content(content) => Some(content),
            Body::Binary(_) => None,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
        match &self.body {
            Body::Content(content) => {
                let payload = serde_json::to_vec(content)?;
                encode_frame(&payload, &self.content_type, &self.encoding)
            }
            Body::Binary(bytes) => encode_frame(bytes, &self.content_type, &self.encoding),
        }
    }
}

impl From<RequestContent> for Request {
    fn from(value: RequestContent) -> Self {
        Request::new(value)
    }
}
