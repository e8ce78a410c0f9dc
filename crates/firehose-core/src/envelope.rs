//! The named-event envelope, `{"name": string, "data": any}`.
//!
//! Outbound frames omit `data` entirely when there is no payload. Inbound
//! frames are accepted as long as they are a JSON object whose `name` is a
//! string; every other shape is rejected with an [`EnvelopeError`] and the
//! caller is expected to drop the frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A single event frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name.
    pub name: String,
    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Why an inbound frame could not be turned into an [`Envelope`].
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame was not valid JSON.
    #[error("invalid envelope JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame was JSON but not an object.
    #[error("envelope is not a JSON object")]
    NotAnObject,
    /// `name` was absent or not a string.
    #[error("envelope name missing or not a string")]
    InvalidName,
    /// Binary frame that is not UTF-8.
    #[error("envelope is not valid UTF-8")]
    NotUtf8,
}

impl Envelope {
    /// Serialize a frame without taking ownership of the payload.
    pub fn encode(name: &str, data: Option<&Value>) -> serde_json::Result<String> {
        #[derive(Serialize)]
        struct Outbound<'a> {
            name: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            data: Option<&'a Value>,
        }
        serde_json::to_string(&Outbound { name, data })
    }

    /// Parse an inbound text frame.
    ///
    /// `data` is kept verbatim (any JSON value); a missing `data` key yields `None`.
    pub fn decode(raw: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(raw)?;
        let Value::Object(mut map) = value else {
            return Err(EnvelopeError::NotAnObject);
        };
        let name = match map.remove("name") {
            Some(Value::String(name)) => name,
            _ => return Err(EnvelopeError::InvalidName),
        };
        Ok(Self {
            name,
            data: map.remove("data"),
        })
    }

    /// Parse an inbound binary frame as UTF-8 text.
    pub fn decode_bytes(raw: &[u8]) -> Result<Self, EnvelopeError> {
        let text = std::str::from_utf8(raw).map_err(|_| EnvelopeError::NotUtf8)?;
        Self::decode(text)
    }
}
