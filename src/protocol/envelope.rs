//! Envelope Codec
//!
//! Every frame exchanged over a peer connection is a JSON object with four
//! string fields:
//!
//! ```text
//! { "msg_type": string, "message": string, "from": string, "to": string }
//! ```
//!
//! Absent fields (and explicit `null`) decode as empty strings. Anything that
//! is not a JSON object with string-valued fields is rejected with a
//! [`DecodeError`]; no partial envelope is ever produced.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::constants::MSG_TYPE_PING;

/// Errors produced while decoding an inbound frame
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    #[error("frame is valid JSON but not an object")]
    NotAnObject,

    #[error("envelope field has the wrong type: {0}")]
    Shape(#[source] serde_json::Error),
}

/// Signaling envelope
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Envelope {
    /// Routing class; `PING` is reserved for heartbeats
    #[serde(rename = "msg_type", default, deserialize_with = "null_as_empty")]
    pub kind: String,
    /// Opaque content, forwarded verbatim
    #[serde(rename = "message", default, deserialize_with = "null_as_empty")]
    pub payload: String,
    #[serde(rename = "from", default, deserialize_with = "null_as_empty")]
    pub sender: String,
    #[serde(rename = "to", default, deserialize_with = "null_as_empty")]
    pub recipient: String,
}

impl Envelope {
    /// Create a new envelope
    pub fn new(
        kind: impl Into<String>,
        payload: impl Into<String>,
        sender: impl Into<String>,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            payload: payload.into(),
            sender: sender.into(),
            recipient: recipient.into(),
        }
    }

    /// Decode a raw frame
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_slice(raw).map_err(DecodeError::Syntax)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }

        Envelope::deserialize(value).map_err(DecodeError::Shape)
    }

    /// Encode to the wire form
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Whether this is a heartbeat that must not be forwarded
    pub fn is_heartbeat(&self) -> bool {
        self.kind == MSG_TYPE_PING
    }

    /// Whether a recipient was named at all
    pub fn has_recipient(&self) -> bool {
        !self.recipient.is_empty()
    }

    /// Re-address this envelope as coming from `sender`
    pub fn forwarded_from(self, sender: &str) -> Self {
        Self {
            sender: sender.to_string(),
            ..self
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
