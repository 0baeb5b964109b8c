//! Transport framing.
//!
//! Outbound: `{ "port": "...", "type": "...", "msg": { ... } }`.
//! Inbound: `{ "return": value }` or `{ "error": "message" }`.

use serde::{Deserialize, Serialize};

use crate::MessageEnvelope;

/// A message as carried by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    /// Router namespace on a shared transport.
    pub port: String,
    /// Message type tag.
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Serialized payload, including the sender-stamped `origin`.
    pub msg: serde_json::Value,
}

impl WireFrame {
    /// Build a frame for `envelope` addressed to `port`.
    ///
    /// The payload must be a JSON object; its `origin` key is overwritten
    /// with the envelope's origin.
    pub fn from_envelope(port: &str, envelope: &MessageEnvelope) -> Result<Self, String> {
        let mut msg = match &envelope.payload {
            serde_json::Value::Object(map) => map.clone(),
            other => {
                return Err(format!(
                    "payload of {} must be a JSON object, got {}",
                    envelope.type_tag, other
                ))
            }
        };
        msg.insert(
            "origin".to_string(),
            serde_json::Value::String(envelope.origin.clone()),
        );

        Ok(Self {
            port: port.to_string(),
            type_tag: envelope.type_tag.clone(),
            msg: serde_json::Value::Object(msg),
        })
    }

    /// Split the frame's `msg` into the claimed origin and the bare payload.
    ///
    /// A missing origin yields an empty string, which never matches a real
    /// sender and is therefore rejected by the origin guard.
    pub fn split_origin(&self) -> Result<(String, serde_json::Value), String> {
        let mut map = match &self.msg {
            serde_json::Value::Object(map) => map.clone(),
            other => {
                return Err(format!(
                    "msg of {} must be a JSON object, got {}",
                    self.type_tag, other
                ))
            }
        };
        let origin = match map.remove("origin") {
            Some(serde_json::Value::String(origin)) => origin,
            _ => String::new(),
        };
        Ok((origin, serde_json::Value::Object(map)))
    }
}

/// Uniform dispatch answer; exactly one field is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireResult {
    /// Handler return value (if successful).
    #[serde(
        rename = "return",
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_present"
    )]
    pub value: Option<serde_json::Value>,
    /// Error message (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WireResult {
    /// Create a successful result.
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            value: Some(value),
            error: None,
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            value: None,
            error: Some(message.into()),
        }
    }
}

/// Keep an explicit `"return": null` as `Some(Null)`; only a missing key is
/// `None`.
fn deserialize_present<'de, D>(deserializer: D) -> Result<Option<serde_json::Value>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    serde_json::Value::deserialize(deserializer).map(Some)
}
