use serde::{Deserialize, Serialize};

use crate::WireFrame;

/// Typed request descriptor as seen by a router before decoding the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Unique type tag of the message.
    pub type_tag: String,
    /// Handler group the message is addressed to.
    pub route: String,
    /// Origin stamped by the sending requester.
    pub origin: String,
    /// Message fields (a JSON object).
    pub payload: serde_json::Value,
}

impl MessageEnvelope {
    /// Rebuild an envelope from a received frame once the route is known.
    pub fn from_frame(frame: &WireFrame, route: &str) -> Result<Self, String> {
        let (origin, payload) = frame.split_origin()?;
        Ok(Self {
            type_tag: frame.type_tag.clone(),
            route: route.to_string(),
            origin,
            payload,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_frame_recovers_origin_and_route() {
        let frame = WireFrame {
            port: "background".to_string(),
            type_tag: "approve-interaction".to_string(),
            msg: json!({ "origin": "chrome-extension://abc", "id": "00ff" }),
        };

        let envelope = MessageEnvelope::from_frame(&frame, "interaction").unwrap();
        assert_eq!(envelope.route, "interaction");
        assert_eq!(envelope.origin, "chrome-extension://abc");
        assert_eq!(envelope.payload, json!({ "id": "00ff" }));
    }
}
