//! Client side of the bridge.

use bridge_protocol_types::{MessageEnvelope, WireFrame, WireResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::message::{envelope_for, Message};
use crate::transport::Transport;
use crate::{BridgeError, BridgeResult};

/// Validates, stamps and sends messages to a router port.
#[derive(Clone)]
pub struct MessageRequester {
    transport: Arc<dyn Transport>,
}

impl MessageRequester {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Origin stamped on every outgoing message. Empty when the local
    /// sender's url has no origin, which any origin guard rejects.
    pub fn origin(&self) -> String {
        self.transport.local_sender().origin().unwrap_or_default()
    }

    /// Send `msg` to the router on `port` and decode its typed answer.
    pub async fn send_message<M: Message>(&self, port: &str, msg: &M) -> BridgeResult<M::Response> {
        msg.validate_basic()?;
        let envelope = envelope_for(msg, &self.origin())?;
        let value = self.send_envelope(port, envelope).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send an already built envelope. Its origin is replaced with ours.
    pub async fn send_envelope(&self, port: &str, mut envelope: MessageEnvelope) -> BridgeResult<Value> {
        envelope.origin = self.origin();
        let frame = WireFrame::from_envelope(port, &envelope).map_err(BridgeError::Protocol)?;
        debug!(port = %port, type_tag = %envelope.type_tag, route = %envelope.route, "Sending message");

        let result = self.transport.send(frame).await?;
        unwrap_result(result)
    }
}

fn unwrap_result(result: WireResult) -> BridgeResult<Value> {
    match result {
        WireResult {
            error: Some(message),
            ..
        } => Err(BridgeError::from_remote(&message)),
        WireResult {
            value: Some(value), ..
        } => Ok(value),
        WireResult {
            value: None,
            error: None,
        } => Err(BridgeError::NullResult),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_wins_over_value() {
        let result = WireResult {
            value: Some(json!(1)),
            error: Some("Request rejected".to_string()),
        };
        assert!(matches!(unwrap_result(result), Err(BridgeError::Rejected)));
    }

    #[test]
    fn explicit_null_is_a_value() {
        assert_eq!(unwrap_result(WireResult::success(Value::Null)).unwrap(), Value::Null);
    }

    #[test]
    fn empty_result_is_null_result() {
        let result = WireResult {
            value: None,
            error: None,
        };
        assert!(matches!(unwrap_result(result), Err(BridgeError::NullResult)));
    }
}
