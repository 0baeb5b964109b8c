//! Message contracts.
//!
//! A concrete message is a serde struct implementing [`Message`]. Messages
//! addressed to the same route are gathered in a tagged union implementing
//! [`RouteMessage`]; the route's handler matches on it exhaustively.

use bridge_protocol_types::MessageEnvelope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::Any;

use crate::BridgeResult;

/// A single message type.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Unique type tag.
    const TYPE: &'static str;

    /// Tagged union of the route this message belongs to.
    type Route: RouteMessage + From<Self>;

    /// Typed answer carried in `{ "return": ... }`.
    type Response: Serialize + DeserializeOwned + Send + 'static;

    /// Name of the handler group.
    fn route() -> &'static str {
        <Self::Route as RouteMessage>::ROUTE
    }

    /// Reject malformed payloads. Runs on both sides of the boundary.
    fn validate_basic(&self) -> BridgeResult<()> {
        Ok(())
    }

    /// Whether untrusted (external) senders may invoke this message.
    fn approve_external(&self) -> bool {
        false
    }
}

/// Tagged union of every message one route accepts.
pub trait RouteMessage: Send + Sync + 'static {
    const ROUTE: &'static str;

    fn message_type(&self) -> &'static str;

    fn validate_basic(&self) -> BridgeResult<()>;

    fn approve_external(&self) -> bool;
}

/// Object-safe view of a decoded route message.
pub(crate) trait ErasedRouteMessage: Send + Sync {
    fn message_type(&self) -> &'static str;
    fn validate_basic(&self) -> BridgeResult<()>;
    fn approve_external(&self) -> bool;
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<R: RouteMessage> ErasedRouteMessage for R {
    fn message_type(&self) -> &'static str {
        RouteMessage::message_type(self)
    }

    fn validate_basic(&self) -> BridgeResult<()> {
        RouteMessage::validate_basic(self)
    }

    fn approve_external(&self) -> bool {
        RouteMessage::approve_external(self)
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// A decoded message together with the envelope it arrived in.
pub struct InboundMessage {
    envelope: MessageEnvelope,
    message: Box<dyn ErasedRouteMessage>,
}

impl InboundMessage {
    pub(crate) fn new(envelope: MessageEnvelope, message: Box<dyn ErasedRouteMessage>) -> Self {
        Self { envelope, message }
    }

    pub fn type_tag(&self) -> &str {
        &self.envelope.type_tag
    }

    pub fn route(&self) -> &str {
        &self.envelope.route
    }

    /// Origin claimed by the sending requester.
    pub fn origin(&self) -> &str {
        &self.envelope.origin
    }

    pub fn approve_external(&self) -> bool {
        self.message.approve_external()
    }

    pub fn envelope(&self) -> &MessageEnvelope {
        &self.envelope
    }

    pub(crate) fn validate_basic(&self) -> BridgeResult<()> {
        self.message.validate_basic()
    }

    pub(crate) fn into_message(self) -> Box<dyn ErasedRouteMessage> {
        self.message
    }
}

/// Build the outbound envelope for `msg`.
pub fn envelope_for<M: Message>(msg: &M, origin: &str) -> BridgeResult<MessageEnvelope> {
    Ok(MessageEnvelope {
        type_tag: M::TYPE.to_string(),
        route: M::route().to_string(),
        origin: origin.to_string(),
        payload: serde_json::to_value(msg)?,
    })
}
