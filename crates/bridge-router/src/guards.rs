//! Guard chain run before any handler sees a message.

use async_trait::async_trait;
use bridge_protocol_types::MessageSender;

use crate::message::InboundMessage;
use crate::{BridgeError, BridgeResult};

/// The part of `Env` guards may look at. Guards cannot request interactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardEnv {
    pub is_internal_msg: bool,
}

/// A predicate that can reject an inbound message outright.
#[async_trait]
pub trait Guard: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn check(
        &self,
        env: &GuardEnv,
        msg: &InboundMessage,
        sender: &MessageSender,
    ) -> BridgeResult<()>;
}

/// Requires the origin stamped on the envelope to equal the origin the
/// transport reports for the sender.
#[derive(Debug, Default, Clone, Copy)]
pub struct OriginGuard;

#[async_trait]
impl Guard for OriginGuard {
    fn name(&self) -> &'static str {
        "origin"
    }

    async fn check(
        &self,
        _env: &GuardEnv,
        msg: &InboundMessage,
        sender: &MessageSender,
    ) -> BridgeResult<()> {
        match sender.origin() {
            Some(origin) if !msg.origin().is_empty() && origin == msg.origin() => Ok(()),
            _ => Err(BridgeError::InvalidOrigin),
        }
    }
}

/// Rejects internal-only messages coming from external senders.
#[derive(Debug, Default, Clone, Copy)]
pub struct CapabilityGuard;

#[async_trait]
impl Guard for CapabilityGuard {
    fn name(&self) -> &'static str {
        "capability"
    }

    async fn check(
        &self,
        env: &GuardEnv,
        msg: &InboundMessage,
        _sender: &MessageSender,
    ) -> BridgeResult<()> {
        if !env.is_internal_msg && !msg.approve_external() {
            return Err(BridgeError::PermissionRejected);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ErasedRouteMessage, RouteMessage};
    use bridge_protocol_types::MessageEnvelope;
    use serde_json::json;

    struct Probe {
        external: bool,
    }

    impl RouteMessage for Probe {
        const ROUTE: &'static str = "probe";

        fn message_type(&self) -> &'static str {
            "probe"
        }

        fn validate_basic(&self) -> BridgeResult<()> {
            Ok(())
        }

        fn approve_external(&self) -> bool {
            self.external
        }
    }

    fn inbound(origin: &str, external: bool) -> InboundMessage {
        let message: Box<dyn ErasedRouteMessage> = Box::new(Probe { external });
        InboundMessage::new(
            MessageEnvelope {
                type_tag: "probe".to_string(),
                route: "probe".to_string(),
                origin: origin.to_string(),
                payload: json!({}),
            },
            message,
        )
    }

    const EXTERNAL: GuardEnv = GuardEnv {
        is_internal_msg: false,
    };
    const INTERNAL: GuardEnv = GuardEnv {
        is_internal_msg: true,
    };

    #[tokio::test]
    async fn origin_guard_accepts_matching_origin() {
        let sender = MessageSender::new("page", "https://app.example/swap");
        let msg = inbound("https://app.example", true);
        assert!(OriginGuard.check(&EXTERNAL, &msg, &sender).await.is_ok());
    }

    #[tokio::test]
    async fn origin_guard_rejects_spoofed_origin_even_when_external_allowed() {
        let sender = MessageSender::new("page", "https://evil.example/");
        let msg = inbound("https://app.example", true);
        assert!(matches!(
            OriginGuard.check(&EXTERNAL, &msg, &sender).await,
            Err(BridgeError::InvalidOrigin)
        ));
    }

    #[tokio::test]
    async fn origin_guard_rejects_missing_origin() {
        let sender = MessageSender::new("page", "not a url");
        let msg = inbound("", true);
        assert!(matches!(
            OriginGuard.check(&EXTERNAL, &msg, &sender).await,
            Err(BridgeError::InvalidOrigin)
        ));
    }

    #[tokio::test]
    async fn capability_guard_blocks_external_internal_only_message() {
        let sender = MessageSender::new("page", "https://app.example/");
        let msg = inbound("https://app.example", false);
        assert!(matches!(
            CapabilityGuard.check(&EXTERNAL, &msg, &sender).await,
            Err(BridgeError::PermissionRejected)
        ));
        assert!(CapabilityGuard.check(&INTERNAL, &msg, &sender).await.is_ok());
    }

    #[tokio::test]
    async fn capability_guard_allows_external_when_approved() {
        let sender = MessageSender::new("page", "https://app.example/");
        let msg = inbound("https://app.example", true);
        assert!(CapabilityGuard.check(&EXTERNAL, &msg, &sender).await.is_ok());
    }
}
