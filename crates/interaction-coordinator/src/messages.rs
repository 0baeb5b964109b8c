//! Messages exchanged between the background coordinator and UI popups.

use bridge_router::{BridgeError, BridgeResult, Message, RouteMessage};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Background route settling interactions.
pub const INTERACTION_ROUTE: &str = "interaction";

/// UI route receiving pushed interactions and events.
pub const FOREGROUND_ROUTE: &str = "interaction-foreground";

/// An interaction waiting for a user decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInteraction {
    pub id: String,
    #[serde(rename = "type")]
    pub interaction_type: String,
    pub data: Value,
    /// Whether the request that caused it came from an extension page.
    #[serde(rename = "isInternal", default)]
    pub is_internal: bool,
}

/// One-way notification for the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
}

fn require_id(id: &str) -> BridgeResult<()> {
    if id.is_empty() {
        return Err(BridgeError::InvalidParams("id is empty".to_string()));
    }
    Ok(())
}

/// Background -> UI: render this interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushInteractionData {
    pub data: PendingInteraction,
}

impl Message for PushInteractionData {
    const TYPE: &'static str = "push-interaction-data";
    type Route = ForegroundMessage;
    type Response = ();

    fn validate_basic(&self) -> BridgeResult<()> {
        require_id(&self.data.id)?;
        if self.data.interaction_type.is_empty() {
            return Err(BridgeError::InvalidParams("type is empty".to_string()));
        }
        Ok(())
    }
}

/// Background -> UI: something happened that the UI may want to show.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEventData {
    pub data: InteractionEvent,
}

impl Message for PushEventData {
    const TYPE: &'static str = "push-event-data";
    type Route = ForegroundMessage;
    type Response = ();

    fn validate_basic(&self) -> BridgeResult<()> {
        if self.data.event_type.is_empty() {
            return Err(BridgeError::InvalidParams("type is empty".to_string()));
        }
        Ok(())
    }
}

/// UI -> background: settle `id` with `result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveInteraction {
    pub id: String,
    #[serde(default)]
    pub result: Value,
}

impl Message for ApproveInteraction {
    const TYPE: &'static str = "approve-interaction";
    type Route = InteractionMessage;
    type Response = ();

    fn validate_basic(&self) -> BridgeResult<()> {
        require_id(&self.id)
    }
}

/// UI -> background: reject `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectInteraction {
    pub id: String,
}

impl Message for RejectInteraction {
    const TYPE: &'static str = "reject-interaction";
    type Route = InteractionMessage;
    type Response = ();

    fn validate_basic(&self) -> BridgeResult<()> {
        require_id(&self.id)
    }
}

/// Messages of the background `interaction` route.
#[derive(Debug)]
pub enum InteractionMessage {
    Approve(ApproveInteraction),
    Reject(RejectInteraction),
}

impl From<ApproveInteraction> for InteractionMessage {
    fn from(msg: ApproveInteraction) -> Self {
        Self::Approve(msg)
    }
}

impl From<RejectInteraction> for InteractionMessage {
    fn from(msg: RejectInteraction) -> Self {
        Self::Reject(msg)
    }
}

impl RouteMessage for InteractionMessage {
    const ROUTE: &'static str = INTERACTION_ROUTE;

    fn message_type(&self) -> &'static str {
        match self {
            Self::Approve(_) => ApproveInteraction::TYPE,
            Self::Reject(_) => RejectInteraction::TYPE,
        }
    }

    fn validate_basic(&self) -> BridgeResult<()> {
        match self {
            Self::Approve(msg) => msg.validate_basic(),
            Self::Reject(msg) => msg.validate_basic(),
        }
    }

    fn approve_external(&self) -> bool {
        match self {
            Self::Approve(msg) => msg.approve_external(),
            Self::Reject(msg) => msg.approve_external(),
        }
    }
}

/// Messages of the UI `interaction-foreground` route.
#[derive(Debug)]
pub enum ForegroundMessage {
    PushInteraction(PushInteractionData),
    PushEvent(PushEventData),
}

impl From<PushInteractionData> for ForegroundMessage {
    fn from(msg: PushInteractionData) -> Self {
        Self::PushInteraction(msg)
    }
}

impl From<PushEventData> for ForegroundMessage {
    fn from(msg: PushEventData) -> Self {
        Self::PushEvent(msg)
    }
}

impl RouteMessage for ForegroundMessage {
    const ROUTE: &'static str = FOREGROUND_ROUTE;

    fn message_type(&self) -> &'static str {
        match self {
            Self::PushInteraction(_) => PushInteractionData::TYPE,
            Self::PushEvent(_) => PushEventData::TYPE,
        }
    }

    fn validate_basic(&self) -> BridgeResult<()> {
        match self {
            Self::PushInteraction(msg) => msg.validate_basic(),
            Self::PushEvent(msg) => msg.validate_basic(),
        }
    }

    fn approve_external(&self) -> bool {
        match self {
            Self::PushInteraction(msg) => msg.approve_external(),
            Self::PushEvent(msg) => msg.approve_external(),
        }
    }
}
