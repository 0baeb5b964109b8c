//! Minimal keyring route used by the simulator. It only tracks whether the
//! keyring is locked; unlocking from a page requires the user's approval.

use async_trait::async_trait;
use bridge_router::{BridgeError, BridgeResult, Env, Handler, Message, RouteMessage};
use interaction_coordinator::{InteractionCoordinator, WaitApproveOptions};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyringStatus {
    Locked,
    Unlocked,
}

/// Make the keyring usable for `chain_id`, asking the user to unlock it
/// first when needed.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnableKeyring {
    pub chain_id: String,
}

impl Message for EnableKeyring {
    const TYPE: &'static str = "enable-keyring";
    type Route = KeyringMessage;
    type Response = KeyringStatus;

    fn validate_basic(&self) -> BridgeResult<()> {
        if self.chain_id.trim().is_empty() {
            return Err(BridgeError::InvalidParams("chain id is empty".to_string()));
        }
        Ok(())
    }

    fn approve_external(&self) -> bool {
        true
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LockKeyring {}

impl Message for LockKeyring {
    const TYPE: &'static str = "lock-keyring";
    type Route = KeyringMessage;
    type Response = KeyringStatus;
}

pub enum KeyringMessage {
    Enable(EnableKeyring),
    Lock(LockKeyring),
}

impl From<EnableKeyring> for KeyringMessage {
    fn from(msg: EnableKeyring) -> Self {
        Self::Enable(msg)
    }
}

impl From<LockKeyring> for KeyringMessage {
    fn from(msg: LockKeyring) -> Self {
        Self::Lock(msg)
    }
}

impl RouteMessage for KeyringMessage {
    const ROUTE: &'static str = "keyring";

    fn message_type(&self) -> &'static str {
        match self {
            Self::Enable(_) => EnableKeyring::TYPE,
            Self::Lock(_) => LockKeyring::TYPE,
        }
    }

    fn validate_basic(&self) -> BridgeResult<()> {
        match self {
            Self::Enable(msg) => msg.validate_basic(),
            Self::Lock(msg) => msg.validate_basic(),
        }
    }

    fn approve_external(&self) -> bool {
        match self {
            Self::Enable(msg) => msg.approve_external(),
            Self::Lock(msg) => msg.approve_external(),
        }
    }
}

pub struct KeyringHandler {
    coordinator: InteractionCoordinator,
    unlocked: AtomicBool,
}

impl KeyringHandler {
    pub fn new(coordinator: InteractionCoordinator) -> Self {
        Self {
            coordinator,
            unlocked: AtomicBool::new(false),
        }
    }

    fn status(&self) -> KeyringStatus {
        if self.unlocked.load(Ordering::SeqCst) {
            KeyringStatus::Unlocked
        } else {
            KeyringStatus::Locked
        }
    }
}

#[async_trait]
impl Handler for KeyringHandler {
    type Route = KeyringMessage;

    async fn handle(&self, env: Env, msg: KeyringMessage) -> BridgeResult<Value> {
        match msg {
            KeyringMessage::Enable(enable) => {
                if self.status() == KeyringStatus::Locked {
                    self.coordinator
                        .wait_approve(
                            &env,
                            "/unlock",
                            "unlock",
                            json!({ "chainId": enable.chain_id }),
                            WaitApproveOptions::default(),
                        )
                        .await?;
                    self.unlocked.store(true, Ordering::SeqCst);
                    info!(chain_id = %enable.chain_id, "Keyring unlocked");
                }
            }
            KeyringMessage::Lock(_) => {
                self.unlocked.store(false, Ordering::SeqCst);
                info!("Keyring locked");
            }
        }
        Ok(serde_json::to_value(self.status())?)
    }
}
