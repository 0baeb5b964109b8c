//! Per-message execution environment.
//!
//! An [`Env`] is produced fresh for every inbound message. It tells the
//! handler whether the sender is one of the extension's own pages and lets
//! it ask a UI window for a decision.

use async_trait::async_trait;
use bridge_protocol_types::{MessageEnvelope, MessageSender};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use url::Url;

use crate::guards::GuardEnv;
use crate::message::{envelope_for, Message};
use crate::requester::MessageRequester;
use crate::window::WindowOrchestrator;
use crate::{BridgeError, BridgeResult};

/// Options for [`Env::request_interaction`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionOptions {
    /// Open a new popup even when an internal request could reuse one.
    pub force_open_window: bool,
    /// Target port; the configured UI port when `None`.
    pub channel: Option<String>,
}

impl InteractionOptions {
    pub fn force_open_window(mut self) -> Self {
        self.force_open_window = true;
        self
    }

    pub fn channel(mut self, port: impl Into<String>) -> Self {
        self.channel = Some(port.into());
        self
    }
}

/// Shows `url` to the user and delivers a message to the UI rendered there.
#[async_trait]
pub trait InteractionPort: Send + Sync {
    async fn request(
        &self,
        url: &str,
        envelope: MessageEnvelope,
        options: &InteractionOptions,
    ) -> BridgeResult<Value>;
}

#[derive(Clone)]
pub struct Env {
    is_internal_msg: bool,
    sender: MessageSender,
    interaction: Arc<dyn InteractionPort>,
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("is_internal_msg", &self.is_internal_msg)
            .field("sender", &self.sender)
            .finish_non_exhaustive()
    }
}

impl Env {
    pub fn new(is_internal_msg: bool, sender: MessageSender, interaction: Arc<dyn InteractionPort>) -> Self {
        Self {
            is_internal_msg,
            sender,
            interaction,
        }
    }

    /// Whether the sender is one of the extension's own pages.
    pub fn is_internal_msg(&self) -> bool {
        self.is_internal_msg
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub fn guard_env(&self) -> GuardEnv {
        GuardEnv {
            is_internal_msg: self.is_internal_msg,
        }
    }

    /// Show `url` in a popup and send `msg` to the UI router there.
    ///
    /// External senders always get a fresh popup. Internal senders reuse the
    /// most recently focused one unless `force_open_window` is set.
    pub async fn request_interaction<M: Message>(
        &self,
        url: &str,
        msg: M,
        options: InteractionOptions,
    ) -> BridgeResult<M::Response> {
        msg.validate_basic()?;
        let envelope = envelope_for(&msg, "")?;
        let value = self.interaction.request(url, envelope, &options).await?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Derives an [`Env`] from transport-reported sender metadata.
pub trait EnvProducer: Send + Sync {
    fn is_internal(&self, sender: &MessageSender) -> bool;

    fn produce_env(&self, sender: &MessageSender) -> Env;
}

/// Identity of the extension's own contexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionIdentity {
    pub id: String,
    /// `scheme://host[:port]`
    pub origin: String,
}

/// [`EnvProducer`] for the background context. Internal and external
/// senders get differently behaving interaction ports.
pub struct ExtensionEnvProducer {
    identity: ExtensionIdentity,
    internal: Arc<PopupInteractionPort>,
    external: Arc<PopupInteractionPort>,
}

impl ExtensionEnvProducer {
    /// `popup_url` is the page interactions are rendered in; relative
    /// interaction urls become its fragment. `requester` delivers the UI
    /// messages and `ui_port` is the default port they go to.
    pub fn new(
        identity: ExtensionIdentity,
        popup_url: &str,
        ui_port: &str,
        windows: Arc<WindowOrchestrator>,
        requester: MessageRequester,
    ) -> BridgeResult<Self> {
        let popup_url = Url::parse(popup_url)
            .map_err(|e| BridgeError::Protocol(format!("invalid popup url {popup_url}: {e}")))?;
        let port = |internal| {
            Arc::new(PopupInteractionPort {
                internal,
                popup_url: popup_url.clone(),
                ui_port: ui_port.to_string(),
                windows: windows.clone(),
                requester: requester.clone(),
            })
        };
        Ok(Self {
            internal: port(true),
            external: port(false),
            identity,
        })
    }

    pub fn identity(&self) -> &ExtensionIdentity {
        &self.identity
    }
}

impl EnvProducer for ExtensionEnvProducer {
    fn is_internal(&self, sender: &MessageSender) -> bool {
        sender.id == self.identity.id
            && sender.origin().as_deref() == Some(self.identity.origin.as_str())
    }

    fn produce_env(&self, sender: &MessageSender) -> Env {
        let internal = self.is_internal(sender);
        let port: Arc<dyn InteractionPort> = if internal {
            self.internal.clone()
        } else {
            self.external.clone()
        };
        Env::new(internal, sender.clone(), port)
    }
}

/// [`InteractionPort`] backed by popup windows.
struct PopupInteractionPort {
    internal: bool,
    popup_url: Url,
    ui_port: String,
    windows: Arc<WindowOrchestrator>,
    requester: MessageRequester,
}

#[async_trait]
impl InteractionPort for PopupInteractionPort {
    async fn request(
        &self,
        url: &str,
        envelope: MessageEnvelope,
        options: &InteractionOptions,
    ) -> BridgeResult<Value> {
        let target = interaction_url(&self.popup_url, url, self.internal)?;
        let handle = if self.internal && !options.force_open_window {
            self.windows.reuse_or_open(&target).await?
        } else {
            self.windows.open(&target).await?
        };

        let port = options.channel.as_deref().unwrap_or(&self.ui_port);
        debug!(
            window_id = handle.window_id,
            port = %port,
            type_tag = %envelope.type_tag,
            internal = self.internal,
            "Delivering interaction to UI"
        );
        self.requester.send_envelope(port, envelope).await
    }
}

/// Resolve the url a popup is pointed at.
///
/// A url starting with `/` is a route inside the popup page and becomes its
/// fragment. Both forms get `interaction=true&interactionInternal=<bool>`
/// appended to the query.
pub fn interaction_url(popup_url: &Url, url: &str, internal: bool) -> BridgeResult<String> {
    let mut target = if url.starts_with('/') {
        let mut page = popup_url.clone();
        page.set_fragment(Some(url));
        page
    } else {
        Url::parse(url).map_err(|e| BridgeError::Protocol(format!("invalid interaction url {url}: {e}")))?
    };
    target
        .query_pairs_mut()
        .append_pair("interaction", "true")
        .append_pair("interactionInternal", if internal { "true" } else { "false" });
    Ok(target.to_string())
}
