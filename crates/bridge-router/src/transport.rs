//! In-process transport between contexts.
//!
//! Every router binds a port on a shared [`ChannelBus`] and receives
//! [`Delivery`] values over an mpsc channel. The sending side never supplies
//! its own [`MessageSender`]; the [`ChannelTransport`] it was handed attaches
//! it.

use async_trait::async_trait;
use bridge_protocol_types::{MessageSender, WireFrame, WireResult};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::debug;

use crate::{BridgeError, BridgeResult};

const ENDPOINT_CAPACITY: usize = 64;

/// One frame in flight, with the channel its answer goes back on.
#[derive(Debug)]
pub struct Delivery {
    pub frame: WireFrame,
    pub sender: MessageSender,
    pub reply: oneshot::Sender<WireResult>,
}

/// Sends frames on behalf of one context.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Metadata the receiving side will see for frames sent through this
    /// transport.
    fn local_sender(&self) -> &MessageSender;

    async fn send(&self, frame: WireFrame) -> BridgeResult<WireResult>;
}

/// Port-addressed set of endpoints shared by every context in the process.
#[derive(Clone, Default)]
pub struct ChannelBus {
    endpoints: Arc<RwLock<HashMap<String, mpsc::Sender<Delivery>>>>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `port` and return the receiving end of its deliveries.
    pub async fn bind(&self, port: &str) -> BridgeResult<mpsc::Receiver<Delivery>> {
        let mut endpoints = self.endpoints.write().await;
        if endpoints.contains_key(port) {
            return Err(BridgeError::DuplicateRegistration(format!("port {port}")));
        }
        let (tx, rx) = mpsc::channel(ENDPOINT_CAPACITY);
        endpoints.insert(port.to_string(), tx);
        debug!(port = %port, "Port bound");
        Ok(rx)
    }

    pub async fn unbind(&self, port: &str) {
        if self.endpoints.write().await.remove(port).is_some() {
            debug!(port = %port, "Port unbound");
        }
    }

    pub async fn is_bound(&self, port: &str) -> bool {
        self.endpoints.read().await.contains_key(port)
    }

    /// A transport whose frames are attributed to `sender`.
    pub fn transport(&self, sender: MessageSender) -> ChannelTransport {
        ChannelTransport {
            bus: self.clone(),
            sender,
        }
    }
}

/// [`Transport`] over a [`ChannelBus`].
#[derive(Clone)]
pub struct ChannelTransport {
    bus: ChannelBus,
    sender: MessageSender,
}

#[async_trait]
impl Transport for ChannelTransport {
    fn local_sender(&self) -> &MessageSender {
        &self.sender
    }

    async fn send(&self, frame: WireFrame) -> BridgeResult<WireResult> {
        let endpoint = self.bus.endpoints.read().await.get(&frame.port).cloned();
        let Some(endpoint) = endpoint else {
            return Err(BridgeError::Transport(format!(
                "no receiver on port {}",
                frame.port
            )));
        };

        let port = frame.port.clone();
        let (reply_tx, reply_rx) = oneshot::channel();
        endpoint
            .send(Delivery {
                frame,
                sender: self.sender.clone(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| BridgeError::Transport(format!("port {port} is closed")))?;

        reply_rx
            .await
            .map_err(|_| BridgeError::Transport(format!("port {port} dropped the reply")))
    }
}
