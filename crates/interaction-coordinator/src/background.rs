//! Background side of the interaction protocol.
//!
//! [`InteractionCoordinator::wait_approve`] parks a privileged call until the
//! UI answers with `ApproveInteraction` or `RejectInteraction` for the same
//! id. Interactions are matched only by id, so several of the same type can
//! be pending at once.

use async_trait::async_trait;
use bridge_router::{
    BridgeError, BridgeResult, Env, Handler, InteractionOptions, MessageRequester,
};
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::messages::{
    InteractionEvent, InteractionMessage, PendingInteraction, PushEventData, PushInteractionData,
};

type Resolver = oneshot::Sender<BridgeResult<Value>>;

/// Options for [`InteractionCoordinator::wait_approve`].
#[derive(Debug, Clone, Default)]
pub struct WaitApproveOptions {
    /// How the popup is opened.
    pub interaction: InteractionOptions,
    /// Reject the interaction once this much time passed. Overrides the
    /// coordinator default.
    pub timeout: Option<Duration>,
}

impl From<InteractionOptions> for WaitApproveOptions {
    fn from(interaction: InteractionOptions) -> Self {
        Self {
            interaction,
            timeout: None,
        }
    }
}

/// Pending interactions and their resolvers, keyed by id.
#[derive(Default)]
struct InteractionStore {
    waiting: HashMap<String, (u64, PendingInteraction)>,
    resolvers: HashMap<String, Resolver>,
    inserted: u64,
}

impl InteractionStore {
    fn insert(&mut self, pending: PendingInteraction, resolver: Resolver) -> BridgeResult<()> {
        if self.waiting.contains_key(&pending.id) || self.resolvers.contains_key(&pending.id) {
            return Err(BridgeError::IdInUse);
        }
        self.inserted += 1;
        self.resolvers.insert(pending.id.clone(), resolver);
        self.waiting.insert(pending.id.clone(), (self.inserted, pending));
        Ok(())
    }

    /// Remove both entries of `id`, returning the resolver if still there.
    fn take(&mut self, id: &str) -> Option<Resolver> {
        self.waiting.remove(id);
        self.resolvers.remove(id)
    }
}

/// Removes the entries of an interaction whose waiting future went away.
struct PendingCleanup {
    store: Arc<Mutex<InteractionStore>>,
    id: String,
}

impl Drop for PendingCleanup {
    fn drop(&mut self) {
        if self.store.lock().take(&self.id).is_some() {
            debug!(interaction_id = %self.id, "Interaction abandoned by its caller");
        }
    }
}

/// Owns the interaction store of one background process. Cheap to clone;
/// clones share the store.
#[derive(Clone, Default)]
pub struct InteractionCoordinator {
    store: Arc<Mutex<InteractionStore>>,
    default_timeout: Option<Duration>,
    events: Option<(MessageRequester, String)>,
}

impl InteractionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject interactions nobody answered within `timeout`. `None` waits
    /// until the user acts.
    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Send [`InteractionEvent`]s to the UI router on `port`.
    pub fn with_events(mut self, requester: MessageRequester, port: impl Into<String>) -> Self {
        self.events = Some((requester, port.into()));
        self
    }

    /// Show `url` to the user and wait for their decision on `data`.
    ///
    /// Resolves with the result the UI approved with, or fails with
    /// [`BridgeError::Rejected`] or [`BridgeError::Timeout`]. Dropping the
    /// returned future forgets the interaction.
    ///
    /// Nothing is registered until the returned future is first polled.
    /// Spawn it (or `join!` several) when entries must be visible, or
    /// coexist, before the caller awaits them.
    pub async fn wait_approve(
        &self,
        env: &Env,
        url: &str,
        interaction_type: &str,
        data: Value,
        options: WaitApproveOptions,
    ) -> BridgeResult<Value> {
        if interaction_type.is_empty() {
            return Err(BridgeError::InvalidParams("type should not be empty".to_string()));
        }

        let pending = PendingInteraction {
            id: generate_id(),
            interaction_type: interaction_type.to_string(),
            data,
            is_internal: env.is_internal_msg(),
        };
        let id = pending.id.clone();
        let (resolver, settled) = oneshot::channel();
        self.store.lock().insert(pending.clone(), resolver)?;
        let _cleanup = PendingCleanup {
            store: self.store.clone(),
            id: id.clone(),
        };

        info!(
            interaction_id = %id,
            interaction_type = %interaction_type,
            internal = env.is_internal_msg(),
            "Waiting for approval"
        );

        let push_env = env.clone();
        let push_url = url.to_string();
        let interaction = options.interaction.clone();
        tokio::spawn(async move {
            let interaction_id = pending.id.clone();
            let push = PushInteractionData { data: pending };
            if let Err(e) = push_env
                .request_interaction(&push_url, push, interaction)
                .await
            {
                warn!(interaction_id = %interaction_id, error = %e, "Failed to deliver interaction to UI");
            }
        });

        let mut settled = settled;
        let outcome = match options.timeout.or(self.default_timeout) {
            Some(timeout) => {
                let in_time = tokio::select! {
                    outcome = &mut settled => Some(outcome),
                    _ = tokio::time::sleep(timeout) => None,
                };
                match in_time {
                    Some(outcome) => outcome,
                    None => return self.expire(&id, &mut settled),
                }
            }
            None => settled.await,
        };

        outcome.map_err(|_| BridgeError::Internal(format!("resolver of interaction {id} dropped")))?
    }

    /// Deadline reached. A settlement that raced the deadline still wins.
    fn expire(&self, id: &str, settled: &mut oneshot::Receiver<BridgeResult<Value>>) -> BridgeResult<Value> {
        if self.store.lock().take(id).is_some() {
            warn!(interaction_id = %id, "Interaction timed out");
            return Err(BridgeError::Timeout(format!("interaction {id}")));
        }
        match settled.try_recv() {
            Ok(outcome) => {
                debug!(interaction_id = %id, "Interaction settled at its deadline");
                outcome
            }
            Err(_) => Err(BridgeError::Timeout(format!("interaction {id}"))),
        }
    }

    /// Settle `id` with `result`. Unknown or settled ids are ignored.
    pub fn approve(&self, id: &str, result: Value) {
        let resolver = self.store.lock().take(id);
        match resolver {
            Some(resolver) => {
                info!(interaction_id = %id, "Interaction approved");
                let _ = resolver.send(Ok(result));
            }
            None => debug!(interaction_id = %id, "Approve for unknown interaction ignored"),
        }
    }

    /// Settle `id` with "Request rejected". Unknown or settled ids are ignored.
    pub fn reject(&self, id: &str) {
        let resolver = self.store.lock().take(id);
        match resolver {
            Some(resolver) => {
                info!(interaction_id = %id, "Interaction rejected");
                let _ = resolver.send(Err(BridgeError::Rejected));
            }
            None => debug!(interaction_id = %id, "Reject for unknown interaction ignored"),
        }
    }

    /// Push a one-way event to the UI. No interaction is created.
    pub async fn dispatch_event(&self, event_type: &str, data: Value) -> BridgeResult<()> {
        let (requester, port) = self
            .events
            .as_ref()
            .ok_or_else(|| BridgeError::Transport("no event channel configured".to_string()))?;
        let push = PushEventData {
            data: InteractionEvent {
                event_type: event_type.to_string(),
                data,
            },
        };
        requester.send_message(port, &push).await
    }

    pub fn waiting_len(&self) -> usize {
        self.store.lock().waiting.len()
    }

    pub fn get_waiting(&self, id: &str) -> Option<PendingInteraction> {
        self.store
            .lock()
            .waiting
            .get(id)
            .map(|(_, pending)| pending.clone())
    }

    /// Pending interactions of one type, oldest first.
    pub fn waiting_of_type(&self, interaction_type: &str) -> Vec<PendingInteraction> {
        let store = self.store.lock();
        let mut matching: Vec<_> = store
            .waiting
            .values()
            .filter(|(_, pending)| pending.interaction_type == interaction_type)
            .collect();
        matching.sort_by_key(|(seq, _)| *seq);
        matching.into_iter().map(|(_, pending)| pending.clone()).collect()
    }
}

/// 8 random bytes, hex encoded.
fn generate_id() -> String {
    let mut bytes = [0u8; 8];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Handler of the background `interaction` route.
pub struct InteractionHandler {
    coordinator: InteractionCoordinator,
}

impl InteractionHandler {
    pub fn new(coordinator: InteractionCoordinator) -> Self {
        Self { coordinator }
    }
}

#[async_trait]
impl Handler for InteractionHandler {
    type Route = InteractionMessage;

    async fn handle(&self, env: Env, msg: InteractionMessage) -> BridgeResult<Value> {
        if !env.is_internal_msg() {
            return Err(BridgeError::PermissionRejected);
        }
        match msg {
            InteractionMessage::Approve(approve) => {
                self.coordinator.approve(&approve.id, approve.result)
            }
            InteractionMessage::Reject(reject) => self.coordinator.reject(&reject.id),
        }
        Ok(Value::Null)
    }
}
