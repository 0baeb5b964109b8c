//! UI side of the interaction protocol.
//!
//! The popup keeps every interaction the background pushed to it, grouped by
//! type in arrival order, until the user approves or rejects it.

use async_trait::async_trait;
use bridge_router::{BridgeResult, Env, Handler, MessageRequester};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::messages::{
    ApproveInteraction, ForegroundMessage, InteractionEvent, PendingInteraction,
    RejectInteraction,
};

const EVENT_CAPACITY: usize = 100;

pub struct InteractionForeground {
    requester: MessageRequester,
    background_port: String,
    interactions: Mutex<HashMap<String, Vec<PendingInteraction>>>,
    events: broadcast::Sender<InteractionEvent>,
}

impl InteractionForeground {
    /// `requester` must belong to an extension page, otherwise the
    /// background refuses every approval.
    pub fn new(requester: MessageRequester, background_port: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            requester,
            background_port: background_port.into(),
            interactions: Mutex::new(HashMap::new()),
            events,
        }
    }

    /// Store a pushed interaction. A repeated push of the same id is ignored.
    pub fn push(&self, data: PendingInteraction) {
        let mut interactions = self.interactions.lock();
        let list = interactions.entry(data.interaction_type.clone()).or_default();
        if list.iter().any(|existing| existing.id == data.id) {
            debug!(interaction_id = %data.id, "Duplicate interaction push ignored");
            return;
        }
        debug!(
            interaction_id = %data.id,
            interaction_type = %data.interaction_type,
            "Interaction received"
        );
        list.push(data);
    }

    /// Interactions of `interaction_type`, oldest first.
    pub fn get(&self, interaction_type: &str) -> Vec<PendingInteraction> {
        self.interactions
            .lock()
            .get(interaction_type)
            .cloned()
            .unwrap_or_default()
    }

    pub fn all(&self) -> Vec<PendingInteraction> {
        self.interactions
            .lock()
            .values()
            .flat_map(|list| list.iter().cloned())
            .collect()
    }

    pub fn has(&self, interaction_type: &str) -> bool {
        self.interactions
            .lock()
            .get(interaction_type)
            .is_some_and(|list| !list.is_empty())
    }

    /// Approve `id` with `result` and drop it locally.
    pub async fn approve(&self, interaction_type: &str, id: &str, result: Value) -> BridgeResult<()> {
        self.remove(interaction_type, id);
        info!(interaction_id = %id, "Approving interaction");
        self.requester
            .send_message(
                &self.background_port,
                &ApproveInteraction {
                    id: id.to_string(),
                    result,
                },
            )
            .await
    }

    /// Reject `id` and drop it locally.
    pub async fn reject(&self, interaction_type: &str, id: &str) -> BridgeResult<()> {
        self.remove(interaction_type, id);
        self.send_reject(id).await
    }

    /// Reject every interaction of `interaction_type`. All rejections are
    /// sent even if one fails; the first failure is returned.
    pub async fn reject_all(&self, interaction_type: &str) -> BridgeResult<()> {
        let drained = self
            .interactions
            .lock()
            .remove(interaction_type)
            .unwrap_or_default();
        self.send_rejects(drained).await
    }

    /// Keep the oldest interaction of `interaction_type` and reject the rest.
    pub async fn reject_all_except_first(&self, interaction_type: &str) -> BridgeResult<()> {
        let rest = {
            let mut interactions = self.interactions.lock();
            match interactions.get_mut(interaction_type) {
                Some(list) if list.len() > 1 => list.split_off(1),
                _ => Vec::new(),
            }
        };
        self.send_rejects(rest).await
    }

    /// Publish a pushed event to subscribers.
    pub fn push_event(&self, event: InteractionEvent) {
        debug!(event_type = %event.event_type, "Event received");
        // No subscriber is fine.
        let _ = self.events.send(event);
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<InteractionEvent> {
        self.events.subscribe()
    }

    fn remove(&self, interaction_type: &str, id: &str) {
        let mut interactions = self.interactions.lock();
        if let Some(list) = interactions.get_mut(interaction_type) {
            list.retain(|pending| pending.id != id);
            if list.is_empty() {
                interactions.remove(interaction_type);
            }
        }
    }

    async fn send_reject(&self, id: &str) -> BridgeResult<()> {
        info!(interaction_id = %id, "Rejecting interaction");
        self.requester
            .send_message(&self.background_port, &RejectInteraction { id: id.to_string() })
            .await
    }

    async fn send_rejects(&self, rejected: Vec<PendingInteraction>) -> BridgeResult<()> {
        let mut first_error = None;
        for pending in rejected {
            if let Err(e) = self.send_reject(&pending.id).await {
                warn!(interaction_id = %pending.id, error = %e, "Failed to reject interaction");
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Handler of the UI `interaction-foreground` route.
pub struct ForegroundHandler {
    foreground: Arc<InteractionForeground>,
}

impl ForegroundHandler {
    pub fn new(foreground: Arc<InteractionForeground>) -> Self {
        Self { foreground }
    }
}

#[async_trait]
impl Handler for ForegroundHandler {
    type Route = ForegroundMessage;

    async fn handle(&self, _env: Env, msg: ForegroundMessage) -> BridgeResult<Value> {
        match msg {
            ForegroundMessage::PushInteraction(push) => self.foreground.push(push.data),
            ForegroundMessage::PushEvent(push) => self.foreground.push_event(push.data),
        }
        Ok(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_protocol_types::MessageSender;
    use bridge_router::{BridgeError, ChannelBus, Delivery};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn pending(id: &str, interaction_type: &str) -> PendingInteraction {
        PendingInteraction {
            id: id.to_string(),
            interaction_type: interaction_type.to_string(),
            data: json!({ "n": id }),
            is_internal: true,
        }
    }

    async fn foreground() -> (InteractionForeground, mpsc::Receiver<Delivery>) {
        let bus = ChannelBus::new();
        let background = bus.bind("background").await.unwrap();
        let requester = MessageRequester::new(Arc::new(bus.transport(MessageSender::new(
            "walletext",
            "chrome-extension://walletext/popup.html",
        ))));
        (InteractionForeground::new(requester, "background"), background)
    }

    /// Answer every delivery with null and collect `(type, msg)` pairs.
    fn answer_all(mut rx: mpsc::Receiver<Delivery>) -> tokio::task::JoinHandle<Vec<(String, Value)>> {
        tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(delivery) = rx.recv().await {
                seen.push((delivery.frame.type_tag.clone(), delivery.frame.msg.clone()));
                let _ = delivery
                    .reply
                    .send(bridge_protocol_types::WireResult::success(Value::Null));
            }
            seen
        })
    }

    #[tokio::test]
    async fn push_groups_by_type_in_arrival_order() {
        let (foreground, _rx) = foreground().await;
        foreground.push(pending("a1", "sign"));
        foreground.push(pending("b1", "unlock"));
        foreground.push(pending("a2", "sign"));
        foreground.push(pending("a1", "sign"));

        let ids: Vec<_> = foreground.get("sign").into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(foreground.all().len(), 3);
        assert!(foreground.has("unlock"));
        assert!(!foreground.has("permission"));
    }

    #[tokio::test]
    async fn approve_removes_locally_and_notifies_background() {
        let (foreground, rx) = foreground().await;
        let seen = answer_all(rx);

        foreground.push(pending("a1", "sign"));
        foreground.approve("sign", "a1", json!({ "ok": true })).await.unwrap();
        assert!(!foreground.has("sign"));

        drop(foreground);
        let seen = seen.await.unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "approve-interaction");
        assert_eq!(seen[0].1["id"], json!("a1"));
        assert_eq!(seen[0].1["result"], json!({ "ok": true }));
        assert_eq!(seen[0].1["origin"], json!("chrome-extension://walletext"));
    }

    #[tokio::test]
    async fn reject_all_except_first_keeps_oldest() {
        let (foreground, rx) = foreground().await;
        let seen = answer_all(rx);

        for id in ["s1", "s2", "s3"] {
            foreground.push(pending(id, "sign"));
        }
        foreground.reject_all_except_first("sign").await.unwrap();
        assert_eq!(foreground.get("sign"), vec![pending("s1", "sign")]);

        foreground.reject_all("sign").await.unwrap();
        assert!(foreground.get("sign").is_empty());

        drop(foreground);
        let rejected: Vec<_> = seen
            .await
            .unwrap()
            .into_iter()
            .map(|(type_tag, msg)| {
                assert_eq!(type_tag, "reject-interaction");
                msg["id"].as_str().unwrap_or_default().to_string()
            })
            .collect();
        assert_eq!(rejected, vec!["s2", "s3", "s1"]);
    }

    #[tokio::test]
    async fn reject_all_reports_failure_after_trying_everything() {
        let bus = ChannelBus::new();
        let requester = MessageRequester::new(Arc::new(
            bus.transport(MessageSender::new("walletext", "chrome-extension://walletext/popup.html")),
        ));
        let foreground = InteractionForeground::new(requester, "background");
        foreground.push(pending("x1", "sign"));
        foreground.push(pending("x2", "sign"));

        assert!(matches!(
            foreground.reject_all("sign").await,
            Err(BridgeError::Transport(_))
        ));
        assert!(!foreground.has("sign"));
    }

    #[tokio::test]
    async fn events_reach_subscribers() {
        let (foreground, _rx) = foreground().await;
        let foreground = Arc::new(foreground);
        let mut events = foreground.subscribe_events();

        let handler = ForegroundHandler::new(foreground.clone());
        let env = Env::new(
            true,
            MessageSender::new("walletext", "chrome-extension://walletext/background.html"),
            Arc::new(NoInteraction),
        );
        handler
            .handle(
                env,
                ForegroundMessage::PushEvent(crate::messages::PushEventData {
                    data: InteractionEvent {
                        event_type: "keystore-changed".to_string(),
                        data: json!({}),
                    },
                }),
            )
            .await
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type, "keystore-changed");
    }

    struct NoInteraction;

    #[async_trait]
    impl bridge_router::InteractionPort for NoInteraction {
        async fn request(
            &self,
            _url: &str,
            _envelope: bridge_protocol_types::MessageEnvelope,
            _options: &bridge_router::InteractionOptions,
        ) -> BridgeResult<Value> {
            Err(BridgeError::Internal("no popup in this test".to_string()))
        }
    }
}
