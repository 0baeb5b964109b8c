//! Guarded message router.
//!
//! A router owns a port. Inbound frames are decoded by type tag, checked by
//! the guard chain, given a fresh [`Env`] and handed to the handler of their
//! route. Every frame addressed to the port gets exactly one answer, even
//! when the handler fails or panics.
//!
//! ## Concurrency
//!
//! [`Router::run`] spawns one task per delivery. A handler suspended in an
//! interaction wait does not block the approval message that will settle it.

use async_trait::async_trait;
use bridge_protocol_types::{MessageEnvelope, MessageSender, WireFrame, WireResult};
use futures_util::FutureExt;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::env::{Env, EnvProducer};
use crate::guards::{CapabilityGuard, Guard, OriginGuard};
use crate::message::{ErasedRouteMessage, InboundMessage, Message, RouteMessage};
use crate::transport::{ChannelBus, Delivery};
use crate::{BridgeError, BridgeResult};

/// Handles every message of one route.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    type Route: RouteMessage;

    async fn handle(&self, env: Env, msg: Self::Route) -> BridgeResult<Value>;
}

type Decoder = Box<dyn Fn(Value) -> BridgeResult<Box<dyn ErasedRouteMessage>> + Send + Sync>;

struct Registration {
    route: &'static str,
    decode: Decoder,
}

#[async_trait]
trait ErasedHandler: Send + Sync {
    async fn handle(&self, env: Env, msg: Box<dyn ErasedRouteMessage>) -> BridgeResult<Value>;
}

struct HandlerAdapter<H>(H);

#[async_trait]
impl<H: Handler> ErasedHandler for HandlerAdapter<H> {
    async fn handle(&self, env: Env, msg: Box<dyn ErasedRouteMessage>) -> BridgeResult<Value> {
        let msg = msg.into_any().downcast::<H::Route>().map_err(|_| {
            BridgeError::Internal(format!(
                "message is not part of route {}",
                <H::Route as RouteMessage>::ROUTE
            ))
        })?;
        self.0.handle(env, *msg).await
    }
}

pub struct Router {
    port: String,
    registry: HashMap<&'static str, Registration>,
    handlers: HashMap<&'static str, Arc<dyn ErasedHandler>>,
    guards: Vec<Arc<dyn Guard>>,
    env_producer: Arc<dyn EnvProducer>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Router {
    /// A router for `port` without any guard installed.
    pub fn new(port: impl Into<String>, env_producer: Arc<dyn EnvProducer>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            port: port.into(),
            registry: HashMap::new(),
            handlers: HashMap::new(),
            guards: Vec::new(),
            env_producer,
            shutdown_tx,
        }
    }

    /// Install the origin guard followed by the capability guard.
    pub fn with_default_guards(mut self) -> Self {
        self.add_guard(OriginGuard);
        self.add_guard(CapabilityGuard);
        self
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    /// Append a guard. Guards run in the order they were added.
    pub fn add_guard<G: Guard + 'static>(&mut self, guard: G) {
        self.guards.push(Arc::new(guard));
    }

    /// Register the decoder for `M`. Each type tag may be registered once.
    pub fn register_message<M: Message>(&mut self) -> BridgeResult<()> {
        if self.registry.contains_key(M::TYPE) {
            return Err(BridgeError::DuplicateRegistration(format!("message type {}", M::TYPE)));
        }
        let decode: Decoder = Box::new(
            |payload: Value| -> BridgeResult<Box<dyn ErasedRouteMessage>> {
                let msg: M = serde_json::from_value(payload)?;
                Ok(Box::new(M::Route::from(msg)))
            },
        );
        self.registry.insert(
            M::TYPE,
            Registration {
                route: M::route(),
                decode,
            },
        );
        Ok(())
    }

    /// Register the handler of `H::Route`. Each route has one handler.
    pub fn add_handler<H: Handler>(&mut self, handler: H) -> BridgeResult<()> {
        let route = <H::Route as RouteMessage>::ROUTE;
        if self.handlers.contains_key(route) {
            return Err(BridgeError::DuplicateRegistration(format!("route {route}")));
        }
        self.handlers.insert(route, Arc::new(HandlerAdapter(handler)));
        Ok(())
    }

    /// Get a shutdown sender for a router that is about to `run`.
    pub fn shutdown_sender(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Answer a single frame. Frames addressed to another port yield `None`.
    pub async fn dispatch(&self, frame: WireFrame, sender: &MessageSender) -> Option<WireResult> {
        if frame.port != self.port {
            return None;
        }

        let type_tag = frame.type_tag.clone();
        let outcome = AssertUnwindSafe(self.dispatch_inner(frame, sender))
            .catch_unwind()
            .await;

        Some(match outcome {
            Ok(Ok(value)) => WireResult::success(value),
            Ok(Err(e)) => {
                match &e {
                    BridgeError::Internal(_) | BridgeError::Transport(_) => {
                        error!(port = %self.port, type_tag = %type_tag, error = %e, "Dispatch failed")
                    }
                    _ => debug!(port = %self.port, type_tag = %type_tag, error = %e, "Dispatch returned error"),
                }
                WireResult::error(e.to_string())
            }
            Err(_) => {
                error!(port = %self.port, type_tag = %type_tag, "Handler panicked");
                WireResult::error(BridgeError::Internal("handler panicked".to_string()).to_string())
            }
        })
    }

    async fn dispatch_inner(&self, frame: WireFrame, sender: &MessageSender) -> BridgeResult<Value> {
        let registration = self
            .registry
            .get(frame.type_tag.as_str())
            .ok_or_else(|| BridgeError::UnknownMessageType(frame.type_tag.clone()))?;

        let envelope =
            MessageEnvelope::from_frame(&frame, registration.route).map_err(BridgeError::Protocol)?;
        let message = (registration.decode)(envelope.payload.clone())?;
        if message.message_type() != frame.type_tag {
            return Err(BridgeError::Internal(format!(
                "route {} labels {} as {}",
                registration.route,
                frame.type_tag,
                message.message_type()
            )));
        }
        let inbound = InboundMessage::new(envelope, message);

        let env = self.env_producer.produce_env(sender);
        let guard_env = env.guard_env();
        for guard in &self.guards {
            if let Err(e) = guard.check(&guard_env, &inbound, sender).await {
                warn!(
                    guard = guard.name(),
                    type_tag = %inbound.type_tag(),
                    route = %inbound.route(),
                    origin = %inbound.origin(),
                    sender_id = %sender.id,
                    error = %e,
                    "Message rejected by guard"
                );
                return Err(e);
            }
        }

        let handler = self
            .handlers
            .get(inbound.route())
            .cloned()
            .ok_or_else(|| BridgeError::MissingHandler(inbound.route().to_string()))?;

        inbound.validate_basic()?;
        debug!(
            type_tag = %inbound.type_tag(),
            route = %inbound.route(),
            internal = env.is_internal_msg(),
            "Dispatching message"
        );
        handler.handle(env, inbound.into_message()).await
    }

    /// Serve deliveries until shutdown or until every sender is gone.
    pub async fn run(self, mut deliveries: mpsc::Receiver<Delivery>) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let router = Arc::new(self);
        info!(port = %router.port, "Router listening");

        loop {
            tokio::select! {
                delivery = deliveries.recv() => {
                    match delivery {
                        Some(delivery) => {
                            let router = router.clone();
                            tokio::spawn(async move {
                                router.serve(delivery).await;
                            });
                        }
                        None => {
                            debug!(port = %router.port, "Delivery channel closed");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(port = %router.port, "Router shutting down");
                    break;
                }
            }
        }
    }

    async fn serve(&self, delivery: Delivery) {
        let Delivery {
            frame,
            sender,
            reply,
        } = delivery;
        if let Some(result) = self.dispatch(frame, &sender).await {
            if reply.send(result).is_err() {
                debug!(port = %self.port, "Requester went away before the answer");
            }
        }
    }

    /// Bind the router's port on `bus` and run it in a background task.
    pub async fn listen(self, bus: &ChannelBus) -> BridgeResult<RouterHandle> {
        let deliveries = bus.bind(&self.port).await?;
        let handle = RouterHandle {
            port: self.port.clone(),
            bus: bus.clone(),
            shutdown_tx: self.shutdown_sender(),
            task: tokio::spawn(self.run(deliveries)),
        };
        Ok(handle)
    }
}

/// A router running on a [`ChannelBus`].
pub struct RouterHandle {
    port: String,
    bus: ChannelBus,
    shutdown_tx: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl RouterHandle {
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Stop the loop, release the port and wait for the task to end.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        self.bus.unbind(&self.port).await;
        if let Err(e) = self.task.await {
            error!(port = %self.port, error = %e, "Router task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{ExtensionEnvProducer, ExtensionIdentity};
    use crate::requester::MessageRequester;
    use crate::window::{RecordingWindowHost, WindowOrchestrator};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    const EXT_ID: &str = "walletext";
    const EXT_ORIGIN: &str = "chrome-extension://walletext";

    #[derive(Debug, Serialize, Deserialize)]
    struct Ping {
        text: String,
    }

    impl Message for Ping {
        const TYPE: &'static str = "ping";
        type Route = TestRoute;
        type Response = String;

        fn validate_basic(&self) -> BridgeResult<()> {
            if self.text.is_empty() {
                return Err(BridgeError::InvalidParams("text is empty".to_string()));
            }
            Ok(())
        }

        fn approve_external(&self) -> bool {
            true
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Secret {}

    impl Message for Secret {
        const TYPE: &'static str = "secret";
        type Route = TestRoute;
        type Response = String;
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Boom {}

    impl Message for Boom {
        const TYPE: &'static str = "boom";
        type Route = TestRoute;
        type Response = String;

        fn approve_external(&self) -> bool {
            true
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Mislabeled {}

    impl Message for Mislabeled {
        const TYPE: &'static str = "mislabeled";
        type Route = TestRoute;
        type Response = String;

        fn approve_external(&self) -> bool {
            true
        }
    }

    enum TestRoute {
        Ping(Ping),
        Secret(Secret),
        Boom(Boom),
        Mislabeled(Mislabeled),
    }

    impl From<Mislabeled> for TestRoute {
        fn from(msg: Mislabeled) -> Self {
            Self::Mislabeled(msg)
        }
    }

    impl From<Ping> for TestRoute {
        fn from(msg: Ping) -> Self {
            Self::Ping(msg)
        }
    }

    impl From<Secret> for TestRoute {
        fn from(msg: Secret) -> Self {
            Self::Secret(msg)
        }
    }

    impl From<Boom> for TestRoute {
        fn from(msg: Boom) -> Self {
            Self::Boom(msg)
        }
    }

    impl RouteMessage for TestRoute {
        const ROUTE: &'static str = "test";

        fn message_type(&self) -> &'static str {
            match self {
                Self::Ping(_) => Ping::TYPE,
                Self::Secret(_) => Secret::TYPE,
                Self::Boom(_) => Boom::TYPE,
                // deliberately wrong
                Self::Mislabeled(_) => Ping::TYPE,
            }
        }

        fn validate_basic(&self) -> BridgeResult<()> {
            match self {
                Self::Ping(msg) => msg.validate_basic(),
                Self::Secret(msg) => msg.validate_basic(),
                Self::Boom(msg) => msg.validate_basic(),
                Self::Mislabeled(msg) => msg.validate_basic(),
            }
        }

        fn approve_external(&self) -> bool {
            match self {
                Self::Ping(msg) => msg.approve_external(),
                Self::Secret(msg) => msg.approve_external(),
                Self::Boom(msg) => msg.approve_external(),
                Self::Mislabeled(msg) => msg.approve_external(),
            }
        }
    }

    struct TestHandler;

    #[async_trait]
    impl Handler for TestHandler {
        type Route = TestRoute;

        async fn handle(&self, env: Env, msg: TestRoute) -> BridgeResult<Value> {
            match msg {
                TestRoute::Ping(ping) => Ok(json!(format!("pong {}", ping.text))),
                TestRoute::Secret(_) => Ok(json!(format!("internal={}", env.is_internal_msg()))),
                TestRoute::Boom(_) => panic!("handler exploded"),
                TestRoute::Mislabeled(_) => Ok(json!("unreachable")),
            }
        }
    }

    fn env_producer() -> Arc<dyn EnvProducer> {
        let bus = ChannelBus::new();
        let requester = MessageRequester::new(Arc::new(
            bus.transport(MessageSender::new(EXT_ID, "chrome-extension://walletext/background.html")),
        ));
        let windows = Arc::new(WindowOrchestrator::new(Arc::new(RecordingWindowHost::new())));
        Arc::new(
            ExtensionEnvProducer::new(
                ExtensionIdentity {
                    id: EXT_ID.to_string(),
                    origin: EXT_ORIGIN.to_string(),
                },
                "chrome-extension://walletext/popup.html",
                "popup",
                windows,
                requester,
            )
            .unwrap(),
        )
    }

    fn router() -> Router {
        let mut router = Router::new("background", env_producer()).with_default_guards();
        router.register_message::<Ping>().unwrap();
        router.register_message::<Secret>().unwrap();
        router.register_message::<Boom>().unwrap();
        router.add_handler(TestHandler).unwrap();
        router
    }

    fn frame(type_tag: &str, msg: Value) -> WireFrame {
        WireFrame {
            port: "background".to_string(),
            type_tag: type_tag.to_string(),
            msg,
        }
    }

    fn page() -> MessageSender {
        MessageSender::new("tab-1", "https://app.example/swap")
    }

    fn popup() -> MessageSender {
        MessageSender::new(EXT_ID, "chrome-extension://walletext/popup.html")
    }

    #[tokio::test]
    async fn dispatches_external_message_allowed_for_pages() {
        let result = router()
            .dispatch(
                frame("ping", json!({ "origin": "https://app.example", "text": "hi" })),
                &page(),
            )
            .await
            .unwrap();
        assert_eq!(result.value, Some(json!("pong hi")));
    }

    #[tokio::test]
    async fn internal_only_message_from_page_is_rejected_before_handler() {
        let result = router()
            .dispatch(frame("secret", json!({ "origin": "https://app.example" })), &page())
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("Permission rejected"));

        let result = router()
            .dispatch(frame("secret", json!({ "origin": EXT_ORIGIN })), &popup())
            .await
            .unwrap();
        assert_eq!(result.value, Some(json!("internal=true")));
    }

    #[tokio::test]
    async fn spoofed_origin_is_rejected() {
        let result = router()
            .dispatch(frame("ping", json!({ "origin": EXT_ORIGIN, "text": "hi" })), &page())
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("Invalid origin"));
    }

    #[tokio::test]
    async fn unknown_type_and_wrong_port() {
        let router = router();
        let result = router
            .dispatch(frame("nope", json!({ "origin": "https://app.example" })), &page())
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("Unknown message type: nope"));

        let mut other = frame("ping", json!({ "origin": "https://app.example", "text": "hi" }));
        other.port = "popup".to_string();
        assert!(router.dispatch(other, &page()).await.is_none());
    }

    #[tokio::test]
    async fn validation_runs_after_guards() {
        let result = router()
            .dispatch(frame("ping", json!({ "origin": "https://app.example", "text": "" })), &page())
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("text is empty"));
    }

    #[tokio::test]
    async fn missing_handler_is_reported() {
        let mut router = Router::new("background", env_producer()).with_default_guards();
        router.register_message::<Ping>().unwrap();
        let result = router
            .dispatch(frame("ping", json!({ "origin": "https://app.example", "text": "hi" })), &page())
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("No handler for route: test"));
    }

    #[tokio::test]
    async fn route_must_label_decoded_message_with_its_tag() {
        let mut router = router();
        router.register_message::<Mislabeled>().unwrap();
        let result = router
            .dispatch(frame("mislabeled", json!({ "origin": "https://app.example" })), &page())
            .await
            .unwrap();
        assert_eq!(
            result.error.as_deref(),
            Some("Internal error: route test labels mislabeled as ping")
        );
    }

    #[tokio::test]
    async fn panicking_handler_still_answers() {
        let result = router()
            .dispatch(frame("boom", json!({ "origin": "https://app.example" })), &page())
            .await
            .unwrap();
        assert_eq!(result.error.as_deref(), Some("Internal error: handler panicked"));
    }

    #[test]
    fn duplicate_registrations_fail() {
        let mut router = router();
        assert!(matches!(
            router.register_message::<Ping>(),
            Err(BridgeError::DuplicateRegistration(_))
        ));
        assert!(matches!(
            router.add_handler(TestHandler),
            Err(BridgeError::DuplicateRegistration(_))
        ));
    }

    #[tokio::test]
    async fn run_loop_serves_requester_until_shutdown() {
        let bus = ChannelBus::new();
        let handle = router().listen(&bus).await.unwrap();

        let requester = MessageRequester::new(Arc::new(bus.transport(page())));
        let answer = requester
            .send_message("background", &Ping { text: "loop".to_string() })
            .await
            .unwrap();
        assert_eq!(answer, "pong loop");

        let rejected = requester
            .send_message("background", &Ping { text: String::new() })
            .await;
        assert!(matches!(rejected, Err(BridgeError::InvalidParams(_))));

        handle.shutdown().await;
        assert!(!bus.is_bound("background").await);
    }
}
