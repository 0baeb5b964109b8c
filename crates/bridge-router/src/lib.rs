//! Guarded request/response routing between wallet contexts.
//!
//! Page scripts, the background process and UI popups never share memory.
//! They talk by sending [`Message`]s through a [`MessageRequester`] to the
//! [`Router`] bound on the target port. The router checks each message with
//! its guard chain and hands it to the handler of its route together with an
//! [`Env`] describing the sender.

mod env;
mod error;
mod guards;
mod message;
mod requester;
mod router;
mod transport;
mod window;

pub use env::{
    interaction_url, Env, EnvProducer, ExtensionEnvProducer, ExtensionIdentity, InteractionOptions,
    InteractionPort,
};
pub use error::{BridgeError, BridgeResult};
pub use guards::{CapabilityGuard, Guard, GuardEnv, OriginGuard};
pub use message::{envelope_for, InboundMessage, Message, RouteMessage};
pub use requester::MessageRequester;
pub use router::{Handler, Router, RouterHandle};
pub use transport::{ChannelBus, ChannelTransport, Delivery, Transport};
pub use window::{
    RecordingWindowHost, WindowEvent, WindowHandle, WindowHost, WindowOrchestrator, WindowRegistry,
};
