//! Wire-level types shared by every wallet-bridge context.
//!
//! This crate provides:
//! - the transport frame (`{ port, type, msg }`) and its answer
//!   (`{ return } | { error }`)
//! - the decoded message envelope
//! - transport-reported sender metadata

mod envelope;
mod sender;
mod wire;

pub use envelope::MessageEnvelope;
pub use sender::MessageSender;
pub use wire::{WireFrame, WireResult};

/// Port the background router listens on.
pub const BACKGROUND_PORT: &str = "background";

/// Port the popup (UI window) router listens on.
pub const APP_PORT: &str = "popup";

/// Error strings that cross the context boundary verbatim.
pub mod error_messages {
    pub const PERMISSION_REJECTED: &str = "Permission rejected";
    pub const INVALID_ORIGIN: &str = "Invalid origin";
    pub const REQUEST_REJECTED: &str = "Request rejected";
    pub const ID_IN_USE: &str = "Id is already in use";
    pub const NULL_RESULT: &str = "Null result";
}
