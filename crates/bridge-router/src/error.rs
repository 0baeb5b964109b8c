//! Router error types.
//!
//! Every variant renders to the plain message that crosses the context
//! boundary inside `{ "error": ... }`.

use bridge_protocol_types::error_messages;
use thiserror::Error;

/// Error type shared by routers, requesters and interaction flows.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// No decoder registered for the type tag
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    /// No handler registered for the route
    #[error("No handler for route: {0}")]
    MissingHandler(String),

    /// A type tag or route was registered twice
    #[error("Already registered: {0}")]
    DuplicateRegistration(String),

    /// Malformed frame or payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope origin does not match the transport-reported origin
    #[error("Invalid origin")]
    InvalidOrigin,

    /// External sender tried to invoke an internal-only message
    #[error("Permission rejected")]
    PermissionRejected,

    /// `validate_basic` failure
    #[error("{0}")]
    InvalidParams(String),

    /// The user rejected the interaction
    #[error("Request rejected")]
    Rejected,

    /// Correlation id collision
    #[error("Id is already in use")]
    IdInUse,

    /// A deadline elapsed
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A newer attempt superseded this one
    #[error("Aborted: {0}")]
    Aborted(String),

    /// Delivery failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The receiver answered with neither `return` nor `error`
    #[error("Null result")]
    NullResult,

    /// Any other error reported by the remote context
    #[error("{0}")]
    Remote(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Rebuild a typed error from a remote `{ "error": ... }` message.
    pub fn from_remote(message: &str) -> Self {
        match message {
            error_messages::PERMISSION_REJECTED => Self::PermissionRejected,
            error_messages::INVALID_ORIGIN => Self::InvalidOrigin,
            error_messages::REQUEST_REJECTED => Self::Rejected,
            error_messages::ID_IN_USE => Self::IdInUse,
            error_messages::NULL_RESULT => Self::NullResult,
            other => Self::Remote(other.to_string()),
        }
    }

    /// Whether this error comes from a guard.
    pub fn is_security(&self) -> bool {
        matches!(self, Self::InvalidOrigin | Self::PermissionRejected)
    }
}

/// Result type alias using BridgeError.
pub type BridgeResult<T> = Result<T, BridgeError>;
