//! Human-in-the-loop approvals across wallet contexts.
//!
//! The background process calls [`InteractionCoordinator::wait_approve`];
//! the popup stores what it was sent in an [`InteractionForeground`] and
//! answers with `ApproveInteraction` or `RejectInteraction`.
//!
//! ```ignore
//! let coordinator = InteractionCoordinator::new();
//! router.register_message::<ApproveInteraction>()?;
//! router.register_message::<RejectInteraction>()?;
//! router.add_handler(InteractionHandler::new(coordinator.clone()))?;
//!
//! // inside some handler
//! let answer = coordinator
//!     .wait_approve(&env, "/unlock", "unlock", json!({}), Default::default())
//!     .await?;
//! ```

mod attempt;
mod background;
mod foreground;
pub mod messages;

pub use attempt::{Attempt, AttemptLock};
pub use background::{InteractionCoordinator, InteractionHandler, WaitApproveOptions};
pub use foreground::{ForegroundHandler, InteractionForeground};
pub use messages::{
    ApproveInteraction, ForegroundMessage, InteractionEvent, InteractionMessage, PendingInteraction,
    PushEventData, PushInteractionData, RejectInteraction,
};

use bridge_router::{BridgeResult, Router};

/// Register the background `interaction` route on `router`.
pub fn register_background(router: &mut Router, coordinator: InteractionCoordinator) -> BridgeResult<()> {
    router.register_message::<ApproveInteraction>()?;
    router.register_message::<RejectInteraction>()?;
    router.add_handler(InteractionHandler::new(coordinator))
}

/// Register the popup `interaction-foreground` route on `router`.
pub fn register_foreground(
    router: &mut Router,
    foreground: std::sync::Arc<InteractionForeground>,
) -> BridgeResult<()> {
    router.register_message::<PushInteractionData>()?;
    router.register_message::<PushEventData>()?;
    router.add_handler(ForegroundHandler::new(foreground))
}
