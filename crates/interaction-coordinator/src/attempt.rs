//! Single-slot attempt lock.
//!
//! Flows talking to a device the user has to touch (a hardware wallet, say)
//! only ever want one attempt in flight. Beginning a new attempt aborts the
//! previous one, and every attempt runs against a fixed absolute deadline.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use bridge_router::{BridgeError, BridgeResult};

/// A started attempt. Pass it to [`AttemptLock::run_until`].
#[derive(Debug)]
pub struct Attempt {
    id: u64,
    aborted: oneshot::Receiver<()>,
}

impl Attempt {
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Default)]
pub struct AttemptLock {
    current: Mutex<Option<(u64, oneshot::Sender<()>)>>,
    next_id: AtomicU64,
}

impl AttemptLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new attempt, aborting the one in flight.
    pub fn begin(&self) -> Attempt {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (abort, aborted) = oneshot::channel();
        if let Some((previous, abort_previous)) = self.current.lock().replace((id, abort)) {
            debug!(attempt = previous, superseded_by = id, "Aborting previous attempt");
            let _ = abort_previous.send(());
        }
        Attempt { id, aborted }
    }

    /// Abort the attempt in flight, if any.
    pub fn abort_current(&self) -> bool {
        match self.current.lock().take() {
            Some((id, abort)) => {
                debug!(attempt = id, "Aborting attempt");
                let _ = abort.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Drive `fut` until it completes, the attempt is superseded, or
    /// `deadline` passes.
    pub async fn run_until<T, F>(&self, attempt: Attempt, deadline: Instant, fut: F) -> BridgeResult<T>
    where
        F: Future<Output = BridgeResult<T>>,
    {
        let Attempt { id, mut aborted } = attempt;
        let outcome = tokio::select! {
            result = fut => result,
            _ = &mut aborted => Err(BridgeError::Aborted(format!("attempt {id} was superseded"))),
            _ = tokio::time::sleep_until(deadline) => {
                Err(BridgeError::Timeout(format!("attempt {id} passed its deadline")))
            }
        };
        self.finish(id);
        outcome
    }

    fn finish(&self, id: u64) {
        let mut current = self.current.lock();
        if matches!(current.as_ref(), Some((running, _)) if *running == id) {
            *current = None;
        }
    }
}
