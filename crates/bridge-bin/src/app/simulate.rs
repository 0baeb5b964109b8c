//! Scripted page -> background -> popup round trip.

use std::sync::Arc;
use std::time::Duration;

use bridge_config_and_utils::Config;
use interaction_coordinator::InteractionForeground;
use serde_json::json;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::extension::Extension;
use super::keyring::{EnableKeyring, KeyringStatus, LockKeyring};

const PAGE_URL: &str = "https://dapp.example/swap";
const UI_POLL_INTERVAL: Duration = Duration::from_millis(10);
const EVENT_WAIT: Duration = Duration::from_secs(2);

/// What the scripted popup does with every interaction it is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

#[derive(Debug, Clone)]
pub struct SimulationOptions {
    pub decision: Decision,
}

#[derive(Debug)]
pub struct SimulationReport {
    /// Answer to the page sending an internal-only message.
    pub page_lock_attempt: String,
    /// Outcome of the page asking to enable the keyring.
    pub enable: Result<KeyringStatus, String>,
    /// Urls of the popups the background opened.
    pub opened_windows: Vec<String>,
    /// Interactions still pending when the run ended.
    pub waiting_after: usize,
    /// Events the popup received.
    pub events: Vec<String>,
}

impl SimulationReport {
    pub fn print(&self) {
        println!("page -> lock-keyring:   {}", self.page_lock_attempt);
        match &self.enable {
            Ok(status) => println!("page -> enable-keyring: {status:?}"),
            Err(e) => println!("page -> enable-keyring: error: {e}"),
        }
        println!("popups opened:          {}", self.opened_windows.len());
        for url in &self.opened_windows {
            println!("  {url}");
        }
        println!("events received:        {}", self.events.join(", "));
        println!("still waiting:          {}", self.waiting_after);
    }
}

pub async fn run_simulation(config: &Config, options: SimulationOptions) -> anyhow::Result<SimulationReport> {
    let extension = Extension::start(config).await?;
    let mut events = extension.foreground.subscribe_events();
    let (stop_ui, ui) = spawn_scripted_ui(extension.foreground.clone(), options.decision);
    let page = extension.page(1, PAGE_URL);

    let page_lock_attempt = match page.send_message(&config.background_port, &LockKeyring {}).await {
        Ok(status) => format!("unexpectedly allowed ({status:?})"),
        Err(e) => e.to_string(),
    };

    let enable = page
        .send_message(
            &config.background_port,
            &EnableKeyring {
                chain_id: "cosmoshub-4".to_string(),
            },
        )
        .await
        .map_err(|e| e.to_string());
    info!(outcome = ?enable, "Enable request settled");

    let mut received = Vec::new();
    if let Ok(status) = &enable {
        extension
            .coordinator
            .dispatch_event("keystore-changed", json!({ "status": status }))
            .await?;
        match tokio::time::timeout(EVENT_WAIT, events.recv()).await {
            Ok(Ok(event)) => received.push(event.event_type),
            Ok(Err(e)) => warn!(error = %e, "Event stream failed"),
            Err(_) => warn!("No event reached the popup"),
        }
    }

    let _ = stop_ui.send(());
    if let Err(e) = ui.await {
        warn!(error = %e, "Scripted popup task failed");
    }

    let report = SimulationReport {
        page_lock_attempt,
        enable,
        opened_windows: extension.host.opened_urls(),
        waiting_after: extension.coordinator.waiting_len(),
        events: received,
    };
    extension.shutdown().await;
    Ok(report)
}

/// Poll the popup's store and act on everything shown to it.
fn spawn_scripted_ui(
    foreground: Arc<InteractionForeground>,
    decision: Decision,
) -> (oneshot::Sender<()>, JoinHandle<()>) {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(UI_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    for pending in foreground.all() {
                        let outcome = match decision {
                            Decision::Approve => {
                                foreground
                                    .approve(&pending.interaction_type, &pending.id, json!({ "approved": true }))
                                    .await
                            }
                            Decision::Reject => {
                                foreground.reject(&pending.interaction_type, &pending.id).await
                            }
                        };
                        if let Err(e) = outcome {
                            warn!(interaction_id = %pending.id, error = %e, "Popup failed to answer");
                        }
                    }
                }
                _ = &mut stop_rx => break,
            }
        }
    });
    (stop_tx, task)
}
