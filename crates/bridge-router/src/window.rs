//! Popup window bookkeeping.
//!
//! The browser is hidden behind [`WindowHost`]. [`WindowRegistry`] tracks the
//! popups this process opened and which one was focused last, so internal
//! interaction requests can reuse a window instead of stacking new ones.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::BridgeResult;

/// A popup window and the tab rendered inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle {
    pub window_id: u32,
    pub tab_id: u32,
}

/// Browser window operations needed by interaction requests.
#[async_trait]
pub trait WindowHost: Send + Sync {
    /// Open a new popup window at `url`.
    async fn open_popup(&self, url: &str) -> BridgeResult<WindowHandle>;

    /// Resolve once the tab finished loading.
    async fn wait_tab_loaded(&self, tab_id: u32) -> BridgeResult<()>;

    /// Point an existing tab at `url`.
    async fn navigate(&self, tab_id: u32, url: &str) -> BridgeResult<()>;
}

/// Open popups ordered by focus recency.
#[derive(Debug, Default)]
pub struct WindowRegistry {
    windows: HashMap<u32, (WindowHandle, u64)>,
    clock: u64,
}

impl WindowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A popup was opened. Opening counts as focusing it.
    pub fn opened(&mut self, handle: WindowHandle) {
        self.clock += 1;
        self.windows.insert(handle.window_id, (handle, self.clock));
    }

    /// A popup gained focus. Unknown windows are ignored.
    pub fn focused(&mut self, window_id: u32) {
        self.clock += 1;
        if let Some(entry) = self.windows.get_mut(&window_id) {
            entry.1 = self.clock;
        }
    }

    pub fn closed(&mut self, window_id: u32) -> bool {
        self.windows.remove(&window_id).is_some()
    }

    /// The most recently focused popup, if any is open.
    pub fn pick(&self) -> Option<WindowHandle> {
        self.windows
            .values()
            .max_by_key(|(_, focused_at)| *focused_at)
            .map(|(handle, _)| *handle)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Opens or reuses popups through a [`WindowHost`] and keeps the registry in
/// sync.
pub struct WindowOrchestrator {
    host: Arc<dyn WindowHost>,
    registry: Mutex<WindowRegistry>,
}

impl WindowOrchestrator {
    pub fn new(host: Arc<dyn WindowHost>) -> Self {
        Self {
            host,
            registry: Mutex::new(WindowRegistry::new()),
        }
    }

    /// Open a fresh popup at `url` and wait until it has loaded.
    pub async fn open(&self, url: &str) -> BridgeResult<WindowHandle> {
        let handle = self.host.open_popup(url).await?;
        self.registry.lock().opened(handle);
        debug!(window_id = handle.window_id, tab_id = handle.tab_id, "Popup opened");
        self.host.wait_tab_loaded(handle.tab_id).await?;
        Ok(handle)
    }

    /// Navigate the most recently focused popup to `url`, or open one when
    /// none is available.
    pub async fn reuse_or_open(&self, url: &str) -> BridgeResult<WindowHandle> {
        let picked = self.registry.lock().pick();
        let Some(handle) = picked else {
            return self.open(url).await;
        };

        if let Err(e) = self.host.navigate(handle.tab_id, url).await {
            warn!(
                window_id = handle.window_id,
                error = %e,
                "Reused popup is gone, opening a new one"
            );
            self.registry.lock().closed(handle.window_id);
            return self.open(url).await;
        }
        self.host.wait_tab_loaded(handle.tab_id).await?;
        self.registry.lock().focused(handle.window_id);
        debug!(window_id = handle.window_id, "Popup reused");
        Ok(handle)
    }

    pub fn window_focused(&self, window_id: u32) {
        self.registry.lock().focused(window_id);
    }

    pub fn window_closed(&self, window_id: u32) {
        if self.registry.lock().closed(window_id) {
            debug!(window_id, "Popup closed");
        }
    }

    pub fn open_windows(&self) -> usize {
        self.registry.lock().len()
    }
}

/// Calls observed by [`RecordingWindowHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    Opened { window_id: u32, url: String },
    Loaded { tab_id: u32 },
    Navigated { tab_id: u32, url: String },
}

/// In-memory [`WindowHost`] that hands out sequential ids and records every
/// call. Used by the simulator and in tests.
#[derive(Default)]
pub struct RecordingWindowHost {
    next_id: AtomicU32,
    events: Mutex<Vec<WindowEvent>>,
    closed: Mutex<Vec<u32>>,
}

impl RecordingWindowHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WindowEvent> {
        self.events.lock().clone()
    }

    /// Urls passed to `open_popup`, in order.
    pub fn opened_urls(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                WindowEvent::Opened { url, .. } => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    /// Mark a tab as closed; later navigations to it fail.
    pub fn close_tab(&self, tab_id: u32) {
        self.closed.lock().push(tab_id);
    }
}

#[async_trait]
impl WindowHost for RecordingWindowHost {
    async fn open_popup(&self, url: &str) -> BridgeResult<WindowHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.events.lock().push(WindowEvent::Opened {
            window_id: id,
            url: url.to_string(),
        });
        Ok(WindowHandle {
            window_id: id,
            tab_id: id,
        })
    }

    async fn wait_tab_loaded(&self, tab_id: u32) -> BridgeResult<()> {
        self.events.lock().push(WindowEvent::Loaded { tab_id });
        Ok(())
    }

    async fn navigate(&self, tab_id: u32, url: &str) -> BridgeResult<()> {
        if self.closed.lock().contains(&tab_id) {
            return Err(crate::BridgeError::Transport(format!("tab {tab_id} is closed")));
        }
        self.events.lock().push(WindowEvent::Navigated {
            tab_id,
            url: url.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(id: u32) -> WindowHandle {
        WindowHandle {
            window_id: id,
            tab_id: id,
        }
    }

    #[test]
    fn registry_picks_most_recently_focused() {
        let mut registry = WindowRegistry::new();
        assert!(registry.pick().is_none());

        registry.opened(handle(1));
        registry.opened(handle(2));
        assert_eq!(registry.pick(), Some(handle(2)));

        registry.focused(1);
        assert_eq!(registry.pick(), Some(handle(1)));

        assert!(registry.closed(1));
        assert_eq!(registry.pick(), Some(handle(2)));
        assert!(!registry.closed(1));
    }

    #[test]
    fn registry_ignores_focus_of_unknown_window() {
        let mut registry = WindowRegistry::new();
        registry.opened(handle(3));
        registry.focused(99);
        assert_eq!(registry.pick(), Some(handle(3)));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn orchestrator_opens_when_nothing_to_reuse() {
        let host = Arc::new(RecordingWindowHost::new());
        let windows = WindowOrchestrator::new(host.clone());

        let opened = windows.reuse_or_open("chrome-extension://x/popup.html").await.unwrap();
        assert_eq!(opened.window_id, 1);
        assert_eq!(
            host.events(),
            vec![
                WindowEvent::Opened {
                    window_id: 1,
                    url: "chrome-extension://x/popup.html".to_string()
                },
                WindowEvent::Loaded { tab_id: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn orchestrator_reuses_focused_window() {
        let host = Arc::new(RecordingWindowHost::new());
        let windows = WindowOrchestrator::new(host.clone());

        windows.open("a").await.unwrap();
        windows.open("b").await.unwrap();
        windows.window_focused(1);

        let reused = windows.reuse_or_open("c").await.unwrap();
        assert_eq!(reused.window_id, 1);
        assert_eq!(windows.open_windows(), 2);
        assert!(host.events().contains(&WindowEvent::Navigated {
            tab_id: 1,
            url: "c".to_string()
        }));
    }

    #[tokio::test]
    async fn orchestrator_replaces_vanished_window() {
        let host = Arc::new(RecordingWindowHost::new());
        let windows = WindowOrchestrator::new(host.clone());

        windows.open("a").await.unwrap();
        host.close_tab(1);

        let fresh = windows.reuse_or_open("b").await.unwrap();
        assert_eq!(fresh.window_id, 2);
        assert_eq!(windows.open_windows(), 1);
        assert_eq!(host.opened_urls(), vec!["a".to_string(), "b".to_string()]);
    }
}
