//! Wires the background and popup contexts onto one bus.

use std::sync::Arc;

use bridge_config_and_utils::Config;
use bridge_protocol_types::MessageSender;
use bridge_router::{
    ChannelBus, ExtensionEnvProducer, ExtensionIdentity, MessageRequester, RecordingWindowHost,
    Router, RouterHandle, WindowOrchestrator,
};
use interaction_coordinator::{
    register_background, register_foreground, InteractionCoordinator, InteractionForeground,
};
use tracing::info;

use super::keyring::{EnableKeyring, KeyringHandler, LockKeyring};

/// A running extension: background router, popup router and the browser
/// stand-in they share.
pub struct Extension {
    pub bus: ChannelBus,
    pub host: Arc<RecordingWindowHost>,
    pub coordinator: InteractionCoordinator,
    pub foreground: Arc<InteractionForeground>,
    routers: Vec<RouterHandle>,
}

impl Extension {
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        let origin = config.extension_origin()?;
        let popup_url = config.popup_url();
        let identity = ExtensionIdentity {
            id: config.extension_id.clone(),
            origin: origin.clone(),
        };

        let bus = ChannelBus::new();
        let host = Arc::new(RecordingWindowHost::new());
        let windows = Arc::new(WindowOrchestrator::new(host.clone()));

        let background_requester = MessageRequester::new(Arc::new(bus.transport(MessageSender::new(
            config.extension_id.clone(),
            format!("{origin}/background.html"),
        ))));
        let coordinator = InteractionCoordinator::new()
            .with_default_timeout(config.interaction_timeout())
            .with_events(background_requester.clone(), config.ui_port.clone());

        let mut background = Router::new(
            config.background_port.clone(),
            Arc::new(ExtensionEnvProducer::new(
                identity.clone(),
                &popup_url,
                &config.ui_port,
                windows.clone(),
                background_requester,
            )?),
        )
        .with_default_guards();
        register_background(&mut background, coordinator.clone())?;
        background.register_message::<EnableKeyring>()?;
        background.register_message::<LockKeyring>()?;
        background.add_handler(KeyringHandler::new(coordinator.clone()))?;

        let popup_requester = MessageRequester::new(Arc::new(
            bus.transport(MessageSender::new(config.extension_id.clone(), popup_url.clone())),
        ));
        let foreground = Arc::new(InteractionForeground::new(
            popup_requester.clone(),
            config.background_port.clone(),
        ));
        let mut popup = Router::new(
            config.ui_port.clone(),
            Arc::new(ExtensionEnvProducer::new(
                identity,
                &popup_url,
                &config.ui_port,
                windows,
                popup_requester,
            )?),
        )
        .with_default_guards();
        register_foreground(&mut popup, foreground.clone())?;

        let routers = vec![background.listen(&bus).await?, popup.listen(&bus).await?];
        info!(
            extension_id = %config.extension_id,
            origin = %origin,
            background_port = %config.background_port,
            ui_port = %config.ui_port,
            "Extension contexts started"
        );

        Ok(Self {
            bus,
            host,
            coordinator,
            foreground,
            routers,
        })
    }

    /// Requester for a web page loaded at `url`.
    pub fn page(&self, tab_id: u32, url: &str) -> MessageRequester {
        MessageRequester::new(Arc::new(
            self.bus
                .transport(MessageSender::new(format!("tab-{tab_id}"), url).with_tab(tab_id)),
        ))
    }

    pub async fn shutdown(self) {
        for router in self.routers {
            router.shutdown().await;
        }
        info!("Extension contexts stopped");
    }
}
