//! Configuration for the wallet-bridge contexts.

use crate::{CoreError, CoreResult, Paths};
use bridge_protocol_types::{APP_PORT, BACKGROUND_PORT};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Extension id used when none is configured.
pub const DEFAULT_EXTENSION_ID: &str = "walletbridgedevextensionid";

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Process-identity token of the extension's own contexts.
    #[serde(default = "default_extension_id")]
    pub extension_id: String,
    /// Privileged origin; derived from `extension_id` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension_origin: Option<String>,
    /// Page opened for interactions; `<origin>/popup.html` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub popup_url: Option<String>,
    /// Port of the background router.
    #[serde(default = "default_background_port")]
    pub background_port: String,
    /// Port of the popup router.
    #[serde(default = "default_ui_port")]
    pub ui_port: String,
    /// Default interaction timeout. `None` waits until the user acts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interaction_timeout_ms: Option<u64>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_extension_id() -> String {
    DEFAULT_EXTENSION_ID.to_string()
}

fn default_background_port() -> String {
    BACKGROUND_PORT.to_string()
}

fn default_ui_port() -> String {
    APP_PORT.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            extension_id: default_extension_id(),
            extension_origin: None,
            popup_url: None,
            background_port: default_background_port(),
            ui_port: default_ui_port(),
            interaction_timeout_ms: None,
        }
    }
}

impl Config {
    /// Load configuration from `<base>/config.json`, falling back to
    /// defaults, then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("WALLET_BRIDGE_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(id) = std::env::var("WALLET_BRIDGE_EXTENSION_ID") {
            if !id.trim().is_empty() {
                self.extension_id = id.trim().to_string();
            }
        }
        if let Ok(raw) = std::env::var("WALLET_BRIDGE_INTERACTION_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(0) => self.interaction_timeout_ms = None,
                Ok(ms) => self.interaction_timeout_ms = Some(ms),
                Err(_) => tracing::warn!(
                    value = %raw,
                    "Ignoring invalid WALLET_BRIDGE_INTERACTION_TIMEOUT_MS"
                ),
            }
        }
    }

    /// Check that ids, ports and URLs are usable.
    pub fn validate(&self) -> CoreResult<()> {
        if self.extension_id.trim().is_empty() {
            return Err(CoreError::Config("extension_id must not be empty".to_string()));
        }
        if self.background_port.is_empty() || self.ui_port.is_empty() {
            return Err(CoreError::Config("ports must not be empty".to_string()));
        }
        if self.background_port == self.ui_port {
            return Err(CoreError::Config(format!(
                "background_port and ui_port must differ (both are {})",
                self.background_port
            )));
        }
        self.extension_origin()?;
        Url::parse(&self.popup_url())?;
        Ok(())
    }

    /// The privileged origin as `scheme://host[:port]`.
    pub fn extension_origin(&self) -> CoreResult<String> {
        let raw = self
            .extension_origin
            .clone()
            .unwrap_or_else(|| format!("chrome-extension://{}", self.extension_id));
        let parsed = Url::parse(&raw)?;
        let host = parsed
            .host_str()
            .ok_or_else(|| CoreError::Config(format!("extension origin has no host: {raw}")))?;
        Ok(match parsed.port() {
            Some(port) => format!("{}://{}:{}", parsed.scheme(), host, port),
            None => format!("{}://{}", parsed.scheme(), host),
        })
    }

    /// URL of the interaction popup page.
    pub fn popup_url(&self) -> String {
        match &self.popup_url {
            Some(url) => url.clone(),
            None => format!("chrome-extension://{}/popup.html", self.extension_id),
        }
    }

    /// Default interaction timeout as a `Duration`.
    pub fn interaction_timeout(&self) -> Option<Duration> {
        self.interaction_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.background_port, "background");
        assert_eq!(config.ui_port, "popup");
        assert!(config.interaction_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_origin_and_popup_follow_extension_id() {
        let config = Config {
            extension_id: "abcdef".to_string(),
            ..Default::default()
        };
        assert_eq!(config.extension_origin().unwrap(), "chrome-extension://abcdef");
        assert_eq!(config.popup_url(), "chrome-extension://abcdef/popup.html");
    }

    #[test]
    fn test_explicit_origin_is_normalized() {
        let config = Config {
            extension_origin: Some("moz-extension://1234/some/page.html".to_string()),
            ..Default::default()
        };
        assert_eq!(config.extension_origin().unwrap(), "moz-extension://1234");
    }

    #[test]
    fn test_config_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let config_json = r#"{
            "log_level": "debug",
            "extension_id": "fromfile",
            "interaction_timeout_ms": 5000
        }"#;
        std::fs::write(&config_path, config_json).unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.extension_id, "fromfile");
        assert_eq!(config.ui_port, "popup");
        assert_eq!(config.interaction_timeout(), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config {
            extension_id: "roundtrip".to_string(),
            popup_url: Some("chrome-extension://roundtrip/popup.html".to_string()),
            ..Default::default()
        };
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.background_port, "background");
    }

    #[test]
    fn test_validate_rejects_shared_port() {
        let config = Config {
            ui_port: "background".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_origin() {
        let config = Config {
            extension_origin: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::InvalidUrl(_))));
    }
}
