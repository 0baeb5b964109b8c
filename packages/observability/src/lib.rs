//! Structured logging shared by every wallet-bridge context.
//!
//! A context calls [`init_with_config`] once and then logs with
//! plain `tracing` macros. Lines go to one JSONL file, `~/.wallet-bridge/logs/dev.jsonl`
//! unless overridden, and optionally to stderr in compact form.
//!
//! Key material never reaches the sink: fields named like `password` or
//! `mnemonic`, mnemonic-shaped strings and raw 32-byte hex are replaced with
//! `[REDACTED]`. [`ObservabilityMode::ProdMetadataOnly`] further drops every
//! field outside the correlation allowlist.

mod json_layer;
mod redact;
mod writer;

use std::io;
use std::path::PathBuf;

pub use json_layer::LogEntry;
pub use redact::{is_sensitive_key, sanitize_value};

/// Which event fields are exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservabilityMode {
    /// Redacted payload fields are kept.
    #[default]
    DevVerbose,
    /// Only correlation identifiers are kept.
    ProdMetadataOnly,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written as `service` on every line (`background`, `popup`, ...).
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub default_level: String,
    /// `None` means [`default_log_path`].
    pub log_path: Option<PathBuf>,
    pub also_stderr: bool,
    pub mode: ObservabilityMode,
}

impl LogConfig {
    pub fn for_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
            mode: ObservabilityMode::default(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::for_service("unknown")
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if the log file cannot be opened or a global subscriber is
/// already set.
pub fn init_with_config(config: LogConfig) -> io::Result<()> {
    writer::init_subscriber(&config)
}

pub fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".wallet-bridge")
        .join("logs")
        .join("dev.jsonl")
}

pub use tracing::{debug, error, info, instrument, trace, warn, Level};
