//! Logging setup for wallet-bridge binaries.

use crate::CoreResult;
use observability::{LogConfig, ObservabilityMode};
use std::path::PathBuf;

/// Selects [`ObservabilityMode`]; `prod` keeps correlation ids only.
pub const OBS_MODE_ENV: &str = "WALLET_BRIDGE_OBS_MODE";

/// Install the JSONL sink (plus stderr) for `service`.
///
/// `level` is the fallback filter when `RUST_LOG` is unset.
pub fn init_logging(service: &str, level: &str, log_path: Option<PathBuf>) -> CoreResult<()> {
    let mode = parse_mode(std::env::var(OBS_MODE_ENV).ok().as_deref());
    observability::init_with_config(LogConfig {
        default_level: level.into(),
        log_path,
        also_stderr: true,
        mode,
        ..LogConfig::for_service(service)
    })?;
    Ok(())
}

fn parse_mode(raw: Option<&str>) -> ObservabilityMode {
    match raw.map(str::trim) {
        Some(v) if v.eq_ignore_ascii_case("prod") || v.eq_ignore_ascii_case("production") => {
            ObservabilityMode::ProdMetadataOnly
        }
        _ => ObservabilityMode::DevVerbose,
    }
}
