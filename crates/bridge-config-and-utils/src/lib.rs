//! Configuration, paths, errors and logging setup shared by the
//! wallet-bridge binaries.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, DEFAULT_EXTENSION_ID, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, OBS_MODE_ENV};
pub use paths::Paths;
