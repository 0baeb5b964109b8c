//! Application wiring for the simulator.

mod config_cmd;
mod extension;
mod keyring;
mod simulate;

pub use config_cmd::print_config;
pub use simulate::{run_simulation, Decision, SimulationOptions};
