//! `wallet-bridge config`.

use bridge_config_and_utils::{Config, Paths};

pub fn print_config(config: &Config, paths: &Paths) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    println!();
    println!("config file:        {}", paths.config_file().display());
    println!("log file:           {}", paths.log_file().display());
    println!("extension origin:   {}", config.extension_origin()?);
    println!("popup url:          {}", config.popup_url());
    match config.interaction_timeout() {
        Some(timeout) => println!("interaction timeout: {} ms", timeout.as_millis()),
        None => println!("interaction timeout: none"),
    }
    Ok(())
}
