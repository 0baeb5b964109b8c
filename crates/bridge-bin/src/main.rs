//! wallet-bridge - runs the page, background and popup contexts in one
//! process over the in-process transport.

mod app;

use std::path::PathBuf;

use bridge_config_and_utils::{init_logging, Config, Paths};
use clap::{Parser, Subcommand};

/// wallet-bridge command-line interface.
#[derive(Parser)]
#[command(name = "wallet-bridge")]
#[command(about = "Cross-context message bridge and approval simulator")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (config, logs). Defaults to ~/.wallet-bridge
    #[arg(long, global = true, env = "WALLET_BRIDGE_BASE_DIR")]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a page -> background -> popup unlock round trip
    Simulate {
        /// Make the scripted popup reject instead of approve
        #[arg(long)]
        reject: bool,

        /// Reject interactions nobody answers within this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Print the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let mut config = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = level;
    }

    paths.ensure_dirs()?;
    init_logging("wallet-bridge", &config.log_level, Some(paths.log_file()))?;

    match cli.command {
        Commands::Simulate { reject, timeout_ms } => {
            if let Some(ms) = timeout_ms {
                config.interaction_timeout_ms = (ms > 0).then_some(ms);
            }
            let options = app::SimulationOptions {
                decision: if reject {
                    app::Decision::Reject
                } else {
                    app::Decision::Approve
                },
            };
            let report = app::run_simulation(&config, options).await?;
            report.print();
        }
        Commands::Config { save } => {
            app::print_config(&config, &paths)?;
            if save {
                config.save(&paths)?;
                println!("Saved to {}", paths.config_file().display());
            }
        }
    }

    Ok(())
}
