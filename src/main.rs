//! DHCP server management daemons.
//!
//! # Architecture Overview
//!
//! ```text
//!        CONFIG_DB (JSON)                          STATE_DB (JSON)
//!             │  change feed                         ▲        │
//!             ▼                                      │        │
//!   ┌───────────────────┐   generate   ┌──────────────────┐   │
//!   │      monitor      │────────────▶│      servd       │   │ server ip
//!   │  (checkers, wait) │              │ cfggen → kea.conf│   │
//!   └─────────┬─────────┘              │ SIGHUP kea-dhcp4 │   │
//!             │                        └──────────────────┘   │
//!             ▼                                               ▼
//!   ┌──────────────────────────────────────────────────────────────┐
//!   │                         relayd                               │
//!   │  LEGACY: verify supervisord programs                          │
//!   │  MANAGED: spawn / replace dhcrelay + dhcpmon                  │
//!   └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both daemons run a single control thread; any fatal condition exits
//! with status 1 and the container supervisor restarts the daemon.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use dhcp_server_mgr::lifecycle::{signals, startup, Shutdown};

#[derive(Parser)]
#[command(name = "dhcp-server-mgr")]
#[command(about = "DHCPv4 server configuration and relay supervision", long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Supervise dhcrelay and dhcpmon
    Relayd,
    /// Render the Kea configuration and keep it current
    Servd,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match startup::init(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dhcp-server-mgr: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        startup::init_metrics(&config);
        let shutdown = Arc::new(Shutdown::new());
        signals::spawn_signal_listener(shutdown.clone());

        match cli.command {
            Commands::Relayd => {
                let mut relayd = startup::build_relayd(&config)?;
                relayd.start().await?;
                relayd.run(shutdown.subscribe()).await?;
            }
            Commands::Servd => {
                let mut servd = startup::build_servd(&config)?;
                servd.start().await?;
                servd.run(shutdown.subscribe()).await?;
            }
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    });

    match result {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error, exiting");
            ExitCode::FAILURE
        }
    }
}
