//! Render the Kea configuration once and print it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use dhcp_server_mgr::cfggen::DhcpServCfgGenerator;
use dhcp_server_mgr::db::FileDb;
use dhcp_server_mgr::lifecycle::startup;

#[derive(Parser)]
#[command(name = "dhcp-cfggen")]
#[command(about = "Render the DHCPv4 server configuration from CONFIG_DB", long_about = None)]
struct Cli {
    /// Settings file (TOML). Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Read this CONFIG_DB dump instead of the configured one.
    #[arg(long)]
    config_db: Option<PathBuf>,

    /// Print skipped rows as JSON on stderr.
    #[arg(long)]
    diagnostics: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match startup::init(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dhcp-cfggen: {e}");
            return ExitCode::FAILURE;
        }
    };

    let config_db = cli
        .config_db
        .unwrap_or_else(|| PathBuf::from(&config.database.config_db_path));
    let db = Arc::new(FileDb::new(config_db, &config.database.state_db_path));

    let generated = DhcpServCfgGenerator::new(db, &config.server, &config.files)
        .and_then(|generator| generator.generate());
    let generated = match generated {
        Ok(generated) => generated,
        Err(e) => {
            tracing::error!(error = %e, "Generation failed");
            return ExitCode::FAILURE;
        }
    };

    print!("{}", generated.config);
    if cli.diagnostics {
        match serde_json::to_string_pretty(&generated.diagnostics) {
            Ok(json) => eprintln!("{json}"),
            Err(e) => tracing::warn!(error = %e, "Failed to serialize diagnostics"),
        }
    }
    ExitCode::SUCCESS
}
