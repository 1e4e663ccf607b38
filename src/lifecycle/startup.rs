//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate the settings file
//! - Initialize logging and metrics
//! - Open the database and build the requested daemon

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::cfggen::{DhcpServCfgGenerator, GenerateError};
use crate::config::loader::{load_or_default, ConfigError};
use crate::config::DaemonConfig;
use crate::db::{DbConnector, DbError, FileDb};
use crate::monitor::DbMonitor;
use crate::observability::{logging, metrics};
use crate::process::SysProcessTable;
use crate::relay::{DhcpRelayd, Supervisorctl};
use crate::servd::{DhcpServd, SystemInterfaces};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid settings: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Generate(#[from] GenerateError),
}

/// Load settings and bring up logging. Runs before anything else logs.
pub fn init(config_path: Option<&Path>) -> Result<DaemonConfig, StartupError> {
    let config = load_or_default(config_path)?;
    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config_db = %config.database.config_db_path,
        "Settings loaded"
    );
    Ok(config)
}

/// Start the metrics endpoint if enabled. Must run inside the runtime.
pub fn init_metrics(config: &DaemonConfig) {
    if !config.observability.metrics_enabled {
        return;
    }
    match config.observability.metrics_address.parse::<SocketAddr>() {
        Ok(addr) => metrics::init_metrics(addr),
        Err(_) => tracing::error!(
            metrics_address = %config.observability.metrics_address,
            "Failed to parse metrics address"
        ),
    }
}

pub fn open_database(config: &DaemonConfig) -> Arc<dyn DbConnector> {
    Arc::new(FileDb::new(
        &config.database.config_db_path,
        &config.database.state_db_path,
    ))
}

fn monitor(db: &Arc<dyn DbConnector>, config: &DaemonConfig) -> Result<DbMonitor, StartupError> {
    Ok(DbMonitor::new(
        db.clone(),
        Duration::from_millis(config.monitor.select_timeout_ms),
    )?)
}

pub fn build_relayd(config: &DaemonConfig) -> Result<DhcpRelayd<SysProcessTable, Supervisorctl>, StartupError> {
    let db = open_database(config);
    let monitor = monitor(&db, config)?;
    Ok(DhcpRelayd::new(
        db,
        monitor,
        SysProcessTable::new(),
        Supervisorctl::new(&config.relay.supervisorctl_path),
        config.relay.clone(),
        &config.files,
    ))
}

pub fn build_servd(config: &DaemonConfig) -> Result<DhcpServd<SystemInterfaces, SysProcessTable>, StartupError> {
    let db = open_database(config);
    let generator = DhcpServCfgGenerator::new(db.clone(), &config.server, &config.files)?;
    let monitor = monitor(&db, config)?;
    Ok(DhcpServd::new(
        db,
        generator,
        monitor,
        SystemInterfaces,
        SysProcessTable::new(),
        config.server.clone(),
        &config.files,
    ))
}
