//! DHCPv4 server and relay management for a switch management plane.

// Shared state access
pub mod config;
pub mod db;
pub mod diagnostics;

// Core subsystems
pub mod cfggen;
pub mod monitor;
pub mod process;
pub mod relay;
pub mod servd;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use cfggen::{DhcpServCfgGenerator, Generated};
pub use config::DaemonConfig;
pub use diagnostics::Diagnostics;
pub use lifecycle::Shutdown;
pub use relay::DhcpRelayd;
pub use servd::DhcpServd;
