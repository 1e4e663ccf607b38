//! Daemon settings subsystem.
//!
//! # Data Flow
//! ```text
//! settings file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DaemonConfig (validated, immutable)
//!     → handed to the daemons at startup
//! ```
//!
//! # Design Decisions
//! - Settings are read once; network state changes come from the database,
//!   not from this file
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::DaemonConfig;
pub use schema::FilesConfig;
pub use schema::MonitorConfig;
pub use schema::ObservabilityConfig;
pub use schema::RelayConfig;
pub use schema::ServerConfig;
