//! Configuration database access.
//!
//! # Data Flow
//! ```text
//! CONFIG_DB (JSON file or in-memory)
//!     → DbConnector::config_table (raw rows)
//!     → tables.rs (typed records, row-level errors)
//!     → cfggen / relay / monitor
//!
//! On change:
//!     watcher.rs (file) or MemoryDb writes
//!     → change feed (unbounded channel)
//!     → monitor wakes and diffs tables
//! ```
//!
//! # Design Decisions
//! - The store is owned by someone else; this side only reads it, except
//!   for the server IP published into the state store
//! - Rows stay untyped until `tables.rs` decodes them

pub mod file;
pub mod memory;
pub mod tables;
pub mod watcher;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub use file::FileDb;
pub use memory::MemoryDb;

pub const DEVICE_METADATA: &str = "DEVICE_METADATA";
pub const VLAN: &str = "VLAN";
pub const VLAN_INTERFACE: &str = "VLAN_INTERFACE";
pub const VLAN_MEMBER: &str = "VLAN_MEMBER";
pub const FEATURE: &str = "FEATURE";
pub const DHCP_SERVER_IPV4: &str = "DHCP_SERVER_IPV4";
pub const DHCP_SERVER_IPV4_RANGE: &str = "DHCP_SERVER_IPV4_RANGE";
pub const DHCP_SERVER_IPV4_PORT: &str = "DHCP_SERVER_IPV4_PORT";
pub const DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS: &str = "DHCP_SERVER_IPV4_CUSTOMIZED_OPTIONS";

/// State store table holding the server's own address.
pub const DHCP_SERVER_IPV4_SERVER_IP: &str = "DHCP_SERVER_IPV4_SERVER_IP";

/// A single field value. Lists may be stored natively or comma-joined.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Scalar view; `None` for native lists.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }

    /// List view. A text value is split on commas; an empty text is an empty list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            FieldValue::List(items) => items.clone(),
            FieldValue::Text(s) if s.trim().is_empty() => Vec::new(),
            FieldValue::Text(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(value: Vec<&str>) -> Self {
        FieldValue::List(value.into_iter().map(str::to_string).collect())
    }
}

pub type Row = BTreeMap<String, FieldValue>;
pub type Table = BTreeMap<String, Row>;

/// A whole database: table name → table.
pub type Snapshot = BTreeMap<String, Table>;

/// Errors raised by the database layer. These are never row-level.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("failed to read database file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write database file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed database file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("change feed unavailable: {0}")]
    Watch(String),

    #[error("change feed closed")]
    FeedClosed,
}

pub type DbResult<T> = Result<T, DbError>;

/// Access to the shared configuration and state stores.
pub trait DbConnector: Send + Sync {
    /// Read a whole table from the configuration store. Missing tables are empty.
    fn config_table(&self, table: &str) -> DbResult<Table>;

    /// Read a whole table from the state store. Missing tables are empty.
    fn state_table(&self, table: &str) -> DbResult<Table>;

    /// Set one field of one row in the state store.
    fn set_state_field(&self, table: &str, key: &str, field: &str, value: &str) -> DbResult<()>;

    /// Subscribe to change notifications. Each message means "something
    /// may have changed"; receivers must re-read the tables they care about.
    fn subscribe(&self) -> DbResult<mpsc::UnboundedReceiver<()>>;
}

/// Split a `<A>|<B>` key into its two halves.
pub fn split_key(key: &str) -> Option<(&str, &str)> {
    let mut parts = key.split('|');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(a), Some(b), None) => Some((a, b)),
        _ => None,
    }
}
