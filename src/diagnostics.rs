//! Row-level diagnostics.
//!
//! A malformed row never aborts a pass: it is logged, recorded here and
//! left out of the result. The accumulated list travels back to the caller
//! alongside the result so operators can see exactly what was dropped.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::db::{self, split_key};

/// One skipped row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Table the offending row lives in.
    pub table: &'static str,
    /// Row key.
    pub key: String,
    /// Human-readable reason.
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a skipped row and emit a warning for it.
    pub fn skip(&mut self, table: &'static str, key: impl Into<String>, reason: impl Into<String>) {
        let key = key.into();
        let reason = reason.into();
        tracing::warn!(table, key = %key, reason = %reason, "Skipping row");
        crate::observability::metrics::record_skipped_row(table);
        self.entries.push(Diagnostic { table, key, reason });
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any diagnostic refers to `key` in `table`.
    pub fn mentions(&self, table: &str, key: &str) -> bool {
        self.entries.iter().any(|d| d.table == table && d.key == key)
    }

    /// DHCP interfaces that lost some coverage because of a skipped row.
    ///
    /// Only rows keyed by interface (`Vlan1000`, `Vlan1000|...`) can be
    /// attributed; range and option rows are attributed through the port
    /// binding that referenced them.
    pub fn affected_interfaces(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter_map(|d| match d.table {
                db::DHCP_SERVER_IPV4 => Some(d.key.clone()),
                db::DHCP_SERVER_IPV4_PORT | db::VLAN_INTERFACE | db::VLAN_MEMBER => {
                    split_key(&d.key).map(|(vlan, _)| vlan.to_string())
                }
                _ => None,
            })
            .collect()
    }
}
