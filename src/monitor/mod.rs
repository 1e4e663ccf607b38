//! Database change monitor.
//!
//! # Data Flow
//! ```text
//! DbConnector::subscribe (change feed)
//!     → DbMonitor::wait_for_update (bounded by select_timeout)
//!     → every enabled Checker re-reads its table and diffs it
//!     → UpdateEvents { fired checkers, new feature state }
//!     → owner runs one synchronous pass
//! ```
//!
//! # Design Decisions
//! - Checkers are evaluated on every wake, including timeouts, so a
//!   dropped notification only delays a pass
//! - The set of enabled checkers is owned by the monitor instance; there is
//!   no process-wide registry

pub mod checker;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::db::tables::{feature_enabled, DHCP_SERVER_FEATURE};
use crate::db::{DbConnector, DbError, DbResult, Snapshot, Table};
use crate::observability::metrics;

pub use checker::{CheckContext, Checker, CheckerKind};

/// Result of one wake of the monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateEvents {
    /// Checkers that fired.
    pub fired: BTreeSet<CheckerKind>,
    /// Current feature state, when the feature checker fired.
    pub feature_enabled: Option<bool>,
}

impl UpdateEvents {
    pub fn fired(&self, kind: CheckerKind) -> bool {
        self.fired.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.fired.is_empty()
    }
}

/// Multiplexed wait over the enabled checkers.
pub struct DbMonitor {
    db: Arc<dyn DbConnector>,
    feed: mpsc::UnboundedReceiver<()>,
    checkers: BTreeMap<CheckerKind, Checker>,
    select_timeout: Duration,
}

impl DbMonitor {
    /// Subscribe to the database and start with no checkers enabled.
    pub fn new(db: Arc<dyn DbConnector>, select_timeout: Duration) -> DbResult<Self> {
        let feed = db.subscribe()?;
        Ok(Self {
            db,
            feed,
            checkers: BTreeMap::new(),
            select_timeout,
        })
    }

    /// Enable checkers. Newly enabled checkers start from the current table
    /// contents; already enabled ones keep their baseline.
    pub fn enable_checkers(&mut self, kinds: impl IntoIterator<Item = CheckerKind>) -> DbResult<()> {
        self.enable_from(kinds, &Snapshot::new())
    }

    fn enable_from(&mut self, kinds: impl IntoIterator<Item = CheckerKind>, baseline: &Snapshot) -> DbResult<()> {
        for kind in kinds {
            if self.checkers.contains_key(&kind) {
                continue;
            }
            let current = match baseline.get(kind.table()) {
                Some(table) => table.clone(),
                None => self.db.config_table(kind.table())?,
            };
            self.checkers.insert(kind, Checker::new(kind, current));
            tracing::info!(checker = kind.name(), "Checker enabled");
        }
        Ok(())
    }

    pub fn disable_checkers(&mut self, kinds: impl IntoIterator<Item = CheckerKind>) {
        for kind in kinds {
            if self.checkers.remove(&kind).is_some() {
                tracing::info!(checker = kind.name(), "Checker disabled");
            }
        }
    }

    /// Make exactly `kinds` enabled.
    pub fn set_checkers(&mut self, kinds: &BTreeSet<CheckerKind>) -> DbResult<()> {
        self.set_checkers_from(kinds, &Snapshot::new())
    }

    /// Make exactly `kinds` enabled. Newly enabled checkers take their
    /// baseline from `baseline` when it holds their table, so changes made
    /// after `baseline` was read still fire.
    pub fn set_checkers_from(&mut self, kinds: &BTreeSet<CheckerKind>, baseline: &Snapshot) -> DbResult<()> {
        let stale: Vec<CheckerKind> = self
            .checkers
            .keys()
            .filter(|k| !kinds.contains(*k))
            .copied()
            .collect();
        self.disable_checkers(stale);
        self.enable_from(kinds.iter().copied(), baseline)
    }

    pub fn enabled_checkers(&self) -> BTreeSet<CheckerKind> {
        self.checkers.keys().copied().collect()
    }

    /// Evaluate every enabled checker once against the current tables.
    pub fn check_db_update(&mut self, ctx: &CheckContext) -> DbResult<UpdateEvents> {
        let mut tables: BTreeMap<&'static str, Table> = BTreeMap::new();
        let mut events = UpdateEvents::default();

        for (kind, checker) in self.checkers.iter_mut() {
            let name = kind.table();
            if !tables.contains_key(name) {
                tables.insert(name, self.db.config_table(name)?);
            }
            let current = tables.get(name).cloned().unwrap_or_default();
            if checker.check(current, ctx) {
                metrics::record_checker_fired(kind.name());
                events.fired.insert(*kind);
            }
        }

        if events.fired(CheckerKind::FeatureState) {
            let features = tables.get(CheckerKind::FeatureState.table());
            events.feature_enabled = Some(
                features
                    .map(|t| feature_enabled(t, DHCP_SERVER_FEATURE))
                    .unwrap_or(false),
            );
        }
        Ok(events)
    }

    /// Block until the database signals a change or the select timeout
    /// elapses, then evaluate the enabled checkers.
    pub async fn wait_for_update(&mut self, ctx: &CheckContext) -> DbResult<UpdateEvents> {
        match tokio::time::timeout(self.select_timeout, self.feed.recv()).await {
            Ok(Some(())) => while self.feed.try_recv().is_ok() {},
            Ok(None) => return Err(DbError::FeedClosed),
            Err(_) => {}
        }
        self.check_db_update(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{row, MemoryDb};
    use crate::db::{DHCP_SERVER_IPV4, FEATURE, VLAN};

    #[tokio::test]
    async fn test_enable_takes_fresh_baseline() {
        let db = Arc::new(MemoryDb::new());
        db.set_config_row(VLAN, "Vlan1000", row([]));
        let mut monitor = DbMonitor::new(db.clone(), Duration::from_millis(10)).unwrap();

        monitor.enable_checkers([CheckerKind::Vlan]).unwrap();
        let ctx = CheckContext {
            interfaces: ["Vlan1000".to_string()].into_iter().collect(),
            ..CheckContext::default()
        };
        // Pre-existing rows never fire.
        assert!(monitor.wait_for_update(&ctx).await.unwrap().is_empty());

        db.remove_config_row(VLAN, "Vlan1000");
        let events = monitor.wait_for_update(&ctx).await.unwrap();
        assert!(events.fired(CheckerKind::Vlan));
    }

    #[tokio::test]
    async fn test_feature_state_reported() {
        let db = Arc::new(MemoryDb::new());
        let mut monitor = DbMonitor::new(db.clone(), Duration::from_millis(10)).unwrap();
        monitor.enable_checkers([CheckerKind::FeatureState]).unwrap();

        db.set_config_row(FEATURE, "dhcp_server", row([("state", "enabled".into())]));
        let events = monitor.wait_for_update(&CheckContext::default()).await.unwrap();
        assert_eq!(events.feature_enabled, Some(true));
    }

    #[test]
    fn test_baseline_from_snapshot_sees_later_changes() {
        let db = Arc::new(MemoryDb::new());
        let mut monitor = DbMonitor::new(db.clone(), Duration::from_millis(10)).unwrap();
        let mut snapshot = Snapshot::new();
        snapshot.insert(VLAN.to_string(), Table::new());

        // Written after the snapshot was taken, before the checker exists.
        db.set_config_row(VLAN, "Vlan1000", row([]));
        let wanted: BTreeSet<_> = [CheckerKind::Vlan].into_iter().collect();
        monitor.set_checkers_from(&wanted, &snapshot).unwrap();

        let ctx = CheckContext {
            interfaces: ["Vlan1000".to_string()].into_iter().collect(),
            ..CheckContext::default()
        };
        assert!(monitor.check_db_update(&ctx).unwrap().fired(CheckerKind::Vlan));
    }

    #[tokio::test]
    async fn test_set_checkers_disables_the_rest() {
        let db = Arc::new(MemoryDb::new());
        let mut monitor = DbMonitor::new(db.clone(), Duration::from_millis(10)).unwrap();
        monitor
            .enable_checkers([CheckerKind::DhcpServerCfg, CheckerKind::Vlan])
            .unwrap();

        let wanted: BTreeSet<_> = [CheckerKind::DhcpServerCfg].into_iter().collect();
        monitor.set_checkers(&wanted).unwrap();
        assert_eq!(monitor.enabled_checkers(), wanted);

        db.set_config_row(VLAN, "Vlan1000", row([]));
        db.set_config_row(DHCP_SERVER_IPV4, "Vlan1000", row([("state", "enabled".into())]));
        let events = monitor.wait_for_update(&CheckContext::default()).await.unwrap();
        assert_eq!(events.fired.len(), 1);
        assert!(events.fired(CheckerKind::DhcpServerCfg));
    }
}
