//! In-memory database.
//!
//! Used by tests and by embedders that feed the daemons from their own
//! store. Every write notifies all subscribers.

use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::db::{DbConnector, DbResult, FieldValue, Row, Snapshot, Table};

#[derive(Default)]
pub struct MemoryDb {
    config: Mutex<Snapshot>,
    state: Mutex<Snapshot>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace one configuration row.
    pub fn set_config_row(&self, table: &str, key: &str, row: Row) {
        self.config
            .lock()
            .expect("memory db mutex poisoned")
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), row);
        self.notify();
    }

    /// Remove one configuration row, if present.
    pub fn remove_config_row(&self, table: &str, key: &str) {
        if let Some(t) = self
            .config
            .lock()
            .expect("memory db mutex poisoned")
            .get_mut(table)
        {
            t.remove(key);
        }
        self.notify();
    }

    /// Remove one state row, if present.
    pub fn remove_state_row(&self, table: &str, key: &str) {
        if let Some(t) = self
            .state
            .lock()
            .expect("memory db mutex poisoned")
            .get_mut(table)
        {
            t.remove(key);
        }
    }

    fn notify(&self) {
        let mut subscribers = self.subscribers.lock().expect("memory db mutex poisoned");
        subscribers.retain(|tx| tx.send(()).is_ok());
    }
}

/// Build a row from `(field, value)` pairs.
pub fn row<const N: usize>(fields: [(&str, FieldValue); N]) -> Row {
    fields
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

impl DbConnector for MemoryDb {
    fn config_table(&self, table: &str) -> DbResult<Table> {
        Ok(self
            .config
            .lock()
            .expect("memory db mutex poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    fn state_table(&self, table: &str) -> DbResult<Table> {
        Ok(self
            .state
            .lock()
            .expect("memory db mutex poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default())
    }

    fn set_state_field(&self, table: &str, key: &str, field: &str, value: &str) -> DbResult<()> {
        self.state
            .lock()
            .expect("memory db mutex poisoned")
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), FieldValue::from(value));
        Ok(())
    }

    fn subscribe(&self) -> DbResult<mpsc::UnboundedReceiver<()>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .expect("memory db mutex poisoned")
            .push(tx);
        Ok(rx)
    }
}
