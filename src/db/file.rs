//! JSON-file backed database.
//!
//! Both stores use the `config_db.json` layout: `{TABLE: {key: {field: value}}}`.
//! Every read re-parses the file, so readers always see the latest snapshot.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use crate::db::watcher::DbWatcher;
use crate::db::{DbConnector, DbError, DbResult, FieldValue, Snapshot, Table};

/// Database backed by a config file and a state file.
pub struct FileDb {
    config_path: PathBuf,
    state_path: PathBuf,
    // Watchers stop when dropped, so they live as long as the connector.
    watchers: Mutex<Vec<RecommendedWatcher>>,
}

impl FileDb {
    pub fn new(config_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            config_path: config_path.into(),
            state_path: state_path.into(),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

fn read_snapshot(path: &Path, missing_ok: bool) -> DbResult<Snapshot> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if missing_ok && e.kind() == ErrorKind::NotFound => return Ok(Snapshot::new()),
        Err(source) => {
            return Err(DbError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };
    if content.trim().is_empty() {
        return Ok(Snapshot::new());
    }
    serde_json::from_str(&content).map_err(|source| DbError::Parse {
        path: path.display().to_string(),
        source,
    })
}

/// Write via a sibling temp file and rename, so readers never see a torn file.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}

impl DbConnector for FileDb {
    fn config_table(&self, table: &str) -> DbResult<Table> {
        let mut snapshot = read_snapshot(&self.config_path, false)?;
        Ok(snapshot.remove(table).unwrap_or_default())
    }

    fn state_table(&self, table: &str) -> DbResult<Table> {
        let mut snapshot = read_snapshot(&self.state_path, true)?;
        Ok(snapshot.remove(table).unwrap_or_default())
    }

    fn set_state_field(&self, table: &str, key: &str, field: &str, value: &str) -> DbResult<()> {
        let mut snapshot = read_snapshot(&self.state_path, true)?;
        snapshot
            .entry(table.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), FieldValue::from(value));

        let body = serde_json::to_vec_pretty(&snapshot).map_err(|source| DbError::Parse {
            path: self.state_path.display().to_string(),
            source,
        })?;
        write_atomic(&self.state_path, &body).map_err(|source| DbError::Write {
            path: self.state_path.display().to_string(),
            source,
        })
    }

    fn subscribe(&self) -> DbResult<mpsc::UnboundedReceiver<()>> {
        let (watcher, rx) = DbWatcher::new(&self.config_path);
        let handle = watcher.run().map_err(|e| DbError::Watch(e.to_string()))?;
        self.watchers
            .lock()
            .map_err(|_| DbError::Watch("watcher registry poisoned".to_string()))?
            .push(handle);
        Ok(rx)
    }
}
