//! Database file watcher feeding the change monitor.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watches the directory holding the database file and forwards a tick for
/// every event touching that file.
///
/// The directory is watched rather than the file itself because writers
/// replace the file by rename, which would orphan a per-inode watch.
pub struct DbWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<()>,
}

impl DbWatcher {
    /// Create a new watcher and the receiver its ticks arrive on.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<()>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                update_tx,
            },
            update_rx,
        )
    }

    /// Start watching. The returned handle must be kept alive.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tx = self.update_tx.clone();
        let file_name: Option<OsString> = self.path.file_name().map(|n| n.to_os_string());
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = event.kind.is_modify() || event.kind.is_create() || event.kind.is_remove();
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if relevant && ours {
                        tracing::debug!(paths = ?event.paths, "Database change detected");
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!("Database watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Database watcher started");
        Ok(watcher)
    }
}
