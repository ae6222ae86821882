//! Watches the data-source file so edits made by `routeforge-ctl` or by
//! hand reach the running daemon.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::datasource::DataSourceManager;

/// Live file watch. Dropping it stops both the watch and the reload task.
pub struct DataSourceWatch {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl DataSourceWatch {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for DataSourceWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct DataSourceWatcher {
    manager: Arc<DataSourceManager>,
}

impl DataSourceWatcher {
    pub fn new(manager: Arc<DataSourceManager>) -> Self {
        Self { manager }
    }

    /// Start watching. Must be called inside a tokio runtime.
    ///
    /// The parent directory is watched rather than the file itself, since
    /// writers replace the file by renaming over it.
    pub fn run(self) -> Result<DataSourceWatch, notify::Error> {
        let path = self.manager.path().to_path_buf();
        let dir = watch_dir(&path);
        let file_name = path.file_name().map(OsString::from);
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    let relevant = (event.kind.is_modify() || event.kind.is_create())
                        && event
                            .paths
                            .iter()
                            .any(|p| p.file_name().map(OsString::from) == file_name);
                    if relevant {
                        let _ = tx.send(());
                    }
                }
                Err(e) => tracing::error!(error = %e, "Data source watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let manager = self.manager;
        let task = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                // One reload covers a burst of events.
                while rx.try_recv().is_ok() {}
                tracing::debug!(path = %manager.path().display(), "Data source file change detected");
                manager.refresh().await;
            }
        });

        tracing::info!(path = %path.display(), "Data source watcher started");
        Ok(DataSourceWatch {
            _watcher: watcher,
            task,
        })
    }
}

fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
