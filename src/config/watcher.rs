//! Configuration file watcher for hot reload.
//!
//! ```text
//! notify callback (watcher thread)
//!     → filter to the config file name
//!     → change signal
//!     → reload task: wait for a quiet period, load, validate
//!     → ClientConfig over the update channel
//! ```
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by writing a temporary file and renaming it over the original
//! keep triggering reloads.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::ClientConfig;

/// Quiet period after the last change before the file is reloaded.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Watches the configuration file and publishes validated reloads.
pub struct ConfigWatcher {
    path: PathBuf,
    debounce: Duration,
    update_tx: mpsc::UnboundedSender<ClientConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<ClientConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();

        (
            Self {
                path: path.to_path_buf(),
                debounce: DEFAULT_DEBOUNCE,
                update_tx,
            },
            update_rx,
        )
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Start watching. Must be called from within a tokio runtime.
    ///
    /// The returned watcher must be kept alive for as long as updates are
    /// wanted; dropping it ends the reload task.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let file_name: OsString = self
            .path
            .file_name()
            .map(ToOwned::to_owned)
            .ok_or_else(|| notify::Error::generic("config path has no file name"))?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };

        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_relevant(&event, &file_name) => {
                    if change_tx.send(()).is_err() {
                        tracing::debug!("Reload task stopped, ignoring config change");
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tokio::spawn(reload_loop(
            self.path.clone(),
            self.debounce,
            change_rx,
            self.update_tx,
        ));

        tracing::info!(path = ?self.path, debounce = ?self.debounce, "Config watcher started");
        Ok(watcher)
    }
}

/// Whether a directory event touches the config file with a content change.
pub fn is_relevant(event: &Event, file_name: &OsStr) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name))
}

/// Coalesce change signals and reload once per quiet period.
///
/// Ends when the watcher is dropped or the update receiver goes away.
async fn reload_loop(
    path: PathBuf,
    debounce: Duration,
    mut changes: mpsc::UnboundedReceiver<()>,
    updates: mpsc::UnboundedSender<ClientConfig>,
) {
    while changes.recv().await.is_some() {
        loop {
            match tokio::time::timeout(debounce, changes.recv()).await {
                Ok(Some(())) => continue,
                Ok(None) => return,
                Err(_) => break,
            }
        }

        tracing::info!(path = ?path, "Config file change detected, reloading");
        match load_config(&path) {
            Ok(config) => {
                if updates.send(config).is_err() {
                    tracing::warn!(path = ?path, "Config update receiver dropped, stopping reload");
                    return;
                }
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "Failed to reload config, keeping current configuration"
                );
            }
        }
    }
    tracing::debug!(path = ?path, "Config watcher stopped");
}
