//! Configuration file watcher for hot reload.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::DispatchConfig;

/// Watches the configuration file and forwards every valid new version.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<DispatchConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and a receiver for validated configuration updates.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<DispatchConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                    reload(&watched, &update_tx);
                }
                Ok(_) => {}
                Err(e) => tracing::error!(error = ?e, "Config watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        tracing::info!(path = ?path, "Config watcher started");
        Ok(watcher)
    }
}

/// Load `path` and forward it. Invalid files are logged and dropped so the
/// running configuration stays in place.
fn reload(path: &Path, tx: &mpsc::UnboundedSender<DispatchConfig>) -> bool {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(path = ?path, "Config file changed, new configuration loaded");
            tx.send(config).is_ok()
        }
        Err(e) => {
            tracing::error!(
                path = ?path,
                error = %e,
                "Config reload failed, keeping current configuration"
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_reload_forwards_only_valid_configs() {
        let path = std::env::temp_dir().join("worker_dispatch_watcher_test.toml");
        let (watcher, mut rx) = ConfigWatcher::new(&path);

        fs::write(&path, "[classifier]\nrisky_methods = [\"POST\"]\n").unwrap();
        assert!(reload(&path, &watcher.update_tx));
        let config = rx.try_recv().unwrap();
        assert_eq!(config.classifier.risky_methods, vec!["POST"]);

        fs::write(&path, "[dispatcher]\nrisky_workers_percent = -1.0\n").unwrap();
        assert!(!reload(&path, &watcher.update_tx));
        assert!(rx.try_recv().is_err());

        fs::remove_file(&path).unwrap_or_default();
    }
}
