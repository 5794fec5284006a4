//! Hot-Reloaded Configuration Store
//!
//! Holds the process-wide configuration as an immutable snapshot behind an
//! [`ArcSwap`]. Readers take a whole snapshot with [`ConfigStore::current_snapshot`]
//! and never see a partially-applied update. A single background task polls
//! the file and swaps the snapshot only when the parsed content differs.

use arc_swap::ArcSwap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Config, ConfigError};
use crate::metrics;

/// Result of one refresh cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The file parsed to the current snapshot
    Unchanged,
    /// A different snapshot was installed
    Swapped,
    /// The file could not be read or parsed; the current snapshot stays
    Failed,
}

/// Process-wide configuration snapshot with background refresh
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    current: ArcSwap<Config>,
    generation: AtomicU64,
    changes: watch::Sender<Arc<Config>>,
}

impl ConfigStore {
    /// Load the configuration at `path` and create the store
    ///
    /// This first load is synchronous; a failure here must stop startup.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let initial = Config::load_from_path(&path)?;
        info!("Loaded configuration from {:?}", path);
        Ok(Self::with_snapshot(path, initial))
    }

    /// Create a store around an already-loaded snapshot
    pub fn with_snapshot<P: AsRef<Path>>(path: P, initial: Config) -> Self {
        let initial = Arc::new(initial);
        let (changes, _) = watch::channel(initial.clone());
        Self {
            path: path.as_ref().to_path_buf(),
            current: ArcSwap::from(initial),
            generation: AtomicU64::new(0),
            changes,
        }
    }

    /// Path the store polls
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse a candidate snapshot without installing it
    pub fn load(&self) -> Result<Config, ConfigError> {
        Config::load_from_path(&self.path)
    }

    /// Latest successfully loaded snapshot
    pub fn current_snapshot(&self) -> Arc<Config> {
        self.current.load_full()
    }

    /// Number of snapshot swaps since the store was created
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Receive each newly installed snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Config>> {
        self.changes.subscribe()
    }

    /// Run one refresh cycle
    pub fn refresh_once(&self) -> RefreshOutcome {
        let candidate = match self.load() {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(kind = e.kind(), error = %e, "Failed to read config file");
                metrics::CONFIG_RELOADS_TOTAL
                    .with_label_values(&["failed"])
                    .inc();
                return RefreshOutcome::Failed;
            }
        };

        if **self.current.load() == candidate {
            return RefreshOutcome::Unchanged;
        }

        let next = Arc::new(candidate);
        self.current.store(next.clone());
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.changes.send_replace(next);

        metrics::CONFIG_RELOADS_TOTAL
            .with_label_values(&["swapped"])
            .inc();
        info!(generation, path = ?self.path, "Configuration changed, snapshot replaced");
        RefreshOutcome::Swapped
    }

    /// Run one refresh cycle on the blocking pool
    pub async fn refresh(self: &Arc<Self>) -> RefreshOutcome {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || store.refresh_once())
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Config refresh task failed");
                RefreshOutcome::Failed
            })
    }

    /// Spawn the refresh loop
    ///
    /// Sleeps `refresh.poll_interval` after a successful cycle and
    /// `refresh.retry_backoff` after a failed one, both taken from the
    /// snapshot current at that moment. Runs until `cancel` fires.
    pub fn spawn_refresh(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            debug!(path = ?store.path, "Config refresh loop started");
            loop {
                let outcome = store.refresh().await;
                let refresh = store.current_snapshot().refresh.clone();
                let delay = match outcome {
                    RefreshOutcome::Failed => refresh.retry_backoff(),
                    _ => refresh.poll_interval(),
                };

                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            debug!("Config refresh loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("config.json");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        let err = ConfigStore::open(dir.path().join("config.json")).unwrap_err();
        assert_eq!(err.kind(), "ConfigUnreadableError");
    }

    #[test]
    fn test_identical_content_does_not_swap() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"port": 8100}"#);
        let store = ConfigStore::open(&path).unwrap();
        let before = store.current_snapshot();

        // Same document, different whitespace
        fs::write(&path, "{ \"port\" : 8100 }\n").unwrap();

        assert_eq!(store.refresh_once(), RefreshOutcome::Unchanged);
        assert_eq!(store.generation(), 0);
        assert!(Arc::ptr_eq(&before, &store.current_snapshot()));
        assert!(!store.subscribe().has_changed().unwrap());
    }

    #[test]
    fn test_changed_content_swaps() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"port": 8100}"#);
        let store = ConfigStore::open(&path).unwrap();
        let mut changes = store.subscribe();

        fs::write(&path, r#"{"port": 8200, "token_path": "other.json"}"#).unwrap();

        assert_eq!(store.refresh_once(), RefreshOutcome::Swapped);
        assert_eq!(store.generation(), 1);

        let snapshot = store.current_snapshot();
        assert_eq!(snapshot.port, 8200);
        assert_eq!(snapshot.token_path, "other.json");
        assert!(changes.has_changed().unwrap());
        assert_eq!(changes.borrow_and_update().port, 8200);
    }

    #[test]
    fn test_failed_read_keeps_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"port": 8100}"#);
        let store = ConfigStore::open(&path).unwrap();

        fs::write(&path, "{ not json").unwrap();
        assert_eq!(store.refresh_once(), RefreshOutcome::Failed);

        fs::remove_file(&path).unwrap();
        assert_eq!(store.refresh_once(), RefreshOutcome::Failed);

        assert_eq!(store.current_snapshot().port, 8100);
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_old_snapshot_stays_whole_after_swap() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"port": 8100, "token_path": "a.json"}"#);
        let store = ConfigStore::open(&path).unwrap();
        let held = store.current_snapshot();

        fs::write(&path, r#"{"port": 8200, "token_path": "b.json"}"#).unwrap();
        store.refresh_once();

        // A reader holding the old snapshot keeps a consistent view
        assert_eq!((held.port, held.token_path.as_str()), (8100, "a.json"));
        let fresh = store.current_snapshot();
        assert_eq!((fresh.port, fresh.token_path.as_str()), (8200, "b.json"));
    }

    #[tokio::test]
    async fn test_refresh_runs_off_the_runtime_thread() {
        let dir = TempDir::new().unwrap();
        let path = write_config(&dir, r#"{"port": 8100}"#);
        let store = Arc::new(ConfigStore::open(&path).unwrap());

        assert_eq!(store.refresh().await, RefreshOutcome::Unchanged);
        fs::write(&path, r#"{"port": 8101}"#).unwrap();
        assert_eq!(store.refresh().await, RefreshOutcome::Swapped);
        fs::remove_file(&path).unwrap();
        assert_eq!(store.refresh().await, RefreshOutcome::Failed);
        assert_eq!(store.current_snapshot().port, 8101);
    }

    #[tokio::test]
    async fn test_refresh_loop_picks_up_change_and_stops() {
        let dir = TempDir::new().unwrap();
        let path = write_config(
            &dir,
            r#"{"port": 8100, "refresh": {"poll_interval_ms": 20, "retry_backoff_ms": 20}}"#,
        );
        let store = Arc::new(ConfigStore::open(&path).unwrap());
        let cancel = CancellationToken::new();
        let handle = store.spawn_refresh(cancel.clone());

        let mut changes = store.subscribe();
        fs::write(
            &path,
            r#"{"port": 8300, "refresh": {"poll_interval_ms": 20, "retry_backoff_ms": 20}}"#,
        )
        .unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(5), changes.changed())
            .await
            .expect("refresh loop did not swap in time")
            .unwrap();
        assert_eq!(store.current_snapshot().port, 8300);

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .expect("refresh loop did not stop")
            .unwrap();
    }
}
