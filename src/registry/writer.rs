//! Token Store Writer
//!
//! Single task that owns store writes for quota changes. Wakes when the
//! registry is marked dirty and on every `refresh.poll_interval` tick, so
//! tokens registered by another process are picked up even when no
//! traffic arrives. Flushes once more on shutdown.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::manager::TokenRegistry;
use crate::config::ConfigStore;

/// Spawn the store writer
pub fn spawn_store_writer(
    registry: Arc<TokenRegistry>,
    config: Arc<ConfigStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        debug!("Token store writer started");
        loop {
            let refresh = config.current_snapshot().refresh.clone();

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = registry.changed() => {}
                _ = tokio::time::sleep(refresh.poll_interval()) => {}
            }

            if let Err(e) = registry.sync_store().await {
                warn!(error = %e, "Failed to sync token store");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(refresh.retry_backoff()) => {}
                }
            }
        }

        if let Err(e) = registry.sync_store().await {
            warn!(error = %e, "Final token store flush failed");
        }
        debug!("Token store writer stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::store::{MemoryTokenStore, TokenRecord, TokenStore};
    use std::time::Duration;

    fn record(token: &str, email: &str, remaining: u32) -> TokenRecord {
        TokenRecord {
            token: token.to_string(),
            email: email.to_string(),
            remaining,
            limit: 20,
            created_at: chrono::Utc::now(),
        }
    }

    fn config() -> Arc<ConfigStore> {
        let mut config = Config::default();
        config.refresh.poll_interval_ms = 20;
        config.refresh.retry_backoff_ms = 20;
        Arc::new(ConfigStore::with_snapshot("unused.json", config))
    }

    async fn eventually<F: Fn() -> bool>(check: F) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_writer_flushes_quota_changes() {
        let store = Arc::new(MemoryTokenStore::with_records(vec![record("abc", "dev@example.com", 3)]));
        let registry = Arc::new(TokenRegistry::load(store.clone(), 20).await.unwrap());
        let cancel = CancellationToken::new();
        let handle = spawn_store_writer(registry.clone(), config(), cancel.clone());

        registry.consume_one("abc");
        registry.consume_one("abc");
        eventually(|| store.snapshot()[0].remaining == 1).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_picks_up_external_registrations() {
        let store = Arc::new(MemoryTokenStore::with_records(vec![record("abc", "dev@example.com", 3)]));
        let registry = Arc::new(TokenRegistry::load(store.clone(), 20).await.unwrap());
        let cancel = CancellationToken::new();
        let handle = spawn_store_writer(registry.clone(), config(), cancel.clone());

        // Written by another process
        store
            .save(&[
                record("abc", "dev@example.com", 3),
                record("xyz", "other@example.com", 20),
            ])
            .await
            .unwrap();

        eventually(|| registry.validate_token("xyz").is_ok()).await;

        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_writer_flushes_on_shutdown() {
        let store = Arc::new(MemoryTokenStore::with_records(vec![record("abc", "dev@example.com", 3)]));
        let registry = Arc::new(TokenRegistry::load(store.clone(), 20).await.unwrap());

        let mut slow = Config::default();
        slow.refresh.poll_interval_ms = 60_000;
        let cancel = CancellationToken::new();
        let handle = spawn_store_writer(
            registry.clone(),
            Arc::new(ConfigStore::with_snapshot("unused.json", slow)),
            cancel.clone(),
        );

        cancel.cancel();
        registry.consume_one("abc");
        handle.await.unwrap();
        assert_eq!(store.snapshot()[0].remaining, 2);
    }
}
