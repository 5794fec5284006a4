//! Quota Replenishment
//!
//! Fixed-window reset: every `quota.window_secs` all tokens get their full
//! limit back. The window length is read from the current config snapshot
//! at the start of each window, so a reload takes effect on the next one.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::manager::TokenRegistry;
use crate::config::ConfigStore;

/// Spawn the window reset task
pub fn spawn_replenisher(
    registry: Arc<TokenRegistry>,
    config: Arc<ConfigStore>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let window = config.current_snapshot().quota.window();
            debug!(?window, "Waiting for next quota window");

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(window) => {}
            }

            if !config.current_snapshot().quota.enabled {
                continue;
            }

            let count = registry.replenish_all();
            info!(tokens = count, "Quota window reset");
        }
        debug!("Quota replenisher stopped");
    })
}
