//! Periodic maintenance: reaper passes and expired-key eviction.

use mdindex_index::IndexStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// One maintenance pass
fn maintain_once(store: &IndexStore) -> mdindex_common::Result<()> {
    store.reap()?;
    let evicted = store.kv().evict_expired()?;
    debug!(evicted, "Maintenance pass complete");
    Ok(())
}

/// Long-running background task: reap and evict every `interval`.
pub async fn maintain_loop(store: Arc<IndexStore>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let store = Arc::clone(&store);
        match tokio::task::spawn_blocking(move || maintain_once(&store)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_retryable() => {
                error!("Maintenance pass failed, retrying next tick: {}", e);
            }
            Ok(Err(e)) => error!("Maintenance pass failed: {}", e),
            Err(e) => error!("Maintenance task panicked: {}", e),
        }
    }
}
