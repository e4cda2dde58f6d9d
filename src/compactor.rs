use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::Config;
use crate::engine::Engine;

/// Spawn [`run_compactor`] with the threshold and period from `config`.
pub fn spawn(engine: Arc<Engine>, config: &Config) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_compactor(
        engine,
        config.compact_threshold,
        config.compact_interval,
    ))
}

/// Background task that compacts the WAL once `threshold` appends have
/// accumulated since the last compaction. Runs until the engine's last
/// other owner drops it.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        if Arc::strong_count(&engine) == 1 {
            debug!("engine dropped, compactor exiting");
            return;
        }
        compact_if_needed(&engine, threshold).await;
    }
}

/// Compact when the append count has reached `threshold`. Returns whether a
/// compaction ran successfully.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> bool {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match engine.compact_wal().await {
        Ok(()) => true,
        Err(e) => {
            warn!("WAL compaction after {appends} appends failed: {e}");
            false
        }
    }
}
