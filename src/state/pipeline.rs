//! Ordered queue of proposed state deltas.
//!
//! Producers call [`UpdatePipeline::submit_update`], which never blocks on
//! merge completion; a single consumer task dequeues in submission order and
//! merges through [`StateCache::apply_update`], which takes the same per-chain
//! lock as on-demand refreshes.

use crate::state::StateCache;
use crate::types::StateUpdate;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Backoff after a consumer-side failure. A single malformed update is merely
/// dropped; this pause only applies to unexpected errors.
const CONSUMER_BACKOFF: Duration = Duration::from_secs(1);

pub struct UpdatePipeline {
    cache: Arc<StateCache>,
    tx: Option<mpsc::UnboundedSender<StateUpdate>>,
    consumer: Option<JoinHandle<()>>,
}

impl UpdatePipeline {
    /// Spawns the consumer loop. The loop never terminates on an error: it
    /// logs, backs off, and continues.
    pub fn start(cache: Arc<StateCache>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<StateUpdate>();
        let consumer_cache = cache.clone();
        let consumer = tokio::spawn(async move {
            while let Some(update) = rx.recv().await {
                let chain_id = update.chain_id;
                match consumer_cache.apply_update(&update).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(target: "update_pipeline", chain_id, "update rejected by validation");
                    }
                    Err(e) => {
                        error!(target: "update_pipeline", chain_id, error = %e, "update merge failed");
                        tokio::time::sleep(CONSUMER_BACKOFF).await;
                    }
                }
            }
            debug!(target: "update_pipeline", "all producers dropped, consumer exiting");
        });
        Self {
            cache,
            tx: Some(tx),
            consumer: Some(consumer),
        }
    }

    /// Enqueues a delta. Returns whether it was accepted into the queue;
    /// acceptance does not imply the merge will pass validation.
    pub fn submit_update(&self, update: StateUpdate) -> bool {
        if !self.cache.is_configured(update.chain_id) {
            warn!(
                target: "update_pipeline",
                chain_id = update.chain_id,
                "rejecting update for unconfigured chain"
            );
            return false;
        }
        match &self.tx {
            Some(tx) => tx.send(update).is_ok(),
            None => false,
        }
    }

    /// Closes the queue, drains every already-submitted update through the
    /// consumer, and stops it.
    pub async fn shutdown(mut self) {
        self.tx = None;
        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.await {
                error!(target: "update_pipeline", error = %e, "consumer task failed during drain");
            }
        }
    }
}

impl Drop for UpdatePipeline {
    fn drop(&mut self) {
        // Dropped without an explicit shutdown: queued updates are discarded.
        if let Some(consumer) = &self.consumer {
            consumer.abort();
        }
    }
}
