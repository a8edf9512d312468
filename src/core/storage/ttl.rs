// src/core/storage/ttl.rs

//! A background sweeper that periodically removes expired string entries.
//!
//! The source's default cadence is 120 seconds (spec §4.3); `GET`/`TYPE`
//! already expire lazily on access, so the sweeper exists only to reclaim
//! memory for keys that are set-and-forgotten and never read again.

use super::db::Db;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(120);

pub struct TtlSweeper {
    db: Arc<Db>,
}

impl TtlSweeper {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    /// Runs the sweep loop until a shutdown signal arrives. Each tick takes
    /// the keyspace lock once (via `Db::sweep_expired`) so a sweep never
    /// interleaves a partial mutation with another in-flight operation.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!("TTL sweeper started, interval {:?}", SWEEP_INTERVAL);
        let mut interval = tokio::time::interval(SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.db.sweep_expired().await;
                    if removed > 0 {
                        debug!("TTL sweeper removed {} expired keys", removed);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("TTL sweeper shutting down");
                    return;
                }
            }
        }
    }
}
