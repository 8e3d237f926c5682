//! Node expiry sweeper.
//!
//! Runs [`sweep_expired_nodes`] every `daemon_min_cycle_time` seconds until
//! shutdown. A failed sweep is logged and retried on the next tick.

use std::sync::Arc;
use std::time::Duration;

use provision_engine::expiry::sweep_expired_nodes;
use provision_engine::{Data, EngineError, ProvisionConfig};
use provision_model::now_timestamp;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub struct Sweeper {
    data: Arc<Data>,
    period: Duration,
    expire_after: i64,
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper")
            .field("period", &self.period)
            .field("expire_after", &self.expire_after)
            .finish_non_exhaustive()
    }
}

impl Sweeper {
    pub fn new(data: Arc<Data>, config: &ProvisionConfig) -> Self {
        Self {
            data,
            period: Duration::from_secs(config.daemon_min_cycle_time.max(1)),
            expire_after: config.node_expire_timeout,
        }
    }

    /// One pass at `now`; returns the removed node uuids
    pub async fn sweep_at(&self, now: i64) -> Result<Vec<String>, EngineError> {
        sweep_expired_nodes(&self.data, now, self.expire_after).await
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Node expiry sweeper running every {:?} (timeout {}s)",
            self.period, self.expire_after
        );
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_at(now_timestamp()).await {
                        Ok(removed) if !removed.is_empty() => {
                            info!("Expired {} node(s)", removed.len());
                        }
                        Ok(_) => debug!("No expired nodes"),
                        Err(e) => warn!("Expiry sweep failed (will retry): {}", e),
                    }
                }
                _ = shutdown.changed() => {
                    info!("Node expiry sweeper stopping");
                    return;
                }
            }
        }
    }
}
