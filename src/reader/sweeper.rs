//! Background cache eviction

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::service::ReaderService;

/// Periodic `cleanup_expired` sweep
///
/// Sweeps once right after start and then every `period`. Shutdown is
/// observed between sweeps, never in the middle of one.
pub struct CacheSweeper {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl CacheSweeper {
    pub fn start(service: ReaderService, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let period = period.max(Duration::from_secs(1));

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => sweep(&service).await,
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::debug!("Cache sweeper stopped");
        });

        tracing::info!(period_secs = period.as_secs(), "Cache sweeper started");
        Self { shutdown, handle }
    }

    /// Stop the sweeper and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "Cache sweeper task failed");
        }
    }
}

async fn sweep(service: &ReaderService) {
    match service.cleanup_expired().await {
        Ok(0) => tracing::debug!("Cache sweep found nothing to evict"),
        Ok(removed) => tracing::info!(removed = removed, "Cache sweep finished"),
        Err(e) => tracing::warn!(error = %e, "Cache sweep failed"),
    }
}
