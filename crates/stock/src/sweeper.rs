use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::service::StockService;

/// Background task that expires stale reservations on a fixed interval.
pub struct ExpirySweeper {
    service: StockService,
}

impl ExpirySweeper {
    pub fn new(service: StockService) -> Self {
        Self { service }
    }

    /// Runs one sweep.
    pub async fn sweep_once(&self) -> Result<u64> {
        let expired = self.service.cleanup_expired_reservations().await?;
        if expired > 0 {
            tracing::info!(expired, "Expired stale reservations");
        } else {
            tracing::debug!("No expired reservations");
        }
        Ok(expired)
    }

    /// Spawns the sweep loop. The first sweep happens one interval after start; the loop
    /// ends when `shutdown` turns true or its sender is dropped.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let period = self.service.settings().sweep_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;

            loop {
                if *shutdown.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            tracing::error!(error = %e, "Reservation expiry sweep failed");
                        }
                    }
                }
            }
            tracing::info!("Expiry sweeper stopped");
        })
    }
}
