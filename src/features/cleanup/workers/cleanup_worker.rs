use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

use crate::features::cleanup::services::CleanupService;
use crate::shared::constants::CLEANUP_WORKER_INTERVAL_SECS;

/// Daily cleanup worker that runs in the background
pub struct CleanupWorker {
    service: Arc<CleanupService>,
}

impl CleanupWorker {
    pub fn new(service: Arc<CleanupService>) -> Self {
        Self { service }
    }

    /// Run the sweeper in a background loop. The first sweep happens at startup.
    pub async fn run(&self) {
        tracing::info!("Starting cleanup worker");

        let mut interval = interval(Duration::from_secs(CLEANUP_WORKER_INTERVAL_SECS));

        loop {
            interval.tick().await;

            match self.service.sweep_until_drained().await {
                Ok(0) => tracing::debug!("Cleanup worker: nothing to remove"),
                Ok(n) => tracing::info!("Cleanup worker removed {} expired files", n),
                Err(e) => tracing::error!("Error running cleanup sweep: {:?}", e),
            }
        }
    }
}
