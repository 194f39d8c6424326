// SPDX-License-Identifier: GPL-3.0-or-later
pub mod job;
pub mod jobs;
pub mod registry;

use pfwatch_application::Reconciler;
use pfwatch_config::AppConfig;
use registry::JobRegistry;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::info;

use jobs::ReconcileFavoritesJob;

pub struct Scheduler {
    config: AppConfig,
    registry: Arc<JobRegistry>,
    reconciler: Arc<Reconciler>,
}

impl Scheduler {
    pub fn new(config: AppConfig, reconciler: Arc<Reconciler>) -> Self {
        Self {
            config,
            registry: Arc::new(JobRegistry::new()),
            reconciler,
        }
    }

    pub async fn register_jobs(&self) {
        let period = Duration::from_secs(self.config.tracker.poll_interval_secs.max(1));
        info!(target: "scheduler", ?period, "registering background jobs");

        self.registry
            .register(
                "reconcile-favorites",
                ReconcileFavoritesJob::new(self.reconciler.clone()),
                period,
            )
            .await;
    }

    /// Start the registered jobs. The returned handle must be shut down on exit.
    pub async fn start(self) -> SchedulerHandle {
        self.registry.start().await;
        SchedulerHandle {
            registry: self.registry,
            reconciler: self.reconciler,
        }
    }
}

pub struct SchedulerHandle {
    registry: Arc<JobRegistry>,
    reconciler: Arc<Reconciler>,
}

impl SchedulerHandle {
    /// Stop the timers, let a pass in progress finish, then silence any alert still playing.
    pub async fn shutdown(self) {
        self.registry.shutdown().await;
        self.reconciler.stop_alert();
        info!(target: "scheduler", "scheduler stopped");
    }
}

pub use job::{Job, JobContext, JobResult};
