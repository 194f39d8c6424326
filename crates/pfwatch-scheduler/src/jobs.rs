// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::{Job, JobContext, JobResult};
use anyhow::Result;
use pfwatch_application::{PassReport, Reconciler};
use std::sync::Arc;
use tracing::{debug, info};

/// Periodic reconciliation pass over the tracked favorites.
pub struct ReconcileFavoritesJob {
    reconciler: Arc<Reconciler>,
}

impl ReconcileFavoritesJob {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }
}

#[async_trait::async_trait]
impl Job for ReconcileFavoritesJob {
    fn job_type(&self) -> &'static str {
        "reconcile_favorites"
    }

    fn name(&self) -> String {
        "Reconcile Favorites".to_string()
    }

    async fn execute(&self, ctx: JobContext) -> Result<JobResult> {
        debug!(target: "jobs", job_id = %ctx.job_id, "executing favorites reconciliation");

        match self.reconciler.run_pass().await {
            PassReport::Skipped => {
                info!(target: "jobs", job_id = %ctx.job_id, "reconciliation already in progress");
                Ok(JobResult::Success)
            }
            PassReport::Idle => Ok(JobResult::Success),
            PassReport::Completed(summary) if summary.groups > 0 && summary.failed_groups == summary.groups => {
                Ok(JobResult::Failure {
                    error: format!("all {} listing queries failed", summary.groups),
                })
            }
            PassReport::Completed(summary) => {
                info!(
                    target: "jobs",
                    job_id = %ctx.job_id,
                    pass_id = %summary.pass_id,
                    checked = summary.checked,
                    fulfilled = summary.newly_fulfilled.len(),
                    "favorites reconciled"
                );
                Ok(JobResult::Success)
            }
        }
    }
}
