// SPDX-License-Identifier: GPL-3.0-or-later
use crate::job::{Job, JobContext, JobResult};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

struct RegisteredJob {
    job_id: String,
    job: Arc<dyn Job>,
    period: Duration,
}

/// Owns interval jobs and the tasks driving them.
///
/// Each job runs immediately, then once per period. Ticks missed while a run
/// is still going are dropped rather than replayed.
pub struct JobRegistry {
    jobs: RwLock<Vec<RegisteredJob>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            jobs: RwLock::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            stop_tx,
        }
    }

    /// Register `job`. A job registered again under the same id replaces the old one.
    pub async fn register(&self, job_id: impl Into<String>, job: impl Job + 'static, period: Duration) {
        let job_id = job_id.into();
        let job = Arc::new(job) as Arc<dyn Job>;
        info!(target: "registry", %job_id, job_type = job.job_type(), ?period, "registering job");

        let mut jobs = self.jobs.write().await;
        jobs.retain(|registered| registered.job_id != job_id);
        jobs.push(RegisteredJob { job_id, job, period });
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }

    /// Spawn one driver task per registered job.
    pub async fn start(&self) {
        let jobs = self.jobs.read().await;
        let mut tasks = self.tasks.lock().await;

        for registered in jobs.iter() {
            let job_id = registered.job_id.clone();
            let job = registered.job.clone();
            let period = registered.period;
            let mut stop_rx = self.stop_tx.subscribe();

            tasks.push(tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        biased;
                        _ = stop_rx.changed() => break,
                        _ = ticker.tick() => {}
                    }
                    execute_job(&job_id, job.as_ref()).await;
                }
                info!(target: "registry", %job_id, "job driver stopped");
            }));
        }

        info!(target: "registry", jobs = jobs.len(), "job registry started");
    }

    /// Stop scheduling new runs and wait for runs in progress to finish.
    pub async fn shutdown(&self) {
        let mut tasks = self.tasks.lock().await;
        info!(target: "registry", tasks = tasks.len(), "stopping job registry");
        self.stop_tx.send_replace(true);
        for task in tasks.drain(..) {
            if let Err(err) = task.await {
                warn!(target: "registry", error = %err, "job driver ended abnormally");
            }
        }
    }
}

async fn execute_job(job_id: &str, job: &dyn Job) {
    info!(target: "registry", %job_id, job_type = job.job_type(), "executing job");

    match job.execute(JobContext::new(job_id)).await {
        Ok(JobResult::Success) => info!(target: "registry", %job_id, "job completed"),
        Ok(JobResult::Failure { error }) => {
            error!(target: "registry", %job_id, %error, "job failed, waiting for next tick");
        }
        Err(err) => error!(target: "registry", %job_id, error = %err, "job execution error"),
    }
}
