pub mod tasks;

use std::future::Future;
use std::pin::Pin;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{info, warn};
use uuid::Uuid;

pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Background cron jobs for `serve`. Nothing runs until `start`, and a
/// scheduler with no jobs never starts.
pub struct Scheduler {
    inner: JobScheduler,
    jobs: Vec<(String, Uuid)>,
    running: bool,
}

impl Scheduler {
    pub async fn new() -> Result<Self> {
        let inner = JobScheduler::new()
            .await
            .context("Failed to create job scheduler")?;
        Ok(Self {
            inner,
            jobs: Vec::new(),
            running: false,
        })
    }

    /// Add a named job on a six-field cron expression (seconds first).
    /// Job names are unique.
    pub async fn add_cron_job<F>(&mut self, cron_expr: &str, name: &str, task: F) -> Result<()>
    where
        F: Fn() -> JobFuture + Send + Sync + 'static,
    {
        if self.jobs.iter().any(|(existing, _)| existing == name) {
            anyhow::bail!("A job named '{}' is already scheduled", name);
        }

        let job_name = name.to_string();
        let job = Job::new_async(cron_expr, move |_uuid, _lock| {
            let name = job_name.clone();
            let fut = task();
            Box::pin(async move {
                info!("Running scheduled job: {}", name);
                fut.await;
            })
        })
        .with_context(|| format!("Invalid cron expression for job '{}': {}", name, cron_expr))?;

        let id = self
            .inner
            .add(job)
            .await
            .with_context(|| format!("Failed to add job: {}", name))?;
        self.jobs.push((name.to_string(), id));

        info!("Scheduled job '{}' with cron: {}", name, cron_expr);
        Ok(())
    }

    pub fn job_names(&self) -> impl Iterator<Item = &str> {
        self.jobs.iter().map(|(name, _)| name.as_str())
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.jobs.is_empty() {
            info!("No scheduled jobs, scheduler not started");
            return Ok(());
        }
        self.inner
            .start()
            .await
            .context("Failed to start scheduler")?;
        self.running = true;
        info!(
            "Scheduler started with jobs: {}",
            self.job_names().collect::<Vec<_>>().join(", ")
        );
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }
        if let Err(e) = self.inner.shutdown().await {
            warn!("Scheduler did not shut down cleanly: {}", e);
            return Err(e).context("Failed to shutdown scheduler");
        }
        self.running = false;
        info!("Scheduler stopped");
        Ok(())
    }
}
