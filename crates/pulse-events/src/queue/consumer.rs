use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pulse_telemetry::Metrics;
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{Instrument, debug, error, info, info_span, warn};

use super::{ClaimedJob, Job, JobDisposition, JobQueue, QueueName, RetryPolicy};

/// Business logic invoked for each delivered job.
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    /// Queue this handler consumes.
    fn queue(&self) -> QueueName;

    /// Process a single job. An error schedules a retry per the consumer's policy.
    ///
    /// # Errors
    ///
    /// Any error marks the attempt as failed.
    async fn handle(&self, job: Job) -> anyhow::Result<()>;
}

/// Tuning knobs for a [`Consumer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerOptions {
    /// Maximum jobs processed at once.
    pub concurrency: usize,
    /// Retry budget applied to failed jobs.
    pub retry: RetryPolicy,
    /// Upper bound on idle waits between claims.
    pub poll_interval: Duration,
}

impl ConsumerOptions {
    /// Options using the default retry policy for `queue`.
    #[must_use]
    pub const fn for_queue(queue: QueueName, concurrency: usize) -> Self {
        Self {
            concurrency,
            retry: RetryPolicy::for_queue(queue),
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Pulls jobs from a [`JobQueue`] and runs them through a [`JobHandler`]
/// with bounded concurrency.
pub struct Consumer {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    options: ConsumerOptions,
    metrics: Metrics,
}

/// Handle used to stop a spawned [`Consumer`].
pub struct ConsumerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ConsumerHandle {
    /// Signal shutdown and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "consumer task join failed");
        }
    }

    /// Whether the consumer loop has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Consumer {
    /// Build a consumer for `handler.queue()`.
    #[must_use]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        options: ConsumerOptions,
        metrics: Metrics,
    ) -> Self {
        Self {
            queue,
            handler,
            options,
            metrics,
        }
    }

    /// Run the consumer on a background task.
    #[must_use]
    pub fn spawn(self) -> ConsumerHandle {
        let (shutdown, signal) = watch::channel(false);
        let task = tokio::spawn(self.run(signal));
        ConsumerHandle { shutdown, task }
    }

    /// Claim and process jobs until `shutdown` flips to `true` or its sender drops.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let name = self.handler.queue();
        let concurrency = self.options.concurrency.max(1);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let mut in_flight = JoinSet::new();
        info!(queue = %name, concurrency, "consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            while let Some(joined) = in_flight.try_join_next() {
                if let Err(err) = joined {
                    error!(queue = %name, error = %err, "job task panicked");
                }
            }

            let available = semaphore.available_permits();
            if available == 0 {
                tokio::select! {
                    _ = in_flight.join_next() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            let claimed = match self.queue.claim(name, available).await {
                Ok(claimed) => claimed,
                Err(err) => {
                    warn!(queue = %name, error = %err, "failed to claim jobs");
                    Vec::new()
                }
            };

            if claimed.is_empty() {
                tokio::select! {
                    () = self.queue.wait_for_work(name, self.options.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }

            for job in claimed {
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let queue = Arc::clone(&self.queue);
                let handler = Arc::clone(&self.handler);
                let metrics = self.metrics.clone();
                let retry = self.options.retry;
                in_flight.spawn(async move {
                    process(queue.as_ref(), handler.as_ref(), &retry, &metrics, job).await;
                    drop(permit);
                });
            }
        }

        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = joined {
                error!(queue = %name, error = %err, "job task panicked during drain");
            }
        }
        info!(queue = %name, "consumer stopped");
    }
}

async fn process(
    queue: &dyn JobQueue,
    handler: &dyn JobHandler,
    retry: &RetryPolicy,
    metrics: &Metrics,
    claimed: ClaimedJob,
) {
    let label = claimed.job.queue().as_str();
    let span = info_span!(
        "job",
        queue = label,
        job_id = claimed.id,
        attempt = claimed.attempt,
        kind = claimed.job.kind()
    );
    metrics.job_started(label);

    async move {
        match handler.handle(claimed.job).await {
            Ok(()) => match queue.complete(claimed.id).await {
                Ok(()) => {
                    metrics.inc_job(label, "completed");
                    debug!("job completed");
                }
                Err(err) => {
                    metrics.inc_job(label, "ack_failed");
                    warn!(error = %err, "failed to acknowledge completed job");
                }
            },
            Err(err) => {
                let detail = format!("{err:#}");
                match queue.fail(claimed.id, &detail, retry).await {
                    Ok(JobDisposition::Retrying { attempt, run_at }) => {
                        metrics.inc_job(label, "retried");
                        warn!(error = %detail, attempt, %run_at, "job failed; retry scheduled");
                    }
                    Ok(JobDisposition::Failed { attempts }) => {
                        metrics.inc_job(label, "failed");
                        error!(error = %detail, attempts, "job failed; retries exhausted");
                    }
                    Err(queue_err) => {
                        metrics.inc_job(label, "ack_failed");
                        error!(
                            error = %detail,
                            queue_error = %queue_err,
                            "job failed and the failure could not be recorded"
                        );
                    }
                }
            }
        }
    }
    .instrument(span)
    .await;

    metrics.job_finished(label);
}
