//! Queue-consuming worker loop.
//!
//! Jobs arrive on an mpsc channel, run through the pipeline with bounded
//! in-flight concurrency, and report their outcomes on a completion
//! channel. The caller owns requeueing: a `Released` outcome is reported,
//! never silently re-run. Shutdown drains in-flight jobs before exiting.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::context::JobContext;
use crate::job::{JobOutcome, LockableJob};
use crate::middleware::Pipeline;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs simultaneously in flight in this process. Independent of the
    /// pool size, which bounds slot holders across every process sharing
    /// the store.
    pub max_concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_concurrency: 4 }
    }
}

/// Outcome report for one finished job.
#[derive(Debug)]
pub struct JobReport {
    pub job_id: String,
    pub job_name: String,
    pub outcome: JobOutcome,
}

/// Run the worker event loop.
///
/// Exits when the queue closes or the shutdown signal flips to true,
/// after draining jobs already in flight.
pub async fn run_worker(
    pipeline: Arc<Pipeline>,
    mut queue_rx: mpsc::Receiver<Arc<dyn LockableJob>>,
    report_tx: mpsc::Sender<JobReport>,
    mut shutdown_rx: watch::Receiver<bool>,
    config: WorkerConfig,
) {
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Shutdown requested, draining in-flight jobs");
                    break;
                }
            }

            joined = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Some(Err(e)) = joined {
                    tracing::error!(error = %e, "Job task panicked, its slot reclaims after TTL");
                }
            }

            job = queue_rx.recv(), if in_flight.len() < config.max_concurrency => {
                let Some(job) = job else {
                    tracing::info!("Queue closed, draining in-flight jobs");
                    break;
                };

                let pipeline = Arc::clone(&pipeline);
                let report_tx = report_tx.clone();
                in_flight.spawn(async move {
                    let job_id = uuid::Uuid::new_v4().to_string();
                    let job_name = job.name().to_string();
                    let mut ctx = JobContext::new(job_id.clone());

                    let outcome = pipeline.dispatch(job, &mut ctx).await;
                    tracing::debug!(
                        job = %job_name,
                        id = %job_id,
                        outcome = outcome.as_str(),
                        "Job finished"
                    );

                    let report = JobReport {
                        job_id,
                        job_name,
                        outcome,
                    };
                    if report_tx.send(report).await.is_err() {
                        tracing::warn!("Report channel closed, dropping job outcome");
                    }
                });
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Job task panicked during drain");
        }
    }
    tracing::info!("Worker exiting");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::allocator::SlotAllocator;
    use crate::config::LockerConfig;
    use crate::middleware::SlotLockMiddleware;
    use crate::store::MemoryStore;

    struct SleepJob {
        duration: Duration,
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl SleepJob {
        fn new(duration: Duration, running: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> Arc<Self> {
            Arc::new(Self {
                duration,
                running: Arc::clone(running),
                peak: Arc::clone(peak),
            })
        }
    }

    #[async_trait::async_trait]
    impl LockableJob for SleepJob {
        fn name(&self) -> &str {
            "sleep"
        }

        async fn handle(&self, _ctx: &mut JobContext) -> anyhow::Result<()> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.duration).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn pipeline(pool_size: u32) -> Arc<Pipeline> {
        let config = LockerConfig {
            prefix: "worker".to_string(),
            pool_size,
            slot_ttl: Duration::from_secs(30),
            acquire_backoff: Duration::from_millis(1),
            acquire_timeout: None,
        };
        let allocator =
            Arc::new(SlotAllocator::new(Arc::new(MemoryStore::new()), config).unwrap());
        Arc::new(Pipeline::new(vec![Arc::new(SlotLockMiddleware::new(
            allocator,
        ))]))
    }

    #[tokio::test]
    async fn processes_jobs_and_reports_outcomes() {
        let (job_tx, job_rx) = mpsc::channel::<Arc<dyn LockableJob>>(16);
        let (report_tx, mut report_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let worker = tokio::spawn(run_worker(
            pipeline(4),
            job_rx,
            report_tx,
            shutdown_rx,
            WorkerConfig { max_concurrency: 2 },
        ));

        for _ in 0..5 {
            let job = SleepJob::new(Duration::from_millis(10), &running, &peak);
            job_tx.send(job).await.unwrap();
        }

        for _ in 0..5 {
            let report = report_rx.recv().await.unwrap();
            assert_eq!(report.outcome, JobOutcome::Completed);
            assert_eq!(report.job_name, "sleep");
        }

        // max_concurrency bounded the in-process parallelism.
        assert!(peak.load(Ordering::SeqCst) <= 2);

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn exits_when_queue_closes() {
        let (job_tx, job_rx) = mpsc::channel::<Arc<dyn LockableJob>>(16);
        let (report_tx, _report_rx) = mpsc::channel(16);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(
            pipeline(1),
            job_rx,
            report_tx,
            shutdown_rx,
            WorkerConfig::default(),
        ));

        drop(job_tx);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn drains_in_flight_jobs_on_shutdown() {
        let (job_tx, job_rx) = mpsc::channel::<Arc<dyn LockableJob>>(16);
        let (report_tx, mut report_rx) = mpsc::channel(16);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker = tokio::spawn(run_worker(
            pipeline(2),
            job_rx,
            report_tx,
            shutdown_rx,
            WorkerConfig { max_concurrency: 2 },
        ));

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let job = SleepJob::new(Duration::from_millis(100), &running, &peak);
            job_tx.send(job).await.unwrap();
        }

        // Wait until both jobs are actually in flight, then shut down.
        for _ in 0..500 {
            if running.load(Ordering::SeqCst) == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(running.load(Ordering::SeqCst), 2);
        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();

        let mut completed = 0;
        while let Ok(report) = report_rx.try_recv() {
            assert_eq!(report.outcome, JobOutcome::Completed);
            completed += 1;
        }
        assert_eq!(completed, 2);
    }
}
