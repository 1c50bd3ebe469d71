use async_trait::async_trait;
use chrono::Utc;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bus::{EventBus, SlotUpdate};
use crate::domain::models::job::Job;
use crate::domain::ports::{AvailabilityCache, JobRepository, QueueCounts, SlotRepository};
use crate::domain::services::policy::retry_backoff;
use crate::error::AppError;

pub const BOOKING_CONFIRMED: &str = "booking:confirmed";
pub const BOOKING_CANCELLED: &str = "booking:cancelled";
pub const RECLAIM_EXPIRED_HOLDS: &str = "slot:reclaim-expired-holds";

/// Cron pattern (with seconds field) for the hold reclaimer.
pub const RECLAIM_CRON: &str = "0 */5 * * * *";

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const PURGE_INTERVAL: Duration = Duration::from_secs(60);
const KEEP_COMPLETED: i64 = 100;
const KEEP_FAILED: i64 = 500;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Handler bound to a job name. `job.attempts` carries the attempt number
/// (1-based); a returned error triggers the retry policy.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> Result<(), AppError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EnqueueOptions {
    pub priority: i32,
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub concurrency: usize,
    pub rate_max: u32,
    pub rate_window_ms: u64,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            rate_max: 50,
            rate_window_ms: 1_000,
        }
    }
}

/// Durable named-job queue: per-name worker pools bounded by concurrency and
/// rate, retries with exponential backoff, cron-scheduled producers, and a
/// retention sweep over finished jobs.
pub struct JobQueue {
    repo: Arc<dyn JobRepository>,
    shutdown_tx: broadcast::Sender<()>,
    accepting: AtomicBool,
    active: Arc<AtomicI64>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueue {
    /// Creates the queue and starts the retention sweeper. Must be called
    /// from within a tokio runtime.
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(8);

        let queue = Self {
            repo,
            shutdown_tx,
            accepting: AtomicBool::new(true),
            active: Arc::new(AtomicI64::new(0)),
            tasks: Mutex::new(Vec::new()),
        };
        queue.spawn_purge_sweeper();
        queue
    }

    /// Appends a job. Delayed jobs become claimable once `execute_at`
    /// passes.
    pub async fn enqueue(
        &self,
        name: &str,
        payload: Value,
        options: EnqueueOptions,
    ) -> Result<Job, AppError> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(AppError::Internal("job queue is shut down".to_string()));
        }

        let execute_at = Utc::now()
            + chrono::Duration::milliseconds(options.delay_ms.unwrap_or(0).min(i64::MAX as u64) as i64);
        let job = Job::new(name, payload, options.priority, execute_at);
        self.repo.enqueue(&job).await
    }

    /// Registers a cron-driven producer that enqueues `name` with `payload`
    /// at each fire time. Patterns use the seconds-first cron syntax.
    pub fn schedule_recurring(
        &self,
        name: &str,
        payload: Value,
        cron_pattern: &str,
    ) -> Result<(), AppError> {
        let schedule = cron::Schedule::from_str(cron_pattern).map_err(|e| {
            AppError::Validation(format!("invalid cron pattern {:?}: {}", cron_pattern, e))
        })?;

        let repo = self.repo.clone();
        let name = name.to_string();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!(name = %name, "recurring job producer started");
            loop {
                let Some(next) = schedule.upcoming(Utc).next() else {
                    break;
                };
                let delay = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let job = Job::new(&name, payload.clone(), 0, Utc::now());
                if let Err(e) = repo.enqueue(&job).await {
                    error!(name = %name, error = %e, "failed to enqueue recurring job");
                }
            }
        });
        self.track(handle);
        Ok(())
    }

    /// Binds `handler` to jobs of `name` and starts the worker pool. The
    /// pool only ever claims jobs matching its name.
    pub fn register_worker(
        &self,
        name: &str,
        handler: Arc<dyn JobHandler>,
        options: WorkerOptions,
    ) {
        let repo = self.repo.clone();
        let active = self.active.clone();
        let name = name.to_string();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        let limiter = Arc::new(build_limiter(options.rate_max, options.rate_window_ms));
        let claim_batch = options.concurrency.max(1) as i64;

        let handle = tokio::spawn(async move {
            info!(name = %name, concurrency = options.concurrency, "job worker started");
            loop {
                let batch = match repo.claim_due(&name, claim_batch, Utc::now()).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        error!(name = %name, error = %e, "failed to claim jobs");
                        Vec::new()
                    }
                };

                let claimed = batch.len();
                for job in batch {
                    limiter.until_ready().await;
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return,
                    };

                    active.fetch_add(1, Ordering::SeqCst);
                    let repo = repo.clone();
                    let handler = handler.clone();
                    let active = active.clone();
                    tokio::spawn(async move {
                        run_one(repo.as_ref(), handler.as_ref(), &job).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        drop(permit);
                    });
                }

                if claimed == 0 {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(POLL_INTERVAL) => {}
                    }
                } else if shutdown_rx.try_recv().is_ok() {
                    break;
                }
            }
        });
        self.track(handle);
    }

    pub async fn stats(&self) -> Result<QueueCounts, AppError> {
        self.repo.counts(Utc::now()).await
    }

    /// Stops intake and producers, then waits for active jobs to drain or
    /// the grace period to elapse.
    pub async fn shutdown(&self, grace: Duration) {
        self.accepting.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());

        let deadline = tokio::time::Instant::now() + grace;
        while self.active.load(Ordering::SeqCst) > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    active = self.active.load(Ordering::SeqCst),
                    "queue shutdown timed out with jobs still active"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let handles: Vec<_> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|p| p.into_inner());
            tasks.drain(..).collect()
        };
        for handle in handles {
            handle.abort();
        }
        info!("job queue shut down");
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(handle);
    }

    fn spawn_purge_sweeper(&self) {
        let repo = self.repo.clone();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(PURGE_INTERVAL) => {}
                }
                match repo.purge_finished(KEEP_COMPLETED, KEEP_FAILED).await {
                    Ok(0) => {}
                    Ok(purged) => debug!(purged, "purged finished jobs"),
                    Err(e) => error!(error = %e, "failed to purge finished jobs"),
                }
            }
        });
        self.track(handle);
    }
}

async fn run_one(repo: &dyn JobRepository, handler: &dyn JobHandler, job: &Job) {
    match handler.run(job).await {
        Ok(()) => {
            if let Err(e) = repo.complete(job.id).await {
                error!(job_id = %job.id, error = %e, "failed to mark job completed");
            }
        }
        Err(e) => {
            let message = e.to_string();
            if job.attempts < job.max_attempts {
                let execute_at = Utc::now() + retry_backoff(job.attempts);
                warn!(
                    job_id = %job.id,
                    name = %job.name,
                    attempt = job.attempts,
                    error = %message,
                    "job failed, scheduling retry"
                );
                if let Err(e) = repo.retry(job.id, &message, execute_at).await {
                    error!(job_id = %job.id, error = %e, "failed to schedule retry");
                }
            } else {
                error!(
                    job_id = %job.id,
                    name = %job.name,
                    attempt = job.attempts,
                    error = %message,
                    "job failed permanently"
                );
                if let Err(e) = repo.fail(job.id, &message).await {
                    error!(job_id = %job.id, error = %e, "failed to mark job failed");
                }
            }
        }
    }
}

fn build_limiter(rate_max: u32, window_ms: u64) -> DirectLimiter {
    let max = rate_max.max(1);
    let period = Duration::from_millis((window_ms / u64::from(max)).max(1));
    let quota = match Quota::with_period(period) {
        Some(quota) => quota.allow_burst(NonZeroU32::new(max).unwrap_or(NonZeroU32::MIN)),
        None => Quota::per_second(NonZeroU32::MIN),
    };
    RateLimiter::direct(quota)
}

/// Reverts HELD slots whose lease lapsed, then refreshes caches and notifies
/// subscribers for every slot that came back.
pub struct ReclaimExpiredHolds {
    slots: Arc<dyn SlotRepository>,
    cache: Arc<dyn AvailabilityCache>,
    bus: Arc<EventBus>,
}

impl ReclaimExpiredHolds {
    pub fn new(
        slots: Arc<dyn SlotRepository>,
        cache: Arc<dyn AvailabilityCache>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self { slots, cache, bus }
    }
}

#[async_trait]
impl JobHandler for ReclaimExpiredHolds {
    async fn run(&self, _job: &Job) -> Result<(), AppError> {
        let reclaimed = self.slots.reclaim_expired_holds(Utc::now()).await?;
        for slot in &reclaimed {
            self.cache.invalidate(slot.venue_id, slot.date).await;
            self.bus.publish_slot(SlotUpdate::from(slot)).await;
        }
        if !reclaimed.is_empty() {
            info!(count = reclaimed.len(), "reclaimed expired holds");
        }
        Ok(())
    }
}

/// Acknowledges booking notification intents. Actual delivery (push, SMS,
/// email) lives outside the engine; this worker is the hand-off point.
pub struct NotifyBookingEvent;

#[async_trait]
impl JobHandler for NotifyBookingEvent {
    async fn run(&self, job: &Job) -> Result<(), AppError> {
        let booking_id = job
            .payload
            .get("bookingId")
            .and_then(Value::as_str)
            .and_then(|raw| Uuid::parse_str(raw).ok())
            .ok_or_else(|| AppError::Internal("notification payload missing bookingId".into()))?;

        info!(
            name = %job.name,
            booking_id = %booking_id,
            "dispatching booking notification intent"
        );
        Ok(())
    }
}
