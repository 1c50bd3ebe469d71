use std::sync::Arc;
use std::time::Duration;

use redis::aio::ConnectionManager;
use redis::Client;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool};
use tracing::info;
use tracing::log::LevelFilter;

use crate::background::{
    JobQueue, NotifyBookingEvent, ReclaimExpiredHolds, WorkerOptions, BOOKING_CANCELLED,
    BOOKING_CONFIRMED, RECLAIM_CRON, RECLAIM_EXPIRED_HOLDS,
};
use crate::bus::EventBus;
use crate::config::Config;
use crate::domain::services::coordinator::BookingCoordinator;
use crate::infra::redis::{
    availability_cache::RedisAvailabilityCache, lock_manager::RedisLockManager,
};
use crate::infra::repositories::{
    postgres_booking_repo::PostgresBookingRepo, postgres_job_repo::PostgresJobRepo,
    postgres_slot_repo::PostgresSlotRepo, postgres_user_repo::PostgresUserRepo,
};
use crate::state::AppState;

pub async fn bootstrap_state(config: &Config) -> AppState {
    info!("Initializing PostgreSQL connection...");
    let mut opts: PgConnectOptions = config
        .database_url
        .parse()
        .expect("Invalid Postgres URL");
    opts = opts
        .log_statements(LevelFilter::Debug)
        .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(opts)
        .await
        .expect("Failed to connect to Postgres");

    run_migrations(&pool).await;

    info!("Initializing Redis connection...");
    let redis_client = Client::open(config.redis_url.as_str()).expect("Invalid Redis URL");
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .expect("Failed to connect to Redis");

    let slot_repo = Arc::new(PostgresSlotRepo::new(pool.clone()));
    let booking_repo = Arc::new(PostgresBookingRepo::new(pool.clone()));
    let user_repo = Arc::new(PostgresUserRepo::new(pool.clone()));
    let job_repo = Arc::new(PostgresJobRepo::new(pool.clone()));

    let locks = Arc::new(RedisLockManager::new(redis_conn.clone()));
    let cache = Arc::new(RedisAvailabilityCache::new(redis_conn));
    let bus = Arc::new(EventBus::new());
    let queue = Arc::new(JobQueue::new(job_repo));

    let worker_options = WorkerOptions {
        concurrency: config.worker_concurrency,
        rate_max: config.queue_rate_max,
        rate_window_ms: config.queue_rate_window_ms,
    };
    queue.register_worker(BOOKING_CONFIRMED, Arc::new(NotifyBookingEvent), worker_options);
    queue.register_worker(BOOKING_CANCELLED, Arc::new(NotifyBookingEvent), worker_options);
    queue.register_worker(
        RECLAIM_EXPIRED_HOLDS,
        Arc::new(ReclaimExpiredHolds::new(
            slot_repo.clone(),
            cache.clone(),
            bus.clone(),
        )),
        worker_options,
    );
    queue
        .schedule_recurring(RECLAIM_EXPIRED_HOLDS, serde_json::json!({}), RECLAIM_CRON)
        .expect("reclaim cron pattern must parse");

    let coordinator = Arc::new(BookingCoordinator::new(
        booking_repo,
        slot_repo.clone(),
        locks,
        cache,
        queue.clone(),
        bus.clone(),
        config.booking_limits(),
        Duration::from_millis(config.slot_lock_ttl_ms),
        Duration::from_secs(config.availability_cache_ttl_s),
    ));

    AppState {
        config: config.clone(),
        slot_repo,
        user_repo,
        coordinator,
        queue,
        bus,
    }
}

async fn run_migrations(pool: &PgPool) {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .expect("Failed to run migrations");
}
