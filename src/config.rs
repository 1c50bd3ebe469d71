use std::env;

use crate::domain::services::policy::BookingLimits;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub port: u16,
    pub max_concurrent_bookings_per_user: i64,
    pub max_booking_advance_days: i64,
    pub cancellation_window_hours: i64,
    pub slot_lock_ttl_ms: u64,
    pub availability_cache_ttl_s: u64,
    pub worker_concurrency: usize,
    pub queue_rate_max: u32,
    pub queue_rate_window_ms: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            redis_url: env::var("REDIS_URL").expect("REDIS_URL must be set"),
            port: env_or("PORT", 3000),
            max_concurrent_bookings_per_user: env_or("MAX_CONCURRENT_BOOKINGS_PER_USER", 5),
            max_booking_advance_days: env_or("MAX_BOOKING_ADVANCE_DAYS", 90),
            cancellation_window_hours: env_or("BOOKING_CANCELLATION_WINDOW_HOURS", 24),
            slot_lock_ttl_ms: env_or("SLOT_LOCK_TTL_MS", 15_000),
            availability_cache_ttl_s: env_or("AVAILABILITY_CACHE_TTL_S", 60),
            worker_concurrency: env_or("WORKER_CONCURRENCY", 5),
            queue_rate_max: env_or("QUEUE_RATE_MAX", 50),
            queue_rate_window_ms: env_or("QUEUE_RATE_WINDOW_MS", 1_000),
        }
    }

    pub fn booking_limits(&self) -> BookingLimits {
        BookingLimits {
            max_concurrent_bookings_per_user: self.max_concurrent_bookings_per_user,
            max_booking_advance_days: self.max_booking_advance_days,
            cancellation_window_hours: self.cancellation_window_hours,
        }
    }
}

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("{} must be a valid number", name)),
        Err(_) => default,
    }
}
