use async_trait::async_trait;
use chrono::NaiveDate;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::slot::SlotSnapshot;
use crate::domain::ports::AvailabilityCache;

/// Redis-backed availability cache keyed by `(venue, date)`.
///
/// Values are JSON-serialized snapshot lists with a server-side TTL. Any
/// Redis failure degrades to a miss (get) or a no-op (put/invalidate) with a
/// warning; availability still resolves through storage.
#[derive(Clone)]
pub struct RedisAvailabilityCache {
    conn: ConnectionManager,
}

impl RedisAvailabilityCache {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn key(venue_id: Uuid, date: NaiveDate) -> String {
        format!("availability:{}:{}", venue_id, date)
    }
}

#[async_trait]
impl AvailabilityCache for RedisAvailabilityCache {
    async fn get(&self, venue_id: Uuid, date: NaiveDate) -> Option<Vec<SlotSnapshot>> {
        let mut conn = self.conn.clone();
        let key = Self::key(venue_id, date);

        let raw: Option<String> = match conn.get(&key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "availability cache read failed");
                return None;
            }
        };

        let raw = raw?;
        match serde_json::from_str(&raw) {
            Ok(snapshots) => Some(snapshots),
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    async fn put(
        &self,
        venue_id: Uuid,
        date: NaiveDate,
        snapshots: &[SlotSnapshot],
        ttl: Duration,
    ) {
        let mut conn = self.conn.clone();
        let key = Self::key(venue_id, date);

        let raw = match serde_json::to_string(snapshots) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to serialize availability snapshots");
                return;
            }
        };

        let result: Result<(), redis::RedisError> =
            conn.set_ex(&key, raw, ttl.as_secs().max(1)).await;
        if let Err(e) = result {
            warn!(key, error = %e, "availability cache write failed");
        }
    }

    async fn invalidate(&self, venue_id: Uuid, date: NaiveDate) {
        let mut conn = self.conn.clone();
        let key = Self::key(venue_id, date);

        let result: Result<(), redis::RedisError> = conn.del(&key).await;
        if let Err(e) = result {
            warn!(key, error = %e, "availability cache invalidation failed");
        }
    }
}
