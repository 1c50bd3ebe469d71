use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use redis::aio::ConnectionManager;
use redis::Script;
use std::time::Duration;
use tracing::warn;

use crate::domain::ports::LockManager;

/// Compare-and-delete: release only the lease we still own. A plain DEL
/// would clobber a successor's lock after our TTL lapsed.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

/// Redis-backed lock manager: `SET key token NX PX ttl` for acquisition,
/// scripted conditional delete for release.
pub struct RedisLockManager {
    conn: ConnectionManager,
    release: Script,
}

impl RedisLockManager {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            release: Script::new(RELEASE_SCRIPT),
        }
    }

    fn new_lease_token() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(24)
            .map(char::from)
            .collect()
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn acquire(&self, key: &str, ttl: Duration) -> Option<String> {
        let mut conn = self.conn.clone();
        let token = Self::new_lease_token();

        let result: Result<Option<String>, redis::RedisError> = redis::cmd("SET")
            .arg(key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await;

        match result {
            Ok(Some(_)) => Some(token),
            Ok(None) => None,
            Err(e) => {
                // Fail closed: without the store we cannot prove exclusivity.
                warn!(key, error = %e, "lock store unreachable, refusing lease");
                None
            }
        }
    }

    async fn release(&self, key: &str, lease_token: &str) -> bool {
        let mut conn = self.conn.clone();

        let result: Result<i64, redis::RedisError> = self
            .release
            .key(key)
            .arg(lease_token)
            .invoke_async(&mut conn)
            .await;

        match result {
            Ok(deleted) => deleted == 1,
            Err(e) => {
                warn!(key, error = %e, "lock release failed");
                false
            }
        }
    }
}
