use std::time::Duration;

use redis::{aio::ConnectionManager, RedisError, Script};
use tracing::debug;
use uuid::Uuid;

/// Deletes the key only if it still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Expiring mutex shared by every process pointed at the same Redis.
#[derive(Clone)]
pub struct DistributedLock {
    conn: ConnectionManager,
    key: String,
    ttl: Duration,
}

pub struct LockGuard {
    conn: ConnectionManager,
    key: String,
    token: String,
}

impl DistributedLock {
    pub fn new(conn: ConnectionManager, key: &str, ttl: Duration) -> Self {
        Self {
            conn,
            key: key.to_string(),
            ttl,
        }
    }

    /// Returns `None` when another holder owns the lock.
    pub async fn try_acquire(&self) -> Result<Option<LockGuard>, RedisError> {
        let token = Uuid::new_v4().to_string();
        let mut conn = self.conn.clone();

        let acquired: Option<String> = redis::cmd("SET")
            .arg(&self.key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;

        Ok(acquired.map(|_| LockGuard {
            conn: self.conn.clone(),
            key: self.key.clone(),
            token,
        }))
    }

    /// Retries `try_acquire` until the lock is obtained or `max_wait` elapses.
    pub async fn acquire(&self, max_wait: Duration) -> Result<Option<LockGuard>, RedisError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            if let Some(guard) = self.try_acquire().await? {
                return Ok(Some(guard));
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(key = %self.key, "gave up waiting for distributed lock");
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

impl LockGuard {
    pub async fn release(mut self) -> Result<(), RedisError> {
        let _: i64 = Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(&self.token)
            .invoke_async(&mut self.conn)
            .await?;
        Ok(())
    }
}
