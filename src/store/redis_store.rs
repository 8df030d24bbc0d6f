use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use tracing::{debug, info, warn};

use super::{RecordStore, StoreResult};
use crate::config::StoreConfig;

const COMPARE_AND_SET: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    redis.call('SET', KEYS[1], ARGV[2])
    return 1
end
return 0
"#;

const RELEASE_LOCK: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Redis-backed record store with a shared multiplexed connection
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
    prefix: String,
}

impl RedisStore {
    /// Connect and verify the server answers PING
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        info!("🔗 Connecting to Redis: {}", config.redis_url);

        let client = redis::Client::open(config.redis_url.clone())?;
        let manager = ConnectionManager::new(client).await?;

        let mut conn = manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;

        info!("✅ Redis connected");

        Ok(Self {
            manager,
            prefix: config.key_prefix.clone(),
        })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.get(self.make_key(key)).await?;
        debug!("📥 GET {} -> {}", key, if value.is_some() { "hit" } else { "miss" });
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.set(self.make_key(key), value).await?;
        debug!("💾 SET {}", key);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let count: i64 = conn.del(self.make_key(key)).await?;
        debug!("🗑️ DEL {} (removed: {})", key, count);
        Ok(())
    }

    async fn compare_and_set(&self, key: &str, expected: &str, value: &str) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let written: i64 = Script::new(COMPARE_AND_SET)
            .key(self.make_key(key))
            .arg(expected)
            .arg(value)
            .invoke_async(&mut conn)
            .await?;
        if written == 0 {
            warn!("⚠️ Compare-and-set lost race on {}", key);
        }
        Ok(written == 1)
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(self.make_key(key)).arg(value).arg("NX");
        if let Some(ttl) = ttl_secs {
            cmd.arg("EX").arg(ttl);
        }
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn set_add(&self, set: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.sadd(self.make_key(set), member).await?;
        Ok(())
    }

    async fn set_remove(&self, set: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        let _: i64 = conn.srem(self.make_key(set), member).await?;
        Ok(())
    }

    async fn set_members(&self, set: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn.smembers(self.make_key(set)).await?;
        Ok(members)
    }

    async fn acquire_lock(&self, key: &str, token: &str, ttl_ms: u64) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.make_key(key))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release_lock(&self, key: &str, token: &str) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let released: i64 = Script::new(RELEASE_LOCK)
            .key(self.make_key(key))
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }

    async fn ping(&self) -> bool {
        let mut conn = self.manager.clone();
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(response) => response == "PONG",
            Err(_) => false,
        }
    }
}
