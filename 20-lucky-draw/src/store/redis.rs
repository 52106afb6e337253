//! Redis backend over a reconnecting connection manager.

use std::collections::BTreeMap;
use std::time::Duration;

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use tracing::info;

use super::{DrawSnapshot, KeyValueStore, StoreResult};
use crate::keys::KeySpace;

/// Store handle shared by every request. Cloning is cheap; clones multiplex
/// over the same connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("connected to redis");
        Ok(Self { conn })
    }
}

/// Deletes the lock only while it still holds the caller's token.
const RELEASE_LOCK: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Pushes the lock's expiry out only while it still holds the caller's token.
const EXTEND_LOCK: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('PEXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

/// Redis expiries are whole milliseconds and must be positive.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

impl KeyValueStore for RedisStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        Ok(conn.exists(key).await?)
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn.clone();
        Ok(conn.scard(key).await?)
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        // SADD without members is a syntax error.
        if members.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        Ok(conn.sadd(key, members).await?)
    }

    async fn spop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.spop(key).await?)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.smembers(key).await?)
    }

    async fn hset_all(&self, key: &str, fields: &BTreeMap<String, String>) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_str()))
            .collect();
        let mut conn = self.conn.clone();
        let () = conn.hset_multiple(key, &items).await?;
        Ok(())
    }

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        let mut conn = self.conn.clone();
        Ok(conn.hgetall(key).await?)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let () = match ttl {
            Some(ttl) => conn.pset_ex(key, value, ttl_millis(ttl)).await?,
            None => conn.set(key, value).await?,
        };
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool> {
        let mut cmd = ::redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let mut conn = self.conn.clone();
        let reply: Option<String> = cmd.query_async(&mut conn).await?;
        Ok(reply.is_some())
    }

    async fn del(&self, keys: &[&str]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.clone();
        Ok(conn.del(keys).await?)
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let () = conn.rename(from, to).await?;
        Ok(())
    }

    async fn extend_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = Script::new(EXTEND_LOCK)
            .key(key)
            .arg(token)
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn release_lock(&self, key: &str, token: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(RELEASE_LOCK)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(released == 1)
    }

    async fn draw_snapshot(&self, keys: &KeySpace) -> StoreResult<DrawSnapshot> {
        let mut conn = self.conn.clone();
        let (is_open, winners_exist, prizes_exist, entrant_count): (bool, bool, bool, u64) =
            ::redis::pipe()
                .exists(&keys.is_open)
                .exists(&keys.winners)
                .exists(&keys.prizes)
                .scard(&keys.entrants)
                .query_async(&mut conn)
                .await?;
        Ok(DrawSnapshot {
            is_open,
            winners_exist,
            prizes_exist,
            entrant_count,
        })
    }

    async fn start_draw(
        &self,
        keys: &KeySpace,
        prizes: &[String],
        ttl: Option<Duration>,
    ) -> StoreResult<()> {
        let mut pipe = ::redis::pipe();
        // DEL, not UNLINK: the prize set is refilled in the same transaction.
        pipe.atomic()
            .del(&[
                keys.entrants.as_str(),
                keys.winners.as_str(),
                keys.winners_pending.as_str(),
                keys.winners_json.as_str(),
                keys.prizes.as_str(),
            ])
            .ignore();
        if !prizes.is_empty() {
            pipe.sadd(&keys.prizes, prizes).ignore();
        }
        match ttl {
            Some(ttl) => pipe.pset_ex(&keys.is_open, "true", ttl_millis(ttl)).ignore(),
            None => pipe.set(&keys.is_open, "true").ignore(),
        };

        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }
}
