//! Shared key-value store the draw is coordinated through.
//!
//! Every method is a single atomic operation on the backend. Sequences of
//! calls are not transactional: other requests may interleave between any two
//! of them. The two batched helpers, [`KeyValueStore::draw_snapshot`] and
//! [`KeyValueStore::start_draw`], default to sequential calls and are sent as
//! one pipeline by backends that can.

mod memory;
mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::keys::KeySpace;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("value at '{key}' holds the wrong kind of value")]
    WrongType { key: String },

    #[error("value at '{key}' could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The four reads the draw phase is derived from.
///
/// Observed in one round trip but not atomically; fields may come from
/// slightly different instants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawSnapshot {
    pub is_open: bool,
    pub winners_exist: bool,
    pub prizes_exist: bool,
    pub entrant_count: u64,
}

pub trait KeyValueStore: Send + Sync + 'static {
    fn exists(&self, key: &str) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Cardinality of a set; zero when the key is absent.
    fn scard(&self, key: &str) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Adds members to a set, returning how many were not already present.
    fn sadd(
        &self,
        key: &str,
        members: &[String],
    ) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Removes and returns one member chosen uniformly at random.
    fn spop(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send;

    fn smembers(&self, key: &str) -> impl Future<Output = StoreResult<Vec<String>>> + Send;

    /// Writes every field of `fields` into the hash at `key` in one command.
    fn hset_all(
        &self,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    fn hgetall(
        &self,
        key: &str,
    ) -> impl Future<Output = StoreResult<BTreeMap<String, String>>> + Send;

    fn get(&self, key: &str) -> impl Future<Output = StoreResult<Option<String>>> + Send;

    /// Sets a string value, replacing whatever was stored, with an optional expiry.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Sets a string value only if the key is absent. Returns whether it was written.
    fn set_nx(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Deletes keys, returning how many existed.
    fn del(&self, keys: &[&str]) -> impl Future<Output = StoreResult<u64>> + Send;

    /// Moves the value at `from` to `to`, replacing `to`. `from` must exist.
    fn rename(&self, from: &str, to: &str) -> impl Future<Output = StoreResult<()>> + Send;

    /// Resets the expiry of a lock still holding `token`. Returns whether it did.
    fn extend_lock(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Deletes a lock only while it still holds `token`. Returns whether it did.
    fn release_lock(
        &self,
        key: &str,
        token: &str,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn draw_snapshot(
        &self,
        keys: &KeySpace,
    ) -> impl Future<Output = StoreResult<DrawSnapshot>> + Send {
        async move {
            Ok(DrawSnapshot {
                is_open: self.exists(&keys.is_open).await?,
                winners_exist: self.exists(&keys.winners).await?,
                prizes_exist: self.exists(&keys.prizes).await?,
                entrant_count: self.scard(&keys.entrants).await?,
            })
        }
    }

    /// Replaces any previous draw with a fresh one holding `prizes`, open for
    /// `ttl` or until closed when `ttl` is `None`.
    fn start_draw(
        &self,
        keys: &KeySpace,
        prizes: &[String],
        ttl: Option<Duration>,
    ) -> impl Future<Output = StoreResult<()>> + Send {
        async move {
            self.del(&[
                keys.entrants.as_str(),
                keys.winners.as_str(),
                keys.winners_pending.as_str(),
                keys.winners_json.as_str(),
                keys.prizes.as_str(),
            ])
            .await?;
            self.sadd(&keys.prizes, prizes).await?;
            self.set(&keys.is_open, "true", ttl).await
        }
    }
}
