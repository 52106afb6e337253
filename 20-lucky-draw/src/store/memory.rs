//! In-process store with Redis-like semantics.
//!
//! Used by the test suite and for running the service without Redis. Each
//! method takes the lock once, so every operation is atomic with respect to
//! the others, just like single Redis commands. Expired keys are dropped
//! lazily when they are next touched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::seq::IteratorRandom;
use tokio::time::Instant;

use super::{KeyValueStore, StoreError, StoreResult};

enum Value {
    Str(String),
    Set(HashSet<String>),
    Hash(BTreeMap<String, String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Value, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
}

type Data = HashMap<String, Entry>;

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drops `key` if it has expired, so callers only ever see live values.
///
/// Expiry uses tokio's clock so paused-time tests can step past a TTL.
fn live<'a>(data: &'a mut Data, key: &str) -> Option<&'a mut Entry> {
    if data
        .get(key)
        .is_some_and(|entry| !entry.is_live(Instant::now()))
    {
        data.remove(key);
    }
    data.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

impl KeyValueStore for MemoryStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(live(&mut self.lock(), key).is_some())
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        match live(&mut self.lock(), key).map(|entry| &entry.value) {
            None => Ok(0),
            Some(Value::Set(members)) => Ok(members.len() as u64),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        let mut data = self.lock();
        if members.is_empty() {
            return Ok(0);
        }
        if live(&mut data, key).is_none() {
            data.insert(key.to_string(), Entry::new(Value::Set(HashSet::new()), None));
        }
        match live(&mut data, key).map(|entry| &mut entry.value) {
            Some(Value::Set(set)) => Ok(members
                .iter()
                .filter(|member| set.insert((*member).clone()))
                .count() as u64),
            _ => Err(wrong_type(key)),
        }
    }

    async fn spop(&self, key: &str) -> StoreResult<Option<String>> {
        let mut data = self.lock();
        let Some(entry) = live(&mut data, key) else {
            return Ok(None);
        };
        let Value::Set(set) = &mut entry.value else {
            return Err(wrong_type(key));
        };

        let popped = set.iter().choose(&mut rand::thread_rng()).cloned();
        if let Some(member) = &popped {
            set.remove(member);
        }
        // Redis drops a set once its last member is gone.
        if set.is_empty() {
            data.remove(key);
        }
        Ok(popped)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        match live(&mut self.lock(), key).map(|entry| &entry.value) {
            None => Ok(Vec::new()),
            Some(Value::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn hset_all(&self, key: &str, fields: &BTreeMap<String, String>) -> StoreResult<()> {
        let mut data = self.lock();
        if fields.is_empty() {
            return Ok(());
        }
        if live(&mut data, key).is_none() {
            data.insert(key.to_string(), Entry::new(Value::Hash(BTreeMap::new()), None));
        }
        match live(&mut data, key).map(|entry| &mut entry.value) {
            Some(Value::Hash(hash)) => {
                hash.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                Ok(())
            }
            _ => Err(wrong_type(key)),
        }
    }

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        match live(&mut self.lock(), key).map(|entry| &entry.value) {
            None => Ok(BTreeMap::new()),
            Some(Value::Hash(hash)) => Ok(hash.clone()),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        match live(&mut self.lock(), key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Str(value)) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.lock()
            .insert(key.to_string(), Entry::new(Value::Str(value.to_string()), ttl));
        Ok(())
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool> {
        let mut data = self.lock();
        if live(&mut data, key).is_some() {
            return Ok(false);
        }
        data.insert(key.to_string(), Entry::new(Value::Str(value.to_string()), ttl));
        Ok(true)
    }

    async fn del(&self, keys: &[&str]) -> StoreResult<u64> {
        let mut data = self.lock();
        let mut removed = 0;
        for key in keys {
            if live(&mut data, key).is_some() {
                data.remove(*key);
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        let mut data = self.lock();
        if live(&mut data, from).is_some() {
            if let Some(entry) = data.remove(from) {
                data.insert(to.to_string(), entry);
            }
        }
        Ok(())
    }

    async fn extend_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        match live(&mut self.lock(), key) {
            Some(entry) if matches!(&entry.value, Value::Str(held) if held == token) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lock(&self, key: &str, token: &str) -> StoreResult<bool> {
        let mut data = self.lock();
        let held = matches!(
            live(&mut data, key).map(|entry| &entry.value),
            Some(Value::Str(held)) if held == token
        );
        if held {
            data.remove(key);
        }
        Ok(held)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn members(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[tokio::test]
    async fn sadd_reports_only_new_members() {
        let store = MemoryStore::new();
        assert_eq!(store.sadd("s", &members(&["a", "b"])).await.unwrap(), 2);
        assert_eq!(store.sadd("s", &members(&["b", "c"])).await.unwrap(), 1);
        assert_eq!(store.sadd("s", &members(&["a"])).await.unwrap(), 0);
        assert_eq!(store.scard("s").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn spop_drains_and_removes_the_key() {
        let store = MemoryStore::new();
        store.sadd("s", &members(&["a", "b", "c"])).await.unwrap();

        let mut popped = Vec::new();
        while let Some(member) = store.spop("s").await.unwrap() {
            popped.push(member);
        }
        popped.sort();

        assert_eq!(popped, members(&["a", "b", "c"]));
        assert!(!store.exists("s").await.unwrap());
        assert_eq!(store.spop("s").await.unwrap(), None);
    }

    #[tokio::test]
    async fn mismatched_types_are_rejected() {
        let store = MemoryStore::new();
        store.set("k", "v", None).await.unwrap();
        assert!(matches!(
            store.sadd("k", &members(&["a"])).await,
            Err(StoreError::WrongType { .. })
        ));
        assert!(matches!(store.hgetall("k").await, Err(StoreError::WrongType { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn values_expire_after_their_ttl() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(10)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.exists("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_can_be_reused_with_another_type() {
        let store = MemoryStore::new();
        store
            .set("k", "v", Some(Duration::from_secs(1)))
            .await
            .unwrap();
        store.sadd("other", &members(&["a"])).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.sadd("k", &members(&["a", "b"])).await.unwrap(), 2);
        assert_eq!(store.scard("k").await.unwrap(), 2);
        assert_eq!(store.scard("other").await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn locks_are_released_and_extended_only_by_their_holder() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(10);
        assert!(store.set_nx("lock", "mine", Some(ttl)).await.unwrap());

        assert!(!store.release_lock("lock", "theirs").await.unwrap());
        assert!(!store.extend_lock("lock", "theirs", ttl).await.unwrap());

        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.extend_lock("lock", "mine", ttl).await.unwrap());
        tokio::time::advance(Duration::from_secs(8)).await;
        assert!(store.exists("lock").await.unwrap());

        assert!(store.release_lock("lock", "mine").await.unwrap());
        assert!(!store.exists("lock").await.unwrap());
        assert!(!store.extend_lock("lock", "mine", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn rename_moves_the_value() {
        let store = MemoryStore::new();
        store
            .hset_all("staged", &BTreeMap::from([("A".into(), "x".into())]))
            .await
            .unwrap();
        store.rename("staged", "final").await.unwrap();

        assert!(!store.exists("staged").await.unwrap());
        assert_eq!(store.hgetall("final").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn set_nx_only_writes_absent_keys() {
        let store = MemoryStore::new();
        assert!(store.set_nx("lock", "1", None).await.unwrap());
        assert!(!store.set_nx("lock", "2", None).await.unwrap());
        assert_eq!(store.del(&["lock", "missing"]).await.unwrap(), 1);
        assert!(store.set_nx("lock", "3", None).await.unwrap());
    }
}
