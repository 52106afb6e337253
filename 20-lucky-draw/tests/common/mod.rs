#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lucky_draw::keys::KeySpace;
use lucky_draw::profile::{IdentityProvider, Profile, ProviderError};
use lucky_draw::store::{KeyValueStore, MemoryStore, StoreError, StoreResult};
use lucky_draw::LuckyDraw;
use reqwest::StatusCode;

/// Identity provider answering from a fixed directory and counting lookups.
#[derive(Default)]
pub struct ScriptedProvider {
    profiles: Mutex<HashMap<String, Profile>>,
    unavailable: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn with_logins(logins: &[&str]) -> Self {
        let provider = Self::default();
        for login in logins {
            provider.insert(profile(login));
        }
        provider
    }

    pub fn insert(&self, profile: Profile) {
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.login.clone(), profile);
    }

    pub fn remove(&self, login: &str) {
        self.profiles.lock().unwrap().remove(login);
    }

    /// Makes lookups of `login` fail as if the provider were down.
    pub fn make_unavailable(&self, login: &str) {
        self.unavailable.lock().unwrap().insert(login.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for ScriptedProvider {
    async fn fetch_profile(&self, identity: &str) -> Result<Option<Profile>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.lock().unwrap().contains(identity) {
            return Err(ProviderError::Status(StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(self.profiles.lock().unwrap().get(identity).cloned())
    }
}

/// Profile with a display name derived from the login and a predictable avatar.
pub fn profile(login: &str) -> Profile {
    let mut profile = Profile::new(login);
    profile.name = Some(format!("{} (display)", login.to_uppercase()));
    profile.avatar_url = Some(format!("https://avatars.example/{login}"));
    profile
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provider: Arc<ScriptedProvider>,
    pub keys: KeySpace,
    pub draw: Arc<LuckyDraw<MemoryStore, ScriptedProvider>>,
}

impl Harness {
    pub fn new(logins: &[&str]) -> Self {
        let store = Arc::new(MemoryStore::new());
        let provider = Arc::new(ScriptedProvider::with_logins(logins));
        let keys = KeySpace::default();
        let draw = Arc::new(LuckyDraw::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            keys.clone(),
        ));
        Self {
            store,
            provider,
            keys,
            draw,
        }
    }
}

pub fn labels(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

/// Memory store whose `SPOP` takes `spop_delay` and whose hash writes can be
/// made to fail.
pub struct SlowStore {
    inner: MemoryStore,
    spop_delay: Duration,
    fail_hash_writes: AtomicBool,
}

impl SlowStore {
    pub fn new(spop_delay: Duration) -> Self {
        Self {
            inner: MemoryStore::new(),
            spop_delay,
            fail_hash_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_hash_writes(&self, fail: bool) {
        self.fail_hash_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for SlowStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        self.inner.scard(key).await
    }

    async fn sadd(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.inner.sadd(key, members).await
    }

    async fn spop(&self, key: &str) -> StoreResult<Option<String>> {
        tokio::time::sleep(self.spop_delay).await;
        self.inner.spop(key).await
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        self.inner.smembers(key).await
    }

    async fn hset_all(&self, key: &str, fields: &BTreeMap<String, String>) -> StoreResult<()> {
        if self.fail_hash_writes.load(Ordering::SeqCst) {
            return Err(StoreError::WrongType {
                key: key.to_string(),
            });
        }
        self.inner.hset_all(key, fields).await
    }

    async fn hgetall(&self, key: &str) -> StoreResult<BTreeMap<String, String>> {
        self.inner.hgetall(key).await
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool> {
        self.inner.set_nx(key, value, ttl).await
    }

    async fn del(&self, keys: &[&str]) -> StoreResult<u64> {
        self.inner.del(keys).await
    }

    async fn rename(&self, from: &str, to: &str) -> StoreResult<()> {
        self.inner.rename(from, to).await
    }

    async fn extend_lock(&self, key: &str, token: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.extend_lock(key, token, ttl).await
    }

    async fn release_lock(&self, key: &str, token: &str) -> StoreResult<bool> {
        self.inner.release_lock(key, token).await
    }
}
