//! The operations the service exposes, over one store and one provider.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::allocator::{PrizeAllocator, WinnerMap};
use crate::error::{DrawError, DrawResult};
use crate::keys::KeySpace;
use crate::profile::{IdentityProvider, Profile, ProfileCache};
use crate::registry::EntrantRegistry;
use crate::state::{DrawState, StateResolver};
use crate::store::KeyValueStore;
use crate::winners::{WinnerRecord, WinnerView};

pub struct LuckyDraw<S, P> {
    store: Arc<S>,
    keys: KeySpace,
    state: StateResolver<S>,
    registry: EntrantRegistry<S, P>,
    allocator: PrizeAllocator<S>,
    winners: WinnerView<S, P>,
}

impl<S: KeyValueStore, P: IdentityProvider> LuckyDraw<S, P> {
    pub fn new(store: Arc<S>, provider: Arc<P>, keys: KeySpace) -> Self {
        let profiles = ProfileCache::new(Arc::clone(&store), provider, keys.clone());
        Self::with_profiles(store, profiles, keys)
    }

    /// Builds the draw around a preconfigured profile cache.
    pub fn with_profiles(store: Arc<S>, profiles: ProfileCache<S, P>, keys: KeySpace) -> Self {
        let profiles = Arc::new(profiles);
        Self {
            state: StateResolver::new(Arc::clone(&store), keys.clone()),
            registry: EntrantRegistry::new(Arc::clone(&store), Arc::clone(&profiles), keys.clone()),
            allocator: PrizeAllocator::new(Arc::clone(&store), keys.clone()),
            winners: WinnerView::new(Arc::clone(&store), profiles, keys.clone()),
            store,
            keys,
        }
    }

    pub async fn state(&self) -> DrawResult<DrawState> {
        Ok(self.state.resolve().await?)
    }

    pub async fn register(&self, identity: &str) -> DrawResult<Profile> {
        self.registry.register(identity).await
    }

    /// Replaces any previous draw with a new open one.
    ///
    /// Labels are trimmed and deduplicated; blank ones are dropped. A
    /// `duration_secs` of zero keeps the draw open until it is closed.
    pub async fn open_draw(&self, prizes: Vec<String>, duration_secs: u64) -> DrawResult<()> {
        let mut prizes: Vec<String> = prizes
            .into_iter()
            .map(|prize| prize.trim().to_string())
            .filter(|prize| !prize.is_empty())
            .collect();
        prizes.sort();
        prizes.dedup();
        if prizes.is_empty() {
            return Err(DrawError::InvalidRequest(
                "a draw needs at least one prize".to_string(),
            ));
        }

        let ttl = (duration_secs > 0).then(|| Duration::from_secs(duration_secs));
        self.store.start_draw(&self.keys, &prizes, ttl).await?;
        info!(prizes = prizes.len(), duration_secs, "draw opened");
        Ok(())
    }

    pub async fn close_draw(&self) -> DrawResult<()> {
        if self.store.del(&[self.keys.is_open.as_str()]).await? > 0 {
            info!("draw closed");
        }
        Ok(())
    }

    pub async fn allocate(&self) -> DrawResult<WinnerMap> {
        self.allocator.allocate().await
    }

    pub async fn winners(&self) -> DrawResult<Option<Vec<WinnerRecord>>> {
        self.winners.get().await
    }

    /// Prize labels of the current draw, sorted.
    pub async fn prizes(&self) -> DrawResult<Vec<String>> {
        let mut prizes = self.store.smembers(&self.keys.prizes).await?;
        prizes.sort();
        Ok(prizes)
    }
}
