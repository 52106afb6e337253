//! Random pairing of prizes to entrants.
//!
//! Both sides are drained with `SPOP`, so each pop is a uniform draw from
//! what is left and nobody can be paired twice. The result is a uniformly
//! random injective matching of `min(prizes, entrants)` pairs.
//!
//! Every pair is written to a staging hash as soon as it is drawn and the
//! finished hash is renamed into place, so readers never see a partial
//! result and an interrupted allocation resumes where it stopped.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{DrawError, DrawResult};
use crate::keys::KeySpace;
use crate::store::KeyValueStore;

/// Prize label to winning identity.
pub type WinnerMap = BTreeMap<String, String>;

/// Upper bound on how long a crashed allocation can block the next one.
pub const ALLOCATION_LOCK_TTL: Duration = Duration::from_secs(30);

/// How often a running allocation pushes its lock expiry out.
const LOCK_RENEW_INTERVAL: Duration = Duration::from_secs(10);

pub struct PrizeAllocator<S> {
    store: Arc<S>,
    keys: KeySpace,
}

impl<S: KeyValueStore> PrizeAllocator<S> {
    pub fn new(store: Arc<S>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    /// Closes the draw and allocates its prizes.
    ///
    /// Only one allocation runs at a time; a concurrent call fails with
    /// [`DrawError::AllocationInProgress`]. Once winners are stored, further
    /// calls return them unchanged.
    ///
    /// With no entrants or no prizes the result is empty and no winners are
    /// written: leftover prizes are discarded and the draw reads as
    /// `NO_DRAW` afterwards.
    ///
    /// The work runs on its own task, so dropping the returned future does
    /// not interrupt it; the lock is held until the task finishes.
    pub async fn allocate(&self) -> DrawResult<WinnerMap> {
        let token = format!("{:032x}", rand::random::<u128>());
        let acquired = self
            .store
            .set_nx(&self.keys.allocating, &token, Some(ALLOCATION_LOCK_TTL))
            .await?;
        if !acquired {
            warn!("allocation already in progress");
            return Err(DrawError::AllocationInProgress);
        }

        let run = AllocationRun {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
            token,
        };
        tokio::spawn(run.execute()).await?
    }
}

/// One allocation holding the lock under `token`.
struct AllocationRun<S> {
    store: Arc<S>,
    keys: KeySpace,
    token: String,
}

impl<S: KeyValueStore> AllocationRun<S> {
    async fn execute(self) -> DrawResult<WinnerMap> {
        let result = self.pair_off().await;

        match self
            .store
            .release_lock(&self.keys.allocating, &self.token)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!("allocation lock expired before release"),
            Err(error) => warn!(%error, "failed to release allocation lock"),
        }
        result
    }

    async fn pair_off(&self) -> DrawResult<WinnerMap> {
        let keys = &self.keys;
        self.store.del(&[keys.is_open.as_str()]).await?;

        let existing = self.store.hgetall(&keys.winners).await?;
        if !existing.is_empty() {
            info!(winners = existing.len(), "draw already allocated");
            self.discard_leftovers().await?;
            return Ok(existing);
        }

        let mut renewed_at = Instant::now();
        loop {
            if renewed_at.elapsed() >= LOCK_RENEW_INTERVAL {
                let held = self
                    .store
                    .extend_lock(&keys.allocating, &self.token, ALLOCATION_LOCK_TTL)
                    .await?;
                if !held {
                    warn!("allocation lock lost, leaving staged pairs for the next run");
                    return Err(DrawError::AllocationInProgress);
                }
                renewed_at = Instant::now();
            }

            let Some(prize) = self.store.spop(&keys.prizes).await? else {
                break;
            };
            let entrant = match self.store.spop(&keys.entrants).await {
                Ok(Some(entrant)) => entrant,
                Ok(None) => {
                    debug!(prize = %prize, "ran out of entrants");
                    break;
                }
                Err(error) => {
                    self.restore(&keys.prizes, prize).await;
                    return Err(error.into());
                }
            };

            let pair = WinnerMap::from([(prize.clone(), entrant.clone())]);
            if let Err(error) = self.store.hset_all(&keys.winners_pending, &pair).await {
                self.restore(&keys.prizes, prize).await;
                self.restore(&keys.entrants, entrant).await;
                return Err(error.into());
            }
        }

        let winners = self.store.hgetall(&keys.winners_pending).await?;
        if !winners.is_empty() {
            self.store.rename(&keys.winners_pending, &keys.winners).await?;
        }
        self.discard_leftovers().await?;

        info!(winners = winners.len(), "prizes allocated");
        Ok(winners)
    }

    /// Unmatched entrants and prizes are discarded.
    async fn discard_leftovers(&self) -> DrawResult<()> {
        self.store
            .del(&[self.keys.entrants.as_str(), self.keys.prizes.as_str()])
            .await?;
        Ok(())
    }

    /// Puts a popped member back after a failed step.
    async fn restore(&self, key: &str, member: String) {
        if let Err(error) = self.store.sadd(key, &[member]).await {
            warn!(%error, key, "failed to restore popped member");
        }
    }
}
