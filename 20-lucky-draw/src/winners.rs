//! Human-facing winner list, derived once and cached.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DrawResult;
use crate::keys::KeySpace;
use crate::profile::{IdentityProvider, ProfileCache};
use crate::store::{KeyValueStore, StoreError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinnerRecord {
    pub name: String,
    pub prize: String,
    pub avatar_url: Option<String>,
}

pub struct WinnerView<S, P> {
    store: Arc<S>,
    profiles: Arc<ProfileCache<S, P>>,
    keys: KeySpace,
}

impl<S: KeyValueStore, P: IdentityProvider> WinnerView<S, P> {
    pub fn new(store: Arc<S>, profiles: Arc<ProfileCache<S, P>>, keys: KeySpace) -> Self {
        Self {
            store,
            profiles,
            keys,
        }
    }

    /// Winner records ordered by prize label, or `None` before allocation.
    ///
    /// The list is cached on first build. Winners never change after
    /// allocation and a new draw deletes the cache, so it is never refreshed.
    pub async fn get(&self) -> DrawResult<Option<Vec<WinnerRecord>>> {
        if let Some(cached) = self.store.get(&self.keys.winners_json).await? {
            let records = serde_json::from_str(&cached).map_err(|source| StoreError::Decode {
                key: self.keys.winners_json.clone(),
                source,
            })?;
            return Ok(Some(records));
        }

        let winners = self.store.hgetall(&self.keys.winners).await?;
        if winners.is_empty() {
            return Ok(None);
        }

        let mut records = Vec::with_capacity(winners.len());
        for (prize, identity) in winners {
            let record = match self.profiles.get(&identity).await? {
                Some(profile) => WinnerRecord {
                    name: profile.display_name().to_string(),
                    prize,
                    avatar_url: profile.avatar_url,
                },
                None => {
                    warn!(identity = %identity, "winner has no profile; showing identity");
                    WinnerRecord {
                        name: identity,
                        prize,
                        avatar_url: None,
                    }
                }
            };
            records.push(record);
        }

        match serde_json::to_string(&records) {
            Ok(encoded) => {
                self.store
                    .set(&self.keys.winners_json, &encoded, None)
                    .await?;
                debug!(winners = records.len(), "cached winner list");
            }
            Err(error) => warn!(%error, "winner list not cached"),
        }
        Ok(Some(records))
    }
}
