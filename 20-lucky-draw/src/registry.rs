//! Admission of entrants into the open draw.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{DrawError, DrawResult};
use crate::keys::KeySpace;
use crate::profile::{normalize_identity, IdentityProvider, Profile, ProfileCache};
use crate::store::KeyValueStore;

pub struct EntrantRegistry<S, P> {
    store: Arc<S>,
    profiles: Arc<ProfileCache<S, P>>,
    keys: KeySpace,
}

impl<S: KeyValueStore, P: IdentityProvider> EntrantRegistry<S, P> {
    pub fn new(store: Arc<S>, profiles: Arc<ProfileCache<S, P>>, keys: KeySpace) -> Self {
        Self {
            store,
            profiles,
            keys,
        }
    }

    /// Enters the identity `raw` into the open draw and returns its profile as a receipt.
    ///
    /// The draw may close between the open check and the set insert; such a
    /// late entrant is dropped with the other non-winners when prizes are
    /// allocated.
    pub async fn register(&self, raw: &str) -> DrawResult<Profile> {
        // Checked first so no provider lookups happen after close.
        if !self.store.exists(&self.keys.is_open).await? {
            return Err(DrawError::NotOpen);
        }

        let Some(identity) = normalize_identity(raw) else {
            debug!(identity = raw, "rejected malformed identity");
            return Err(DrawError::IdentityNotFound(raw.to_string()));
        };

        let Some(profile) = self.profiles.get(&identity).await? else {
            return Err(DrawError::IdentityNotFound(identity));
        };

        // The insert delta is authoritative; a separate membership check would race.
        let added = self
            .store
            .sadd(&self.keys.entrants, std::slice::from_ref(&identity))
            .await?;
        if added == 0 {
            return Err(DrawError::AlreadyRegistered(identity));
        }

        info!(identity = %identity, "entrant registered");
        Ok(profile)
    }
}
