//! Phase of the draw, derived from store contents on every read.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::keys::KeySpace;
use crate::store::{DrawSnapshot, KeyValueStore, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DrawState {
    NoDraw,
    OpenNoEntrants,
    OpenWithEntrants,
    ClosedNoEntrants,
    ClosedWithEntrants,
    Won,
}

impl DrawState {
    /// Classifies a snapshot. Rules are checked in order; anything unmatched is `Won`.
    ///
    /// The snapshot need not be consistent: every combination of fields maps
    /// to some state.
    pub fn classify(snapshot: &DrawSnapshot) -> Self {
        let DrawSnapshot {
            is_open,
            winners_exist,
            prizes_exist,
            entrant_count,
        } = *snapshot;

        if !is_open && !winners_exist && !prizes_exist {
            return Self::NoDraw;
        }
        if is_open {
            return if entrant_count == 0 {
                Self::OpenNoEntrants
            } else {
                Self::OpenWithEntrants
            };
        }
        if !winners_exist {
            return if entrant_count == 0 {
                Self::ClosedNoEntrants
            } else {
                Self::ClosedWithEntrants
            };
        }
        Self::Won
    }

    pub fn is_open(self) -> bool {
        matches!(self, Self::OpenNoEntrants | Self::OpenWithEntrants)
    }
}

pub struct StateResolver<S> {
    store: Arc<S>,
    keys: KeySpace,
}

impl<S: KeyValueStore> StateResolver<S> {
    pub fn new(store: Arc<S>, keys: KeySpace) -> Self {
        Self { store, keys }
    }

    pub async fn resolve(&self) -> StoreResult<DrawState> {
        let snapshot = self.store.draw_snapshot(&self.keys).await?;
        Ok(DrawState::classify(&snapshot))
    }
}
