use thiserror::Error;

use crate::profile::ProviderError;
use crate::store::StoreError;

/// Failures returned by draw operations.
#[derive(Debug, Error)]
pub enum DrawError {
    #[error("the draw is not open")]
    NotOpen,

    #[error("identity '{0}' was not found")]
    IdentityNotFound(String),

    #[error("identity '{0}' has already entered the draw")]
    AlreadyRegistered(String),

    #[error("identity provider unavailable: {0}")]
    ProviderUnavailable(#[from] ProviderError),

    #[error("prizes are already being allocated")]
    AllocationInProgress,

    #[error("allocation task failed: {0}")]
    AllocationFailed(#[from] tokio::task::JoinError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type DrawResult<T> = Result<T, DrawError>;
