//! Participant profiles and the read-through cache in front of the provider.
//!
//! A provider hit is cached for [`PROFILE_TTL`]. A provider "not found" is
//! returned as `None` and never cached, so every lookup of an unknown
//! identity reaches the provider again. Transport failures and unexpected
//! statuses are reported as [`ProviderError`], distinct from "not found".

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::error::DrawResult;
use crate::keys::KeySpace;
use crate::store::KeyValueStore;

pub const PROFILE_TTL: Duration = Duration::from_secs(60 * 60);

/// Longest login GitHub accepts.
const MAX_IDENTITY_LEN: usize = 39;

/// Public profile as returned by the identity provider.
///
/// Fields the draw does not use are kept in `extra` so the full provider
/// document survives a round trip through the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Profile {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            name: None,
            avatar_url: None,
            extra: serde_json::Map::new(),
        }
    }

    /// The display name, or the login when no name is set.
    pub fn display_name(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.login,
        }
    }
}

/// Canonical form of an identity: trimmed and lowercased.
///
/// Returns `None` for anything that cannot be a login (empty, too long, or
/// containing characters other than ASCII alphanumerics and `-`), which also
/// keeps separators out of store keys and provider URLs.
pub fn normalize_identity(raw: &str) -> Option<String> {
    let identity = raw.trim().to_ascii_lowercase();
    let valid = !identity.is_empty()
        && identity.len() <= MAX_IDENTITY_LEN
        && identity
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    valid.then_some(identity)
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),
}

/// External service resolving an identity to its public profile.
pub trait IdentityProvider: Send + Sync + 'static {
    /// `Ok(None)` means the provider has no such identity.
    fn fetch_profile(
        &self,
        identity: &str,
    ) -> impl Future<Output = Result<Option<Profile>, ProviderError>> + Send;
}

/// Client for the GitHub users API (`GET /users/{login}`).
pub struct GithubProvider {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl GithubProvider {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.github.com";

    /// Every request is bounded by `timeout`; running out counts as a provider failure.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("lucky-draw/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

impl IdentityProvider for GithubProvider {
    async fn fetch_profile(&self, identity: &str) -> Result<Option<Profile>, ProviderError> {
        let mut request = self
            .client
            .get(format!("{}/users/{identity}", self.base_url))
            .header(ACCEPT, "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => Ok(Some(response.json().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(ProviderError::Status(status)),
        }
    }
}

pub struct ProfileCache<S, P> {
    store: Arc<S>,
    provider: Arc<P>,
    keys: KeySpace,
    ttl: Duration,
}

impl<S: KeyValueStore, P: IdentityProvider> ProfileCache<S, P> {
    pub fn new(store: Arc<S>, provider: Arc<P>, keys: KeySpace) -> Self {
        Self {
            store,
            provider,
            keys,
            ttl: PROFILE_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Looks up a normalized identity, fetching and caching it on a miss.
    pub async fn get(&self, identity: &str) -> DrawResult<Option<Profile>> {
        if normalize_identity(identity).as_deref() != Some(identity) {
            return Ok(None);
        }

        let key = self.keys.profile(identity);
        if let Some(cached) = self.store.get(&key).await? {
            match serde_json::from_str(&cached) {
                Ok(profile) => {
                    debug!(identity, "profile cache hit");
                    return Ok(Some(profile));
                }
                Err(error) => warn!(identity, %error, "discarding undecodable cached profile"),
            }
        }

        debug!(identity, "profile cache miss");
        let Some(profile) = self.provider.fetch_profile(identity).await? else {
            return Ok(None);
        };

        match serde_json::to_string(&profile) {
            Ok(encoded) => self.store.set(&key, &encoded, Some(self.ttl)).await?,
            Err(error) => warn!(identity, %error, "profile not cached"),
        }
        Ok(Some(profile))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_falls_back_to_login() {
        let mut profile = Profile::new("octocat");
        assert_eq!(profile.display_name(), "octocat");

        profile.name = Some("  ".into());
        assert_eq!(profile.display_name(), "octocat");

        profile.name = Some("The Octocat".into());
        assert_eq!(profile.display_name(), "The Octocat");
    }

    #[test]
    fn identities_are_lowercased_and_validated() {
        assert_eq!(normalize_identity(" Alice ").as_deref(), Some("alice"));
        assert_eq!(normalize_identity("dev-ops-42").as_deref(), Some("dev-ops-42"));
        assert_eq!(normalize_identity(""), None);
        assert_eq!(normalize_identity("a:b"), None);
        assert_eq!(normalize_identity("../admin"), None);
        assert_eq!(normalize_identity(&"x".repeat(40)), None);
    }

    #[test]
    fn unknown_profile_fields_are_preserved() {
        let raw = r#"{"login":"octocat","name":null,"avatar_url":"https://a/1","public_repos":8}"#;
        let profile: Profile = serde_json::from_str(raw).expect("parse profile");

        assert_eq!(profile.login, "octocat");
        assert_eq!(profile.avatar_url.as_deref(), Some("https://a/1"));
        assert_eq!(profile.extra.get("public_repos"), Some(&serde_json::json!(8)));

        let encoded = serde_json::to_value(&profile).expect("encode profile");
        assert_eq!(encoded["public_repos"], 8);
    }
}
