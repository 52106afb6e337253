//! Read-through caching of provider profiles.

mod common;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use lucky_draw::keys::KeySpace;
use lucky_draw::profile::{ProfileCache, PROFILE_TTL};
use lucky_draw::store::{KeyValueStore, MemoryStore};
use lucky_draw::DrawError;

use common::ScriptedProvider;

fn cache(
    logins: &[&str],
) -> (
    Arc<MemoryStore>,
    Arc<ScriptedProvider>,
    ProfileCache<MemoryStore, ScriptedProvider>,
) {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(ScriptedProvider::with_logins(logins));
    let cache = ProfileCache::new(Arc::clone(&store), Arc::clone(&provider), KeySpace::default());
    (store, provider, cache)
}

#[tokio::test(start_paused = true)]
async fn hits_within_ttl_skip_the_provider() -> Result<()> {
    let (_store, provider, cache) = cache(&["octocat"]);

    let first = cache.get("octocat").await?.expect("known identity");
    assert_eq!(provider.calls(), 1);

    tokio::time::advance(PROFILE_TTL - Duration::from_secs(1)).await;
    let second = cache.get("octocat").await?.expect("cached identity");
    assert_eq!(provider.calls(), 1);
    assert_eq!(first, second);

    tokio::time::advance(Duration::from_secs(2)).await;
    cache.get("octocat").await?.expect("refetched identity");
    assert_eq!(provider.calls(), 2);

    cache.get("octocat").await?;
    assert_eq!(provider.calls(), 2);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn ttl_is_configurable() -> Result<()> {
    let (_store, provider, cache) = cache(&["octocat"]);
    let cache = cache.with_ttl(Duration::from_secs(5));

    cache.get("octocat").await?;
    tokio::time::advance(Duration::from_secs(6)).await;
    cache.get("octocat").await?;

    assert_eq!(provider.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn misses_are_not_cached() -> Result<()> {
    let (store, provider, cache) = cache(&[]);

    assert_eq!(cache.get("nobody").await?, None);
    assert_eq!(cache.get("nobody").await?, None);

    assert_eq!(provider.calls(), 2);
    assert!(!store.exists(&KeySpace::default().profile("nobody")).await?);
    Ok(())
}

#[tokio::test]
async fn outages_surface_as_errors() -> Result<()> {
    let (_store, provider, cache) = cache(&["octocat"]);
    provider.make_unavailable("octocat");

    let result = cache.get("octocat").await;
    assert!(matches!(result, Err(DrawError::ProviderUnavailable(_))));
    Ok(())
}

#[tokio::test]
async fn undecodable_entries_are_refetched() -> Result<()> {
    let (store, provider, cache) = cache(&["octocat"]);
    let key = KeySpace::default().profile("octocat");
    store.set(&key, "{not json", None).await?;

    let profile = cache.get("octocat").await?.expect("refetched profile");

    assert_eq!(profile.login, "octocat");
    assert_eq!(provider.calls(), 1);
    let stored = store.get(&key).await?.expect("profile re-cached");
    assert!(stored.contains(r#""login":"octocat""#));
    Ok(())
}

#[tokio::test]
async fn non_canonical_identities_are_not_looked_up() -> Result<()> {
    let (_store, provider, cache) = cache(&["octocat"]);

    assert_eq!(cache.get("OctoCat").await?, None);
    assert_eq!(cache.get("octo/cat").await?, None);
    assert_eq!(provider.calls(), 0);
    Ok(())
}
