//! Single-flight memoization of resolved contexts.
//!
//! Resolution opens credential files and builds a pooled transport, so it must
//! run at most once per configuration identity no matter how many pollers
//! start concurrently. [`ConfigCache`] provides the generic discipline: one
//! construction slot per key, full parallelism across keys, lock-free-ish
//! reads after the first success. [`ContextCache`] is the typed instantiation
//! used by discovery.
//!
//! Failures are never cached. A construction error is returned to the caller
//! who triggered it and leaves the slot empty, so the next call retries —
//! a missing token file or an unset env var may simply not be mounted yet.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;

use crate::bootstrap::{BootstrapSource, ProcessEnvironment};
use crate::config::DiscoveryConfig;
use crate::context::ResolvedContext;
use crate::prelude::debug;
use crate::resolver::ResolveError;

/// Generic single-flight cache keyed by value identity.
///
/// For any key, at most one initializer runs at a time; concurrent callers
/// for the same key wait for the in-flight attempt. A successful value is
/// stored forever (entries are bounded by the number of distinct
/// configurations, not by traffic); a failed attempt leaves the entry empty.
#[derive(Debug)]
pub struct ConfigCache<K, V> {
    entries: Mutex<HashMap<K, Arc<OnceCell<Arc<V>>>>>,
}

impl<K, V> Default for ConfigCache<K, V> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, V> ConfigCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached value for `key`, constructing it with `init` if
    /// absent.
    ///
    /// The map lock is held only for the entry lookup; `init` runs outside
    /// it, so construction for one key never blocks lookups or construction
    /// for other keys.
    ///
    /// # Errors
    ///
    /// Propagates the error produced by `init`. The entry stays empty, and a
    /// later call with the same key re-attempts construction.
    pub async fn get_or_try_init<E, F, Fut>(&self, key: &K, init: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        let value = cell
            .get_or_try_init(|| async { init().await.map(Arc::new) })
            .await?;
        Ok(Arc::clone(value))
    }

    /// Drops the entry for `key`, if any.
    ///
    /// Callers already holding the old value keep using it; the next
    /// [`Self::get_or_try_init`] for the key constructs a fresh one.
    pub fn invalidate(&self, key: &K) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

/// Memoizing store of [`ResolvedContext`]s keyed by [`DiscoveryConfig`] value
/// identity.
///
/// Construct one per process at startup and hand it to every discovery
/// poller. Field-wise equal configurations — even independently built ones —
/// share a single resolved context; the resolution pipeline runs exactly once
/// per identity across any number of concurrent callers.
#[derive(Debug, Default)]
pub struct ContextCache {
    cache: ConfigCache<DiscoveryConfig, ResolvedContext>,
}

impl ContextCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the resolved context for `config`, constructing it on first
    /// use.
    ///
    /// Bootstrap mode reads the real process environment; tests should prefer
    /// [`Self::resolve_with`].
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] if construction fails. Failures are not
    /// cached: a later call with the same configuration retries.
    pub async fn resolve(
        &self,
        config: &DiscoveryConfig,
    ) -> Result<Arc<ResolvedContext>, ResolveError> {
        self.resolve_with(config, &ProcessEnvironment).await
    }

    /// Like [`Self::resolve`], with an injected [`BootstrapSource`].
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] if construction fails.
    pub async fn resolve_with(
        &self,
        config: &DiscoveryConfig,
        source: &dyn BootstrapSource,
    ) -> Result<Arc<ResolvedContext>, ResolveError> {
        self.cache
            .get_or_try_init(config, || async {
                debug!("building resolved context for a new discovery configuration");
                ResolvedContext::new(config, source)
            })
            .await
    }

    /// Drops the cached context for `config`, forcing the next
    /// [`Self::resolve`] to rebuild it (e.g. after credential rotation behind
    /// an unchanged configuration).
    pub fn invalidate(&self, config: &DiscoveryConfig) {
        self.cache.invalidate(config);
    }
}
