//! Process-lifetime memoization of loaded resources, keyed on the parameters they were loaded
//! with. Entries are never invalidated; a restart is the only way to reload.

use std::{future::Future, hash::Hash, sync::Arc};

use anyhow::anyhow;
use log::debug;
use moka::future::Cache as MokaCache;

/// Upper bound on distinct load parameters kept per cache
const CACHE_CAPACITY: u64 = 32;

pub struct LoadCache<K, V> {
    name: &'static str,
    inner: MokaCache<K, Arc<V>>,
}

impl<K, V> LoadCache<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + std::fmt::Debug + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: MokaCache::new(CACHE_CAPACITY),
        }
    }

    /// Returns the entry for `key`, running `load` on a miss. Concurrent callers asking for the
    /// same key wait on a single `load`. A failed load is not stored.
    pub async fn get_or_load<F>(&self, key: K, load: F) -> anyhow::Result<Arc<V>>
    where
        F: Future<Output = anyhow::Result<V>>,
    {
        let name = self.name;
        let miss_key = key.clone();
        self.inner
            .try_get_with(key, async move {
                debug!("{name} cache miss for {miss_key:?}");
                load.await.map(Arc::new)
            })
            .await
            .map_err(|e| anyhow!("{e:#}"))
    }
}
