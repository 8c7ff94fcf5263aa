use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::source::{Node, Source};

use super::error::{ArborError, Result};
use super::inflight::{FlightTicket, InflightRegistry};
use super::key::{self, AdapterIdentity, CacheKey, KeyKind};
use super::store::{CacheStore, InsertOutcome, Lookup, StoreLimits};
use super::tracker::VisitTracker;
use super::types::{CacheStats, Depth, FetchOptions, StatCounters};

const ADAPTER_CLASS_ID: &str = "cached-source";

/// Caching facade over a [`Source`].
///
/// Wraps any hierarchical source with a completeness-aware children
/// cache: results are keyed by (instance, target, depth), deeper cached
/// scans satisfy shallower requests, concurrent fetches for one key are
/// coalesced into a single source call, and the bounded-memory guard
/// keeps the store inside the configured limits.
///
/// Every instance gets its own key namespace, so stacked facades over
/// one base source never serve each other's entries.
pub struct CachedSource<S: Source> {
    inner: Arc<S>,
    identity: AdapterIdentity,
    config: CacheConfig,
    store: Arc<RwLock<CacheStore<S::Node>>>,
    tracker: Arc<RwLock<VisitTracker>>,
    inflight: InflightRegistry<S::Node>,
    stats: Arc<RwLock<StatCounters>>,
}

impl<S: Source> Clone for CachedSource<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            identity: self.identity,
            config: self.config.clone(),
            store: Arc::clone(&self.store),
            tracker: Arc::clone(&self.tracker),
            inflight: self.inflight.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<S: Source> CachedSource<S> {
    /// Wrap `inner` with a cache configured by `config`.
    pub fn new(inner: S, config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let identity = AdapterIdentity::allocate(ADAPTER_CLASS_ID);
        let limits = StoreLimits {
            oom_protection: config.enable_oom_protection,
            max_entries: config.max_entries,
            max_memory_bytes: config.max_memory_bytes(),
            max_cache_depth: config.max_cache_depth,
            max_path_depth: config.max_path_depth,
        };
        let tracker = VisitTracker::new(config.max_tracked_nodes, config.enable_oom_protection);
        info!(
            "Cache adapter {} initialized (max_entries: {}, max_memory_mb: {}, oom_protection: {})",
            identity, config.max_entries, config.max_memory_mb, config.enable_oom_protection
        );
        Ok(Self {
            inner: Arc::new(inner),
            identity,
            config,
            store: Arc::new(RwLock::new(CacheStore::new(identity, limits))),
            tracker: Arc::new(RwLock::new(tracker)),
            inflight: InflightRegistry::new(),
            stats: Arc::new(RwLock::new(StatCounters::default())),
        })
    }

    /// Enumerate children honoring the per-call [`FetchOptions`].
    pub async fn children_with(
        &self,
        node: &S::Node,
        options: FetchOptions,
    ) -> Result<Vec<S::Node>> {
        let target = key::normalize_target(node.identifier());

        if !options.use_cache {
            self.stats.write().bypasses += 1;
            debug!("Cache bypass for target: {}", target);
            return self.inner.children(node).await;
        }

        let depth = options
            .depth
            .unwrap_or(Depth::Levels(0))
            .clamped(self.config.max_depth);
        let key = CacheKey::new(self.identity, KeyKind::Children, target, depth);

        if let Some(data) = self.cached(node, &key).await {
            self.stats.write().hits += 1;
            self.tracker.write().record(&key.target, depth);
            debug!("Cache HIT for key: {}", key);
            return Ok(data.as_ref().clone());
        }
        self.stats.write().misses += 1;

        match self.inflight.ticket(&key) {
            FlightTicket::Join(mut rx) => {
                debug!("Joining in-flight fetch for key: {}", key);
                let outcome = match rx.recv().await {
                    Ok(outcome) => outcome,
                    Err(_) => return Err(ArborError::fetch_cancelled(&key.target)),
                };
                let data = outcome?;
                self.tracker.write().record(&key.target, depth);
                Ok(data.as_ref().clone())
            }
            FlightTicket::Lead(lead) => {
                let outcome = self.fetch_and_store(node, &key).await;
                lead.finish(outcome.clone());
                let data = outcome?;
                self.tracker.write().record(&key.target, depth);
                Ok(data.as_ref().clone())
            }
        }
    }

    /// Serve from the store if a satisfying entry exists, running a due
    /// staleness validation on the way.
    async fn cached(&self, node: &S::Node, key: &CacheKey) -> Option<Arc<Vec<S::Node>>> {
        let lookup = self.store.write().lookup(
            key.target.as_str(),
            key.depth,
            self.config.validation_ttl_seconds,
        );
        match lookup {
            Lookup::Hit { data } => Some(data),
            Lookup::Miss => None,
            Lookup::NeedsValidation { key, data, mtime } => match node.metadata().await {
                Ok(meta) if meta.modified.is_some_and(|current| current != mtime) => {
                    // A sibling validator may have removed the entry while
                    // we awaited metadata; only the task that actually
                    // removes it counts the eviction.
                    if self.store.write().remove_entry(&key) {
                        self.stats.write().evictions += 1;
                        debug!("Stale entry evicted for key: {} (source mtime changed)", key);
                    }
                    None
                }
                Ok(_) => {
                    self.store.write().refresh(&key);
                    Some(data)
                }
                Err(error) => {
                    // Source can't answer; keep serving what we have.
                    warn!("Staleness check failed for key: {}: {}", key, error);
                    self.store.write().refresh(&key);
                    Some(data)
                }
            },
        }
    }

    async fn fetch_and_store(&self, node: &S::Node, key: &CacheKey) -> Result<Arc<Vec<S::Node>>> {
        debug!("Cache MISS for key: {}, fetching from source", key);
        let children = self.inner.children(node).await?;
        let data = Arc::new(children);

        // A negative TTL disables validation, so skip the timestamp read
        // entirely (it can be expensive on network-backed sources).
        let mtime = if self.config.validation_ttl_seconds < 0.0 {
            None
        } else {
            match node.metadata().await {
                Ok(meta) => meta.modified,
                Err(error) => {
                    debug!("No source timestamp for key: {}: {}", key, error);
                    None
                }
            }
        };

        let outcome =
            self.store
                .write()
                .insert(key.target.as_str(), key.depth, Arc::clone(&data), mtime);
        match outcome {
            InsertOutcome::Inserted {
                superseded,
                evicted,
            } => {
                if superseded > 0 || evicted > 0 {
                    let mut stats = self.stats.write();
                    stats.upgrades += superseded as u64;
                    stats.evictions += evicted as u64;
                }
                if evicted > 0 {
                    debug!("Evicted {} entries to stay under limits", evicted);
                }
            }
            InsertOutcome::Rejected(reason) => {
                debug!("Entry not cached for key: {} ({})", key, reason);
            }
        }
        Ok(data)
    }

    /// Remove cached entries for `target`; with `deep`, every descendant
    /// of it too. Returns the number of entries removed.
    pub fn invalidate(&self, target: &str, deep: bool) -> usize {
        let target = key::normalize_target(target);
        if deep && key::is_root_target(&target) {
            return self.invalidate_all();
        }
        let removed = if deep {
            self.store.write().invalidate_deep(&target)
        } else {
            self.store.write().invalidate_target(&target)
        };
        if removed > 0 {
            self.stats.write().invalidations += removed as u64;
            debug!(
                "Invalidated {} entries for target: {} (deep: {})",
                removed, target, deep
            );
        }
        removed
    }

    /// Clear the store and the visit tracker. Returns the number of
    /// entries removed.
    pub fn invalidate_all(&self) -> usize {
        let removed = self.store.write().clear();
        self.tracker.write().clear();
        if removed > 0 {
            self.stats.write().invalidations += removed as u64;
        }
        info!("Cache cleared: {} entries removed", removed);
        removed
    }

    /// Invalidate the cached entries under a node's own target.
    pub fn invalidate_node(&self, node: &S::Node, deep: bool) -> Result<usize> {
        let identifier = node.identifier();
        if identifier.is_empty() {
            return Err(ArborError::InvalidTarget(
                "node has no resolvable identifier".to_string(),
            ));
        }
        Ok(self.invalidate(identifier, deep))
    }

    /// Invalidate a batch of nodes, each under its own target only. With
    /// `ignore_errors`, unresolvable nodes are skipped; otherwise the
    /// first one aborts the batch.
    pub fn invalidate_nodes(&self, nodes: &[S::Node], ignore_errors: bool) -> Result<usize> {
        let mut removed = 0;
        for node in nodes {
            match self.invalidate_node(node, false) {
                Ok(count) => removed += count,
                Err(error) if ignore_errors => {
                    warn!("Skipping node in batch invalidation: {}", error);
                }
                Err(error) => return Err(error),
            }
        }
        Ok(removed)
    }

    /// Snapshot of the cache counters and gauges.
    pub fn stats(&self) -> CacheStats {
        let (entries, memory_bytes) = {
            let store = self.store.read();
            (store.len(), store.memory_bytes())
        };
        self.stats.read().snapshot(entries, memory_bytes)
    }

    /// Depth recorded by the most recent visit of `target`, if any.
    pub fn last_visited_depth(&self, target: &str) -> Option<Depth> {
        let target = key::normalize_target(target);
        self.tracker.read().last_depth(&target)
    }

    /// The cache key this adapter uses for (target, depth). Stable for
    /// the adapter's lifetime and distinct across instances.
    pub fn key_for(&self, target: &str, depth: Depth) -> CacheKey {
        CacheKey::new(
            self.identity,
            KeyKind::Children,
            key::normalize_target(target),
            depth.clamped(self.config.max_depth),
        )
    }

    pub fn identity(&self) -> AdapterIdentity {
        self.identity
    }

    /// The wrapped source.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

#[async_trait]
impl<S: Source> Source for CachedSource<S> {
    type Node = S::Node;

    async fn children(&self, node: &Self::Node) -> Result<Vec<Self::Node>> {
        self.children_with(node, FetchOptions::default()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NodeMetadata;
    use serde::Serialize;

    #[derive(Debug, Clone, Serialize)]
    struct TestNode {
        id: String,
    }

    #[async_trait]
    impl Node for TestNode {
        fn identifier(&self) -> &str {
            &self.id
        }

        async fn metadata(&self) -> Result<NodeMetadata> {
            Ok(NodeMetadata::default())
        }
    }

    struct TestSource;

    #[async_trait]
    impl Source for TestSource {
        type Node = TestNode;

        async fn children(&self, _node: &TestNode) -> Result<Vec<TestNode>> {
            Ok(vec![TestNode {
                id: "/child".to_string(),
            }])
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = CacheConfig {
            max_depth: 0,
            ..CacheConfig::default()
        };
        assert!(matches!(
            CachedSource::new(TestSource, config),
            Err(ArborError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn test_bypass_skips_store() {
        let cache = CachedSource::new(TestSource, CacheConfig::default()).unwrap();
        let node = TestNode {
            id: "/".to_string(),
        };
        let children = cache
            .children_with(&node, FetchOptions::bypass())
            .await
            .unwrap();
        assert_eq!(children.len(), 1);

        let stats = cache.stats();
        assert_eq!(stats.bypasses, 1);
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.hits + stats.misses, 0);
    }

    #[test]
    fn test_keys_differ_across_instances() {
        let a = CachedSource::new(TestSource, CacheConfig::default()).unwrap();
        let b = CachedSource::new(TestSource, CacheConfig::default()).unwrap();
        assert_ne!(a.identity(), b.identity());
        assert_ne!(
            a.key_for("/x", Depth::Levels(1)),
            b.key_for("/x", Depth::Levels(1))
        );
    }

    #[test]
    fn test_key_depth_is_clamped() {
        // max_cache_depth must stay within the lowered ceiling or
        // construction refuses the config.
        let config = CacheConfig {
            max_depth: 10,
            max_cache_depth: 10,
            ..CacheConfig::default()
        };
        let cache = CachedSource::new(TestSource, config).unwrap();
        assert_eq!(cache.config().max_depth, 10);
        assert_eq!(
            cache.key_for("/x", Depth::Levels(99)).depth,
            Depth::Levels(10)
        );
    }
}
