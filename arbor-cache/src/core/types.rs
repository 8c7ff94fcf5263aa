use std::fmt;

use serde::{Deserialize, Serialize};

/// Subtree coverage of a cached enumeration.
///
/// `Levels(n)` means the scan that produced the entry covered `n` levels
/// below the target; `Complete` means the whole subtree was covered. The
/// variant order gives the derived `Ord` the shape the satisfaction law
/// needs: every finite depth sorts below `Complete`, and finite depths
/// sort by their level count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Depth {
    /// Finite number of levels below the target.
    Levels(u32),
    /// Recursively complete subtree coverage.
    Complete,
}

impl Depth {
    /// Whether an entry at this depth can answer a request for `requested`.
    pub fn satisfies(self, requested: Depth) -> bool {
        self >= requested
    }

    /// Clamp a finite depth to the configured encoding ceiling.
    pub(crate) fn clamped(self, max_depth: u32) -> Depth {
        match self {
            Depth::Levels(levels) if levels > max_depth => Depth::Levels(max_depth),
            other => other,
        }
    }

    /// Finite level count, if any.
    pub fn as_levels(self) -> Option<u32> {
        match self {
            Depth::Levels(levels) => Some(levels),
            Depth::Complete => None,
        }
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Depth::Levels(levels) => write!(f, "{}", levels),
            Depth::Complete => write!(f, "complete"),
        }
    }
}

/// Per-call options for cached enumeration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FetchOptions {
    /// `false` skips the cache entirely: no lookup, no dedup, no insert.
    pub use_cache: bool,
    /// Coverage the surrounding scan gives this enumeration. `None` means
    /// "just the children", cached at depth 0.
    pub depth: Option<Depth>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            use_cache: true,
            depth: None,
        }
    }
}

impl FetchOptions {
    /// Fetch straight from the source without touching the cache.
    pub fn bypass() -> Self {
        Self {
            use_cache: false,
            depth: None,
        }
    }

    /// Cached fetch tagged with a finite depth.
    pub fn at_depth(levels: u32) -> Self {
        Self {
            use_cache: true,
            depth: Some(Depth::Levels(levels)),
        }
    }

    /// Cached fetch tagged as a complete subtree scan.
    pub fn complete() -> Self {
        Self {
            use_cache: true,
            depth: Some(Depth::Complete),
        }
    }
}

/// Point-in-time cache statistics.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups answered from the store
    pub hits: u64,
    /// Lookups that went to the source (coalesced waiters included)
    pub misses: u64,
    /// Entries removed by LRU pressure or staleness
    pub evictions: u64,
    /// Entries removed by explicit invalidation
    pub invalidations: u64,
    /// Calls that skipped the cache on request
    pub bypasses: u64,
    /// Shallow entries superseded by deeper fetches
    pub upgrades: u64,
    /// Entries currently stored
    pub entries: usize,
    /// Estimated bytes currently stored
    pub memory_bytes: usize,
    /// hits / (hits + misses), 0.0 before the first lookup
    pub hit_rate: f64,
}

/// Running counters behind [`CacheStats`] snapshots.
#[derive(Debug, Default, Clone)]
pub(crate) struct StatCounters {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
    pub bypasses: u64,
    pub upgrades: u64,
}

impl StatCounters {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Snapshot the counters together with the store gauges.
    pub fn snapshot(&self, entries: usize, memory_bytes: usize) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
            invalidations: self.invalidations,
            bypasses: self.bypasses,
            upgrades: self.upgrades,
            entries,
            memory_bytes,
            hit_rate: self.hit_rate(),
        }
    }
}
