use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use radix_trie::{Trie, TrieCommon};
use serde::Serialize;
use tracing::debug;

use super::key::{self, AdapterIdentity, CacheKey, KeyKind};
use super::types::Depth;

/// One cached enumeration.
#[derive(Debug, Clone)]
pub struct CacheEntry<N> {
    /// Child descriptors, shared with every caller of the producing fetch
    pub data: Arc<Vec<N>>,
    /// Coverage claimed by the scan that produced the data
    pub depth: Depth,
    /// Source modification time observed at cache time
    pub mtime: Option<f64>,
    /// Set at insert, refreshed by a successful staleness validation
    pub cached_at: Instant,
    /// Hits served by this entry
    pub access_count: u64,
    /// Heuristic serialized size of `data` in bytes
    pub size_estimate: usize,
}

/// Bounds enforced around store mutations while OOM protection is on.
#[derive(Debug, Clone, Copy)]
pub struct StoreLimits {
    pub oom_protection: bool,
    pub max_entries: usize,
    pub max_memory_bytes: usize,
    pub max_cache_depth: u32,
    pub max_path_depth: u32,
}

/// Outcome of a store lookup.
#[derive(Debug)]
pub enum Lookup<N> {
    /// Satisfying entry served; access bookkeeping is already done.
    Hit { data: Arc<Vec<N>> },
    /// Satisfying entry found but its staleness check is due. The caller
    /// re-reads the source timestamp with no lock held, then either
    /// refreshes or removes the keyed entry.
    NeedsValidation {
        key: CacheKey,
        data: Arc<Vec<N>>,
        mtime: f64,
    },
    /// Nothing satisfying is cached.
    Miss,
}

/// Outcome of a store insert.
#[derive(Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Entry persisted. Carries how many shallower entries it superseded
    /// and how many entries were evicted to get back under the bounds.
    Inserted { superseded: usize, evicted: usize },
    /// The guard refused persistence; the fetched data still goes to the
    /// caller.
    Rejected(RejectReason),
}

/// Why the resource guard refused to persist an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Finite request depth above `max_cache_depth`
    DepthAboveLimit,
    /// Target nested deeper than `max_path_depth` segments
    PathTooDeep,
    /// `max_entries == 0` disables persistence
    ZeroCapacity,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::DepthAboveLimit => write!(f, "depth above max_cache_depth"),
            RejectReason::PathTooDeep => write!(f, "path deeper than max_path_depth"),
            RejectReason::ZeroCapacity => write!(f, "max_entries is 0"),
        }
    }
}

const FALLBACK_CHILD_BYTES: usize = 64;

/// Heuristic entry size: serialized length of the child vector, with a
/// flat per-child fallback when serialization fails.
fn estimate_size<N: Serialize>(data: &Arc<Vec<N>>) -> usize {
    match serde_json::to_vec(data.as_ref()) {
        Ok(serialized) => serialized.len(),
        Err(_) => data.len() * FALLBACK_CHILD_BYTES,
    }
}

/// Completeness-aware entry store for one cache-adapter instance.
///
/// Entries are indexed by target in a radix trie (descendant scans drive
/// deep invalidation), one slot of depth-keyed entries per target. Access
/// order lives in a queue maintained only while OOM protection is on;
/// `current_memory` tracks heuristic entry sizes incrementally.
pub struct CacheStore<N> {
    identity: AdapterIdentity,
    entries: Trie<String, BTreeMap<Depth, CacheEntry<N>>>,
    order: VecDeque<CacheKey>,
    entry_count: usize,
    current_memory: usize,
    limits: StoreLimits,
}

impl<N: Serialize> CacheStore<N> {
    pub fn new(identity: AdapterIdentity, limits: StoreLimits) -> Self {
        Self {
            identity,
            entries: Trie::new(),
            order: VecDeque::new(),
            entry_count: 0,
            current_memory: 0,
            limits,
        }
    }

    pub fn len(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn memory_bytes(&self) -> usize {
        self.current_memory
    }

    fn key(&self, target: &str, depth: Depth) -> CacheKey {
        CacheKey::new(self.identity, KeyKind::Children, target, depth)
    }

    /// Find a satisfying entry for (target, requested): the exact depth,
    /// else COMPLETE, else the deepest finite entry at or above the
    /// request. Validation is signalled, never performed; the caller owns
    /// the async timestamp read.
    pub fn lookup(&mut self, target: &str, requested: Depth, validation_ttl: f64) -> Lookup<N> {
        let (chosen, data, due_mtime) = {
            let Some(slot) = self.entries.get(target) else {
                return Lookup::Miss;
            };
            let chosen = if slot.contains_key(&requested) {
                requested
            } else if slot.contains_key(&Depth::Complete) {
                Depth::Complete
            } else {
                match slot.range(requested..).next_back() {
                    Some((depth, _)) => *depth,
                    None => return Lookup::Miss,
                }
            };
            let Some(entry) = slot.get(&chosen) else {
                return Lookup::Miss;
            };
            let due_mtime = entry.mtime.filter(|_| {
                validation_ttl >= 0.0
                    && entry.cached_at.elapsed().as_secs_f64() >= validation_ttl
            });
            (chosen, Arc::clone(&entry.data), due_mtime)
        };

        if let Some(mtime) = due_mtime {
            return Lookup::NeedsValidation {
                key: self.key(target, chosen),
                data,
                mtime,
            };
        }

        if let Some(entry) = self
            .entries
            .get_mut(target)
            .and_then(|slot| slot.get_mut(&chosen))
        {
            entry.access_count += 1;
        }
        if self.limits.oom_protection {
            let key = self.key(target, chosen);
            self.touch_order(&key);
        }
        Lookup::Hit { data }
    }

    /// Successful (or unanswerable) validation: push the next check one
    /// TTL window out and count the access.
    pub fn refresh(&mut self, key: &CacheKey) {
        let refreshed = match self
            .entries
            .get_mut(key.target.as_str())
            .and_then(|slot| slot.get_mut(&key.depth))
        {
            Some(entry) => {
                entry.cached_at = Instant::now();
                entry.access_count += 1;
                true
            }
            None => false,
        };
        if refreshed && self.limits.oom_protection {
            self.touch_order(key);
        }
    }

    /// Remove a single keyed entry (staleness path). Returns whether it
    /// was present.
    pub fn remove_entry(&mut self, key: &CacheKey) -> bool {
        self.remove_depth(key.target.as_str(), key.depth).is_some()
    }

    /// Persist a fetched enumeration, superseding strictly shallower
    /// entries for the same target, then evict down to the bounds.
    pub fn insert(
        &mut self,
        target: &str,
        depth: Depth,
        data: Arc<Vec<N>>,
        mtime: Option<f64>,
    ) -> InsertOutcome {
        if self.limits.oom_protection {
            if let Depth::Levels(levels) = depth {
                if levels > self.limits.max_cache_depth {
                    return InsertOutcome::Rejected(RejectReason::DepthAboveLimit);
                }
            }
            if key::path_depth(target) > self.limits.max_path_depth {
                return InsertOutcome::Rejected(RejectReason::PathTooDeep);
            }
            if self.limits.max_entries == 0 {
                return InsertOutcome::Rejected(RejectReason::ZeroCapacity);
            }
        }

        let size_estimate = estimate_size(&data);

        let superseded_depths: Vec<Depth> = self
            .entries
            .get(target)
            .map(|slot| {
                slot.keys()
                    .filter(|existing| **existing < depth)
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        let superseded = superseded_depths.len();
        for shallow in superseded_depths {
            self.remove_depth(target, shallow);
            debug!("Superseded entry for target: {} ({} -> {})", target, shallow, depth);
        }
        // An entry already sitting at this exact depth is replaced.
        self.remove_depth(target, depth);

        let entry = CacheEntry {
            data,
            depth,
            mtime,
            cached_at: Instant::now(),
            access_count: 0,
            size_estimate,
        };
        self.current_memory += size_estimate;
        self.entry_count += 1;
        match self.entries.get_mut(target) {
            Some(slot) => {
                slot.insert(depth, entry);
            }
            None => {
                let mut slot = BTreeMap::new();
                slot.insert(depth, entry);
                self.entries.insert(target.to_string(), slot);
            }
        }
        if self.limits.oom_protection {
            self.order.push_back(self.key(target, depth));
        }

        let evicted = if self.limits.oom_protection {
            self.evict_to_limits()
        } else {
            0
        };
        InsertOutcome::Inserted {
            superseded,
            evicted,
        }
    }

    /// Remove every entry (all depths, COMPLETE included) for `target`.
    pub fn invalidate_target(&mut self, target: &str) -> usize {
        let Some(slot) = self.entries.remove(target) else {
            return 0;
        };
        let removed = slot.len();
        for entry in slot.values() {
            self.current_memory = self.current_memory.saturating_sub(entry.size_estimate);
        }
        self.entry_count -= removed;
        self.order.retain(|queued| queued.target != target);
        removed
    }

    /// Remove `target` and every descendant target (segment-aware prefix
    /// match on the hierarchical identifier).
    pub fn invalidate_deep(&mut self, target: &str) -> usize {
        let prefix = format!("{}/", target.trim_end_matches('/'));
        let descendants: Vec<String> = self
            .entries
            .get_raw_descendant(prefix.as_str())
            .map(|subtrie| subtrie.keys().cloned().collect())
            .unwrap_or_default();

        let mut removed = self.invalidate_target(target);
        for descendant in descendants {
            removed += self.invalidate_target(&descendant);
        }
        removed
    }

    /// Drop everything; returns the prior entry count.
    pub fn clear(&mut self) -> usize {
        let removed = self.entry_count;
        self.entries = Trie::new();
        self.order.clear();
        self.entry_count = 0;
        self.current_memory = 0;
        removed
    }

    fn touch_order(&mut self, key: &CacheKey) {
        self.order.retain(|queued| queued != key);
        self.order.push_back(key.clone());
    }

    fn remove_depth(&mut self, target: &str, depth: Depth) -> Option<CacheEntry<N>> {
        let (entry, emptied) = {
            let slot = self.entries.get_mut(target)?;
            let entry = slot.remove(&depth)?;
            (entry, slot.is_empty())
        };
        if emptied {
            self.entries.remove(target);
        }
        self.entry_count -= 1;
        self.current_memory = self.current_memory.saturating_sub(entry.size_estimate);
        self.order
            .retain(|queued| !(queued.target == target && queued.depth == depth));
        Some(entry)
    }

    fn evict_to_limits(&mut self) -> usize {
        let mut evicted = 0;
        while self.entry_count > self.limits.max_entries
            || self.current_memory > self.limits.max_memory_bytes
        {
            let Some(victim) = self.order.pop_front() else {
                break;
            };
            if self
                .remove_depth(victim.target.as_str(), victim.depth)
                .is_some()
            {
                evicted += 1;
                debug!("Evicted LRU entry: {}", victim);
            }
        }
        evicted
    }
}
