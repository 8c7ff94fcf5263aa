use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::types::Depth;

/// Process-wide instance counter. No two adapter instances ever share
/// an id, even when they are the same class.
static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one cache-adapter instance.
///
/// Every cache key embeds the full identity, so two cache layers stacked
/// over the same physical source keep disjoint key spaces even though
/// they are the same class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AdapterIdentity {
    /// Adapter class label, fixed per adapter type.
    pub class_id: &'static str,
    /// Monotonically increasing id assigned once at construction.
    pub instance_id: u64,
}

impl AdapterIdentity {
    /// Allocate a fresh identity for `class_id`.
    pub fn allocate(class_id: &'static str) -> Self {
        Self {
            class_id,
            instance_id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }
}

impl fmt::Display for AdapterIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.class_id, self.instance_id)
    }
}

/// What a cache key addresses. Only child enumerations are cached today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    /// A node's enumerated children
    Children,
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyKind::Children => write!(f, "children"),
        }
    }
}

/// Structured cache key: (class, instance, kind, target, depth).
///
/// Distinct depths for the same target are distinct keys; replacing a
/// shallow entry with a deeper one is explicit store logic, never key
/// aliasing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub identity: AdapterIdentity,
    pub kind: KeyKind,
    pub target: String,
    pub depth: Depth,
}

impl CacheKey {
    /// Build a key for (target, depth) under `identity`.
    pub fn new(
        identity: AdapterIdentity,
        kind: KeyKind,
        target: impl Into<String>,
        depth: Depth,
    ) -> Self {
        Self {
            identity,
            kind,
            target: target.into(),
            depth,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}@{}",
            self.identity, self.kind, self.target, self.depth
        )
    }
}

/// Canonical form of a target identifier: no trailing separator except
/// for the root itself.
pub(crate) fn normalize_target(target: &str) -> String {
    if target.len() > 1 {
        let trimmed = target.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        target.to_string()
    }
}

/// Whether `target` names the root of the hierarchy.
pub(crate) fn is_root_target(target: &str) -> bool {
    target.is_empty() || target == "/"
}

/// Number of separator-delimited segments in a target identifier.
pub(crate) fn path_depth(target: &str) -> u32 {
    target.split('/').filter(|segment| !segment.is_empty()).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_ids_are_unique_and_increasing() {
        let a = AdapterIdentity::allocate("cache");
        let b = AdapterIdentity::allocate("cache");
        let c = AdapterIdentity::allocate("other");
        assert!(b.instance_id > a.instance_id);
        assert!(c.instance_id > b.instance_id);
        assert_ne!(a, b);
    }

    #[test]
    fn test_same_class_instances_produce_distinct_keys() {
        let a = AdapterIdentity::allocate("cache");
        let b = AdapterIdentity::allocate("cache");
        let key_a = CacheKey::new(a, KeyKind::Children, "/proj", Depth::Levels(3));
        let key_b = CacheKey::new(b, KeyKind::Children, "/proj", Depth::Levels(3));
        assert_ne!(key_a, key_b);
    }

    #[test]
    fn test_distinct_depths_are_distinct_keys() {
        let identity = AdapterIdentity::allocate("cache");
        let shallow = CacheKey::new(identity, KeyKind::Children, "/proj", Depth::Levels(3));
        let deep = CacheKey::new(identity, KeyKind::Children, "/proj", Depth::Levels(4));
        let complete = CacheKey::new(identity, KeyKind::Children, "/proj", Depth::Complete);
        assert_ne!(shallow, deep);
        assert_ne!(shallow, complete);
        assert_ne!(deep, complete);
    }

    #[test]
    fn test_key_display() {
        let identity = AdapterIdentity {
            class_id: "cache",
            instance_id: 7,
        };
        let key = CacheKey::new(identity, KeyKind::Children, "/a/b", Depth::Levels(2));
        assert_eq!(key.to_string(), "cache#7:children:/a/b@2");

        let key = CacheKey::new(identity, KeyKind::Children, "/a/b", Depth::Complete);
        assert_eq!(key.to_string(), "cache#7:children:/a/b@complete");
    }

    #[test]
    fn test_normalize_target() {
        assert_eq!(normalize_target("/proj/"), "/proj");
        assert_eq!(normalize_target("/proj"), "/proj");
        assert_eq!(normalize_target("///"), "/");
        assert_eq!(normalize_target("/"), "/");
        assert_eq!(normalize_target(""), "");
    }

    #[test]
    fn test_path_depth() {
        assert_eq!(path_depth("/"), 0);
        assert_eq!(path_depth("/a"), 1);
        assert_eq!(path_depth("/a/b/c"), 3);
        assert_eq!(path_depth("a/b"), 2);
    }

    #[test]
    fn test_root_detection() {
        assert!(is_root_target("/"));
        assert!(is_root_target(""));
        assert!(!is_root_target("/a"));
    }
}
