use std::collections::VecDeque;

use tracing::debug;

use crate::core::adapter::CachedSource;
use crate::core::error::Result;
use crate::core::types::FetchOptions;
use crate::source::Source;

/// Breadth-first traversal over a source.
///
/// Visits `root` and everything reachable through `children`, going at
/// most `max_depth` enumeration levels below the root (`None` means
/// unbounded). `descend` is consulted per node before its children are
/// enumerated; returning false prunes that subtree.
pub async fn walk<S, F>(
    source: &S,
    root: S::Node,
    max_depth: Option<u32>,
    mut descend: F,
) -> Result<Vec<S::Node>>
where
    S: Source,
    F: FnMut(&S::Node) -> bool,
{
    let mut visited = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back((root, 0u32));

    while let Some((node, level)) = queue.pop_front() {
        if max_depth.is_none_or(|limit| level < limit) && descend(&node) {
            for child in source.children(&node).await? {
                queue.push_back((child, level + 1));
            }
        }
        visited.push(node);
    }
    debug!("Walk finished: {} nodes visited", visited.len());
    Ok(visited)
}

/// Like [`walk`], but drives a [`CachedSource`] with depth-tagged fetch
/// options: each enumeration is cached claiming the coverage the walk
/// still has left below that node, so a later walk (or any shallower
/// request for the same targets) is answered from the cache. Pruned
/// subtrees simply stay cold.
pub async fn walk_cached<S, F>(
    cache: &CachedSource<S>,
    root: S::Node,
    max_depth: Option<u32>,
    mut descend: F,
) -> Result<Vec<S::Node>>
where
    S: Source,
    F: FnMut(&S::Node) -> bool,
{
    let mut visited = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back((root, 0u32));

    while let Some((node, level)) = queue.pop_front() {
        if max_depth.is_none_or(|limit| level < limit) && descend(&node) {
            // Children are one level below us; the walk covers whatever
            // budget remains past them.
            let options = match max_depth {
                Some(limit) => FetchOptions::at_depth(limit - level - 1),
                None => FetchOptions::complete(),
            };
            for child in cache.children_with(&node, options).await? {
                queue.push_back((child, level + 1));
            }
        }
        visited.push(node);
    }
    debug!("Cached walk finished: {} nodes visited", visited.len());
    Ok(visited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::source::{Node, NodeMetadata};
    use async_trait::async_trait;
    use serde::Serialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, Serialize)]
    struct TreeNode {
        id: String,
    }

    fn node(id: &str) -> TreeNode {
        TreeNode { id: id.to_string() }
    }

    #[async_trait]
    impl Node for TreeNode {
        fn identifier(&self) -> &str {
            &self.id
        }

        async fn metadata(&self) -> Result<NodeMetadata> {
            Ok(NodeMetadata::default())
        }
    }

    struct TreeSource {
        children: HashMap<String, Vec<String>>,
    }

    impl TreeSource {
        fn sample() -> Self {
            let mut children = HashMap::new();
            children.insert("/".to_string(), vec!["/a".to_string(), "/b".to_string()]);
            children.insert("/a".to_string(), vec!["/a/1".to_string()]);
            Self { children }
        }
    }

    #[async_trait]
    impl Source for TreeSource {
        type Node = TreeNode;

        async fn children(&self, node: &TreeNode) -> Result<Vec<TreeNode>> {
            Ok(self
                .children
                .get(&node.id)
                .map(|ids| ids.iter().map(|id| TreeNode { id: id.clone() }).collect())
                .unwrap_or_default())
        }
    }

    fn ids(nodes: &[TreeNode]) -> Vec<&str> {
        nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_walk_visits_breadth_first() {
        let source = TreeSource::sample();
        let visited = walk(&source, node("/"), None, |_| true).await.unwrap();
        assert_eq!(ids(&visited), ["/", "/a", "/b", "/a/1"]);
    }

    #[tokio::test]
    async fn test_walk_respects_max_depth() {
        let source = TreeSource::sample();
        let visited = walk(&source, node("/"), Some(1), |_| true).await.unwrap();
        assert_eq!(ids(&visited), ["/", "/a", "/b"]);

        let visited = walk(&source, node("/"), Some(0), |_| true).await.unwrap();
        assert_eq!(ids(&visited), ["/"]);
    }

    #[tokio::test]
    async fn test_walk_prunes_on_descend() {
        let source = TreeSource::sample();
        let visited = walk(&source, node("/"), None, |n| n.identifier() != "/a")
            .await
            .unwrap();
        assert_eq!(ids(&visited), ["/", "/a", "/b"]);
    }

    #[tokio::test]
    async fn test_walk_cached_serves_second_walk_from_cache() {
        let cache = CachedSource::new(TreeSource::sample(), CacheConfig::default()).unwrap();

        let first = walk_cached(&cache, node("/"), Some(2), |_| true)
            .await
            .unwrap();
        assert_eq!(ids(&first), ["/", "/a", "/b", "/a/1"]);
        let misses_after_first = cache.stats().misses;
        assert!(misses_after_first > 0);

        let second = walk_cached(&cache, node("/"), Some(2), |_| true)
            .await
            .unwrap();
        assert_eq!(ids(&second), ["/", "/a", "/b", "/a/1"]);
        assert_eq!(cache.stats().misses, misses_after_first);
        assert!(cache.stats().hits > 0);
    }
}
