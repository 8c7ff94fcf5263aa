use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::core::error::Result;

/// Live metadata for a node, as much as the source can supply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct NodeMetadata {
    /// Modification time in fractional seconds since the Unix epoch.
    /// `None` when the source has no usable timestamp; such nodes are
    /// cached and served without staleness checks.
    pub modified: Option<f64>,
    /// Payload size in bytes, when the source tracks one.
    pub size: Option<u64>,
}

/// One node in a hierarchical source.
///
/// `Serialize` feeds the heuristic size accounting of cached
/// enumerations; it never hits a wire or disk.
#[async_trait]
pub trait Node: Clone + Send + Sync + Serialize + 'static {
    /// Stable identifier of this node within its hierarchy,
    /// `/`-separated for path-like sources.
    fn identifier(&self) -> &str;

    /// Current metadata. Failures are treated by callers as "no staleness
    /// information", not as request failures.
    async fn metadata(&self) -> Result<NodeMetadata>;
}

/// Anything that can enumerate the children of its nodes.
#[async_trait]
pub trait Source: Send + Sync + 'static {
    type Node: Node;

    /// Enumerate the direct children of `node`.
    async fn children(&self, node: &Self::Node) -> Result<Vec<Self::Node>>;
}

#[async_trait]
impl<S: Source> Source for Arc<S> {
    type Node = S::Node;

    async fn children(&self, node: &Self::Node) -> Result<Vec<Self::Node>> {
        (**self).children(node).await
    }
}
