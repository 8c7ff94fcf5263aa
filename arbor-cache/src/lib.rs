pub mod config;
pub mod core;
pub mod source;
pub mod walk;

// Re-export commonly used types
pub use config::{CacheConfig, DEFAULT_MAX_DEPTH};
pub use core::{
    AdapterIdentity, ArborError, CacheKey, CacheStats, CachedSource, Depth, FetchOptions, KeyKind,
    Result,
};
pub use source::{Node, NodeMetadata, Source};
pub use walk::{walk, walk_cached};
