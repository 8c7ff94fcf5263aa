pub mod adapter;
pub mod error;
pub mod inflight;
pub mod key;
pub mod store;
pub mod tracker;
pub mod types;

pub use adapter::CachedSource;
pub use error::{ArborError, Result};
pub use key::{AdapterIdentity, CacheKey, KeyKind};
pub use types::{CacheStats, Depth, FetchOptions};
